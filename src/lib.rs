//! Modloader - bootstrap module loader with a pluggable transformer chain
//!
//! Resolves named binary modules from a prioritized set of byte-code sources,
//! runs each through an ordered chain of transformer plugins, remaps module
//! identities and hands the finished images to a runtime with provenance
//! (origin, signers, package sealing) attached.
//!
//! ## Design Principles
//!
//! 1. **Owned state**: every cache lives in the loader instance, never in statics
//! 2. **Monotonic caches**: images are immutable, so nothing is ever evicted
//! 3. **Failure isolation**: broken plugins and sealing mismatches are logged,
//!    never fatal to the loader
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use modloader::{InMemoryRuntime, MemorySource, ModuleLoader, SourceSet};
//!
//! let source = MemorySource::new("memory:app").with_module("app.Main", Bytes::from_static(b"main"));
//! let loader = ModuleLoader::with_runtime(
//!     SourceSet::single(Arc::new(source)),
//!     Arc::new(InMemoryRuntime::new()),
//! );
//! let module = loader.resolve("app.Main").unwrap();
//! assert_eq!(module.name(), "app.Main");
//! ```

pub mod config;
pub mod module;
pub mod utils;

pub use config::{DebugConfig, ExclusionConfig, LoaderConfig, LoggingConfig};
pub use module::*;
