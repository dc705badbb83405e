//! Module system
//!
//! Components, leaves first:
//!
//! - **Sources**: ordered archives and directories supplying raw images
//! - **Resource cache**: positive and negative memoization of source lookups
//! - **Transformer chain**: registration-ordered plugins, one optional name remapper
//! - **Loader**: the resolution state machine tying everything together
//! - **Dump sink**: optional on-disk copy of every transformed image

pub mod bootstrap;
pub mod cache;
pub mod dump;
pub mod loader;
pub mod name;
pub mod provenance;
pub mod registry;
pub mod runtime;
pub mod source;
pub mod traits;
pub mod transformer;

pub use bootstrap::{Bootstrap, BootstrapResult};
pub use cache::ResourceCache;
pub use dump::DebugDumpSink;
pub use loader::{ModuleLoader, NullParent};
pub use provenance::{CodeSource, Package, PackageTable, Provenance};
pub use registry::{ArchiveManifest, DiscoveredPlugin, PluginDiscovery, PluginManifest};
pub use runtime::{DefinedModule, InMemoryRuntime, TransformerFactory};
pub use source::{open_source, ArchiveSource, DirectorySource, MemorySource, SourceSet};
pub use traits::{
    LoadError, ModuleRuntime, ModuleSource, NameRemapper, ParentResolver, RuntimeError,
    SourceError, SourceKind, Transformer,
};
pub use transformer::TransformerChain;
