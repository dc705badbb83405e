//! Manifests and plugin discovery
//!
//! Archive manifests (sealing and signer data) and transformer plugin
//! descriptors, plus the scanner that finds plugins on disk.

pub mod discovery;
pub mod manifest;

pub use discovery::{DiscoveredPlugin, PluginDiscovery};
pub use manifest::{ArchiveManifest, PluginManifest};
