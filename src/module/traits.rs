//! Module system traits and interfaces
//!
//! Defines the seams between the loader and its collaborators: byte-code
//! sources, transformer plugins, the parent resolver and the runtime that
//! receives finished modules.

use bytes::Bytes;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::module::provenance::{CodeSource, Package};
use crate::module::registry::manifest::ArchiveManifest;
use crate::module::runtime::DefinedModule;

/// Kind of location a source reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Packed archive; may carry a manifest with sealing and signer data
    Archive,
    /// Plain directory tree; never sealed, never signed
    Directory,
}

/// A byte-code source contributing named module entries
///
/// Paths are storage paths (`pkg/Name.mod`), see
/// [`resource_path`](crate::module::name::resource_path).
pub trait ModuleSource: Send + Sync {
    /// Location string used as the origin of modules read from this source
    fn location(&self) -> &str;

    /// Whether this is an archive or a directory
    fn kind(&self) -> SourceKind;

    /// Check if the source exposes `path`
    fn contains(&self, path: &str) -> bool;

    /// Read the entry at `path` fully
    fn read(&self, path: &str) -> io::Result<Bytes>;

    /// Archive manifest, if the source has one
    fn manifest(&self) -> Option<Arc<ArchiveManifest>> {
        None
    }
}

/// Optional name remapping capability of a transformer
///
/// `unmap(remap(x)) == x` is expected of implementations. The loader does
/// not enforce it.
pub trait NameRemapper: Send + Sync {
    /// Logical name to storage name
    fn remap(&self, name: &str) -> String;

    /// Storage name back to logical name
    fn unmap(&self, name: &str) -> String;
}

/// Binary transformer plugin
///
/// Receives the accumulated output of the previous transformer (or the raw
/// source bytes, or `None` when the source has nothing) and returns the new
/// image, or `None` to signal "no output".
pub trait Transformer: Send + Sync {
    /// Name used in trace output
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Transform one module image
    fn transform(
        &self,
        name: &str,
        transformed_name: &str,
        image: Option<Bytes>,
    ) -> anyhow::Result<Option<Bytes>>;

    /// Name remapping capability, if this transformer has one
    fn as_remapper(&self) -> Option<&dyn NameRemapper> {
        None
    }
}

/// Upstream resolver consulted for loader-excluded names
pub trait ParentResolver: Send + Sync {
    /// Resolve a module by name; results are returned to callers verbatim
    fn load_by_name(&self, name: &str) -> Result<Arc<DefinedModule>, LoadError>;
}

/// Runtime that owns defined modules
pub trait ModuleRuntime: Send + Sync {
    /// Define a finished module image under `name`
    fn define_module(
        &self,
        name: &str,
        image: Bytes,
        code_source: Option<CodeSource>,
        package: Option<Arc<Package>>,
    ) -> Result<Arc<DefinedModule>, RuntimeError>;

    /// Create a transformer instance from a defined plugin module
    ///
    /// `id` is the name the plugin was registered under; `module` may carry
    /// a different (remapped) storage name.
    fn instantiate_transformer(
        &self,
        id: &str,
        module: &DefinedModule,
    ) -> Result<Arc<dyn Transformer>, RuntimeError>;
}

/// Resolution errors surfaced to callers of `resolve`
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Failed to define module {name}: {source}")]
    Definition {
        name: String,
        #[source]
        source: RuntimeError,
    },
}

impl LoadError {
    /// Name the error refers to
    pub fn module_name(&self) -> &str {
        match self {
            LoadError::NotFound(name) => name,
            LoadError::Definition { name, .. } => name,
        }
    }
}

/// Errors raised by a [`ModuleRuntime`]
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Duplicate module definition: {0}")]
    DuplicateDefinition(String),

    #[error("Malformed module image for {name}: {reason}")]
    MalformedImage { name: String, reason: String },

    #[error("No transformer constructor registered for module {0}")]
    NoConstructor(String),

    #[error("Invalid package state for {name}: {reason}")]
    InvalidPackage { name: String, reason: String },
}

/// Errors opening or reading sources
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported source: {0:?}")]
    Unsupported(PathBuf),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
}
