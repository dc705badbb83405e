//! Byte-code sources
//!
//! The [`SourceSet`] is the ordered list of locations the loader reads raw
//! module images from. It only ever grows: sources are appended (for
//! example once a plugin archive has been discovered) and never reordered.

pub mod archive;
pub mod directory;
pub mod memory;

pub use archive::ArchiveSource;
pub use directory::DirectorySource;
pub use memory::MemorySource;

use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::module::traits::{ModuleSource, SourceError};

/// Open a filesystem location as a source
///
/// Directories become [`DirectorySource`]s; `.tar`, `.tar.gz` and `.tgz`
/// files become [`ArchiveSource`]s.
pub fn open_source<P: AsRef<Path>>(path: P) -> Result<Arc<dyn ModuleSource>, SourceError> {
    let path = path.as_ref();
    if path.is_dir() {
        return Ok(Arc::new(DirectorySource::new(path)));
    }
    if path.is_file() && ArchiveSource::is_archive_path(path) {
        return Ok(Arc::new(ArchiveSource::new(path)));
    }
    if !path.exists() {
        return Err(SourceError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("source does not exist: {}", path.display()),
        )));
    }
    Err(SourceError::Unsupported(path.to_path_buf()))
}

/// Ordered, append-only set of sources
#[derive(Default)]
pub struct SourceSet {
    sources: RwLock<Vec<Arc<dyn ModuleSource>>>,
}

impl SourceSet {
    /// Create a source set in the given priority order
    pub fn new(sources: Vec<Arc<dyn ModuleSource>>) -> Self {
        Self {
            sources: RwLock::new(sources),
        }
    }

    /// Source set with one source
    pub fn single(source: Arc<dyn ModuleSource>) -> Self {
        Self::new(vec![source])
    }

    /// Append a source after all existing ones
    pub fn push(&self, source: Arc<dyn ModuleSource>) {
        debug!("Adding source {}", source.location());
        self.sources.write().push(source);
    }

    /// Current sources in order
    pub fn snapshot(&self) -> Vec<Arc<dyn ModuleSource>> {
        self.sources.read().clone()
    }

    /// Locations of all sources in order
    pub fn locations(&self) -> Vec<String> {
        self.sources
            .read()
            .iter()
            .map(|s| s.location().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }

    /// First source exposing `path`
    pub fn find(&self, path: &str) -> Option<Arc<dyn ModuleSource>> {
        self.sources
            .read()
            .iter()
            .find(|source| source.contains(path))
            .cloned()
    }
}

impl std::fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.locations()).finish()
    }
}
