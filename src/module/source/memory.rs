//! In-memory source for synthetic modules

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::module::name::resource_path;
use crate::module::registry::manifest::ArchiveManifest;
use crate::module::traits::{ModuleSource, SourceKind};

/// Source holding entries in memory
///
/// Reports itself as a directory unless a manifest is attached, in which
/// case it behaves like an archive for provenance purposes.
pub struct MemorySource {
    location: String,
    entries: RwLock<HashMap<String, Bytes>>,
    manifest: Option<Arc<ArchiveManifest>>,
    reads: AtomicUsize,
}

impl MemorySource {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            entries: RwLock::new(HashMap::new()),
            manifest: None,
            reads: AtomicUsize::new(0),
        }
    }

    /// Add a module image under its storage path
    pub fn with_module(self, name: &str, image: Bytes) -> Self {
        self.insert(&resource_path(name), image);
        self
    }

    /// Add an entry under a raw path
    pub fn with_entry(self, path: &str, data: Bytes) -> Self {
        self.insert(path, data);
        self
    }

    /// Attach an archive manifest
    pub fn with_manifest(mut self, manifest: ArchiveManifest) -> Self {
        self.manifest = Some(Arc::new(manifest));
        self
    }

    pub fn insert(&self, path: &str, data: Bytes) {
        self.entries.write().insert(path.to_string(), data);
    }

    /// Number of successful reads served so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ModuleSource for MemorySource {
    fn location(&self) -> &str {
        &self.location
    }

    fn kind(&self) -> SourceKind {
        if self.manifest.is_some() {
            SourceKind::Archive
        } else {
            SourceKind::Directory
        }
    }

    fn contains(&self, path: &str) -> bool {
        self.entries.read().contains_key(path)
    }

    fn read(&self, path: &str) -> io::Result<Bytes> {
        let data = self.entries.read().get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no entry {}", path))
        })?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    }

    fn manifest(&self) -> Option<Arc<ArchiveManifest>> {
        self.manifest.clone()
    }
}
