//! Archive-backed source (`.tar`, `.tar.gz`, `.tgz`)
//!
//! The archive is read once, on first access, into an in-memory index.
//! A broken archive is logged and behaves like an empty one.

use bytes::Bytes;
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, warn};

use crate::module::registry::manifest::{ArchiveManifest, ARCHIVE_MANIFEST_PATH};
use crate::module::traits::{ModuleSource, SourceError, SourceKind};

#[derive(Default)]
struct ArchiveIndex {
    entries: HashMap<String, Bytes>,
    manifest: Option<Arc<ArchiveManifest>>,
}

/// Source reading module images out of a tar archive
pub struct ArchiveSource {
    path: PathBuf,
    location: String,
    index: OnceLock<ArchiveIndex>,
}

impl ArchiveSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let location = path.display().to_string();
        Self {
            path,
            location,
            index: OnceLock::new(),
        }
    }

    /// Check if a path names a supported archive
    pub fn is_archive_path(path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        name.ends_with(".tar") || name.ends_with(".tar.gz") || name.ends_with(".tgz")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entry paths contained in the archive
    pub fn entry_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.index().entries.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn index(&self) -> &ArchiveIndex {
        self.index.get_or_init(|| match Self::load(&self.path) {
            Ok(index) => {
                debug!("Indexed {} entries from {}", index.entries.len(), self.location);
                index
            }
            Err(e) => {
                warn!("Failed to read archive {}: {}", self.location, e);
                ArchiveIndex::default()
            }
        })
    }

    fn load(path: &Path) -> Result<ArchiveIndex, SourceError> {
        let file = File::open(path)?;
        let name = path.to_string_lossy().to_ascii_lowercase();
        let reader: Box<dyn Read> = if name.ends_with(".gz") || name.ends_with(".tgz") {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        let mut archive = tar::Archive::new(reader);
        let mut entries = HashMap::new();
        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let entry_path = entry
                .path()?
                .to_string_lossy()
                .replace('\\', "/")
                .trim_start_matches("./")
                .to_string();
            // Header sizes are untrusted; grow the buffer from what is actually read
            let declared = entry.size();
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            if data.len() as u64 != declared {
                return Err(SourceError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "entry {} declares {} bytes but holds {}",
                        entry_path,
                        declared,
                        data.len()
                    ),
                )));
            }
            entries.insert(entry_path, Bytes::from(data));
        }

        let manifest = entries
            .get(ARCHIVE_MANIFEST_PATH)
            .and_then(|raw| match std::str::from_utf8(raw) {
                Ok(text) => match ArchiveManifest::parse(text) {
                    Ok(manifest) => Some(Arc::new(manifest)),
                    Err(e) => {
                        error!("Ignoring manifest of {}: {}", path.display(), e);
                        None
                    }
                },
                Err(e) => {
                    error!("Ignoring non UTF-8 manifest of {}: {}", path.display(), e);
                    None
                }
            });

        Ok(ArchiveIndex { entries, manifest })
    }
}

impl ModuleSource for ArchiveSource {
    fn location(&self) -> &str {
        &self.location
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Archive
    }

    fn contains(&self, path: &str) -> bool {
        self.index().entries.contains_key(path)
    }

    fn read(&self, path: &str) -> io::Result<Bytes> {
        self.index().entries.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} has no entry {}", self.location, path),
            )
        })
    }

    fn manifest(&self) -> Option<Arc<ArchiveManifest>> {
        self.index().manifest.clone()
    }
}

impl std::fmt::Debug for ArchiveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveSource")
            .field("path", &self.path)
            .field("indexed", &self.index.get().is_some())
            .finish()
    }
}
