//! Directory-backed source

use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};

use crate::module::traits::{ModuleSource, SourceKind};

/// Source reading module images from files under a root directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    location: String,
}

impl DirectorySource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        let location = root.display().to_string();
        Self { root, location }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        // Storage paths are relative and never climb out of the root
        if path.split('/').any(|part| part == "..") || path.starts_with('/') {
            return None;
        }
        Some(self.root.join(path))
    }
}

impl ModuleSource for DirectorySource {
    fn location(&self) -> &str {
        &self.location
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Directory
    }

    fn contains(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    fn read(&self, path: &str) -> io::Result<Bytes> {
        let file = self.resolve(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("invalid path: {}", path))
        })?;
        Ok(Bytes::from(std::fs::read(file)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_lookup() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("pkg")).unwrap();
        std::fs::write(temp_dir.path().join("pkg/Foo.mod"), b"foo").unwrap();

        let source = DirectorySource::new(temp_dir.path());
        assert!(source.contains("pkg/Foo.mod"));
        assert!(!source.contains("pkg/Bar.mod"));
        assert!(!source.contains("pkg"));
        assert!(!source.contains("../etc/passwd"));
        assert_eq!(source.read("pkg/Foo.mod").unwrap(), Bytes::from_static(b"foo"));
        assert!(source.read("pkg/Bar.mod").is_err());
        assert!(source.manifest().is_none());
    }
}
