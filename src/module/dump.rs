//! Debug dump of transformed images
//!
//! Writes each post-transform image to `<root>/<pkg>/<Name>.mod` for offline
//! inspection. All I/O here is best-effort.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::module::name::resource_path;

/// Scratch directory receiving transformed images
#[derive(Debug, Clone)]
pub struct DebugDumpSink {
    root: PathBuf,
}

impl DebugDumpSink {
    /// Prepare the dump directory, wiping whatever it contained
    pub fn prepare<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        if root.exists() {
            fs::remove_dir_all(&root)?;
        }
        fs::create_dir_all(&root)?;
        info!("Dumping transformed modules to {:?}", root);
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File an image for `name` is written to
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(resource_path(name))
    }

    /// Write the image of `name`, replacing an earlier dump
    pub fn save(&self, name: &str, image: &[u8]) -> io::Result<PathBuf> {
        let file = self.path_for(name);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }
        if file.exists() {
            warn!("Transformed module {} already dumped, replacing", name);
            fs::remove_file(&file)?;
        }
        debug!("Saving transformed module {} to {:?}", name, file);
        fs::write(&file, image)?;
        Ok(file)
    }
}
