//! Plugin discovery
//!
//! Scans a plugins directory for transformer plugins. A plugin is either an
//! archive (`.tar`, `.tar.gz`, `.tgz`) carrying `plugin.toml` at its root, or
//! a directory with `plugin.toml` beside its module tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::module::registry::manifest::{PluginManifest, PLUGIN_MANIFEST_PATH};
use crate::module::source::{ArchiveSource, DirectorySource};
use crate::module::traits::{ModuleSource, SourceError};

/// Discovered plugin information
#[derive(Clone)]
pub struct DiscoveredPlugin {
    /// Plugin archive or directory
    pub path: PathBuf,
    /// Parsed plugin descriptor
    pub manifest: PluginManifest,
    /// Source exposing the plugin's modules
    pub source: Arc<dyn ModuleSource>,
}

impl std::fmt::Debug for DiscoveredPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveredPlugin")
            .field("path", &self.path)
            .field("manifest", &self.manifest)
            .field("source", &self.source.location())
            .finish()
    }
}

/// Plugin discovery scanner
pub struct PluginDiscovery {
    /// Base directory to scan for plugins
    plugins_dir: PathBuf,
}

impl PluginDiscovery {
    pub fn new<P: AsRef<Path>>(plugins_dir: P) -> Self {
        Self {
            plugins_dir: plugins_dir.as_ref().to_path_buf(),
        }
    }

    /// Discover all plugins, in file name order
    ///
    /// Entries without a readable, valid `plugin.toml` are skipped with a
    /// warning. A missing plugins directory yields no plugins.
    pub fn discover(&self) -> Result<Vec<DiscoveredPlugin>, SourceError> {
        info!("Discovering plugins in {:?}", self.plugins_dir);

        if !self.plugins_dir.exists() {
            debug!("Plugins directory does not exist: {:?}", self.plugins_dir);
            return Ok(Vec::new());
        }

        let mut paths = fs::read_dir(&self.plugins_dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        paths.sort();

        let mut plugins = Vec::new();
        for path in paths {
            let source: Arc<dyn ModuleSource> = if path.is_dir() {
                Arc::new(DirectorySource::new(&path))
            } else if ArchiveSource::is_archive_path(&path) {
                Arc::new(ArchiveSource::new(&path))
            } else {
                debug!("Skipping non-plugin entry {:?}", path);
                continue;
            };

            if !source.contains(PLUGIN_MANIFEST_PATH) {
                debug!("No {} found in {:?}, skipping", PLUGIN_MANIFEST_PATH, path);
                continue;
            }

            match Self::read_manifest(source.as_ref()) {
                Ok(manifest) => {
                    debug!(
                        "Found plugin {} {} with {} transformers",
                        manifest.name,
                        manifest.version,
                        manifest.transformers.len()
                    );
                    plugins.push(DiscoveredPlugin {
                        path,
                        manifest,
                        source,
                    });
                }
                Err(e) => {
                    warn!("Failed to parse plugin manifest in {:?}: {}", path, e);
                }
            }
        }

        info!("Discovered {} plugins", plugins.len());
        Ok(plugins)
    }

    fn read_manifest(source: &dyn ModuleSource) -> Result<PluginManifest, SourceError> {
        let raw = source.read(PLUGIN_MANIFEST_PATH)?;
        let text = std::str::from_utf8(&raw)
            .map_err(|e| SourceError::InvalidManifest(format!("Manifest is not UTF-8: {}", e)))?;
        PluginManifest::parse(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_tar(path: &Path, entries: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let mut builder = tar::Builder::new(file);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, data.as_bytes()).unwrap();
        }
        builder.finish().unwrap();
    }

    #[test]
    fn test_missing_directory_yields_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let discovery = PluginDiscovery::new(temp_dir.path().join("absent"));
        assert!(discovery.discover().unwrap().is_empty());
    }

    #[test]
    fn test_discovers_archives_and_directories() {
        let temp_dir = TempDir::new().unwrap();
        write_tar(
            &temp_dir.path().join("a-renamer.tar"),
            &[
                (
                    "plugin.toml",
                    "name = \"renamer\"\nversion = \"1.0.0\"\ntransformers = [\"plugins.Renamer\"]\n",
                ),
                ("plugins/Renamer.mod", "plugin"),
            ],
        );

        let dir_plugin = temp_dir.path().join("b-dir");
        fs::create_dir_all(&dir_plugin).unwrap();
        fs::write(
            dir_plugin.join("plugin.toml"),
            "name = \"dir\"\nversion = \"0.1.0\"\nconfigs = [\"dir.cfg\"]\n",
        )
        .unwrap();

        fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let plugins = PluginDiscovery::new(temp_dir.path()).discover().unwrap();
        assert_eq!(plugins.len(), 2);
        assert_eq!(plugins[0].manifest.name, "renamer");
        assert_eq!(plugins[0].manifest.transformers, vec!["plugins.Renamer".to_string()]);
        assert!(plugins[0].source.contains("plugins/Renamer.mod"));
        assert_eq!(plugins[1].manifest.configs, vec!["dir.cfg".to_string()]);
    }

    #[test]
    fn test_invalid_manifest_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        write_tar(
            &temp_dir.path().join("broken.tar"),
            &[("plugin.toml", "name = \"\"\nversion = \"1\"\n")],
        );
        write_tar(&temp_dir.path().join("plain.tar"), &[("pkg/Foo.mod", "foo")]);

        assert!(PluginDiscovery::new(temp_dir.path()).discover().unwrap().is_empty());
    }
}
