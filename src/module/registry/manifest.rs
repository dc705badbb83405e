//! Manifest parsing
//!
//! Two manifests live inside archives:
//! - `META-INF/manifest.toml`: packaging attributes (sealing, package
//!   metadata, per-entry digests and signers)
//! - `plugin.toml`: transformer plugin descriptor

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use tracing::error;

use crate::module::traits::SourceError;

/// Location of the archive manifest inside an archive
pub const ARCHIVE_MANIFEST_PATH: &str = "META-INF/manifest.toml";

/// Location of the plugin descriptor inside a plugin archive
pub const PLUGIN_MANIFEST_PATH: &str = "plugin.toml";

/// Per-package attributes (keyed by `pkg/path/`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageAttributes {
    /// Overrides the main `sealed` attribute when present
    pub sealed: Option<bool>,
    pub title: Option<String>,
    pub version: Option<String>,
    pub vendor: Option<String>,
}

/// Per-entry attributes (keyed by storage path)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAttributes {
    /// Hex SHA-256 of the entry bytes the signers vouch for
    pub sha256: Option<String>,
    #[serde(default)]
    pub signers: Vec<String>,
}

/// Archive manifest (`META-INF/manifest.toml`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    /// Main sealing attribute
    #[serde(default)]
    pub sealed: bool,
    pub title: Option<String>,
    pub version: Option<String>,
    pub vendor: Option<String>,
    #[serde(default)]
    pub packages: HashMap<String, PackageAttributes>,
    #[serde(default)]
    pub entries: HashMap<String, EntryAttributes>,
}

impl ArchiveManifest {
    /// Parse manifest text
    pub fn parse(contents: &str) -> Result<Self, SourceError> {
        toml::from_str(contents).map_err(|e| {
            SourceError::InvalidManifest(format!("Failed to parse manifest TOML: {}", e))
        })
    }

    /// Per-path attributes for a package path (`pkg/sub/`)
    pub fn package_attributes(&self, package_path: &str) -> Option<&PackageAttributes> {
        self.packages.get(package_path)
    }

    /// Whether the package at `package_path` is sealed
    ///
    /// The per-path attribute wins; the main attribute applies otherwise.
    pub fn is_sealed(&self, package_path: &str) -> bool {
        self.package_attributes(package_path)
            .and_then(|attrs| attrs.sealed)
            .unwrap_or(self.sealed)
    }

    /// Package title, per-path first
    pub fn title_for(&self, package_path: &str) -> Option<String> {
        self.package_attributes(package_path)
            .and_then(|a| a.title.clone())
            .or_else(|| self.title.clone())
    }

    /// Package version, per-path first
    pub fn version_for(&self, package_path: &str) -> Option<String> {
        self.package_attributes(package_path)
            .and_then(|a| a.version.clone())
            .or_else(|| self.version.clone())
    }

    /// Package vendor, per-path first
    pub fn vendor_for(&self, package_path: &str) -> Option<String> {
        self.package_attributes(package_path)
            .and_then(|a| a.vendor.clone())
            .or_else(|| self.vendor.clone())
    }

    /// Signers of an entry whose recorded digest matches `bytes`
    ///
    /// A digest mismatch or an entry without a digest yields no signers.
    pub fn signers_for(&self, entry_path: &str, bytes: &[u8]) -> Vec<String> {
        let Some(entry) = self.entries.get(entry_path) else {
            return Vec::new();
        };
        if entry.signers.is_empty() {
            return Vec::new();
        }
        let Some(expected) = entry.sha256.as_deref() else {
            error!("Manifest lists signers for {} without a digest", entry_path);
            return Vec::new();
        };

        let actual = hex::encode(Sha256::digest(bytes));
        if !actual.eq_ignore_ascii_case(expected) {
            error!(
                "Digest mismatch for signed entry {} (expected {}, got {})",
                entry_path, expected, actual
            );
            return Vec::new();
        }
        entry.signers.clone()
    }
}

/// Transformer plugin descriptor (`plugin.toml`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin name
    pub name: String,
    /// Plugin version
    pub version: String,
    /// Human-readable description
    pub description: Option<String>,
    /// Transformer module names, registered in order
    #[serde(default)]
    pub transformers: Vec<String>,
    /// Configuration file names shipped with the plugin
    #[serde(default)]
    pub configs: Vec<String>,
}

impl PluginManifest {
    /// Load manifest from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SourceError::InvalidManifest(format!("Failed to read manifest file: {}", e))
        })?;
        Self::parse(&contents)
    }

    /// Parse and validate manifest text
    pub fn parse(contents: &str) -> Result<Self, SourceError> {
        let manifest: PluginManifest = toml::from_str(contents).map_err(|e| {
            SourceError::InvalidManifest(format!("Failed to parse manifest TOML: {}", e))
        })?;

        if manifest.name.is_empty() {
            return Err(SourceError::InvalidManifest(
                "Plugin name cannot be empty".to_string(),
            ));
        }
        if manifest.transformers.iter().any(|t| t.trim().is_empty()) {
            return Err(SourceError::InvalidManifest(format!(
                "Plugin {} declares an empty transformer name",
                manifest.name
            )));
        }

        Ok(manifest)
    }
}
