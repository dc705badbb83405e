//! Configuration management for the module loader
//!
//! Handles configuration loading (TOML or JSON), environment overrides and
//! validation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::env::{env_bool, env_opt};

/// Enables debug tracing of module loading
pub const ENV_DEBUG: &str = "MODLOADER_DEBUG";
/// Enables per-transformer tracing (needs debug)
pub const ENV_DEBUG_FINER: &str = "MODLOADER_DEBUG_FINER";
/// Enables dumping transformed images (needs debug)
pub const ENV_DEBUG_SAVE: &str = "MODLOADER_DEBUG_SAVE";
/// Overrides the dump directory
pub const ENV_DUMP_PATH: &str = "MODLOADER_DUMP_PATH";
/// Serializes all resolution through one lock
pub const ENV_SERIAL: &str = "MODLOADER_SERIAL";

fn default_true() -> bool {
    true
}

fn default_dump_path() -> PathBuf {
    PathBuf::from("./.modloader.out")
}

/// Debug tracing and dump configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Trace module loading
    #[serde(default)]
    pub enabled: bool,

    /// Trace every transformer step (only with `enabled`)
    #[serde(default)]
    pub finer: bool,

    /// Dump transformed images to disk (only with `enabled`)
    #[serde(default)]
    pub save: bool,

    /// Dump directory, wiped at startup when dumping
    #[serde(default = "default_dump_path")]
    pub dump_path: PathBuf,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            finer: false,
            save: false,
            dump_path: default_dump_path(),
        }
    }
}

impl DebugConfig {
    pub fn trace_finer(&self) -> bool {
        self.enabled && self.finer
    }

    pub fn dump_enabled(&self) -> bool {
        self.enabled && self.save
    }
}

/// Name prefixes exempt from parts of the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionConfig {
    /// Delegated entirely to the parent resolver
    #[serde(default)]
    pub loader: Vec<String>,

    /// Resolved locally but never transformed
    #[serde(default)]
    pub transformer: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive (e.g. "info", "modloader=debug"); RUST_LOG wins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// JSON output (needs the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Loader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Byte-code sources in priority order
    #[serde(default)]
    pub sources: Vec<PathBuf>,

    /// Directory scanned for transformer plugin archives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins_dir: Option<PathBuf>,

    /// Transformer module names registered before plugin-declared ones
    #[serde(default)]
    pub transformers: Vec<String>,

    /// Allow concurrent resolution; `false` serializes every request
    #[serde(default = "default_true")]
    pub parallel: bool,

    #[serde(default)]
    pub exclusions: ExclusionConfig,

    #[serde(default)]
    pub debug: DebugConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            plugins_dir: None,
            transformers: Vec::new(),
            parallel: true,
            exclusions: ExclusionConfig::default(),
            debug: DebugConfig::default(),
            logging: None,
        }
    }
}

impl LoaderConfig {
    /// Load configuration from a TOML or JSON file (by extension)
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let config: LoaderConfig = if is_json {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML
    pub fn to_toml_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `MODLOADER_*` environment overrides
    ///
    /// Flags that are set switch features on; unset flags keep the file value.
    pub fn apply_env_overrides(mut self) -> Self {
        if env_bool(ENV_DEBUG) {
            self.debug.enabled = true;
        }
        if env_bool(ENV_DEBUG_FINER) {
            self.debug.finer = true;
        }
        if env_bool(ENV_DEBUG_SAVE) {
            self.debug.save = true;
        }
        if let Some(path) = env_opt(ENV_DUMP_PATH) {
            self.debug.dump_path = PathBuf::from(path);
        }
        if env_bool(ENV_SERIAL) {
            self.parallel = false;
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        for prefix in self
            .exclusions
            .loader
            .iter()
            .chain(self.exclusions.transformer.iter())
        {
            if prefix.is_empty() {
                anyhow::bail!("Empty exclusion prefix would match every module");
            }
        }
        if self.transformers.iter().any(|t| t.trim().is_empty()) {
            anyhow::bail!("Empty transformer name in configuration");
        }
        if self.debug.dump_path.as_os_str().is_empty() {
            anyhow::bail!("Dump path cannot be empty");
        }
        Ok(())
    }
}
