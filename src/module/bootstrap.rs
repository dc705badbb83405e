//! Loader bootstrap
//!
//! Two-phase start-up: the loader is constructed with an empty transformer
//! chain, then every transformer plugin is resolved through that same loader
//! and appended to the chain before any application module is requested.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::LoaderConfig;
use crate::module::loader::{ModuleLoader, NullParent};
use crate::module::registry::discovery::{DiscoveredPlugin, PluginDiscovery};
use crate::module::source::{open_source, SourceSet};
use crate::module::traits::{ModuleRuntime, ModuleSource, ParentResolver};

/// Outcome of a bootstrap run
#[derive(Debug)]
pub struct BootstrapResult {
    /// Loader with all registrable transformers in its chain
    pub loader: ModuleLoader,
    /// Plugins found in the plugins directory
    pub plugins: Vec<DiscoveredPlugin>,
    /// Configuration file names declared by the plugins, in plugin order
    pub configs: Vec<String>,
    /// Transformer ids that were registered successfully
    pub registered: Vec<String>,
}

/// Builds a ready-to-use loader from configuration
pub struct Bootstrap {
    config: LoaderConfig,
    parent: Arc<dyn ParentResolver>,
    runtime: Arc<dyn ModuleRuntime>,
    base_sources: Vec<Arc<dyn ModuleSource>>,
}

impl Bootstrap {
    pub fn new(config: LoaderConfig, runtime: Arc<dyn ModuleRuntime>) -> Self {
        Self {
            config,
            parent: Arc::new(NullParent),
            runtime,
            base_sources: Vec::new(),
        }
    }

    /// Resolver for loader-excluded names
    pub fn with_parent(mut self, parent: Arc<dyn ParentResolver>) -> Self {
        self.parent = parent;
        self
    }

    /// Extra base source, placed after the configured source paths
    pub fn with_source(mut self, source: Arc<dyn ModuleSource>) -> Self {
        self.base_sources.push(source);
        self
    }

    /// Build the source set, construct the loader and register transformers
    ///
    /// Unreadable source paths and broken transformers are logged and
    /// skipped. Only an unreadable plugins directory is an error.
    pub fn run(self) -> anyhow::Result<BootstrapResult> {
        let sources = SourceSet::default();
        for path in &self.config.sources {
            match open_source(path) {
                Ok(source) => sources.push(source),
                Err(e) => warn!("Skipping source {:?}: {}", path, e),
            }
        }
        for source in self.base_sources {
            sources.push(source);
        }

        let plugins = match &self.config.plugins_dir {
            Some(dir) => PluginDiscovery::new(dir).discover()?,
            None => Vec::new(),
        };
        for plugin in &plugins {
            sources.push(Arc::clone(&plugin.source));
        }

        let loader = ModuleLoader::new(sources, self.parent, self.runtime, &self.config);

        let ids = self
            .config
            .transformers
            .iter()
            .chain(plugins.iter().flat_map(|p| p.manifest.transformers.iter()));
        let mut registered = Vec::new();
        for id in ids {
            if loader.register_transformer(id) {
                registered.push(id.clone());
            }
        }

        let configs: Vec<String> = plugins
            .iter()
            .flat_map(|p| p.manifest.configs.iter().cloned())
            .collect();

        info!(
            "Bootstrap complete: {} sources, {} plugins, {} transformers",
            loader.sources().len(),
            plugins.len(),
            registered.len()
        );

        Ok(BootstrapResult {
            loader,
            plugins,
            configs,
            registered,
        })
    }
}
