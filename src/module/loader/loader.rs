//! Module loader implementation
//!
//! Resolves module names into defined modules: exclusion rules, cache
//! lookups, name remapping, the transformer chain, provenance and the final
//! definition into the runtime. Every cache is owned by the loader instance
//! and only grows; the loader is expected to live as long as the process.

use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use parking_lot::ReentrantMutex;
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::config::LoaderConfig;
use crate::module::cache::ResourceCache;
use crate::module::dump::DebugDumpSink;
use crate::module::name::{matches_any, normalize};
use crate::module::provenance::PackageTable;
use crate::module::runtime::DefinedModule;
use crate::module::source::SourceSet;
use crate::module::traits::{LoadError, ModuleRuntime, ModuleSource, ParentResolver, Transformer};
use crate::module::transformer::TransformerChain;
use crate::utils::error::log_error;

/// Parent resolver that knows no modules
#[derive(Debug, Default, Clone, Copy)]
pub struct NullParent;

impl ParentResolver for NullParent {
    fn load_by_name(&self, name: &str) -> Result<Arc<DefinedModule>, LoadError> {
        Err(LoadError::NotFound(name.to_string()))
    }
}

/// Module loader and transformation pipeline
pub struct ModuleLoader {
    sources: SourceSet,
    parent: Arc<dyn ParentResolver>,
    runtime: Arc<dyn ModuleRuntime>,
    chain: TransformerChain,
    cache: ResourceCache,
    packages: PackageTable,
    /// Finished modules keyed by storage name
    defined: DashMap<String, Arc<DefinedModule>>,
    /// Names that failed resolution; never retried
    invalid: DashSet<String>,
    loader_exclusions: DashSet<String>,
    transformer_exclusions: DashSet<String>,
    dump: Option<DebugDumpSink>,
    /// Single-flight locks for names being resolved
    in_flight: DashMap<String, Arc<ReentrantMutex<()>>>,
    /// Loader-wide lock in legacy serial mode
    serial: Option<ReentrantMutex<()>>,
    debug: bool,
}

impl ModuleLoader {
    /// Create a loader with an empty transformer chain
    ///
    /// Exclusions and debug settings come from `config`. When dumping is
    /// enabled the dump directory is wiped here; failing to prepare it only
    /// disables dumping.
    pub fn new(
        sources: SourceSet,
        parent: Arc<dyn ParentResolver>,
        runtime: Arc<dyn ModuleRuntime>,
        config: &LoaderConfig,
    ) -> Self {
        let debug_enabled = config.debug.enabled;
        let dump = if config.debug.dump_enabled() {
            log_error(
                || DebugDumpSink::prepare(&config.debug.dump_path),
                "Failed to prepare module dump directory",
            )
        } else {
            None
        };

        let loader = Self {
            sources,
            parent,
            runtime,
            chain: TransformerChain::new(config.debug.trace_finer()),
            cache: ResourceCache::new(debug_enabled),
            packages: PackageTable::new(),
            defined: DashMap::new(),
            invalid: DashSet::new(),
            loader_exclusions: config.exclusions.loader.iter().cloned().collect(),
            transformer_exclusions: config.exclusions.transformer.iter().cloned().collect(),
            dump,
            in_flight: DashMap::new(),
            serial: (!config.parallel).then(|| ReentrantMutex::new(())),
            debug: debug_enabled,
        };

        info!(
            "Module loader created with {} sources (parallel: {}, debug: {})",
            loader.sources.len(),
            config.parallel,
            loader.debug
        );
        loader
    }

    /// Loader with no parent and default configuration
    pub fn with_runtime(sources: SourceSet, runtime: Arc<dyn ModuleRuntime>) -> Self {
        Self::new(sources, Arc::new(NullParent), runtime, &LoaderConfig::default())
    }

    /// Resolve a module by name
    ///
    /// Slash-separated names are accepted and treated as their dotted form.
    pub fn resolve(&self, name: &str) -> Result<Arc<DefinedModule>, LoadError> {
        let _serial = self.serial.as_ref().map(|lock| lock.lock());
        let name = normalize(name);
        let name = name.as_str();

        if self.invalid.contains(name) {
            return Err(LoadError::NotFound(name.to_string()));
        }

        if self.is_loader_excluded(name) {
            return self.parent.load_by_name(name);
        }

        if let Some(module) = self.cached_module(name) {
            return Ok(module);
        }

        let excluded = self.is_transformer_excluded(name);
        let storage_name = if excluded {
            name.to_string()
        } else {
            self.chain.remap(name)
        };

        let lock = self.name_lock(&storage_name);
        let result = {
            let _guard = lock.lock();
            // Another thread may have settled this name while we waited
            if self.invalid.contains(name) {
                Err(LoadError::NotFound(name.to_string()))
            } else if let Some(module) = self.cached_module(name) {
                Ok(module)
            } else if excluded {
                self.define_untransformed(name)
            } else {
                self.transform_and_define(name, &storage_name)
            }
        };
        drop(lock);
        self.in_flight
            .remove_if(&storage_name, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    /// Register a transformer plugin by module name
    ///
    /// The plugin module is resolved through this loader and instantiated by
    /// the runtime. Failures are logged and the plugin is skipped. Returns
    /// whether the transformer was added to the chain.
    pub fn register_transformer(&self, id: &str) -> bool {
        match log_error(
            || self.instantiate_transformer(id),
            &format!("Error registering transformer {}", id),
        ) {
            Some(transformer) => {
                let remapper = self.chain.push(transformer);
                info!(
                    "Registered transformer {}{}",
                    id,
                    if remapper { " as name remapper" } else { "" }
                );
                true
            }
            None => false,
        }
    }

    fn instantiate_transformer(&self, id: &str) -> anyhow::Result<Arc<dyn Transformer>> {
        let module = self.resolve(id)?;
        Ok(self.runtime.instantiate_transformer(id, &module)?)
    }

    // Plain path for transformer-excluded names: raw bytes, provenance, define.
    fn define_untransformed(&self, name: &str) -> Result<Arc<DefinedModule>, LoadError> {
        let Some(raw) = self.cache.get_bytes(name, &self.sources) else {
            return Err(self.mark_invalid(name));
        };
        let provenance = self.packages.derive(name, &self.sources, Some(&raw));
        match self
            .runtime
            .define_module(name, raw, provenance.code_source, provenance.package)
        {
            Ok(module) => Ok(self.cache_module(name, module)),
            Err(source) => {
                self.invalid.insert(name.to_string());
                Err(LoadError::Definition {
                    name: name.to_string(),
                    source,
                })
            }
        }
    }

    fn transform_and_define(
        &self,
        name: &str,
        storage_name: &str,
    ) -> Result<Arc<DefinedModule>, LoadError> {
        if let Some(module) = self.cached_module(storage_name) {
            return Ok(module);
        }

        let logical_name = self.chain.unmap(name);
        let raw = self.cache.get_bytes(&logical_name, &self.sources);

        let image = match self.chain.run(&logical_name, storage_name, raw.clone()) {
            Ok(Some(image)) => image,
            Ok(None) => {
                if self.debug {
                    debug!("No image produced for {} ({})", logical_name, storage_name);
                }
                return Err(self.mark_invalid(name));
            }
            Err(e) => {
                if self.debug {
                    debug!("Transform of {} failed: {:#}", name, e);
                } else {
                    trace!("Transform of {} failed: {:#}", name, e);
                }
                return Err(self.mark_invalid(name));
            }
        };

        if let Some(dump) = &self.dump {
            log_error(
                || dump.save(storage_name, &image),
                &format!("Failed to dump transformed module {}", storage_name),
            );
        }

        let provenance = self.packages.derive(&logical_name, &self.sources, raw.as_ref());
        match self.runtime.define_module(
            storage_name,
            image,
            provenance.code_source,
            provenance.package,
        ) {
            Ok(module) => Ok(self.cache_module(storage_name, module)),
            Err(source) => {
                if self.debug {
                    debug!("Definition of {} failed: {}", storage_name, source);
                }
                self.invalid.insert(name.to_string());
                Err(LoadError::Definition {
                    name: name.to_string(),
                    source,
                })
            }
        }
    }

    fn cache_module(&self, key: &str, module: Arc<DefinedModule>) -> Arc<DefinedModule> {
        let entry = self.defined.entry(key.to_string()).or_insert(module);
        Arc::clone(entry.value())
    }

    fn mark_invalid(&self, name: &str) -> LoadError {
        self.invalid.insert(name.to_string());
        LoadError::NotFound(name.to_string())
    }

    fn name_lock(&self, key: &str) -> Arc<ReentrantMutex<()>> {
        let entry = self
            .in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(ReentrantMutex::new(())));
        Arc::clone(entry.value())
    }

    fn is_loader_excluded(&self, name: &str) -> bool {
        self.loader_exclusions
            .iter()
            .any(|prefix| matches_any(name, [prefix.as_str()]))
    }

    fn is_transformer_excluded(&self, name: &str) -> bool {
        self.transformer_exclusions
            .iter()
            .any(|prefix| matches_any(name, [prefix.as_str()]))
    }

    /// Raw (untransformed) bytes of `name` through the resource cache
    pub fn get_bytes(&self, name: &str) -> Option<Bytes> {
        self.cache.get_bytes(name, &self.sources)
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    /// Append a source after the existing ones
    pub fn add_source(&self, source: Arc<dyn ModuleSource>) {
        self.sources.push(source);
    }

    pub fn loader_exclusions(&self) -> Vec<String> {
        self.loader_exclusions.iter().map(|p| p.key().clone()).collect()
    }

    /// Delegate names starting with `prefix` to the parent resolver
    pub fn add_loader_exclusion(&self, prefix: impl Into<String>) {
        self.loader_exclusions.insert(prefix.into());
    }

    pub fn transformer_exclusions(&self) -> Vec<String> {
        self.transformer_exclusions
            .iter()
            .map(|p| p.key().clone())
            .collect()
    }

    /// Skip the transformer chain for names starting with `prefix`
    pub fn add_transformer_exclusion(&self, prefix: impl Into<String>) {
        self.transformer_exclusions.insert(prefix.into());
    }

    /// Forget the listed resources recorded as absent
    pub fn clear_negative_entries<'a, I>(&self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.cache.clear_negative_entries(names);
    }

    pub fn clear_all_negative_entries(&self) {
        self.cache.clear_all_negative_entries();
    }

    /// Whether `name` failed resolution before
    pub fn is_invalid(&self, name: &str) -> bool {
        self.invalid.contains(name)
    }

    /// Finished module cached under `name`
    pub fn cached_module(&self, name: &str) -> Option<Arc<DefinedModule>> {
        self.defined.get(name).map(|m| Arc::clone(m.value()))
    }

    /// Number of finished modules
    pub fn defined_len(&self) -> usize {
        self.defined.len()
    }

    pub fn resource_cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn packages(&self) -> &PackageTable {
        &self.packages
    }

    /// Transformers in registration order
    pub fn transformers(&self) -> Vec<Arc<dyn Transformer>> {
        self.chain.snapshot()
    }

    /// Active name remapper, if one was registered
    pub fn name_remapper(&self) -> Option<Arc<dyn Transformer>> {
        self.chain.name_remapper().cloned()
    }

    pub fn remap(&self, name: &str) -> String {
        self.chain.remap(name)
    }

    pub fn unmap(&self, name: &str) -> String {
        self.chain.unmap(name)
    }

    pub fn dump_sink(&self) -> Option<&DebugDumpSink> {
        self.dump.as_ref()
    }

    pub fn is_parallel(&self) -> bool {
        self.serial.is_none()
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("sources", &self.sources)
            .field("chain", &self.chain)
            .field("defined", &self.defined.len())
            .field("invalid", &self.invalid.len())
            .field("parallel", &self.serial.is_none())
            .finish()
    }
}
