//! Shared helpers for integration tests
#![allow(dead_code)]

use bytes::Bytes;
use modloader::{
    DefinedModule, InMemoryRuntime, LoadError, MemorySource, ModuleLoader, NameRemapper,
    ParentResolver, SourceSet, Transformer,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Passes images through unchanged, counting calls
#[derive(Default)]
pub struct CountingTransformer {
    pub calls: AtomicUsize,
}

impl CountingTransformer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transformer for CountingTransformer {
    fn name(&self) -> &str {
        "counting"
    }

    fn transform(&self, _: &str, _: &str, image: Option<Bytes>) -> anyhow::Result<Option<Bytes>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(image)
    }
}

/// Remapper appending a fixed suffix to every name
pub struct SuffixRemapper(pub &'static str);

impl NameRemapper for SuffixRemapper {
    fn remap(&self, name: &str) -> String {
        if name.ends_with(self.0) {
            name.to_string()
        } else {
            format!("{}{}", name, self.0)
        }
    }

    fn unmap(&self, name: &str) -> String {
        name.strip_suffix(self.0).unwrap_or(name).to_string()
    }
}

impl Transformer for SuffixRemapper {
    fn name(&self) -> &str {
        "suffix-remapper"
    }

    fn transform(&self, _: &str, _: &str, image: Option<Bytes>) -> anyhow::Result<Option<Bytes>> {
        Ok(image)
    }

    fn as_remapper(&self) -> Option<&dyn NameRemapper> {
        Some(self)
    }
}

/// Produces an image for `gen.*` names out of nothing
pub struct Generator;

impl Transformer for Generator {
    fn transform(&self, name: &str, _: &str, image: Option<Bytes>) -> anyhow::Result<Option<Bytes>> {
        if image.is_none() && name.starts_with("gen.") {
            return Ok(Some(Bytes::from(format!("generated:{}", name))));
        }
        Ok(image)
    }
}

/// Always fails
pub struct Exploding;

impl Transformer for Exploding {
    fn transform(&self, name: &str, _: &str, _: Option<Bytes>) -> anyhow::Result<Option<Bytes>> {
        anyhow::bail!("cannot transform {}", name)
    }
}

/// Parent resolver backed by its own runtime, counting requests
pub struct RecordingParent {
    pub runtime: InMemoryRuntime,
    pub requests: AtomicUsize,
}

impl RecordingParent {
    pub fn with_module(name: &str, image: &'static [u8]) -> Self {
        use modloader::ModuleRuntime;
        let runtime = InMemoryRuntime::new();
        runtime
            .define_module(name, Bytes::from_static(image), None, None)
            .unwrap();
        Self {
            runtime,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl ParentResolver for RecordingParent {
    fn load_by_name(&self, name: &str) -> Result<Arc<DefinedModule>, LoadError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.runtime
            .get(name)
            .ok_or_else(|| LoadError::NotFound(name.to_string()))
    }
}

/// Runtime with the shared test transformers registered as plugins
pub fn plugin_runtime(counter: Arc<CountingTransformer>) -> Arc<InMemoryRuntime> {
    let runtime = Arc::new(InMemoryRuntime::new());
    runtime.register_factory("plugins.Counting", move || counter.clone());
    runtime.register_factory("plugins.Renamer", || Arc::new(SuffixRemapper("$renamed")));
    runtime.register_factory("plugins.Generator", || Arc::new(Generator));
    runtime.register_factory("plugins.Exploding", || Arc::new(Exploding));
    runtime
}

/// Memory source carrying the plugin modules named in [`plugin_runtime`]
pub fn plugin_source() -> MemorySource {
    MemorySource::new("memory:plugins")
        .with_module("plugins.Counting", Bytes::from_static(b"counting"))
        .with_module("plugins.Renamer", Bytes::from_static(b"renamer"))
        .with_module("plugins.Generator", Bytes::from_static(b"generator"))
        .with_module("plugins.Exploding", Bytes::from_static(b"exploding"))
}

/// Loader over `app` followed by the plugin source
pub fn loader_with_plugins(
    app: Arc<MemorySource>,
    runtime: Arc<InMemoryRuntime>,
) -> ModuleLoader {
    let sources = SourceSet::single(app);
    sources.push(Arc::new(plugin_source()));
    ModuleLoader::with_runtime(sources, runtime)
}

/// Write an uncompressed tar archive
pub fn write_tar(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut builder = tar::Builder::new(file);
    for &(name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
    }
    builder.finish().unwrap();
}

/// Hex SHA-256 of `data`, as written into archive manifests
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(data))
}
