//! Concurrent resolution tests

use bytes::Bytes;
use modloader::{InMemoryRuntime, LoaderConfig, MemorySource, ModuleLoader, NullParent, SourceSet};
use std::sync::Arc;
mod common;
use common::*;

const THREADS: usize = 8;

fn app_source(count: usize) -> Arc<MemorySource> {
    let source = MemorySource::new("memory:app");
    for i in 0..count {
        source.insert(&format!("pkg/M{}.mod", i), Bytes::from(format!("module {}", i)));
    }
    Arc::new(source)
}

#[test]
fn test_same_name_defined_once_under_contention() {
    let counter = Arc::new(CountingTransformer::default());
    let runtime = plugin_runtime(counter.clone());
    let app = app_source(1);
    let loader = loader_with_plugins(app.clone(), runtime.clone());
    assert!(loader.register_transformer("plugins.Counting"));

    let modules: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| scope.spawn(|| loader.resolve("pkg.M0").unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for module in &modules {
        assert!(Arc::ptr_eq(module, &modules[0]));
    }
    // Single-flight: the chain ran once and the source was read once
    assert_eq!(counter.calls(), 1);
    assert_eq!(app.read_count(), 1);
    assert!(!loader.is_invalid("pkg.M0"));
}

#[test]
fn test_unrelated_names_resolve_in_parallel() {
    let app = app_source(64);
    let loader = ModuleLoader::with_runtime(SourceSet::single(app.clone()), Arc::new(InMemoryRuntime::new()));

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let loader = &loader;
            scope.spawn(move || {
                for i in (t..64).step_by(THREADS) {
                    let module = loader.resolve(&format!("pkg.M{}", i)).unwrap();
                    assert_eq!(module.image(), &Bytes::from(format!("module {}", i)));
                }
                assert!(loader.resolve(&format!("pkg.Missing{}", t)).is_err());
            });
        }
    });

    assert_eq!(loader.defined_len(), 64);
    assert_eq!(app.read_count(), 64);
    for t in 0..THREADS {
        assert!(loader.is_invalid(&format!("pkg.Missing{}", t)));
    }
}

#[test]
fn test_serial_mode_under_contention() {
    let config = LoaderConfig {
        parallel: false,
        ..LoaderConfig::default()
    };
    let app = app_source(16);
    let loader = ModuleLoader::new(
        SourceSet::single(app.clone()),
        Arc::new(NullParent),
        Arc::new(InMemoryRuntime::new()),
        &config,
    );
    assert!(!loader.is_parallel());

    std::thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                for i in 0..16 {
                    loader.resolve(&format!("pkg.M{}", i)).unwrap();
                }
            });
        }
    });

    assert_eq!(loader.defined_len(), 16);
    assert_eq!(app.read_count(), 16);
}
