//! Debug dump tests

use bytes::Bytes;
use modloader::{InMemoryRuntime, LoaderConfig, MemorySource, ModuleLoader, NullParent, SourceSet};
use std::sync::Arc;
use tempfile::TempDir;

fn dump_config(root: &std::path::Path, save: bool) -> LoaderConfig {
    let mut config = LoaderConfig::default();
    config.debug.enabled = true;
    config.debug.save = save;
    config.debug.dump_path = root.to_path_buf();
    config
}

#[test]
fn test_transformed_images_are_dumped() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("out");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("stale.mod"), b"stale").unwrap();

    let app = MemorySource::new("memory:app").with_module("pkg.sub.Foo", Bytes::from_static(b"foo"));
    let loader = ModuleLoader::new(
        SourceSet::single(Arc::new(app)),
        Arc::new(NullParent),
        Arc::new(InMemoryRuntime::new()),
        &dump_config(&root, true),
    );
    assert!(!root.join("stale.mod").exists());

    loader.resolve("pkg.sub.Foo").unwrap();
    assert_eq!(std::fs::read(root.join("pkg/sub/Foo.mod")).unwrap(), b"foo");
    assert_eq!(loader.dump_sink().unwrap().root(), root.as_path());
}

#[test]
fn test_dump_requires_save_flag() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("out");
    let app = MemorySource::new("memory:app").with_module("pkg.Foo", Bytes::from_static(b"foo"));
    let loader = ModuleLoader::new(
        SourceSet::single(Arc::new(app)),
        Arc::new(NullParent),
        Arc::new(InMemoryRuntime::new()),
        &dump_config(&root, false),
    );

    loader.resolve("pkg.Foo").unwrap();
    assert!(loader.dump_sink().is_none());
    assert!(!root.exists());
}

#[test]
fn test_dump_failure_is_not_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("out");
    let app = MemorySource::new("memory:app").with_module("pkg.Foo", Bytes::from_static(b"foo"));
    let loader = ModuleLoader::new(
        SourceSet::single(Arc::new(app)),
        Arc::new(NullParent),
        Arc::new(InMemoryRuntime::new()),
        &dump_config(&root, true),
    );

    // A file where the package directory should go makes the write fail
    std::fs::write(root.join("pkg"), b"in the way").unwrap();
    let module = loader.resolve("pkg.Foo").unwrap();
    assert_eq!(module.image(), &Bytes::from_static(b"foo"));
}
