//! Property-based tests for name remapping
//!
//! Uses proptest to verify the remap/unmap inverse relation and that
//! resolution through a remapper always lands on the storage identity.

use bytes::Bytes;
use modloader::{MemorySource, TransformerChain};
use proptest::prelude::*;
use std::sync::Arc;
mod common;
use common::*;

fn module_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,6}(\\.[A-Za-z][A-Za-z0-9_]{0,8}){0,3}"
}

proptest! {
    /// Property: without a remapper both directions are the identity
    #[test]
    fn prop_identity_without_remapper(name in module_name()) {
        let chain = TransformerChain::default();
        prop_assert_eq!(chain.remap(&name), name.clone());
        prop_assert_eq!(chain.unmap(&name), name);
    }

    /// Property: unmap(remap(x)) == x with an active remapper
    #[test]
    fn prop_unmap_inverts_remap(name in module_name()) {
        let chain = TransformerChain::default();
        chain.push(Arc::new(SuffixRemapper("$renamed")));
        let storage = chain.remap(&name);
        prop_assert_ne!(&storage, &name);
        prop_assert_eq!(chain.unmap(&storage), name);
    }

    /// Property: a remapped module is cached under its storage name only
    #[test]
    fn prop_resolution_caches_storage_identity(name in module_name()) {
        let app = Arc::new(MemorySource::new("memory:app").with_module(&name, Bytes::from_static(b"image")));
        let loader = loader_with_plugins(app, plugin_runtime(Arc::new(CountingTransformer::default())));
        loader.add_transformer_exclusion("plugins.");
        prop_assert!(loader.register_transformer("plugins.Renamer"));

        let module = loader.resolve(&name).unwrap();
        let storage = format!("{}$renamed", name);
        prop_assert_eq!(module.name(), storage.as_str());
        prop_assert!(loader.cached_module(&storage).is_some());
        prop_assert_eq!(loader.unmap(&storage), name);
    }
}
