//! Defined modules and the in-memory runtime
//!
//! [`InMemoryRuntime`] is the default [`ModuleRuntime`]: it keeps a registry
//! of defined modules, refuses to define the same identity twice or to mix
//! two different sealings of one package, and instantiates transformer
//! plugins from registered constructors.

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::module::provenance::{CodeSource, Package};
use crate::module::traits::{ModuleRuntime, RuntimeError, Transformer};

/// A module defined into the runtime
#[derive(Debug)]
pub struct DefinedModule {
    name: String,
    image: Bytes,
    code_source: Option<CodeSource>,
    package: Option<Arc<Package>>,
}

impl DefinedModule {
    pub fn new(
        name: impl Into<String>,
        image: Bytes,
        code_source: Option<CodeSource>,
        package: Option<Arc<Package>>,
    ) -> Self {
        Self {
            name: name.into(),
            image,
            code_source,
            package,
        }
    }

    /// Identity the module was defined under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Final (post-transform) image
    pub fn image(&self) -> &Bytes {
        &self.image
    }

    pub fn code_source(&self) -> Option<&CodeSource> {
        self.code_source.as_ref()
    }

    pub fn package(&self) -> Option<&Arc<Package>> {
        self.package.as_ref()
    }

    /// Signers of the module's source entry
    pub fn signers(&self) -> &[String] {
        self.code_source
            .as_ref()
            .map(|cs| cs.signers.as_slice())
            .unwrap_or(&[])
    }
}

/// No-argument constructor of a transformer plugin
pub type TransformerFactory = Arc<dyn Fn() -> Arc<dyn Transformer> + Send + Sync>;

/// Runtime keeping defined modules in memory
#[derive(Default)]
pub struct InMemoryRuntime {
    modules: DashMap<String, Arc<DefinedModule>>,
    factories: DashMap<String, TransformerFactory>,
    packages: DashMap<String, Arc<Package>>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor used when `module_name` is registered as a transformer
    pub fn register_factory<F>(&self, module_name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Transformer> + Send + Sync + 'static,
    {
        self.factories
            .insert(module_name.to_string(), Arc::new(factory));
    }

    /// Module previously defined under `name`
    pub fn get(&self, name: &str) -> Option<Arc<DefinedModule>> {
        self.modules.get(name).map(|m| Arc::clone(m.value()))
    }

    /// Package first seen under `name`
    pub fn package(&self, name: &str) -> Option<Arc<Package>> {
        self.packages.get(name).map(|p| Arc::clone(p.value()))
    }

    /// Number of defined modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleRuntime for InMemoryRuntime {
    fn define_module(
        &self,
        name: &str,
        image: Bytes,
        code_source: Option<CodeSource>,
        package: Option<Arc<Package>>,
    ) -> Result<Arc<DefinedModule>, RuntimeError> {
        if image.is_empty() {
            return Err(RuntimeError::MalformedImage {
                name: name.to_string(),
                reason: "empty image".to_string(),
            });
        }

        if let Some(package) = &package {
            let known = self
                .packages
                .entry(package.name.clone())
                .or_insert_with(|| Arc::clone(package));
            if known.sealed_by != package.sealed_by {
                return Err(RuntimeError::InvalidPackage {
                    name: name.to_string(),
                    reason: format!(
                        "package {} already defined with seal {:?}",
                        package.name,
                        known.sealed_by
                    ),
                });
            }
        }

        match self.modules.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RuntimeError::DuplicateDefinition(name.to_string())),
            Entry::Vacant(slot) => {
                let module = Arc::new(DefinedModule::new(name, image, code_source, package));
                slot.insert(Arc::clone(&module));
                debug!("Defined module {}", name);
                Ok(module)
            }
        }
    }

    fn instantiate_transformer(
        &self,
        id: &str,
        module: &DefinedModule,
    ) -> Result<Arc<dyn Transformer>, RuntimeError> {
        // Constructors are registered under the plugin id; the module may
        // have been defined under a remapped name
        let factory = self
            .factories
            .get(id)
            .or_else(|| self.factories.get(module.name()))
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| RuntimeError::NoConstructor(id.to_string()))?;
        Ok(factory())
    }
}

impl std::fmt::Debug for InMemoryRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRuntime")
            .field("modules", &self.modules.len())
            .field("factories", &self.factories.len())
            .field("packages", &self.packages.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Identity;

    impl Transformer for Identity {
        fn transform(&self, _: &str, _: &str, image: Option<Bytes>) -> anyhow::Result<Option<Bytes>> {
            Ok(image)
        }
    }

    #[test]
    fn test_duplicate_definition_rejected() {
        let runtime = InMemoryRuntime::new();
        runtime
            .define_module("pkg.Foo", Bytes::from_static(b"foo"), None, None)
            .unwrap();
        let err = runtime
            .define_module("pkg.Foo", Bytes::from_static(b"foo"), None, None)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::DuplicateDefinition(_)));
        assert_eq!(runtime.len(), 1);
    }

    #[test]
    fn test_empty_image_rejected() {
        let runtime = InMemoryRuntime::new();
        let err = runtime
            .define_module("pkg.Empty", Bytes::new(), None, None)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::MalformedImage { .. }));
        assert!(runtime.is_empty());
    }

    #[test]
    fn test_instantiate_transformer() {
        let runtime = InMemoryRuntime::new();
        runtime.register_factory("plugins.Identity", || Arc::new(Identity));

        let module = runtime
            .define_module("plugins.Identity", Bytes::from_static(b"plugin"), None, None)
            .unwrap();
        assert!(runtime
            .instantiate_transformer("plugins.Identity", &module)
            .is_ok());

        let other = DefinedModule::new("plugins.Missing", Bytes::from_static(b"x"), None, None);
        assert!(matches!(
            runtime.instantiate_transformer("plugins.Missing", &other),
            Err(RuntimeError::NoConstructor(_))
        ));
    }

    #[test]
    fn test_instantiate_transformer_by_id_under_remapped_name() {
        let runtime = InMemoryRuntime::new();
        runtime.register_factory("plugins.Identity", || Arc::new(Identity));

        let module = runtime
            .define_module(
                "plugins.Identity$mapped",
                Bytes::from_static(b"plugin"),
                None,
                None,
            )
            .unwrap();
        assert!(runtime
            .instantiate_transformer("plugins.Identity", &module)
            .is_ok());
    }

    #[test]
    fn test_conflicting_package_seal_rejected() {
        let runtime = InMemoryRuntime::new();
        let mut sealed = Package::unsealed("pkg");
        sealed.sealed_by = Some("archive:a.tar".to_string());
        let sealed = Arc::new(sealed);

        runtime
            .define_module("pkg.A", Bytes::from_static(b"a"), None, Some(Arc::clone(&sealed)))
            .unwrap();
        // Same seal, different Arc: accepted
        let same = Arc::new((*sealed).clone());
        runtime
            .define_module("pkg.B", Bytes::from_static(b"b"), None, Some(same))
            .unwrap();

        let unsealed = Arc::new(Package::unsealed("pkg"));
        let err = runtime
            .define_module("pkg.C", Bytes::from_static(b"c"), None, Some(unsealed))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidPackage { ref name, .. } if name == "pkg.C"));
        assert!(runtime.get("pkg.C").is_none());
        assert_eq!(runtime.package("pkg").unwrap().sealed_by, sealed.sealed_by);
    }
}
