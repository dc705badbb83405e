//! Provenance and package sealing
//!
//! Every defined module carries the location it was read from, the signers
//! vouching for its bytes, and the package descriptor of its namespace.
//! Sealing inconsistencies are reported through the log and never stop a
//! module from being defined.

use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};

use crate::module::name::{package_of, package_path, resource_path};
use crate::module::registry::manifest::ArchiveManifest;
use crate::module::source::SourceSet;
use crate::module::traits::SourceKind;

/// Origin of a module image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeSource {
    /// Location of the source that supplied the raw bytes
    pub location: String,
    /// Verified signers of the entry (archives only)
    pub signers: Vec<String>,
}

/// Package descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    pub name: String,
    /// Location that sealed the package, if sealed
    pub sealed_by: Option<String>,
    pub title: Option<String>,
    pub version: Option<String>,
    pub vendor: Option<String>,
}

impl Package {
    /// Unsealed package without metadata
    pub fn unsealed(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sealed_by: None,
            title: None,
            version: None,
            vendor: None,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed_by.is_some()
    }

    /// Sealed with respect to `location`
    pub fn is_sealed_by(&self, location: &str) -> bool {
        self.sealed_by.as_deref() == Some(location)
    }
}

/// Provenance attached to a module at definition time
#[derive(Debug, Clone, Default)]
pub struct Provenance {
    pub code_source: Option<CodeSource>,
    pub package: Option<Arc<Package>>,
}

/// Packages defined by one loader
#[derive(Debug, Default)]
pub struct PackageTable {
    packages: DashMap<String, Arc<Package>>,
}

impl PackageTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Package>> {
        self.packages.get(name).map(|p| Arc::clone(p.value()))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Define a package; a concurrent definition that got there first wins
    pub fn define(&self, package: Package) -> Arc<Package> {
        let entry = self
            .packages
            .entry(package.name.clone())
            .or_insert_with(|| Arc::new(package));
        Arc::clone(entry.value())
    }

    /// Define a package for a directory source: unsealed, no metadata
    pub fn define_unsealed(&self, name: &str) -> Arc<Package> {
        debug!("Defining unsealed package {}", name);
        self.define(Package::unsealed(name))
    }

    /// Define a package from archive manifest attributes
    pub fn define_from_manifest(
        &self,
        name: &str,
        manifest: &ArchiveManifest,
        location: &str,
    ) -> Arc<Package> {
        let path = package_path(name);
        let sealed_by = manifest
            .is_sealed(&path)
            .then(|| location.to_string());
        debug!("Defining package {} from {} (sealed: {})", name, location, sealed_by.is_some());
        self.define(Package {
            name: name.to_string(),
            sealed_by,
            title: manifest.title_for(&path),
            version: manifest.version_for(&path),
            vendor: manifest.vendor_for(&path),
        })
    }

    /// Derive the provenance of `logical_name`
    ///
    /// `raw` is the untransformed image, used to verify entry signers.
    pub fn derive(&self, logical_name: &str, sources: &SourceSet, raw: Option<&Bytes>) -> Provenance {
        let path = resource_path(logical_name);
        let source = sources.find(&path);
        let mut signers = Vec::new();
        let mut package = None;

        if let Some(package_name) = package_of(logical_name) {
            let manifest = source
                .as_ref()
                .filter(|s| s.kind() == SourceKind::Archive)
                .and_then(|s| s.manifest().map(|m| (s.location().to_string(), m)));

            match manifest {
                Some((location, manifest)) => {
                    if let Some(raw) = raw {
                        signers = manifest.signers_for(&path, raw);
                    }
                    package = Some(match self.get(package_name) {
                        None => self.define_from_manifest(package_name, &manifest, &location),
                        Some(existing) => {
                            if existing.is_sealed() {
                                if !existing.is_sealed_by(&location) {
                                    error!(
                                        "The archive {} is trying to seal already secured path {}",
                                        location, package_name
                                    );
                                }
                            } else if manifest.is_sealed(&package_path(package_name)) {
                                error!(
                                    "The archive {} has a security seal for path {}, but that path is defined and not secure",
                                    location, package_name
                                );
                            }
                            existing
                        }
                    });
                }
                None => {
                    package = Some(match self.get(package_name) {
                        None => self.define_unsealed(package_name),
                        Some(existing) => {
                            if existing.is_sealed() {
                                error!(
                                    "The source {} is defining elements for sealed path {}",
                                    source.as_ref().map(|s| s.location()).unwrap_or("<unknown>"),
                                    package_name
                                );
                            }
                            existing
                        }
                    });
                }
            }
        }

        Provenance {
            code_source: source.map(|s| CodeSource {
                location: s.location().to_string(),
                signers,
            }),
            package,
        }
    }
}
