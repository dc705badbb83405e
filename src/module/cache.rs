//! Raw resource cache
//!
//! Positive (name -> bytes) and negative (name known absent) caches layered
//! over [`SourceSet`] lookups. Both only grow for the lifetime of the loader:
//! images are immutable and the loader lives as long as the process, so
//! there is no eviction. The negative side can be cleared explicitly for
//! resources that appear at runtime.

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tracing::trace;

use crate::module::name::{reserved_fallback, resource_path};
use crate::module::source::SourceSet;

/// Positive/negative resource cache
#[derive(Debug, Default)]
pub struct ResourceCache {
    positive: DashMap<String, Bytes>,
    negative: DashSet<String>,
    debug: bool,
}

impl ResourceCache {
    pub fn new(debug: bool) -> Self {
        Self {
            positive: DashMap::new(),
            negative: DashSet::new(),
            debug,
        }
    }

    /// Raw bytes for `name`, reading through `sources` on a miss
    ///
    /// Any failure (missing entry, I/O error) records `name` as absent.
    pub fn get_bytes(&self, name: &str, sources: &SourceSet) -> Option<Bytes> {
        if self.negative.contains(name) {
            return None;
        }
        if let Some(data) = self.positive.get(name) {
            return Some(data.clone());
        }

        if let Some(fallback) = reserved_fallback(name) {
            if let Some(data) = self.get_bytes(&fallback, sources) {
                self.insert_positive(name, data.clone());
                return Some(data);
            }
        }

        let path = resource_path(name);
        let Some(source) = sources.find(&path) else {
            if self.debug {
                trace!("Failed to find resource {}", path);
            }
            self.insert_negative(name);
            return None;
        };

        match source.read(&path) {
            Ok(data) => {
                if self.debug {
                    trace!("Loading {} from {}", name, source.location());
                }
                self.insert_positive(name, data.clone());
                Some(data)
            }
            Err(e) => {
                if self.debug {
                    trace!("Failed to load {} from {}: {}", name, source.location(), e);
                }
                self.insert_negative(name);
                None
            }
        }
    }

    /// Forget the listed absent entries
    pub fn clear_negative_entries<'a, I>(&self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            self.negative.remove(name);
        }
    }

    /// Forget every absent entry
    pub fn clear_all_negative_entries(&self) {
        self.negative.clear();
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.positive.contains_key(name)
    }

    pub fn is_known_absent(&self, name: &str) -> bool {
        self.negative.contains(name)
    }

    /// Number of cached images
    pub fn cached_len(&self) -> usize {
        self.positive.len()
    }

    // A name lives on at most one side; the first side to claim it keeps it.
    // Both inserts hold the positive entry while consulting the negative set,
    // so the check and the insert cannot interleave.
    fn insert_positive(&self, name: &str, data: Bytes) {
        if let Entry::Vacant(slot) = self.positive.entry(name.to_string()) {
            if !self.negative.contains(name) {
                slot.insert(data);
            }
        }
    }

    fn insert_negative(&self, name: &str) {
        if let Entry::Vacant(_slot) = self.positive.entry(name.to_string()) {
            self.negative.insert(name.to_string());
        }
    }
}
