//! Transformer chain
//!
//! Ordered list of transformer plugins. Every non-excluded module image is
//! fed through the chain in registration order, each transformer seeing the
//! previous one's output. The first registered transformer with a
//! [`NameRemapper`](crate::module::traits::NameRemapper) capability becomes
//! the active remapper; later ones still run as plain transformers.

use anyhow::Context;
use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

use crate::module::traits::Transformer;

/// Registration-ordered transformer chain
#[derive(Default)]
pub struct TransformerChain {
    transformers: RwLock<Vec<Arc<dyn Transformer>>>,
    remapper: OnceLock<Arc<dyn Transformer>>,
    trace_finer: bool,
}

impl TransformerChain {
    pub fn new(trace_finer: bool) -> Self {
        Self {
            transformers: RwLock::new(Vec::new()),
            remapper: OnceLock::new(),
            trace_finer,
        }
    }

    /// Append a transformer
    ///
    /// Returns `true` if it became the active name remapper.
    pub fn push(&self, transformer: Arc<dyn Transformer>) -> bool {
        let mut transformers = self.transformers.write();
        let mut became_remapper = false;
        if transformer.as_remapper().is_some() && self.remapper.get().is_none() {
            became_remapper = self.remapper.set(Arc::clone(&transformer)).is_ok();
        }
        debug!(
            "Registered transformer {} at position {}{}",
            transformer.name(),
            transformers.len(),
            if became_remapper { " (name remapper)" } else { "" }
        );
        transformers.push(transformer);
        became_remapper
    }

    /// Transformers in registration order
    pub fn snapshot(&self) -> Vec<Arc<dyn Transformer>> {
        self.transformers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.transformers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.read().is_empty()
    }

    /// Active remapper, if any
    pub fn name_remapper(&self) -> Option<&Arc<dyn Transformer>> {
        self.remapper.get()
    }

    /// Logical name to storage name (identity without a remapper)
    pub fn remap(&self, name: &str) -> String {
        self.remapper
            .get()
            .and_then(|t| t.as_remapper())
            .map(|r| r.remap(name))
            .unwrap_or_else(|| name.to_string())
    }

    /// Storage name to logical name (identity without a remapper)
    pub fn unmap(&self, name: &str) -> String {
        self.remapper
            .get()
            .and_then(|t| t.as_remapper())
            .map(|r| r.unmap(name))
            .unwrap_or_else(|| name.to_string())
    }

    /// Run every transformer over `image`
    ///
    /// The chain is snapshotted first so transformers may resolve other
    /// modules (or new transformers may register) while it runs.
    pub fn run(
        &self,
        name: &str,
        transformed_name: &str,
        image: Option<Bytes>,
    ) -> anyhow::Result<Option<Bytes>> {
        let transformers = self.snapshot();
        if self.trace_finer {
            trace!(
                "Beginning transform of {{{} ({})}} Start Length: {}",
                name,
                transformed_name,
                image_len(&image)
            );
        }

        let mut image = image;
        for transformer in transformers {
            if self.trace_finer {
                trace!(
                    "Before Transformer {{{} ({})}} {}: {}",
                    name,
                    transformed_name,
                    transformer.name(),
                    image_len(&image)
                );
            }

            image = transformer
                .transform(name, transformed_name, image)
                .with_context(|| format!("transformer {} failed on {}", transformer.name(), name))?;

            if self.trace_finer {
                trace!(
                    "After  Transformer {{{} ({})}} {}: {}",
                    name,
                    transformed_name,
                    transformer.name(),
                    image_len(&image)
                );
            }
        }
        Ok(image)
    }
}

fn image_len(image: &Option<Bytes>) -> usize {
    image.as_ref().map(|b| b.len()).unwrap_or(0)
}

impl std::fmt::Debug for TransformerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .snapshot()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        f.debug_struct("TransformerChain")
            .field("transformers", &names)
            .field("remapper", &self.remapper.get().map(|t| t.name().to_string()))
            .finish()
    }
}
