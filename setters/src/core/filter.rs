//! Filters transform the documents flowing through a pipeline.

use std::collections::BTreeMap;

use crate::core::document::Document;
use crate::error::Result;

/// One stage of a document pipeline.
///
/// A filter receives every document read from the package and returns the
/// documents that should be handed to the next stage. Returning a subset is
/// allowed; what happens to the missing documents is the writer's policy.
pub trait Filter {
    fn filter(&mut self, documents: Vec<Document>) -> Result<Vec<Document>>;
}

/// Counts bindings per setter name without passing any document on.
#[derive(Debug, Default)]
pub struct BindingCounter {
    counts: BTreeMap<String, usize>,
}

impl BindingCounter {
    pub fn count(&self, setter: &str) -> usize {
        self.counts.get(setter).copied().unwrap_or(0)
    }
}

impl Filter for BindingCounter {
    fn filter(&mut self, documents: Vec<Document>) -> Result<Vec<Document>> {
        for document in &documents {
            for binding in document.bindings() {
                *self.counts.entry(binding.setter).or_default() += 1;
            }
        }
        Ok(Vec::new())
    }
}
