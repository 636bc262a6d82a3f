//! Filters that write setter values into bound fields, or clear bindings.

use crate::core::document::{Document, Rewrite};
use crate::core::filter::Filter;
use crate::core::schema::SchemaDocument;
use crate::error::{Result, SetterError};

/// Which bindings a [`SetterFilter`] rewrites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Only bindings of the named setter.
    Single(String),
    /// Bindings of every setter defined in the schema.
    All,
}

/// Writes each bound field from its setter's current value in the schema.
///
/// This is a set, not a diff: a binding that already holds the value is
/// rewritten and counted again. Only documents with at least one rewrite are
/// passed on.
#[derive(Debug)]
pub struct SetterFilter<'a> {
    schema: &'a SchemaDocument,
    target: Target,
    count: usize,
}

impl<'a> SetterFilter<'a> {
    pub fn single(name: &str, schema: &'a SchemaDocument) -> Self {
        Self {
            schema,
            target: Target::Single(name.to_string()),
            count: 0,
        }
    }

    pub fn all(schema: &'a SchemaDocument) -> Self {
        Self {
            schema,
            target: Target::All,
            count: 0,
        }
    }

    /// Number of fields rewritten so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Unknown setters are skipped rather than reported.
    fn targets(&self, setter: &str) -> bool {
        match &self.target {
            Target::Single(name) => name == setter && self.schema.contains(setter),
            Target::All => self.schema.contains(setter),
        }
    }
}

impl Filter for SetterFilter<'_> {
    fn filter(&mut self, documents: Vec<Document>) -> Result<Vec<Document>> {
        let mut changed = Vec::new();
        for mut document in documents {
            if let Some(binding) = document
                .bindings()
                .into_iter()
                .find(|binding| self.targets(&binding.setter) && !binding.is_rewritable())
            {
                return Err(SetterError::parse(
                    document.path(),
                    format!(
                        "field {:?} on line {} is bound to setter {:?} but its value cannot be rewritten",
                        binding.field,
                        binding.line + 1,
                        binding.setter
                    ),
                ));
            }
            let applied = document.rewrite_bindings(|binding| {
                if !self.targets(&binding.setter) {
                    return None;
                }
                let definition = self.schema.get(&binding.setter)?;
                Some(Rewrite::Set {
                    value: definition.value.clone(),
                    setter_type: definition.setter_type,
                })
            });
            if applied > 0 {
                self.count += applied;
                changed.push(document);
            }
        }
        Ok(changed)
    }
}

/// Handles the bindings of a setter that was removed from the schema.
///
/// Without `force`, any remaining binding is a `Referenced` error. With
/// `force`, the marker comments are removed and the field values are kept.
#[derive(Debug)]
pub struct ClearFilter {
    name: String,
    force: bool,
    count: usize,
}

impl ClearFilter {
    pub fn new(name: &str, force: bool) -> Self {
        Self {
            name: name.to_string(),
            force,
            count: 0,
        }
    }

    /// Number of bindings cleared.
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Filter for ClearFilter {
    fn filter(&mut self, documents: Vec<Document>) -> Result<Vec<Document>> {
        if !self.force {
            let referenced: usize = documents
                .iter()
                .map(|document| {
                    document
                        .bindings()
                        .iter()
                        .filter(|binding| binding.setter == self.name)
                        .count()
                })
                .sum();
            if referenced > 0 {
                return Err(SetterError::Referenced {
                    name: self.name.clone(),
                    count: referenced,
                });
            }
            return Ok(Vec::new());
        }

        let mut changed = Vec::new();
        for mut document in documents {
            let cleared = document
                .rewrite_bindings(|binding| (binding.setter == self.name).then_some(Rewrite::Clear));
            if cleared > 0 {
                self.count += cleared;
                changed.push(document);
            }
        }
        Ok(changed)
    }
}
