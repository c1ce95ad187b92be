//! Batch classification
//!
//! A batch of change records is folded into four collections: added elements,
//! removed elements, added attributes and removed attribute names. The fold has
//! to see the whole batch at once; an element that was moved appears in both
//! node sets and is only recognisable as a move when both are complete.

use crate::record::{Attribute, ChangeRecord};
use indexmap::{IndexMap, IndexSet};
use tessera_dom::{Document, Element};

/// The result of classifying one batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Classification {
    pub added_elements: IndexSet<Element>,
    pub removed_elements: IndexSet<Element>,
    /// Attributes that are now present, with their current value
    pub added_attributes: IndexMap<Element, Vec<Attribute>>,
    /// Attribute names whose previous application has to be cleaned up
    pub removed_attributes: IndexMap<Element, Vec<String>>,
}

impl Classification {
    /// Classify a batch against the current state of `document`
    pub fn classify(document: &Document, records: &[ChangeRecord]) -> Self {
        let mut out = Self::default();

        for record in records {
            if let Some(target) = document.as_element(record.target()) {
                if document.ignores_mutations(target) {
                    continue;
                }
            }

            match record {
                ChangeRecord::ChildList { added, removed, .. } => {
                    out.added_elements.extend(added.iter().copied());
                    out.removed_elements.extend(removed.iter().copied());
                }
                ChangeRecord::Attribute {
                    target,
                    name,
                    old_value,
                } => {
                    let el = *target;
                    if !document.has_attribute(el, name) {
                        out.remove(el, name);
                        continue;
                    }
                    let value = document.get_attribute(el, name).unwrap_or_default();
                    if old_value.is_some() {
                        // Changed: clean up, then re-apply
                        out.remove(el, name);
                    }
                    out.add(el, name, value);
                }
            }
        }

        out
    }

    fn add(&mut self, el: Element, name: &str, value: String) {
        self.added_attributes
            .entry(el)
            .or_default()
            .push(Attribute::new(name, Some(value)));
    }

    fn remove(&mut self, el: Element, name: &str) {
        self.removed_attributes
            .entry(el)
            .or_default()
            .push(name.to_string());
    }

    /// Added elements that were not also removed in this batch
    pub fn elements_added(&self) -> impl Iterator<Item = Element> + '_ {
        self.added_elements
            .iter()
            .copied()
            .filter(|el| !self.removed_elements.contains(el))
    }

    /// Removed elements that were not also added in this batch
    pub fn elements_removed(&self) -> impl Iterator<Item = Element> + '_ {
        self.removed_elements
            .iter()
            .copied()
            .filter(|el| !self.added_elements.contains(el))
    }

    pub fn is_empty(&self) -> bool {
        self.added_elements.is_empty()
            && self.removed_elements.is_empty()
            && self.added_attributes.is_empty()
            && self.removed_attributes.is_empty()
    }
}
