//! Per-element attribute cleanup registry
//!
//! Directives register teardown callbacks under `(element, attribute name)`.
//! Running cleanup for a name deletes the whole entry, so a directive that
//! re-applies the same attribute has to register again.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use tessera_dom::Element;

/// A one-shot teardown callback
pub type Cleanup = Box<dyn FnOnce()>;

#[derive(Default)]
pub struct AttributeCleanupRegistry {
    entries: RefCell<IndexMap<Element, IndexMap<String, Vec<Cleanup>>>>,
}

impl AttributeCleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a cleanup for `name` on `el`
    pub fn register(&self, el: Element, name: impl Into<String>, cleanup: Cleanup) {
        self.entries
            .borrow_mut()
            .entry(el)
            .or_default()
            .entry(name.into())
            .or_default()
            .push(cleanup);
    }

    /// Remove the entries for `names` (all names when `None`) and return
    /// their callbacks in registration order
    pub fn take(&self, el: Element, names: Option<&[String]>) -> Vec<Cleanup> {
        let mut entries = self.entries.borrow_mut();
        let Some(by_name) = entries.get_mut(&el) else {
            return Vec::new();
        };

        let mut taken = Vec::new();
        match names {
            None => {
                for (_, cleanups) in by_name.drain(..) {
                    taken.extend(cleanups);
                }
            }
            Some(names) => by_name.retain(|name, cleanups| {
                if names.contains(name) {
                    taken.append(cleanups);
                    false
                } else {
                    true
                }
            }),
        }

        if by_name.is_empty() {
            entries.shift_remove(&el);
        }
        taken
    }

    /// Run and delete the entries for `names`; returns how many callbacks ran
    ///
    /// The callbacks run after the registry is released, so they may register
    /// new cleanups.
    pub fn run(&self, el: Element, names: Option<&[String]>) -> usize {
        let cleanups = self.take(el, names);
        let count = cleanups.len();
        for cleanup in cleanups {
            cleanup();
        }
        count
    }

    pub fn contains(&self, el: Element, name: &str) -> bool {
        self.entries
            .borrow()
            .get(&el)
            .is_some_and(|by_name| by_name.contains_key(name))
    }

    /// Number of elements that have at least one entry
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl fmt::Debug for AttributeCleanupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeCleanupRegistry")
            .field("elements", &self.len())
            .finish()
    }
}
