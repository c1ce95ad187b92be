//! Platform change notification
//!
//! A [`MutationObserver`] watches a node (and optionally its subtree) of a
//! [`Document`] and collects one [`MutationRecord`] per atomic change. The first
//! record of a batch queues a microtask; when it runs, every record collected
//! so far is delivered to the observer's callback in one call.
//!
//! Nodes removed from an observed subtree stay observed until the next
//! delivery, so a node that is moved out of a subtree which was itself just
//! detached still reports its removal in the same batch.

use crate::tree::Tree;
use crate::{Document, Microtasks, NodeId};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// What kind of change a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    /// Children were added to or removed from `target`
    ChildList,
    /// An attribute of `target` was set or removed
    Attributes,
}

/// One atomic change reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
    /// Set for attribute records
    pub attribute_name: Option<String>,
    /// Previous attribute value, when requested and when there was one
    pub old_value: Option<String>,
}

impl MutationRecord {
    /// Create a child-list record
    pub fn child_list(target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            added_nodes: added,
            removed_nodes: removed,
            attribute_name: None,
            old_value: None,
        }
    }

    /// Create an attribute record
    pub fn attributes(
        target: NodeId,
        name: impl Into<String>,
        old_value: Option<String>,
    ) -> Self {
        Self {
            kind: MutationKind::Attributes,
            target,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
            attribute_name: Some(name.into()),
            old_value,
        }
    }
}

/// Which changes an observer wants to hear about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverInit {
    /// Observe every descendant of the target, not just the target itself
    pub subtree: bool,
    /// Report added and removed children
    pub child_list: bool,
    /// Report attribute changes
    pub attributes: bool,
    /// Keep the previous value on attribute records
    pub attribute_old_value: bool,
}

impl ObserverInit {
    /// Everything: subtree, children, attributes and previous values
    pub fn all() -> Self {
        Self {
            subtree: true,
            child_list: true,
            attributes: true,
            attribute_old_value: true,
        }
    }
}

type Callback = Box<dyn Fn(Vec<MutationRecord>)>;

#[derive(Default)]
struct ObserverState {
    target: Option<(NodeId, ObserverInit)>,
    document: Option<Document>,
    records: Vec<MutationRecord>,
    transient: IndexSet<NodeId>,
    delivery_scheduled: bool,
}

pub(crate) struct ObserverShared {
    microtasks: Microtasks,
    callback: Callback,
    state: RefCell<ObserverState>,
}

impl ObserverShared {
    /// Offer a record produced by a tree edit
    ///
    /// Called with the tree borrowed, so this must never run the callback.
    pub(crate) fn offer(self: &Rc<Self>, tree: &Tree, record: &MutationRecord) {
        let mut state = self.state.borrow_mut();
        let Some((root, init)) = state.target else {
            return;
        };

        let wanted = match record.kind {
            MutationKind::ChildList => init.child_list,
            MutationKind::Attributes => init.attributes,
        };
        if !wanted {
            return;
        }

        let in_scope = record.target == root
            || (init.subtree
                && (tree.is_inclusive_ancestor(root, record.target)
                    || state
                        .transient
                        .iter()
                        .any(|detached| tree.is_inclusive_ancestor(*detached, record.target))));
        if !in_scope {
            return;
        }

        let mut record = record.clone();
        if !init.attribute_old_value {
            record.old_value = None;
        }
        if init.subtree {
            state.transient.extend(record.removed_nodes.iter().copied());
        }
        state.records.push(record);

        if !state.delivery_scheduled {
            state.delivery_scheduled = true;
            let weak: Weak<Self> = Rc::downgrade(self);
            self.microtasks.queue(move || {
                if let Some(observer) = weak.upgrade() {
                    observer.deliver();
                }
            });
        }
    }

    fn deliver(&self) {
        let records = {
            let mut state = self.state.borrow_mut();
            state.delivery_scheduled = false;
            state.transient.clear();
            std::mem::take(&mut state.records)
        };
        if !records.is_empty() {
            tracing::trace!(count = records.len(), "delivering mutation records");
            (self.callback)(records);
        }
    }
}

/// Handle to a platform mutation observer
#[derive(Clone)]
pub struct MutationObserver {
    shared: Rc<ObserverShared>,
}

impl MutationObserver {
    /// Create an observer whose batches are delivered through `microtasks`
    pub fn new(microtasks: &Microtasks, callback: impl Fn(Vec<MutationRecord>) + 'static) -> Self {
        Self {
            shared: Rc::new(ObserverShared {
                microtasks: microtasks.clone(),
                callback: Box::new(callback),
                state: RefCell::new(ObserverState::default()),
            }),
        }
    }

    /// Start observing `target` in `document`
    ///
    /// Observing again replaces the previous target and options.
    pub fn observe(&self, document: &Document, target: NodeId, init: ObserverInit) {
        let previous = {
            let mut state = self.shared.state.borrow_mut();
            state.target = Some((target, init));
            state.document.replace(document.clone())
        };
        if let Some(previous) = previous {
            previous.unregister_observer(&self.shared);
        }
        document.register_observer(&self.shared);
    }

    /// Stop observing and drop every undelivered record
    pub fn disconnect(&self) {
        let document = {
            let mut state = self.shared.state.borrow_mut();
            state.target = None;
            state.records.clear();
            state.transient.clear();
            state.document.take()
        };
        if let Some(document) = document {
            document.unregister_observer(&self.shared);
        }
    }

    /// Take the records that have not been delivered yet
    pub fn take_records(&self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.shared.state.borrow_mut().records)
    }

    /// Whether the observer currently has a target
    pub fn is_observing(&self) -> bool {
        self.shared.state.borrow().target.is_some()
    }
}

impl fmt::Debug for MutationObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("MutationObserver")
            .field("target", &state.target)
            .field("pending_records", &state.records.len())
            .finish()
    }
}
