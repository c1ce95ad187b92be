//! Identity types for document nodes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Arena index of a node inside a [`Document`](crate::Document)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a new node ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u32 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// A node that has been validated as an element
///
/// Only [`Document`](crate::Document) hands these out, either from
/// `create_element` or from `as_element` after checking the node type, so code
/// holding an `Element` never needs to re-check what kind of node it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Element(NodeId);

impl Element {
    pub(crate) fn new_unchecked(id: NodeId) -> Self {
        Self(id)
    }

    /// The underlying node ID
    pub fn node(&self) -> NodeId {
        self.0
    }
}

impl From<Element> for NodeId {
    fn from(el: Element) -> Self {
        el.0
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element:{}", self.0.raw())
    }
}
