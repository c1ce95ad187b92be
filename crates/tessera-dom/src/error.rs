//! Error types for tessera-dom

use crate::NodeId;
use thiserror::Error;

/// Tree operation error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Node is not an element: {0}")]
    NotAnElement(NodeId),

    #[error("{child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },

    #[error("Cannot insert {child} into {parent}: would create a cycle or invalid hierarchy")]
    HierarchyRequest { parent: NodeId, child: NodeId },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
