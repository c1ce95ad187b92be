//! Validated change records
//!
//! Platform records carry raw node IDs and optional fields. They are checked
//! once, when they enter the pipeline, and turned into [`ChangeRecord`]s whose
//! element fields are already known to be elements.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tessera_dom::{Document, Element, MutationKind, MutationRecord, NodeId, NodeType};

/// An attribute as announced to lifecycle callbacks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    /// `None` only when the absence of the attribute must be signalled
    pub value: Option<String>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: Option<String>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One atomic change, validated at the platform boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeRecord {
    /// Elements added to or removed from `target` (text and comments dropped)
    ChildList {
        target: NodeId,
        added: Vec<Element>,
        removed: Vec<Element>,
    },
    /// An attribute of `target` changed; `old_value` is the value before
    Attribute {
        target: Element,
        name: String,
        old_value: Option<String>,
    },
}

impl ChangeRecord {
    /// Check a platform record against `document`
    pub fn validate(document: &Document, record: MutationRecord) -> Result<Self> {
        let target_type = document.node_type(record.target)?;

        match record.kind {
            MutationKind::ChildList => {
                let elements = |nodes: Vec<NodeId>| -> Vec<Element> {
                    nodes
                        .into_iter()
                        .filter_map(|node| document.as_element(node))
                        .collect()
                };
                Ok(ChangeRecord::ChildList {
                    target: record.target,
                    added: elements(record.added_nodes),
                    removed: elements(record.removed_nodes),
                })
            }
            MutationKind::Attributes => {
                if target_type != NodeType::Element {
                    return Err(Error::MalformedRecord(format!(
                        "attribute record targets non-element {}",
                        record.target
                    )));
                }
                let name = record.attribute_name.ok_or_else(|| {
                    Error::MalformedRecord(format!(
                        "attribute record on {} has no attribute name",
                        record.target
                    ))
                })?;
                let target = document
                    .as_element(record.target)
                    .ok_or(tessera_dom::Error::NotAnElement(record.target))?;
                Ok(ChangeRecord::Attribute {
                    target,
                    name,
                    old_value: record.old_value,
                })
            }
        }
    }

    /// The node the change happened on
    pub fn target(&self) -> NodeId {
        match self {
            ChangeRecord::ChildList { target, .. } => *target,
            ChangeRecord::Attribute { target, .. } => target.node(),
        }
    }
}
