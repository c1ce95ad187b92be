//! Arena-backed document tree
//!
//! Nodes are never freed; a removed node keeps its ID and its own subtree and
//! can be re-inserted anywhere. Every edit made while an observer is attached
//! is offered to it as a [`MutationRecord`].

use crate::error::{Error, Result};
use crate::observer::{MutationRecord, ObserverShared};
use crate::{Element, NodeId};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Kind of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Document,
    Element,
    Text,
    Comment,
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attributes: IndexMap<String, String>,
    /// Set by the runtime for elements it re-renders wholesale
    ignore_mutations: bool,
}

#[derive(Debug, Clone)]
#[allow(dead_code)] // text payloads are only read back in tests
enum NodeData {
    Document,
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

pub(crate) struct Tree {
    nodes: Vec<Node>,
    observers: Vec<Weak<ObserverShared>>,
}

impl Tree {
    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.index()).ok_or(Error::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id.index()).ok_or(Error::NodeNotFound(id))
    }

    fn element(&self, el: Element) -> Result<&ElementData> {
        match &self.node(el.node())?.data {
            NodeData::Element(data) => Ok(data),
            _ => Err(Error::NotAnElement(el.node())),
        }
    }

    fn element_mut(&mut self, el: Element) -> Result<&mut ElementData> {
        match &mut self.node_mut(el.node())?.data {
            NodeData::Element(data) => Ok(data),
            _ => Err(Error::NotAnElement(el.node())),
        }
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Whether `ancestor` is `node` or one of its ancestors
    pub(crate) fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(id.index()).and_then(|n| n.parent);
        }
        false
    }

    fn notify(&mut self, record: MutationRecord) {
        self.observers.retain(|weak| weak.strong_count() > 0);
        let observers: Vec<_> = self.observers.iter().filter_map(Weak::upgrade).collect();
        for observer in observers {
            observer.offer(self, &record);
        }
    }

    fn detach(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let siblings = &mut self.node_mut(parent)?.children;
        let index = siblings
            .iter()
            .position(|c| *c == child)
            .ok_or(Error::NotAChild { parent, child })?;
        siblings.remove(index);
        self.node_mut(child)?.parent = None;
        self.notify(MutationRecord::child_list(parent, Vec::new(), vec![child]));
        Ok(())
    }
}

/// Shared handle to a document tree
///
/// Cloning the handle does not clone the tree.
#[derive(Clone)]
pub struct Document {
    tree: Rc<RefCell<Tree>>,
}

impl Document {
    /// Create a document containing only its root node
    pub fn new() -> Self {
        let mut tree = Tree {
            nodes: Vec::new(),
            observers: Vec::new(),
        };
        tree.push(NodeData::Document);
        Self {
            tree: Rc::new(RefCell::new(tree)),
        }
    }

    /// The document root node
    pub fn root(&self) -> NodeId {
        NodeId::new(0)
    }

    /// Create a detached element
    pub fn create_element(&self, tag: impl Into<String>) -> Element {
        let id = self.tree.borrow_mut().push(NodeData::Element(ElementData {
            tag: tag.into(),
            attributes: IndexMap::new(),
            ignore_mutations: false,
        }));
        Element::new_unchecked(id)
    }

    /// Create a detached text node
    pub fn create_text(&self, data: impl Into<String>) -> NodeId {
        self.tree.borrow_mut().push(NodeData::Text(data.into()))
    }

    /// Create a detached comment node
    pub fn create_comment(&self, data: impl Into<String>) -> NodeId {
        self.tree.borrow_mut().push(NodeData::Comment(data.into()))
    }

    /// Get the kind of a node
    pub fn node_type(&self, node: NodeId) -> Result<NodeType> {
        let tree = self.tree.borrow();
        Ok(match tree.node(node)?.data {
            NodeData::Document => NodeType::Document,
            NodeData::Element(_) => NodeType::Element,
            NodeData::Text(_) => NodeType::Text,
            NodeData::Comment(_) => NodeType::Comment,
        })
    }

    /// Validate that `node` is an element
    pub fn as_element(&self, node: NodeId) -> Option<Element> {
        match self.node_type(node) {
            Ok(NodeType::Element) => Some(Element::new_unchecked(node)),
            _ => None,
        }
    }

    /// Tag name of an element
    pub fn tag_name(&self, el: Element) -> Option<String> {
        self.tree.borrow().element(el).ok().map(|e| e.tag.clone())
    }

    /// Text content of a text or comment node
    #[cfg(test)]
    pub(crate) fn text(&self, node: NodeId) -> Option<String> {
        match &self.tree.borrow().node(node).ok()?.data {
            NodeData::Text(data) | NodeData::Comment(data) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn parent(&self, node: impl Into<NodeId>) -> Option<NodeId> {
        self.tree.borrow().node(node.into()).ok()?.parent
    }

    pub fn children(&self, node: impl Into<NodeId>) -> Vec<NodeId> {
        self.tree
            .borrow()
            .node(node.into())
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Every element below `node`, in tree order, excluding `node` itself
    pub fn descendants(&self, node: impl Into<NodeId>) -> Vec<Element> {
        let tree = self.tree.borrow();
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match tree.node(node.into()) {
            Ok(n) => n.children.iter().rev().copied().collect(),
            Err(_) => return out,
        };
        while let Some(id) = stack.pop() {
            let Ok(n) = tree.node(id) else { continue };
            if matches!(n.data, NodeData::Element(_)) {
                out.push(Element::new_unchecked(id));
            }
            stack.extend(n.children.iter().rev().copied());
        }
        out
    }

    /// Whether the node is reachable from the document root
    #[cfg(test)]
    pub(crate) fn is_connected(&self, node: impl Into<NodeId>) -> bool {
        self.tree.borrow().is_inclusive_ancestor(self.root(), node.into())
    }

    /// Append `child` as the last child of `parent`
    pub fn append_child(&self, parent: impl Into<NodeId>, child: impl Into<NodeId>) -> Result<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` before `reference` (or last when `reference` is `None`)
    ///
    /// A child that already has a parent is first removed from it, producing a
    /// removal record on the old parent followed by an addition record.
    pub fn insert_before(
        &self,
        parent: impl Into<NodeId>,
        child: impl Into<NodeId>,
        reference: Option<NodeId>,
    ) -> Result<()> {
        let (parent, child) = (parent.into(), child.into());
        let mut tree = self.tree.borrow_mut();

        let parent_node = tree.node(parent)?;
        if matches!(parent_node.data, NodeData::Text(_) | NodeData::Comment(_)) {
            return Err(Error::HierarchyRequest { parent, child });
        }
        if matches!(tree.node(child)?.data, NodeData::Document)
            || tree.is_inclusive_ancestor(child, parent)
        {
            return Err(Error::HierarchyRequest { parent, child });
        }
        if let Some(reference) = reference {
            if tree.node(reference)?.parent != Some(parent) {
                return Err(Error::NotAChild {
                    parent,
                    child: reference,
                });
            }
        }

        if let Some(old_parent) = tree.node(child)?.parent {
            tree.detach(old_parent, child)?;
        }

        let siblings = &mut tree.node_mut(parent)?.children;
        let index = reference
            .and_then(|r| siblings.iter().position(|c| *c == r))
            .unwrap_or(siblings.len());
        siblings.insert(index, child);
        tree.node_mut(child)?.parent = Some(parent);
        tree.notify(MutationRecord::child_list(parent, vec![child], Vec::new()));
        Ok(())
    }

    /// Remove `child` from `parent`
    pub fn remove_child(&self, parent: impl Into<NodeId>, child: impl Into<NodeId>) -> Result<()> {
        self.tree.borrow_mut().detach(parent.into(), child.into())
    }

    /// Remove a node from its parent; no-op for a detached node
    pub fn remove(&self, node: impl Into<NodeId>) -> Result<()> {
        let node = node.into();
        let parent = self.tree.borrow().node(node)?.parent;
        match parent {
            Some(parent) => self.remove_child(parent, node),
            None => Ok(()),
        }
    }

    pub fn get_attribute(&self, el: Element, name: &str) -> Option<String> {
        self.tree.borrow().element(el).ok()?.attributes.get(name).cloned()
    }

    pub fn has_attribute(&self, el: Element, name: &str) -> bool {
        self.tree
            .borrow()
            .element(el)
            .map(|e| e.attributes.contains_key(name))
            .unwrap_or(false)
    }

    /// All attributes of an element in the order they were first set
    #[cfg(test)]
    pub(crate) fn attributes(&self, el: Element) -> Vec<(String, String)> {
        self.tree
            .borrow()
            .element(el)
            .map(|e| {
                e.attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Set an attribute; always produces a record, even for an unchanged value
    pub fn set_attribute(
        &self,
        el: Element,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        let name = name.into();
        let mut tree = self.tree.borrow_mut();
        let old = tree
            .element_mut(el)?
            .attributes
            .insert(name.clone(), value.into());
        tree.notify(MutationRecord::attributes(el.node(), name, old));
        Ok(())
    }

    /// Remove an attribute; returns whether it was present
    pub fn remove_attribute(&self, el: Element, name: &str) -> Result<bool> {
        let mut tree = self.tree.borrow_mut();
        let Some(old) = tree.element_mut(el)?.attributes.shift_remove(name) else {
            return Ok(false);
        };
        tree.notify(MutationRecord::attributes(el.node(), name, Some(old)));
        Ok(true)
    }

    /// Mark an element so the runtime ignores every change that targets it
    pub fn set_ignore_mutations(&self, el: Element, ignore: bool) -> Result<()> {
        self.tree.borrow_mut().element_mut(el)?.ignore_mutations = ignore;
        Ok(())
    }

    pub fn ignores_mutations(&self, el: Element) -> bool {
        self.tree
            .borrow()
            .element(el)
            .map(|e| e.ignore_mutations)
            .unwrap_or(false)
    }

    pub(crate) fn register_observer(&self, observer: &Rc<ObserverShared>) {
        let mut tree = self.tree.borrow_mut();
        let already = tree
            .observers
            .iter()
            .any(|w| std::ptr::eq(w.as_ptr(), Rc::as_ptr(observer)));
        if !already {
            tree.observers.push(Rc::downgrade(observer));
        }
    }

    pub(crate) fn unregister_observer(&self, observer: &Rc<ObserverShared>) {
        self.tree
            .borrow_mut()
            .observers
            .retain(|w| !std::ptr::eq(w.as_ptr(), Rc::as_ptr(observer)));
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.tree.borrow();
        f.debug_struct("Document")
            .field("nodes", &tree.nodes.len())
            .field("observers", &tree.observers.len())
            .finish()
    }
}
