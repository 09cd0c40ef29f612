//! Node representation for the arena document tree.
//!
//! Nodes are stored in a flat arena owned by [`Document`](crate::Document)
//! and addressed by [`NodeId`]. Ids are never reused: a deleted node stays in
//! the arena in a detached state, so ids captured in change records or undo
//! commands remain meaningful for the lifetime of the document.
//!
//! Attributes are nodes too. An attribute node's parent is the element that
//! owns it, which is what lets locations address positions inside attribute
//! values with the same machinery used for text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Arena index of a node. Copyable, cheap, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Qualified name: optional namespace plus a local name.
///
/// The namespace is an opaque string chosen by the embedder (a URI, a prefix,
/// whatever the schema layer uses); the tree never interprets it beyond
/// equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualName {
    pub ns: Option<String>,
    pub local: String,
}

impl QualName {
    /// Name with no namespace.
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            ns: None,
            local: local.into(),
        }
    }

    /// Namespaced name.
    pub fn namespaced(ns: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            ns: Some(ns.into()),
            local: local.into(),
        }
    }
}

impl fmt::Display for QualName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns {
            Some(ns) => write!(f, "{}:{}", ns, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

/// A single node in the arena.
#[derive(Debug, Clone)]
pub struct Node {
    /// Owning parent. `None` means the node is detached (or was never
    /// attached). For attribute nodes this is the owning element.
    pub parent: Option<NodeId>,
    pub data: NodeData,
}

/// Node payload.
#[derive(Debug, Clone)]
pub enum NodeData {
    Element(ElementData),
    /// Character data. Offsets into text are char indices, never bytes.
    Text(String),
    Attribute(AttributeData),
}

/// Element payload: name, ordered children, attribute nodes.
#[derive(Debug, Clone)]
pub struct ElementData {
    pub name: QualName,
    pub children: Vec<NodeId>,
    /// Attribute nodes. A set keyed by qualified name; insertion order is
    /// kept only so paths and comparisons are deterministic.
    pub attrs: Vec<NodeId>,
}

impl ElementData {
    pub fn new(name: QualName) -> Self {
        Self {
            name,
            children: Vec::new(),
            attrs: Vec::new(),
        }
    }
}

/// Attribute payload.
#[derive(Debug, Clone)]
pub struct AttributeData {
    pub name: QualName,
    pub value: String,
}

impl Node {
    #[inline]
    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element(_))
    }

    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self.data, NodeData::Text(_))
    }

    #[inline]
    pub fn is_attribute(&self) -> bool {
        matches!(self.data, NodeData::Attribute(_))
    }

    #[inline]
    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    #[inline]
    pub fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text(t) => Some(t),
            _ => None,
        }
    }

    #[inline]
    pub fn as_attribute(&self) -> Option<&AttributeData> {
        match &self.data {
            NodeData::Attribute(a) => Some(a),
            _ => None,
        }
    }
}

/// Number of chars in `s`. Every offset in this crate counts chars.
#[inline]
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `s` at char offset `offset`, clamping past-the-end offsets.
pub fn char_split(s: &str, offset: usize) -> (&str, &str) {
    match s.char_indices().nth(offset) {
        Some((byte, _)) => s.split_at(byte),
        None => (s, ""),
    }
}
