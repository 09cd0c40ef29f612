//! Change records: the low-level mutation stream.
//!
//! Every primitive mutation is announced twice, once with
//! [`Phase::Before`] right before the tree changes and once with
//! [`Phase::After`] right after, with identical payloads. Nothing else is
//! ever emitted between the two. Compound operations are sequences of
//! primitives and emit exactly the records of their expansion.
//!
//! Records carry ids and values, never references, and serialize with
//! serde so sessions can be journaled or shipped elsewhere.

use serde::{Deserialize, Serialize};
use vellum_dom::{NodeId, QualName};

/// Which side of the mutation a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Before,
    After,
}

/// One primitive mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditOp {
    /// `node` becomes child `index` of `parent`.
    InsertNode {
        parent: NodeId,
        index: usize,
        node: NodeId,
    },
    /// `node` leaves `parent`; `index` is its position at that moment.
    DeleteNode {
        node: NodeId,
        parent: NodeId,
        index: usize,
    },
    /// Full text replacement on a text node.
    SetText {
        node: NodeId,
        old: String,
        new: String,
    },
    /// Attribute write on element `node`; `None` means absent.
    SetAttribute {
        node: NodeId,
        name: QualName,
        old: Option<String>,
        new: Option<String>,
    },
}

/// A phase plus its operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub phase: Phase,
    pub op: EditOp,
}

/// What to insert: one node, or a fragment expanded into consecutive
/// siblings by the operations that accept it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSpec {
    Node(NodeId),
    Fragment(Vec<NodeId>),
}

impl NodeSpec {
    /// The nodes this spec stands for, in insertion order.
    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            NodeSpec::Node(n) => vec![*n],
            NodeSpec::Fragment(v) => v.clone(),
        }
    }
}
