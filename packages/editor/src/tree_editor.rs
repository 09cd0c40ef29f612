//! # Tree Mutation Protocol
//!
//! [`TreeEditor`] owns the document and is its sole writer. Every change
//! funnels through four primitives (insert node, delete node, set text,
//! set attribute); each primitive validates first, then announces itself
//! to the record listeners with a Before record, applies the change, and
//! announces again with an identical After record. Compound operations
//! are plain sequences of primitives and emit exactly the records of
//! their expansion, so a listener can always reconstruct the tree.
//!
//! Listener callbacks receive `&Document` and therefore cannot re-enter
//! the editor; follow-up mutations belong in deferred trigger handlers
//! (see the router).
//!
//! Text normalization: the compound operations never leave two adjacent
//! text siblings behind. The raw primitives are the escape hatch and trust
//! the caller.

use crate::errors::{EditError, EditResult};
use crate::records::{ChangeRecord, EditOp, NodeSpec, Phase};
use std::cmp::Ordering;
use tracing::debug;
use vellum_dom::{char_len, char_split, Document, Location, LocationError, NodeData, NodeId, QualName, Root};

/// Record listener. Called synchronously, in registration order, for the
/// Before and After record of every primitive.
pub type RecordListener = Box<dyn FnMut(&Document, &ChangeRecord)>;

/// Outcome of [`TreeEditor::insert_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertedText {
    /// The text (or attribute) node holding the inserted text. `None` when
    /// the call was an empty-text no-op.
    pub node: Option<NodeId>,
    /// Whether a fresh text node had to be created.
    pub is_new: bool,
    /// Caret after the operation; at the start or the end of the inserted
    /// run depending on the `caret_at_end` argument.
    pub caret: Location,
}

/// The mutation protocol around a document and one root.
pub struct TreeEditor {
    doc: Document,
    root: Root,
    listeners: Vec<RecordListener>,
    version: u64,
}

impl TreeEditor {
    /// Take ownership of a built document and edit under `root`.
    pub fn new(doc: Document, root: Root) -> Self {
        Self {
            doc,
            root,
            listeners: Vec::new(),
            version: 0,
        }
    }

    /// Read access to the tree.
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Give the document back, dropping the listeners.
    pub fn into_document(self) -> Document {
        self.doc
    }

    /// The root this editor edits under.
    pub fn root(&self) -> Root {
        self.root
    }

    /// Count of primitive mutations applied so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Build a detached element, ready for insertion. Construction emits
    /// no records; the node is not part of any tree yet.
    pub fn create_element(&mut self, name: QualName) -> NodeId {
        self.doc.create_element(name)
    }

    /// Build a detached text node.
    pub fn create_text(&mut self, content: impl Into<String>) -> NodeId {
        self.doc.create_text(content)
    }

    /// Register a record listener. Listeners added while a record is being
    /// dispatched see the next record.
    pub fn add_listener(&mut self, listener: RecordListener) {
        self.listeners.push(listener);
    }

    fn emit(&mut self, phase: Phase, op: &EditOp) {
        let record = ChangeRecord {
            phase,
            op: op.clone(),
        };
        let TreeEditor {
            doc, listeners, ..
        } = self;
        for listener in listeners.iter_mut() {
            listener(doc, &record);
        }
    }

    // ------------------------------------------------------------------
    // Primitives

    /// Insert a single detached node as child `index` of `parent`.
    ///
    /// Fragments are rejected here; use [`TreeEditor::insert_at`] to
    /// expand one. Out-of-range indices are clamped to the child count and
    /// the record carries the clamped value.
    pub fn insert_node_at(&mut self, parent: NodeId, index: usize, spec: NodeSpec) -> EditResult<NodeId> {
        let node = match spec {
            NodeSpec::Node(n) => n,
            NodeSpec::Fragment(_) => return Err(EditError::FragmentNotAllowed),
        };
        if !self.doc.node(parent).is_element() {
            return Err(EditError::NotAnElement);
        }
        debug_assert!(self.doc.parent(node).is_none(), "inserted node must be detached");
        debug_assert!(!self.doc.node(node).is_attribute(), "attributes go through set_attribute");
        debug_assert!(index <= self.doc.children(parent).len(), "insert index out of range");
        let index = index.min(self.doc.children(parent).len());
        debug!(parent = %parent, index, node = %node, "insert node");
        let op = EditOp::InsertNode { parent, index, node };
        self.emit(Phase::Before, &op);
        self.doc.insert_child(parent, index, node);
        self.version += 1;
        self.emit(Phase::After, &op);
        Ok(node)
    }

    /// Detach `node` from its parent. The node stays in the arena and can
    /// be re-inserted later, which is what undo does.
    pub fn delete_node(&mut self, node: NodeId) -> EditResult<()> {
        debug_assert!(!self.doc.node(node).is_attribute(), "attributes go through set_attribute");
        let (Some(parent), Some(index)) = (self.doc.parent(node), self.doc.index_in_parent(node))
        else {
            debug_assert!(false, "delete_node on a detached node");
            return Ok(());
        };
        debug!(node = %node, parent = %parent, index, "delete node");
        let op = EditOp::DeleteNode { node, parent, index };
        self.emit(Phase::Before, &op);
        self.doc.detach(node);
        self.version += 1;
        self.emit(Phase::After, &op);
        Ok(())
    }

    /// Replace the whole value of a text node. An empty `value` deletes
    /// the node instead: empty text nodes never stay in the tree.
    pub fn set_text_node(&mut self, node: NodeId, value: &str) -> EditResult<()> {
        let Some(old) = self.doc.node(node).as_text().map(str::to_string) else {
            return Err(EditError::NotATextNode);
        };
        if value.is_empty() {
            return self.delete_node(node);
        }
        debug!(node = %node, old_chars = char_len(&old), new_chars = char_len(value), "set text");
        let op = EditOp::SetText {
            node,
            old,
            new: value.to_string(),
        };
        self.emit(Phase::Before, &op);
        self.doc.set_text(node, value);
        self.version += 1;
        self.emit(Phase::After, &op);
        Ok(())
    }

    /// Set (`Some`) or remove (`None`) an attribute of `element`.
    ///
    /// Always emits its record pair, even when old and new agree; records
    /// report what was asked and what was there.
    pub fn set_attribute(&mut self, element: NodeId, name: &QualName, value: Option<&str>) -> EditResult<()> {
        if !self.doc.node(element).is_element() {
            return Err(EditError::NotAnElement);
        }
        let old = self.doc.attribute_value(element, name).map(str::to_string);
        debug!(element = %element, name = %name, "set attribute");
        let op = EditOp::SetAttribute {
            node: element,
            name: name.clone(),
            old,
            new: value.map(str::to_string),
        };
        self.emit(Phase::Before, &op);
        self.doc.set_attribute_value(element, name, value);
        self.version += 1;
        self.emit(Phase::After, &op);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Text editing

    /// Insert `text` at a caret position.
    ///
    /// `target` may be a text node (insert at char `offset`), an attribute
    /// node (splice into its value), or an element (`offset` is a child
    /// index). At an element, an existing text child at the caret is
    /// extended rather than a new node created: first the child at
    /// `offset`, then the child just before it. Empty `text` emits nothing
    /// and reports no node.
    pub fn insert_text(&mut self, target: NodeId, offset: usize, text: &str, caret_at_end: bool) -> EditResult<InsertedText> {
        if text.is_empty() {
            return Ok(InsertedText {
                node: None,
                is_new: false,
                caret: Location {
                    root: self.root,
                    node: target,
                    offset,
                },
            });
        }
        match &self.doc.node(target).data {
            NodeData::Text(_) => self.splice_text(target, offset, text, caret_at_end),
            NodeData::Attribute(_) => self.splice_attribute(target, offset, text, caret_at_end),
            NodeData::Element(_) => {
                let children = self.doc.children(target);
                debug_assert!(offset <= children.len(), "caret index out of range");
                let ix = offset.min(children.len());
                if let Some(&at) = self.doc.children(target).get(ix) {
                    if self.doc.node(at).is_text() {
                        return self.splice_text(at, 0, text, caret_at_end);
                    }
                }
                if ix > 0 {
                    let before = self.doc.children(target)[ix - 1];
                    if self.doc.node(before).is_text() {
                        let end = self.doc.size(before);
                        return self.splice_text(before, end, text, caret_at_end);
                    }
                }
                let fresh = self.doc.create_text(text);
                self.insert_node_at(target, ix, NodeSpec::Node(fresh))?;
                let caret_offset = if caret_at_end { char_len(text) } else { 0 };
                Ok(InsertedText {
                    node: Some(fresh),
                    is_new: true,
                    caret: Location {
                        root: self.root,
                        node: fresh,
                        offset: caret_offset,
                    },
                })
            }
        }
    }

    fn splice_text(&mut self, node: NodeId, offset: usize, text: &str, caret_at_end: bool) -> EditResult<InsertedText> {
        let old = self.doc.node(node).as_text().map(str::to_string).ok_or(EditError::NotATextNode)?;
        let offset = offset.min(char_len(&old));
        let (head, tail) = char_split(&old, offset);
        let new = format!("{head}{text}{tail}");
        self.set_text_node(node, &new)?;
        let caret_offset = if caret_at_end {
            offset + char_len(text)
        } else {
            offset
        };
        Ok(InsertedText {
            node: Some(node),
            is_new: false,
            caret: Location {
                root: self.root,
                node,
                offset: caret_offset,
            },
        })
    }

    fn splice_attribute(&mut self, attr: NodeId, offset: usize, text: &str, caret_at_end: bool) -> EditResult<InsertedText> {
        let Some(element) = self.doc.parent(attr) else {
            debug_assert!(false, "text insertion into a detached attribute");
            return Err(EditError::NotAnElement);
        };
        let (name, old) = match self.doc.node(attr).as_attribute() {
            Some(a) => (a.name.clone(), a.value.clone()),
            None => return Err(EditError::NotATextNode),
        };
        let offset = offset.min(char_len(&old));
        let (head, tail) = char_split(&old, offset);
        let new = format!("{head}{text}{tail}");
        self.set_attribute(element, &name, Some(&new))?;
        let caret_offset = if caret_at_end {
            offset + char_len(text)
        } else {
            offset
        };
        Ok(InsertedText {
            node: Some(attr),
            is_new: false,
            caret: Location {
                root: self.root,
                node: attr,
                offset: caret_offset,
            },
        })
    }

    /// Remove `len` chars of a text node starting at `offset`. Both are
    /// clamped to the content. Removing everything deletes the node.
    pub fn delete_text(&mut self, node: NodeId, offset: usize, len: usize) -> EditResult<()> {
        let Some(old) = self.doc.node(node).as_text().map(str::to_string) else {
            return Err(EditError::NotATextNode);
        };
        let total = char_len(&old);
        let offset = offset.min(total);
        let len = len.min(total - offset);
        if len == 0 {
            return Ok(());
        }
        let (head, rest) = char_split(&old, offset);
        let (_, tail) = char_split(rest, len);
        let new = format!("{head}{tail}");
        self.set_text_node(node, &new)
    }

    // ------------------------------------------------------------------
    // Compound operations

    /// Insert one node or a whole fragment at `index`, expanding fragments
    /// into consecutive single insertions.
    pub fn insert_at(&mut self, parent: NodeId, index: usize, spec: NodeSpec) -> EditResult<()> {
        for (i, node) in spec.nodes().into_iter().enumerate() {
            self.insert_node_at(parent, index + i, NodeSpec::Node(node))?;
        }
        Ok(())
    }

    /// Merge `node` with its following sibling when both are text nodes.
    ///
    /// Returns a caret at the merge boundary, or just after `node` when
    /// there was nothing to merge. Idempotent: a second call lands in the
    /// second branch and changes nothing.
    pub fn merge_text_nodes(&mut self, node: NodeId) -> EditResult<Location> {
        let root = self.root;
        let (Some(parent), Some(index)) = (self.doc.parent(node), self.doc.index_in_parent(node))
        else {
            debug_assert!(false, "merge_text_nodes on a detached node");
            return Ok(Location {
                root,
                node,
                offset: 0,
            });
        };
        let next = self.doc.children(parent).get(index + 1).copied();
        if let Some(next) = next {
            if self.doc.node(node).is_text() && self.doc.node(next).is_text() {
                let own = self.doc.node(node).as_text().map(str::to_string).unwrap_or_default();
                let following = self.doc.node(next).as_text().map(str::to_string).unwrap_or_default();
                let boundary = char_len(&own);
                self.set_text_node(node, &format!("{own}{following}"))?;
                self.delete_node(next)?;
                return Ok(Location {
                    root,
                    node,
                    offset: boundary,
                });
            }
        }
        Ok(Location {
            root,
            node: parent,
            offset: index + 1,
        })
    }

    /// [`TreeEditor::merge_text_nodes`] that accepts "nothing": `None`
    /// comes straight back as `Ok(None)`.
    pub fn merge_text_nodes_nf(&mut self, node: Option<NodeId>) -> EditResult<Option<Location>> {
        match node {
            Some(n) => self.merge_text_nodes(n).map(Some),
            None => Ok(None),
        }
    }

    /// Delete `node` and merge the text siblings its removal made
    /// adjacent. Returns a caret at the removal point.
    pub fn remove_node(&mut self, node: NodeId) -> EditResult<Location> {
        let root = self.root;
        let (Some(parent), Some(index)) = (self.doc.parent(node), self.doc.index_in_parent(node))
        else {
            debug_assert!(false, "remove_node on a detached node");
            return Ok(Location {
                root,
                node,
                offset: 0,
            });
        };
        let prev = index.checked_sub(1).map(|ix| self.doc.children(parent)[ix]);
        self.delete_node(node)?;
        Ok(match self.merge_text_nodes_nf(prev)? {
            Some(caret) => caret,
            None => Location {
                root,
                node: parent,
                offset: index,
            },
        })
    }

    /// [`TreeEditor::remove_node`] that accepts "nothing".
    pub fn remove_node_nf(&mut self, node: Option<NodeId>) -> EditResult<Option<Location>> {
        match node {
            Some(n) => self.remove_node(n).map(Some),
            None => Ok(None),
        }
    }

    /// Delete a run of contiguous siblings, in order, then merge the texts
    /// left adjacent at the seam. The nodes must be consecutive children
    /// of one parent or nothing happens. An empty slice removes nothing
    /// and yields no caret.
    pub fn remove_nodes(&mut self, nodes: &[NodeId]) -> EditResult<Option<Location>> {
        let Some(&first) = nodes.first() else {
            return Ok(None);
        };
        let (Some(parent), Some(first_ix)) = (self.doc.parent(first), self.doc.index_in_parent(first))
        else {
            return Err(EditError::NotContiguous);
        };
        for (i, &n) in nodes.iter().enumerate() {
            if self.doc.parent(n) != Some(parent) || self.doc.index_in_parent(n) != Some(first_ix + i) {
                return Err(EditError::NotContiguous);
            }
        }
        let prev = first_ix.checked_sub(1).map(|ix| self.doc.children(parent)[ix]);
        for &n in nodes {
            self.delete_node(n)?;
        }
        Ok(Some(match self.merge_text_nodes_nf(prev)? {
            Some(caret) => caret,
            None => Location {
                root: self.root,
                node: parent,
                offset: first_ix,
            },
        }))
    }

    /// Split the content of `text_node` at `offset` and put `spec`'s nodes
    /// between the halves. Empty halves are dropped rather than left as
    /// empty text nodes. `offset` is clamped into the content, negative
    /// values to the start.
    ///
    /// Returns the locations just before and just after the inserted run,
    /// expressed in the surviving text halves where they exist and in the
    /// parent otherwise.
    pub fn insert_into_text(&mut self, text_node: NodeId, offset: isize, spec: NodeSpec) -> EditResult<(Location, Location)> {
        let Some(old) = self.doc.node(text_node).as_text().map(str::to_string) else {
            return Err(EditError::NotATextNode);
        };
        let payload = spec.nodes();
        if payload.is_empty() {
            return Err(EditError::NoNodeToInsert);
        }
        let (Some(parent), Some(node_index)) = (self.doc.parent(text_node), self.doc.index_in_parent(text_node))
        else {
            debug_assert!(false, "insert_into_text on a detached node");
            return Err(EditError::NotInside);
        };
        let root = self.root;
        let total = char_len(&old);
        let offset = offset.clamp(0, total as isize) as usize;
        let (head, tail) = {
            let (h, t) = char_split(&old, offset);
            (h.to_string(), t.to_string())
        };

        self.delete_node(text_node)?;
        let mut at = node_index;
        let before = if head.is_empty() {
            Location {
                root,
                node: parent,
                offset: node_index,
            }
        } else {
            let head_len = char_len(&head);
            let head_node = self.doc.create_text(head);
            self.insert_node_at(parent, at, NodeSpec::Node(head_node))?;
            at += 1;
            Location {
                root,
                node: head_node,
                offset: head_len,
            }
        };
        for node in payload {
            self.insert_node_at(parent, at, NodeSpec::Node(node))?;
            at += 1;
        }
        let after = if tail.is_empty() {
            Location {
                root,
                node: parent,
                offset: at,
            }
        } else {
            let tail_node = self.doc.create_text(tail);
            self.insert_node_at(parent, at, NodeSpec::Node(tail_node))?;
            Location {
                root,
                node: tail_node,
                offset: 0,
            }
        };
        Ok((before, after))
    }

    /// Split the subtree under `top` in two along the path to
    /// `(node, offset)`.
    ///
    /// `top` is deleted and replaced by two fresh siblings built from
    /// copies of its content: everything before the split point in the
    /// first, everything after it in the second. Splitting straight
    /// through elements copies their shell (name and attributes) into both
    /// halves; empty text halves are dropped. The record sequence is one
    /// delete and two inserts.
    pub fn split_at(&mut self, top: NodeId, node: NodeId, offset: usize) -> EditResult<(NodeId, NodeId)> {
        if !self.doc.in_subtree(top, node) || self.doc.node(node).is_attribute() {
            return Err(EditError::NotInside);
        }
        if self.doc.node(top).is_text() {
            return Err(EditError::WouldDenormalize);
        }
        let (Some(top_parent), Some(top_index)) = (self.doc.parent(top), self.doc.index_in_parent(top))
        else {
            debug_assert!(false, "split_at on a detached top");
            return Err(EditError::NotInside);
        };
        debug!(top = %top, node = %node, offset, "split");

        // child-index path from top down to node
        let mut path = Vec::new();
        let mut cur = node;
        while cur != top {
            match (self.doc.parent(cur), self.doc.index_in_parent(cur)) {
                (Some(p), Some(ix)) => {
                    path.push(ix);
                    cur = p;
                }
                _ => return Err(EditError::NotInside),
            }
        }
        path.reverse();

        self.delete_node(top)?;
        let (left, right) = split_detached(&mut self.doc, top, &path, offset);
        self.insert_node_at(top_parent, top_index, NodeSpec::Node(left))?;
        self.insert_node_at(top_parent, top_index + 1, NodeSpec::Node(right))?;
        Ok((left, right))
    }

    /// Remove everything between two locations under this editor's root.
    ///
    /// The locations are ordered internally, so callers can pass selection
    /// endpoints either way round. Partially covered text nodes keep their
    /// outside part in the tree; the removed inside part comes back as a
    /// fresh detached text node. Wholly covered siblings are detached as
    /// they are. Returns a caret at the cut point plus the removed pieces
    /// in document order.
    ///
    /// Both endpoints must lie directly under one container element (in
    /// its text children or in the container itself); anything else is
    /// [`EditError::NotContiguous`]. Attribute locations are not cuttable.
    pub fn cut(&mut self, a: Location, b: Location) -> EditResult<(Location, Vec<NodeId>)> {
        let order = a
            .compare(&b, &self.doc)
            .ok_or(EditError::Location(LocationError::NodeNotInRoot))?;
        let (start, end) = match order {
            Ordering::Greater => (b, a),
            _ => (a, b),
        };
        debug!(start = %start.node, end = %end.node, "cut");
        if start.node == end.node {
            return self.cut_within(start, end);
        }

        let (c_start, mid_from, start_partial) = self.cut_start_bound(&start)?;
        let (c_end, mid_to, end_partial) = self.cut_end_bound(&end)?;
        if c_start != c_end {
            return Err(EditError::NotContiguous);
        }
        let container = c_start;
        let mid_to = mid_to.max(mid_from);
        let middle: Vec<NodeId> = self.doc.children(container)[mid_from..mid_to].to_vec();

        let mut captured = Vec::new();
        if let Some((snode, soff)) = start_partial {
            let tail: String = match self.doc.node(snode).as_text() {
                Some(t) => t.chars().skip(soff).collect(),
                None => String::new(),
            };
            let tail_len = char_len(&tail);
            let keep = self.doc.create_text(tail);
            captured.push(keep);
            self.delete_text(snode, soff, tail_len)?;
        }
        for &n in &middle {
            self.delete_node(n)?;
        }
        captured.extend(middle);
        if let Some((enode, eoff)) = end_partial {
            let head: String = match self.doc.node(enode).as_text() {
                Some(t) => t.chars().take(eoff).collect(),
                None => String::new(),
            };
            let keep = self.doc.create_text(head);
            captured.push(keep);
            self.delete_text(enode, 0, eoff)?;
        }

        let prev = mid_from.checked_sub(1).map(|ix| self.doc.children(container)[ix]);
        let caret = match self.merge_text_nodes_nf(prev)? {
            Some(caret) => caret,
            None => Location {
                root: self.root,
                node: container,
                offset: mid_from,
            },
        };
        Ok((caret, captured))
    }

    /// Cut where both endpoints share one node.
    fn cut_within(&mut self, start: Location, end: Location) -> EditResult<(Location, Vec<NodeId>)> {
        let root = self.root;
        let node = start.node;
        match &self.doc.node(node).data {
            NodeData::Text(t) => {
                let content = t.clone();
                let from = start.offset.min(char_len(&content));
                let to = end.offset.min(char_len(&content));
                if from >= to {
                    return Ok((start, Vec::new()));
                }
                let removed: String = content.chars().skip(from).take(to - from).collect();
                let fallback = (self.doc.parent(node), self.doc.index_in_parent(node));
                self.delete_text(node, from, to - from)?;
                let keep = self.doc.create_text(removed);
                let caret = if self.doc.parent(node).is_some() {
                    Location {
                        root,
                        node,
                        offset: from,
                    }
                } else {
                    // the whole content was cut and the node went with it
                    match fallback {
                        (Some(parent), Some(ix)) => Location {
                            root,
                            node: parent,
                            offset: ix,
                        },
                        _ => start,
                    }
                };
                Ok((caret, vec![keep]))
            }
            NodeData::Element(_) => {
                let children = self.doc.children(node);
                let from = start.offset.min(children.len());
                let to = end.offset.min(children.len());
                let removed: Vec<NodeId> = children[from..to].to_vec();
                for &n in &removed {
                    self.delete_node(n)?;
                }
                let prev = from.checked_sub(1).map(|ix| self.doc.children(node)[ix]);
                let caret = match self.merge_text_nodes_nf(prev)? {
                    Some(caret) => caret,
                    None => Location {
                        root,
                        node,
                        offset: from,
                    },
                };
                Ok((caret, removed))
            }
            NodeData::Attribute(_) => Err(EditError::NotATextNode),
        }
    }

    /// Where the cut begins: the container, the first wholly removed child
    /// index, and the partially removed start text if any.
    fn cut_start_bound(&self, loc: &Location) -> EditResult<(NodeId, usize, Option<(NodeId, usize)>)> {
        match &self.doc.node(loc.node).data {
            NodeData::Element(_) => Ok((loc.node, loc.offset, None)),
            NodeData::Text(t) => {
                let (Some(parent), Some(ix)) = (self.doc.parent(loc.node), self.doc.index_in_parent(loc.node))
                else {
                    return Err(EditError::NotContiguous);
                };
                let len = char_len(t);
                if loc.offset == 0 {
                    Ok((parent, ix, None))
                } else if loc.offset >= len {
                    Ok((parent, ix + 1, None))
                } else {
                    Ok((parent, ix + 1, Some((loc.node, loc.offset))))
                }
            }
            NodeData::Attribute(_) => Err(EditError::NotATextNode),
        }
    }

    /// Where the cut ends: the container, the first surviving child index,
    /// and the partially removed end text if any.
    fn cut_end_bound(&self, loc: &Location) -> EditResult<(NodeId, usize, Option<(NodeId, usize)>)> {
        match &self.doc.node(loc.node).data {
            NodeData::Element(_) => Ok((loc.node, loc.offset, None)),
            NodeData::Text(t) => {
                let (Some(parent), Some(ix)) = (self.doc.parent(loc.node), self.doc.index_in_parent(loc.node))
                else {
                    return Err(EditError::NotContiguous);
                };
                let len = char_len(t);
                if loc.offset >= len {
                    Ok((parent, ix + 1, None))
                } else if loc.offset == 0 {
                    Ok((parent, ix, None))
                } else {
                    Ok((parent, ix, Some((loc.node, loc.offset))))
                }
            }
            NodeData::Attribute(_) => Err(EditError::NotATextNode),
        }
    }
}

/// Pure arena-side split of a detached subtree. Builds both halves out of
/// fresh nodes and copies, leaving the original subtree intact so that a
/// recorded delete of it stays replayable.
fn split_detached(doc: &mut Document, cur: NodeId, path: &[usize], offset: usize) -> (NodeId, NodeId) {
    match path.split_first() {
        // the split point itself
        None => match &doc.node(cur).data {
            NodeData::Text(t) => {
                let (head, tail) = char_split(t, offset);
                let (head, tail) = (head.to_string(), tail.to_string());
                (doc.create_text(head), doc.create_text(tail))
            }
            _ => {
                let children = doc.children(cur).to_vec();
                let cut = offset.min(children.len());
                let left = doc.clone_shell(cur);
                for &c in &children[..cut] {
                    let copy = doc.clone_subtree(c);
                    doc.append_child(left, copy);
                }
                let right = doc.clone_shell(cur);
                for &c in &children[cut..] {
                    let copy = doc.clone_subtree(c);
                    doc.append_child(right, copy);
                }
                (left, right)
            }
        },
        Some((&ix, rest)) => {
            let children = doc.children(cur).to_vec();
            let (child_left, child_right) = split_detached(doc, children[ix], rest, offset);
            let left = doc.clone_shell(cur);
            for &c in &children[..ix] {
                let copy = doc.clone_subtree(c);
                doc.append_child(left, copy);
            }
            if keep_half(doc, child_left) {
                doc.append_child(left, child_left);
            }
            let right = doc.clone_shell(cur);
            if keep_half(doc, child_right) {
                doc.append_child(right, child_right);
            }
            for &c in &children[ix + 1..] {
                let copy = doc.clone_subtree(c);
                doc.append_child(right, copy);
            }
            (left, right)
        }
    }
}

/// Empty text halves are dropped; everything else is kept.
fn keep_half(doc: &Document, node: NodeId) -> bool {
    doc.node(node).as_text().map_or(true, |t| !t.is_empty())
}
