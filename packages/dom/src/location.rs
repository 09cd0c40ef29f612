//! Locations: stable, serializable addresses into a marked subtree.
//!
//! A [`Location`] is a `(root, node, offset)` triple. For element nodes the
//! offset is a position in the child list (`0..=child_count`); for text and
//! attribute nodes it is a char offset into the content (`0..=char_count`).
//! Locations hold no references and are never invalidated in place: validity
//! is recomputed against the current tree whenever it matters.
//!
//! The serialized form is a root-relative path such as `0/1/3` (child
//! indices, then a final offset) or `0/1/@rend/2` (an attribute of the
//! element at `0/1`, char offset 2). The empty path addresses the root
//! itself at offset 0.
//!
//! Design notes on ordering: [`Location::compare`] uses the DOM boundary
//! point rule. A parent location at offset `i` sorts before every location
//! inside child `i` and after every location inside child `i - 1`.
//! Attribute nodes sort as pseudo-children placed after all normal children
//! of their element, in attribute order.

use crate::document::{Document, Root};
use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Errors for root marking, location construction, and path handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// The node is not inside the subtree of the location's root.
    #[error("node is not a descendant of the root")]
    NotADescendant,
    /// The id does not belong to this document.
    #[error("node does not belong to this document")]
    InvalidNode,
    /// The path string violates the path syntax.
    #[error("malformed path: {0:?}")]
    MalformedPath(String),
    /// A strict construction was given a negative offset.
    #[error("negative offset")]
    NegativeOffset,
    /// A strict construction was given an offset past the node's size.
    #[error("offset {offset} is greater than the node size {size}")]
    OffsetTooLarge { offset: usize, size: usize },
    /// A strict construction was given a node outside the root.
    #[error("node is not contained in the root")]
    NodeNotInRoot,
    /// The subtree being marked already contains a marked root.
    #[error("subtree already contains a marked root")]
    AlreadyMarked,
}

/// An address inside the subtree of a marked root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub root: Root,
    pub node: NodeId,
    pub offset: usize,
}

impl Location {
    /// Strict construction.
    ///
    /// `Ok(None)` when `node` is `None`: absent nodes mean there is no
    /// meaningful position to point at, which is not an error. Everything
    /// else is checked: the node must belong to the document and sit inside
    /// the root, and the offset must be in `0..=size`.
    pub fn new(
        doc: &Document,
        root: Root,
        node: Option<NodeId>,
        offset: isize,
    ) -> Result<Option<Location>, LocationError> {
        let Some(node) = node else {
            return Ok(None);
        };
        if doc.get(node).is_none() {
            return Err(LocationError::InvalidNode);
        }
        if !doc.in_subtree(root.node(), node) {
            return Err(LocationError::NodeNotInRoot);
        }
        if offset < 0 {
            return Err(LocationError::NegativeOffset);
        }
        let offset = offset as usize;
        let size = doc.size(node);
        if offset > size {
            return Err(LocationError::OffsetTooLarge { offset, size });
        }
        Ok(Some(Location { root, node, offset }))
    }

    /// Like [`Location::new`] but out-of-range offsets are clamped into
    /// `0..=size` instead of failing.
    pub fn new_clamped(
        doc: &Document,
        root: Root,
        node: Option<NodeId>,
        offset: isize,
    ) -> Result<Option<Location>, LocationError> {
        let Some(node) = node else {
            return Ok(None);
        };
        if doc.get(node).is_none() {
            return Err(LocationError::InvalidNode);
        }
        if !doc.in_subtree(root.node(), node) {
            return Err(LocationError::NodeNotInRoot);
        }
        let offset = (offset.max(0) as usize).min(doc.size(node));
        Ok(Some(Location { root, node, offset }))
    }

    /// Whether this location still points into the tree: the node must be
    /// reachable from the root and the offset within the node's current
    /// size.
    pub fn is_valid(&self, doc: &Document) -> bool {
        if doc.get(self.node).is_none() || doc.get(self.root.node()).is_none() {
            return false;
        }
        doc.in_subtree(self.root.node(), self.node) && self.offset <= doc.size(self.node)
    }

    /// Clamp the offset to the node's current size. Idempotent; a valid
    /// location comes back unchanged. Reachability is not repaired here.
    pub fn normalized(&self, doc: &Document) -> Location {
        match doc.get(self.node) {
            Some(_) => Location {
                offset: self.offset.min(doc.size(self.node)),
                ..*self
            },
            None => *self,
        }
    }

    /// Serialize to a root-relative path.
    pub fn to_path(&self, doc: &Document) -> Result<String, LocationError> {
        if doc.get(self.node).is_none() || doc.get(self.root.node()).is_none() {
            return Err(LocationError::InvalidNode);
        }
        let mut segs: Vec<String> = Vec::new();
        let mut cur = self.node;
        while cur != self.root.node() {
            let parent = doc.parent(cur).ok_or(LocationError::NotADescendant)?;
            let seg = match doc.node(cur).as_attribute() {
                Some(a) => format!("@{}", a.name.local),
                None => doc
                    .index_in_parent(cur)
                    .ok_or(LocationError::NotADescendant)?
                    .to_string(),
            };
            segs.push(seg);
            cur = parent;
        }
        segs.reverse();
        segs.push(self.offset.to_string());
        Ok(segs.join("/"))
    }

    /// Resolve a path produced by [`Location::to_path`] (or built by hand).
    ///
    /// Returns `Err(MalformedPath)` for syntax violations and `Ok(None)`
    /// when the path is well formed but does not resolve in the current
    /// tree: a child index or offset out of range, a step through a
    /// non-element, a missing attribute. The final offset check is
    /// inclusive (`offset <= size`) so end-of-node locations round-trip.
    pub fn from_path(
        doc: &Document,
        root: Root,
        path: &str,
    ) -> Result<Option<Location>, LocationError> {
        if path.is_empty() {
            return Ok(Some(Location {
                root,
                node: root.node(),
                offset: 0,
            }));
        }
        let malformed = || LocationError::MalformedPath(path.to_string());
        let segs: Vec<&str> = path.split('/').collect();
        let last = segs.len() - 1;

        let mut cur = root.node();
        for (i, seg) in segs[..last].iter().enumerate() {
            if let Some(name) = seg.strip_prefix('@') {
                // an attribute can only be the addressed node itself, so
                // the attribute step must sit right before the offset
                if name.is_empty() || i != last - 1 {
                    return Err(malformed());
                }
                let attr = doc
                    .attributes(cur)
                    .iter()
                    .copied()
                    .find(|&a| doc.node(a).as_attribute().map(|d| d.name.local.as_str()) == Some(name));
                match attr {
                    Some(a) => cur = a,
                    None => return Ok(None),
                }
            } else {
                if !is_digits(seg) {
                    return Err(malformed());
                }
                let Ok(ix) = seg.parse::<usize>() else {
                    // all digits but too large for usize: nothing has that
                    // many children
                    return Ok(None);
                };
                match doc.children(cur).get(ix) {
                    Some(&child) => cur = child,
                    None => return Ok(None),
                }
            }
        }

        let offset_seg = segs[last];
        if !is_digits(offset_seg) {
            return Err(malformed());
        }
        let Ok(offset) = offset_seg.parse::<usize>() else {
            return Ok(None);
        };
        if offset > doc.size(cur) {
            return Ok(None);
        }
        Ok(Some(Location {
            root,
            node: cur,
            offset,
        }))
    }

    /// Document-order comparison of two locations under the same root.
    ///
    /// `None` when the roots differ or either location is stale. Boundary
    /// semantics are described in the module docs.
    pub fn compare(&self, other: &Location, doc: &Document) -> Option<Ordering> {
        if self.root != other.root {
            return None;
        }
        if !self.is_valid(doc) || !other.is_valid(doc) {
            return None;
        }
        if self.node == other.node {
            return Some(self.offset.cmp(&other.offset));
        }

        let a = ancestor_chain(doc, self.root.node(), self.node);
        let b = ancestor_chain(doc, self.root.node(), other.node);
        let mut d = 0;
        while d < a.len() && d < b.len() && a[d] == b[d] {
            d += 1;
        }
        match (a.get(d), b.get(d)) {
            // diverging branches: order by sibling position under the
            // deepest common ancestor
            (Some(&ca), Some(&cb)) => {
                let common = a[d - 1];
                Some(pseudo_index(doc, common, ca).cmp(&pseudo_index(doc, common, cb)))
            }
            // self.node is an ancestor of other.node
            (None, Some(&cb)) => {
                let ix = pseudo_index(doc, self.node, cb);
                Some(if self.offset <= ix {
                    Ordering::Less
                } else {
                    Ordering::Greater
                })
            }
            // other.node is an ancestor of self.node
            (Some(&ca), None) => {
                let ix = pseudo_index(doc, other.node, ca);
                Some(if other.offset <= ix {
                    Ordering::Greater
                } else {
                    Ordering::Less
                })
            }
            (None, None) => Some(self.offset.cmp(&other.offset)),
        }
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Nodes from `root` down to `node`, both inclusive.
fn ancestor_chain(doc: &Document, root: NodeId, node: NodeId) -> Vec<NodeId> {
    let mut chain = vec![node];
    let mut cur = node;
    while cur != root {
        match doc.parent(cur) {
            Some(p) => {
                chain.push(p);
                cur = p;
            }
            None => break,
        }
    }
    chain.reverse();
    chain
}

/// Sibling position of `child` under `parent`, counting attribute nodes as
/// pseudo-children after all normal children.
fn pseudo_index(doc: &Document, parent: NodeId, child: NodeId) -> usize {
    if let Some(ix) = doc.children(parent).iter().position(|&c| c == child) {
        return ix;
    }
    let children = doc.children(parent).len();
    match doc.attributes(parent).iter().position(|&a| a == child) {
        Some(ix) => children + ix,
        None => {
            debug_assert!(false, "child is not under parent");
            children
        }
    }
}
