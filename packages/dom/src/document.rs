//! Arena document: owns every node and all raw structural operations.
//!
//! `Document` is the storage and low-level mutation layer. It enforces
//! single-parent ownership but knows nothing about change records, events or
//! undo; that is the editing layer's job. Code that holds a `Document`
//! directly is expected to be building the initial tree. Once editing starts,
//! all writes go through the editing layer and everyone else reads.

use crate::location::LocationError;
use crate::node::{char_len, AttributeData, ElementData, Node, NodeData, NodeId, QualName};
use serde::{Deserialize, Serialize};

/// Handle to a marked root, produced by [`Document::mark_root`].
///
/// Roots exist so locations can be expressed relative to a stable subtree
/// top. The handle is an ordinary copyable value; holding one does not keep
/// the root attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Root(NodeId);

impl Root {
    /// The node this root handle designates.
    #[inline]
    pub fn node(self) -> NodeId {
        self.0
    }
}

/// The node arena plus the set of marked roots.
///
/// Nodes are never freed: detaching leaves the node in the arena with no
/// parent, so its id stays valid for later re-insertion or inspection.
#[derive(Debug, Default)]
pub struct Document {
    nodes: Vec<Node>,
    marked_roots: Vec<NodeId>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        debug_assert!(self.nodes.len() < u32::MAX as usize);
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { parent: None, data });
        id
    }

    /// Create a detached element.
    pub fn create_element(&mut self, name: QualName) -> NodeId {
        self.alloc(NodeData::Element(ElementData::new(name)))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, content: impl Into<String>) -> NodeId {
        self.alloc(NodeData::Text(content.into()))
    }

    fn create_attribute(&mut self, name: QualName, value: String) -> NodeId {
        self.alloc(NodeData::Attribute(AttributeData { name, value }))
    }

    /// Borrow a node. Panics if `id` did not come from this document.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Borrow a node, or `None` for a foreign id.
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Number of nodes ever allocated, detached ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Children of `id`; empty for text and attribute nodes.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).data {
            NodeData::Element(e) => &e.children,
            _ => &[],
        }
    }

    /// Attribute nodes of `id`, in insertion order; empty for non-elements.
    pub fn attributes(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).data {
            NodeData::Element(e) => &e.attrs,
            _ => &[],
        }
    }

    /// Text content of a text node, or an attribute node's value.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).data {
            NodeData::Text(t) => Some(t),
            NodeData::Attribute(a) => Some(&a.value),
            _ => None,
        }
    }

    /// The size a location offset is measured against: child count for
    /// elements, char count for text and attribute nodes.
    pub fn size(&self, id: NodeId) -> usize {
        match &self.node(id).data {
            NodeData::Element(e) => e.children.len(),
            NodeData::Text(t) => char_len(t),
            NodeData::Attribute(a) => char_len(&a.value),
        }
    }

    /// Position of `id` among its parent's children.
    ///
    /// `None` for detached nodes and for attribute nodes, which do not live
    /// in the child list.
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// True when `node` is `top` or a descendant of it. Attribute nodes are
    /// inside the subtree of their owning element.
    pub fn in_subtree(&self, top: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == top {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    /// Pre-order traversal of `top` and its descendants (child tree only,
    /// attribute nodes are not visited).
    pub fn descendants(&self, top: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            stack: vec![top],
        }
    }

    // ------------------------------------------------------------------
    // Structural mutation

    /// Attach a detached node as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let index = self.children(parent).len();
        self.insert_child(parent, index, child);
    }

    /// Attach a detached node at `index` in `parent`'s child list.
    ///
    /// `index` is clamped to the child count; out-of-range values are a
    /// caller bug and trip a debug assertion.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        debug_assert!(self.node(child).parent.is_none(), "child must be detached");
        debug_assert!(!self.node(child).is_attribute(), "attributes are not children");
        debug_assert!(self.node(parent).is_element(), "parent must be an element");
        self.node_mut(child).parent = Some(parent);
        if let Some(e) = self.node_mut(parent).as_element_mut() {
            let index = index.min(e.children.len());
            e.children.insert(index, child);
        }
    }

    /// Detach `node` from its parent, returning the former parent and the
    /// former index in its child list (attribute slot for attribute nodes).
    /// `None` when the node was already detached.
    pub fn detach(&mut self, node: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.node(node).parent?;
        self.node_mut(node).parent = None;
        if let Some(e) = self.node_mut(parent).as_element_mut() {
            if let Some(ix) = e.children.iter().position(|&c| c == node) {
                e.children.remove(ix);
                return Some((parent, ix));
            }
            if let Some(ix) = e.attrs.iter().position(|&a| a == node) {
                e.attrs.remove(ix);
                return Some((parent, ix));
            }
        }
        debug_assert!(false, "attached node missing from its parent's lists");
        None
    }

    /// Replace the content of a text node.
    pub fn set_text(&mut self, node: NodeId, value: impl Into<String>) {
        debug_assert!(self.node(node).is_text());
        if let NodeData::Text(t) = &mut self.node_mut(node).data {
            *t = value.into();
        }
    }

    /// Attribute node of `element` with the given name.
    pub fn attribute(&self, element: NodeId, name: &QualName) -> Option<NodeId> {
        self.attributes(element)
            .iter()
            .copied()
            .find(|&a| self.node(a).as_attribute().map(|d| &d.name) == Some(name))
    }

    /// Value of the named attribute, if present.
    pub fn attribute_value(&self, element: NodeId, name: &QualName) -> Option<&str> {
        let attr = self.attribute(element, name)?;
        self.text(attr)
    }

    /// Set, replace, or remove (`value: None`) an attribute.
    ///
    /// Replacing a value keeps the existing attribute node, so locations
    /// addressing into the value survive as far as their offsets allow.
    /// Returns the previous value.
    pub fn set_attribute_value(
        &mut self,
        element: NodeId,
        name: &QualName,
        value: Option<&str>,
    ) -> Option<String> {
        debug_assert!(self.node(element).is_element());
        let existing = self.attribute(element, name);
        match (existing, value) {
            (Some(attr), Some(new)) => {
                if let NodeData::Attribute(a) = &mut self.node_mut(attr).data {
                    return Some(std::mem::replace(&mut a.value, new.to_string()));
                }
                None
            }
            (None, Some(new)) => {
                let attr = self.create_attribute(name.clone(), new.to_string());
                self.node_mut(attr).parent = Some(element);
                if let Some(e) = self.node_mut(element).as_element_mut() {
                    e.attrs.push(attr);
                }
                None
            }
            (Some(attr), None) => {
                let old = self.text(attr).map(str::to_string);
                self.detach(attr);
                old
            }
            (None, None) => None,
        }
    }

    // ------------------------------------------------------------------
    // Subtree copies

    /// Copy an element's name and attributes into a fresh detached element,
    /// leaving children behind.
    pub fn clone_shell(&mut self, element: NodeId) -> NodeId {
        debug_assert!(self.node(element).is_element());
        let name = match self.node(element).as_element() {
            Some(e) => e.name.clone(),
            // non-element input is a caller bug, checked above in debug
            None => QualName::new("#invalid"),
        };
        let shell = self.create_element(name);
        for attr in self.attributes(element).to_vec() {
            if let Some(a) = self.node(attr).as_attribute() {
                let (name, value) = (a.name.clone(), a.value.clone());
                self.set_attribute_value(shell, &name, Some(&value));
            }
        }
        shell
    }

    /// Deep-copy a subtree into fresh detached nodes.
    pub fn clone_subtree(&mut self, node: NodeId) -> NodeId {
        match &self.node(node).data {
            NodeData::Text(t) => {
                let t = t.clone();
                self.create_text(t)
            }
            NodeData::Attribute(a) => {
                let (name, value) = (a.name.clone(), a.value.clone());
                self.create_attribute(name, value)
            }
            NodeData::Element(_) => {
                let shell = self.clone_shell(node);
                for child in self.children(node).to_vec() {
                    let copy = self.clone_subtree(child);
                    self.append_child(shell, copy);
                }
                shell
            }
        }
    }

    /// Merge adjacent text siblings throughout the subtree of `node`.
    ///
    /// For trees assembled by hand before editing starts; the editing layer
    /// maintains this invariant on its own operations.
    pub fn normalize(&mut self, node: NodeId) {
        let elements: Vec<NodeId> = self
            .descendants(node)
            .filter(|&n| self.node(n).is_element())
            .collect();
        for el in elements {
            let mut i = 0;
            loop {
                let children = self.children(el);
                if i + 1 >= children.len() {
                    break;
                }
                let (a, b) = (children[i], children[i + 1]);
                if self.node(a).is_text() && self.node(b).is_text() {
                    let merged = format!(
                        "{}{}",
                        self.text(a).unwrap_or_default(),
                        self.text(b).unwrap_or_default()
                    );
                    self.set_text(a, merged);
                    self.detach(b);
                } else {
                    i += 1;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Roots

    /// Mark `node` as a location root and return the handle.
    ///
    /// Fails with [`LocationError::AlreadyMarked`] when the subtree of
    /// `node` (itself included) already contains a marked root.
    pub fn mark_root(&mut self, node: NodeId) -> Result<Root, LocationError> {
        if self.get(node).is_none() {
            return Err(LocationError::InvalidNode);
        }
        if self
            .marked_roots
            .iter()
            .any(|&m| self.in_subtree(node, m))
        {
            return Err(LocationError::AlreadyMarked);
        }
        self.marked_roots.push(node);
        Ok(Root(node))
    }

    /// All roots marked so far.
    pub fn marked_roots(&self) -> &[NodeId] {
        &self.marked_roots
    }
}

/// Iterator over a subtree in pre-order. See [`Document::descendants`].
pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let next = self.stack.pop()?;
        let children = self.doc.children(next);
        self.stack.extend(children.iter().rev());
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> QualName {
        QualName::new(s)
    }

    #[test]
    fn build_and_traverse() {
        let mut doc = Document::new();
        let p = doc.create_element(name("p"));
        let t = doc.create_text("hello");
        let hi = doc.create_element(name("hi"));
        doc.append_child(p, t);
        doc.append_child(p, hi);

        assert_eq!(doc.children(p), &[t, hi]);
        assert_eq!(doc.parent(t), Some(p));
        assert_eq!(doc.index_in_parent(hi), Some(1));
        assert_eq!(doc.size(p), 2);
        assert_eq!(doc.size(t), 5);
        assert!(doc.in_subtree(p, hi));
        assert!(!doc.in_subtree(hi, p));

        let order: Vec<NodeId> = doc.descendants(p).collect();
        assert_eq!(order, vec![p, t, hi]);
    }

    #[test]
    fn detach_reports_former_position() {
        let mut doc = Document::new();
        let p = doc.create_element(name("p"));
        let a = doc.create_text("a");
        let b = doc.create_text("b");
        doc.append_child(p, a);
        doc.append_child(p, b);

        assert_eq!(doc.detach(b), Some((p, 1)));
        assert_eq!(doc.parent(b), None);
        assert_eq!(doc.children(p), &[a]);
        // detached nodes stay in the arena
        assert_eq!(doc.text(b), Some("b"));
        assert_eq!(doc.detach(b), None);
    }

    #[test]
    fn attributes_are_nodes_owned_by_their_element() {
        let mut doc = Document::new();
        let el = doc.create_element(name("ref"));
        assert_eq!(doc.set_attribute_value(el, &name("target"), Some("x1")), None);
        let attr = doc.attribute(el, &name("target")).unwrap();
        assert_eq!(doc.parent(attr), Some(el));
        assert_eq!(doc.text(attr), Some("x1"));
        assert!(doc.in_subtree(el, attr));

        // replacing keeps the node
        let old = doc.set_attribute_value(el, &name("target"), Some("x2"));
        assert_eq!(old.as_deref(), Some("x1"));
        assert_eq!(doc.attribute(el, &name("target")), Some(attr));

        // removal detaches it
        let old = doc.set_attribute_value(el, &name("target"), None);
        assert_eq!(old.as_deref(), Some("x2"));
        assert_eq!(doc.attribute(el, &name("target")), None);
        assert_eq!(doc.parent(attr), None);
    }

    #[test]
    fn namespaced_attributes_do_not_collide() {
        let mut doc = Document::new();
        let el = doc.create_element(name("x"));
        doc.set_attribute_value(el, &QualName::namespaced("a", "id"), Some("1"));
        doc.set_attribute_value(el, &QualName::namespaced("b", "id"), Some("2"));
        assert_eq!(doc.attributes(el).len(), 2);
        assert_eq!(
            doc.attribute_value(el, &QualName::namespaced("b", "id")),
            Some("2")
        );
    }

    #[test]
    fn normalize_merges_adjacent_text_runs() {
        let mut doc = Document::new();
        let p = doc.create_element(name("p"));
        for part in ["a", "b", "c"] {
            let t = doc.create_text(part);
            doc.append_child(p, t);
        }
        let hi = doc.create_element(name("hi"));
        doc.append_child(p, hi);
        let inner = doc.create_text("d");
        doc.append_child(hi, inner);
        let tail1 = doc.create_text("e");
        let tail2 = doc.create_text("f");
        doc.append_child(p, tail1);
        doc.append_child(p, tail2);

        doc.normalize(p);
        let texts: Vec<&str> = doc
            .children(p)
            .iter()
            .filter_map(|&c| doc.text(c))
            .collect();
        assert_eq!(texts, vec!["abc", "ef"]);
        assert_eq!(doc.children(p).len(), 3);
    }

    #[test]
    fn clone_subtree_is_deep_and_fresh() {
        let mut doc = Document::new();
        let p = doc.create_element(name("p"));
        doc.set_attribute_value(p, &name("rend"), Some("it"));
        let t = doc.create_text("ab");
        doc.append_child(p, t);

        let copy = doc.clone_subtree(p);
        assert_ne!(copy, p);
        assert_eq!(doc.parent(copy), None);
        assert_eq!(doc.attribute_value(copy, &name("rend")), Some("it"));
        let copy_child = doc.children(copy)[0];
        assert_ne!(copy_child, t);
        assert_eq!(doc.text(copy_child), Some("ab"));
    }

    #[test]
    fn mark_root_rejects_nested_marks() {
        let mut doc = Document::new();
        let top = doc.create_element(name("doc"));
        let p = doc.create_element(name("p"));
        doc.append_child(top, p);

        let root = doc.mark_root(p).unwrap();
        assert_eq!(root.node(), p);
        // marking an ancestor of an existing root is refused
        assert!(matches!(
            doc.mark_root(top),
            Err(LocationError::AlreadyMarked)
        ));
        // as is re-marking the same node
        assert!(matches!(
            doc.mark_root(p),
            Err(LocationError::AlreadyMarked)
        ));
    }
}
