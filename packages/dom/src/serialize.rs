//! Markup writer: render a subtree back to XML-ish text.
//!
//! Used for golden assertions in tests, for log output, and by embedders
//! that want a cheap structural dump. Output is deterministic: attributes
//! are sorted by qualified name regardless of insertion order.

use crate::document::Document;
use crate::node::{NodeData, NodeId};
use std::fmt::Write;

/// Render `node` and its subtree as markup.
pub fn to_markup(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, node, &mut out);
    out
}

fn write_node(doc: &Document, node: NodeId, out: &mut String) {
    match &doc.node(node).data {
        NodeData::Text(t) => out.push_str(&escape_text(t)),
        NodeData::Attribute(a) => {
            let _ = write!(out, "{}=\"{}\"", a.name, escape_attr(&a.value));
        }
        NodeData::Element(e) => {
            let _ = write!(out, "<{}", e.name);
            let mut attrs: Vec<NodeId> = e.attrs.clone();
            attrs.sort_by_key(|&a| {
                doc.node(a)
                    .as_attribute()
                    .map(|d| (d.name.ns.clone(), d.name.local.clone()))
            });
            for attr in attrs {
                out.push(' ');
                write_node(doc, attr, out);
            }
            if e.children.is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for &child in &e.children {
                write_node(doc, child, out);
            }
            let _ = write!(out, "</{}>", e.name);
        }
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}
