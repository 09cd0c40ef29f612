//! Arena document tree with serializable location addressing.
//!
//! This crate is the storage layer under the editing engine: nodes,
//! documents, marked roots, locations and their path form. Editing with
//! change records and events lives in `vellum-editor`.

pub mod document;
pub mod location;
pub mod node;
pub mod serialize;

pub use document::{Descendants, Document, Root};
pub use location::{Location, LocationError};
pub use node::{char_len, char_split, AttributeData, ElementData, Node, NodeData, NodeId, QualName};
pub use serialize::to_markup;
