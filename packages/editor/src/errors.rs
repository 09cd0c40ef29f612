//! Error types for the editing layer

use thiserror::Error;
use vellum_dom::LocationError;

/// Errors from the tree mutation protocol.
///
/// Every check runs before the first change record of an operation is
/// emitted, so a returned error means the tree was not touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("fragments are not allowed here")]
    FragmentNotAllowed,

    #[error("nodes are not contiguous siblings")]
    NotContiguous,

    #[error("node is not an element")]
    NotAnElement,

    #[error("node is not a text node")]
    NotATextNode,

    #[error("there is no node to insert")]
    NoNodeToInsert,

    #[error("node is not inside the subtree being split")]
    NotInside,

    #[error("splitting here would leave adjacent text siblings")]
    WouldDenormalize,

    #[error(transparent)]
    Location(#[from] LocationError),
}

pub type EditResult<T> = Result<T, EditError>;

/// Rejection of a structural pattern at subscribe time.
///
/// The pattern language is deliberately small; anything beyond tags,
/// attribute classes and the two combinators is refused up front rather
/// than silently never matching.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("empty pattern")]
    Empty,

    #[error("unsupported selector syntax {0:?}")]
    Unsupported(char),

    #[error("malformed pattern near {0:?}")]
    Malformed(String),
}
