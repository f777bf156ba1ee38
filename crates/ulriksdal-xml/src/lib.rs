#![forbid(unsafe_code)]

//! XML document model for the Ulriksdal XML Security library.
//!
//! A mutable arena tree built from `roxmltree` output, an identity-preserving
//! element handle cache, the replaced-node arbiter used by tree-mutating
//! operations, and `NodeSet` for canonicalization and transforms.

pub mod document;
pub mod nodeset;
pub mod ownership;
pub mod parse;
pub mod tree;
pub mod writer;

pub use document::{Document, Element, DEFAULT_FIND_NS, DEFAULT_ID_ATTRS};
pub use nodeset::NodeSet;
pub use ownership::{DrainReport, ReplacedNodes};
pub use tree::{NodeId, NodeKind, NsDecl, QName, SlotState, Tree};
