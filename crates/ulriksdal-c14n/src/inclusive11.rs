#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.1 (C14N 1.1).
//!
//! Algorithm URI: `http://www.w3.org/2006/12/xml-c14n11`
//!
//! Same walk as C14N 1.0, except that `xml:id` and `xml:base` are not
//! inherited by output elements whose parent is not output.

use crate::inclusive::{run, XmlAttrs};
use ulriksdal_core::Error;
use ulriksdal_xml::{NodeId, NodeSet, Tree};

pub fn canonicalize(
    tree: &Tree,
    start: NodeId,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    run(tree, start, with_comments, node_set, XmlAttrs::SkipIdAndBase)
}
