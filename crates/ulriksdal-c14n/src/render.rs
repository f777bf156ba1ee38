#![forbid(unsafe_code)]

//! Rendering pieces shared by the inclusive and exclusive walkers.

use crate::escape;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use ulriksdal_xml::{NodeId, NodeKind, Tree};

/// Namespace bindings already written by output ancestors, keyed by prefix
/// (`""` for the default namespace).
pub type Rendered = BTreeMap<String, String>;

/// A namespace declaration to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// `""` for the default namespace.
    pub prefix: String,
    pub uri: String,
}

impl NsDecl {
    pub fn render(&self, out: &mut Vec<u8>) {
        if self.prefix.is_empty() {
            out.extend_from_slice(b" xmlns=\"");
        } else {
            out.extend_from_slice(b" xmlns:");
            out.extend_from_slice(self.prefix.as_bytes());
            out.extend_from_slice(b"=\"");
        }
        escape::push_attr(out, &self.uri);
        out.push(b'"');
    }
}

impl Ord for NsDecl {
    // default namespace first, then by prefix
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.prefix.is_empty(), other.prefix.is_empty()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.prefix.cmp(&other.prefix),
        }
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// `""` when the attribute has no namespace.
    pub ns_uri: String,
    pub local_name: String,
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    pub fn render(&self, out: &mut Vec<u8>) {
        out.push(b' ');
        out.extend_from_slice(self.qualified_name.as_bytes());
        out.extend_from_slice(b"=\"");
        escape::push_attr(out, &self.value);
        out.push(b'"');
    }
}

impl Ord for Attr {
    // un-namespaced first by local name, then by (namespace, local name)
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.ns_uri.is_empty(), other.ns_uri.is_empty()) {
            (true, true) => self.local_name.cmp(&other.local_name),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self
                .ns_uri
                .cmp(&other.ns_uri)
                .then_with(|| self.local_name.cmp(&other.local_name)),
        }
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The element's own attributes, unsorted.
pub fn attributes(tree: &Tree, id: NodeId) -> Vec<Attr> {
    tree.element(id)
        .map(|e| {
            e.attributes
                .iter()
                .map(|a| Attr {
                    ns_uri: a.name.ns.clone().unwrap_or_default(),
                    local_name: a.name.local.clone(),
                    qualified_name: a.name.qualified(),
                    value: a.value.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// In-scope namespaces of `id` keyed by prefix.
pub fn in_scope(tree: &Tree, id: NodeId) -> Rendered {
    tree.namespaces_in_scope(id)
        .into_iter()
        .map(|d| (d.prefix.unwrap_or_default(), d.uri))
        .collect()
}

/// Write the start tag, then return the element's qualified name for the end tag.
pub fn start_tag(tree: &Tree, id: NodeId, decls: &mut [NsDecl], attrs: &mut [Attr], out: &mut Vec<u8>) -> String {
    let name = tree.name(id).map(|n| n.qualified()).unwrap_or_default();
    decls.sort();
    attrs.sort();
    out.push(b'<');
    out.extend_from_slice(name.as_bytes());
    for d in decls.iter() {
        d.render(out);
    }
    for a in attrs.iter() {
        a.render(out);
    }
    out.push(b'>');
    name
}

pub fn end_tag(name: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(b"</");
    out.extend_from_slice(name.as_bytes());
    out.push(b'>');
}

/// Write a text, comment or processing-instruction node.
///
/// Comments and PIs that are children of the document node are separated
/// from the document element by a line feed.
pub fn leaf(tree: &Tree, id: NodeId, with_comments: bool, out: &mut Vec<u8>) {
    match tree.kind(id) {
        NodeKind::Text(t) => escape::push_text(out, t),
        NodeKind::Comment(c) if with_comments => {
            let (before, after) = document_level_position(tree, id);
            if before {
                out.push(b'\n');
            }
            out.extend_from_slice(b"<!--");
            out.extend_from_slice(c.as_bytes());
            out.extend_from_slice(b"-->");
            if after {
                out.push(b'\n');
            }
        }
        NodeKind::ProcessingInstruction { target, data } => {
            let (before, after) = document_level_position(tree, id);
            if before {
                out.push(b'\n');
            }
            out.extend_from_slice(b"<?");
            out.extend_from_slice(target.as_bytes());
            if let Some(d) = data.as_deref().filter(|d| !d.is_empty()) {
                out.push(b' ');
                escape::push_pi(out, d);
            }
            out.extend_from_slice(b"?>");
            if after {
                out.push(b'\n');
            }
        }
        _ => {}
    }
}

/// (document element precedes, document element follows) for top-level nodes.
fn document_level_position(tree: &Tree, id: NodeId) -> (bool, bool) {
    let Some(parent) = tree.parent(id) else {
        return (false, false);
    };
    if !matches!(tree.kind(parent), NodeKind::Document) {
        return (false, false);
    }
    let siblings = tree.children(parent);
    let Some(pos) = siblings.iter().position(|s| *s == id) else {
        return (false, false);
    };
    let before = siblings[..pos].iter().any(|s| tree.is_element(*s));
    let after = siblings[pos + 1..].iter().any(|s| tree.is_element(*s));
    (before, after)
}
