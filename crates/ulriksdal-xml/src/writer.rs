#![forbid(unsafe_code)]

//! Serialize arena trees back to XML text.

use crate::tree::{NodeId, NodeKind, NsDecl, Tree};

pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Serialize the whole document with an XML declaration.
pub fn document_to_string(tree: &Tree) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    for child in tree.children(tree.document_node()) {
        write_node(tree, *child, &[], &mut out);
        out.push('\n');
    }
    out
}

/// Serialize one subtree. If it is an element, namespaces it inherits are
/// declared on it so the output stands alone.
pub fn node_to_string(tree: &Tree, id: NodeId) -> String {
    let mut out = String::new();
    if matches!(tree.kind(id), NodeKind::Document) {
        for child in tree.children(id) {
            write_node(tree, *child, &[], &mut out);
        }
        return out;
    }
    let inherited = match tree.parent_element(id) {
        Some(p) => tree.namespaces_in_scope(p),
        None => Vec::new(),
    };
    write_node(tree, id, &inherited, &mut out);
    out
}

/// Serialize the children of `id`, each standing alone.
pub fn children_to_string(tree: &Tree, id: NodeId) -> String {
    let inherited = tree.namespaces_in_scope(id);
    let mut out = String::new();
    for child in tree.children(id) {
        write_node(tree, *child, &inherited, &mut out);
    }
    out
}

fn write_node(tree: &Tree, id: NodeId, extra_ns: &[NsDecl], out: &mut String) {
    match tree.kind(id) {
        NodeKind::Document => {
            for child in tree.children(id) {
                write_node(tree, *child, &[], out);
            }
        }
        NodeKind::Text(t) => out.push_str(&escape_text(t)),
        NodeKind::Comment(c) => {
            out.push_str("<!--");
            out.push_str(c);
            out.push_str("-->");
        }
        NodeKind::ProcessingInstruction { target, data } => {
            out.push_str("<?");
            out.push_str(target);
            if let Some(d) = data.as_deref().filter(|d| !d.is_empty()) {
                out.push(' ');
                out.push_str(d);
            }
            out.push_str("?>");
        }
        NodeKind::Element(e) => {
            let qname = e.name.qualified();
            out.push('<');
            out.push_str(&qname);
            for d in &e.namespaces {
                write_ns(d, out);
            }
            for d in extra_ns {
                if !e.namespaces.iter().any(|x| x.prefix == d.prefix) {
                    write_ns(d, out);
                }
            }
            for a in &e.attributes {
                out.push(' ');
                out.push_str(&a.name.qualified());
                out.push_str("=\"");
                out.push_str(&escape_attr(&a.value));
                out.push('"');
            }
            let children = tree.children(id);
            if children.is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in children {
                write_node(tree, *child, &[], out);
            }
            out.push_str("</");
            out.push_str(&qname);
            out.push('>');
        }
    }
}

fn write_ns(d: &NsDecl, out: &mut String) {
    match &d.prefix {
        Some(p) => {
            out.push_str(" xmlns:");
            out.push_str(p);
        }
        None => out.push_str(" xmlns"),
    }
    out.push_str("=\"");
    out.push_str(&escape_attr(&d.uri));
    out.push('"');
}
