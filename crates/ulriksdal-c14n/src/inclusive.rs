#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0 (C14N 1.0).
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//!
//! An output element renders every in-scope namespace whose binding differs
//! from the one rendered by its nearest output ancestor. When an output
//! element's parent is not output, the `xml:*` attributes of its ancestors
//! are inherited.

use crate::render::{self, Attr, NsDecl, Rendered};
use std::collections::BTreeMap;
use ulriksdal_core::{ns, Error};
use ulriksdal_xml::{NodeId, NodeKind, NodeSet, Tree};

/// Canonicalize the subtree at `start` using Inclusive C14N 1.0.
///
/// Without a node set every node below `start` is output.
pub fn canonicalize(
    tree: &Tree,
    start: NodeId,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    run(tree, start, with_comments, node_set, XmlAttrs::All)
}

/// Which `xml:*` attributes an orphaned output element inherits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum XmlAttrs {
    All,
    /// C14N 1.1: `xml:id` and `xml:base` are not inherited.
    SkipIdAndBase,
}

pub(crate) fn run(
    tree: &Tree,
    start: NodeId,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    xml_attrs: XmlAttrs,
) -> Result<Vec<u8>, Error> {
    if tree.is_freed(start) {
        return Err(Error::Canonicalization("node has been freed".into()));
    }
    let ctx = Walker {
        tree,
        start,
        with_comments,
        node_set,
        xml_attrs,
    };
    let mut output = Vec::new();
    ctx.node(start, &mut output, &Rendered::new());
    Ok(output)
}

struct Walker<'a> {
    tree: &'a Tree,
    start: NodeId,
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    xml_attrs: XmlAttrs,
}

impl Walker<'_> {
    fn visible(&self, id: NodeId) -> bool {
        self.node_set.map_or(true, |s| s.contains(id))
    }

    fn node(&self, id: NodeId, out: &mut Vec<u8>, rendered: &Rendered) {
        match self.tree.kind(id) {
            NodeKind::Document => {
                for child in self.tree.children(id) {
                    self.node(*child, out, rendered);
                }
            }
            NodeKind::Element(_) => self.element(id, out, rendered),
            _ => {
                if self.visible(id) {
                    render::leaf(self.tree, id, self.with_comments, out);
                }
            }
        }
    }

    fn element(&self, id: NodeId, out: &mut Vec<u8>, rendered: &Rendered) {
        if !self.visible(id) {
            for child in self.tree.children(id) {
                self.node(*child, out, rendered);
            }
            return;
        }

        let scope = render::in_scope(self.tree, id);
        let mut decls: Vec<NsDecl> = scope
            .iter()
            .filter(|(prefix, uri)| rendered.get(*prefix) != Some(*uri))
            .map(|(prefix, uri)| NsDecl {
                prefix: prefix.clone(),
                uri: uri.clone(),
            })
            .collect();
        let undeclare_default =
            !scope.contains_key("") && rendered.get("").is_some_and(|u| !u.is_empty());
        if undeclare_default {
            decls.push(NsDecl {
                prefix: String::new(),
                uri: String::new(),
            });
        }

        let mut attrs = render::attributes(self.tree, id);
        if !self.parent_is_output(id) {
            let inherited = self.inherited_xml_attrs(id, &attrs);
            attrs.extend(inherited);
        }

        let name = render::start_tag(self.tree, id, &mut decls, &mut attrs, out);

        let mut child_rendered = rendered.clone();
        for d in &decls {
            child_rendered.insert(d.prefix.clone(), d.uri.clone());
        }
        for child in self.tree.children(id) {
            self.node(*child, out, &child_rendered);
        }
        render::end_tag(&name, out);
    }

    /// Without a node set only `start`'s subtree is output.
    fn parent_is_output(&self, id: NodeId) -> bool {
        match self.node_set {
            Some(set) => self.tree.parent_element(id).is_some_and(|p| set.contains(p)),
            None => id != self.start && self.tree.parent_element(id).is_some(),
        }
    }

    fn inherited_xml_attrs(&self, id: NodeId, existing: &[Attr]) -> Vec<Attr> {
        let mut found: BTreeMap<String, String> = BTreeMap::new();
        let mut current = self.tree.parent_element(id);
        while let Some(ancestor) = current {
            if let Some(e) = self.tree.element(ancestor) {
                for a in &e.attributes {
                    if a.name.ns.as_deref() == Some(ns::XML) {
                        found
                            .entry(a.name.local.clone())
                            .or_insert_with(|| a.value.clone());
                    }
                }
            }
            current = self.tree.parent_element(ancestor);
        }
        found
            .into_iter()
            .filter(|(local, _)| {
                self.xml_attrs == XmlAttrs::All || (local != "id" && local != "base")
            })
            .filter(|(local, _)| {
                !existing
                    .iter()
                    .any(|a| a.ns_uri == ns::XML && a.local_name == *local)
            })
            .map(|(local, value)| Attr {
                ns_uri: ns::XML.to_owned(),
                qualified_name: format!("xml:{local}"),
                local_name: local,
                value,
            })
            .collect()
    }
}
