#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//!
//! Only "visibly utilized" namespace declarations are output. A prefix is
//! visibly utilized by an element if the element name or one of its
//! attributes uses it, or it is listed in the InclusiveNamespaces PrefixList
//! (`#default` naming the default namespace).

use crate::render::{self, NsDecl, Rendered};
use std::collections::BTreeSet;
use ulriksdal_core::Error;
use ulriksdal_xml::{NodeId, NodeKind, NodeSet, Tree};

/// Canonicalize the subtree at `start` using Exclusive C14N 1.0.
pub fn canonicalize(
    tree: &Tree,
    start: NodeId,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    if tree.is_freed(start) {
        return Err(Error::Canonicalization("node has been freed".into()));
    }
    let inclusive: BTreeSet<String> = inclusive_prefixes
        .iter()
        .map(|p| if p == "#default" { String::new() } else { p.clone() })
        .collect();
    let ctx = Walker {
        tree,
        with_comments,
        node_set,
        inclusive,
    };
    let mut output = Vec::new();
    ctx.node(start, &mut output, &Rendered::new());
    Ok(output)
}

struct Walker<'a> {
    tree: &'a Tree,
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    inclusive: BTreeSet<String>,
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

    fn utilized(&self, id: NodeId) -> BTreeSet<String> {
        let mut used = self.inclusive.clone();
        if let Some(e) = self.tree.element(id) {
            used.insert(e.name.prefix.clone().unwrap_or_default());
            for a in &e.attributes {
                if let Some(p) = &a.name.prefix {
                    if p != "xml" {
                        used.insert(p.clone());
                    }
                }
            }
        }
        used
    }

    fn element(&self, id: NodeId, out: &mut Vec<u8>, rendered: &Rendered) {
        if !self.visible(id) {
            for child in self.tree.children(id) {
                self.node(*child, out, rendered);
            }
            return;
        }

        let scope = render::in_scope(self.tree, id);
        let mut decls = Vec::new();
        for prefix in self.utilized(id) {
            match scope.get(&prefix) {
                Some(uri) if rendered.get(&prefix) != Some(uri) => decls.push(NsDecl {
                    prefix,
                    uri: uri.clone(),
                }),
                Some(_) => {}
                None if prefix.is_empty() => {
                    if rendered.get("").is_some_and(|u| !u.is_empty()) {
                        decls.push(NsDecl {
                            prefix,
                            uri: String::new(),
                        });
                    }
                }
                None => {}
            }
        }

        let mut attrs = render::attributes(self.tree, id);
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulriksdal_xml::parse::parse;

    fn exc(xml: &str, start_path: &[usize], prefixes: &[&str]) -> String {
        let tree = parse(xml).unwrap();
        let mut node = tree.root_element().unwrap();
        for i in start_path {
            node = tree.children(node)[*i];
        }
        let prefixes: Vec<String> = prefixes.iter().map(|p| p.to_string()).collect();
        String::from_utf8(canonicalize(&tree, node, false, None, &prefixes).unwrap()).unwrap()
    }

    #[test]
    fn test_unused_namespaces_dropped() {
        let xml = r#"<r xmlns:a="urn:a" xmlns:b="urn:b"><a:x b:attr="1"><y/></a:x></r>"#;
        assert_eq!(
            exc(xml, &[0], &[]),
            r#"<a:x xmlns:a="urn:a" xmlns:b="urn:b" b:attr="1"><y></y></a:x>"#
        );
    }

    #[test]
    fn test_inclusive_prefix_list() {
        let xml = r#"<r xmlns:a="urn:a" xmlns:c="urn:c" xmlns="urn:d"><a:x/></r>"#;
        assert_eq!(exc(xml, &[0], &["c"]), r#"<a:x xmlns:a="urn:a" xmlns:c="urn:c"></a:x>"#);
        assert_eq!(
            exc(xml, &[0], &["#default"]),
            r#"<a:x xmlns="urn:d" xmlns:a="urn:a"></a:x>"#
        );
    }

    #[test]
    fn test_redeclaration_only_when_changed() {
        let xml = r#"<a:r xmlns:a="urn:a"><a:s/><a:t xmlns:a="urn:other"/></a:r>"#;
        assert_eq!(
            exc(xml, &[], &[]),
            r#"<a:r xmlns:a="urn:a"><a:s></a:s><a:t xmlns:a="urn:other"></a:t></a:r>"#
        );
    }

    #[test]
    fn test_default_namespace_undeclared_for_child() {
        let xml = r#"<r xmlns="urn:r"><s xmlns=""/></r>"#;
        assert_eq!(exc(xml, &[], &[]), r#"<r xmlns="urn:r"><s xmlns=""></s></r>"#);
    }
}
