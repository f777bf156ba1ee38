#![forbid(unsafe_code)]

//! Build an arena [`Tree`] from text with `roxmltree`.

use crate::tree::{Attribute, ElementData, NodeId, NodeKind, NsDecl, QName, Tree};
use ulriksdal_core::{ns, Error, Result};

/// Name of the element wrapped around fragments parsed in context.
const FRAGMENT_WRAPPER: &str = "ulriksdal-fragment";

/// Return roxmltree parsing options that allow DTD.
///
/// roxmltree does not expand external entities, so allowing a DTD is safe.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}

/// Parse a complete document.
pub fn parse(text: &str) -> Result<Tree> {
    let doc = roxmltree::Document::parse_with_options(text, parsing_options())
        .map_err(|e| Error::XmlParse(e.to_string()))?;
    let mut tree = Tree::new();
    let top = tree.document_node();
    for child in doc.root().children() {
        build(&mut tree, text, child, top, &[])?;
    }
    Ok(tree)
}

pub fn parse_bytes(data: &[u8]) -> Result<Tree> {
    let text =
        std::str::from_utf8(data).map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))?;
    parse(text)
}

/// Parse `text` as element content in a context where `context` namespaces
/// are in scope. Returns the tree and the wrapper element whose children are
/// the parsed nodes.
pub fn parse_fragment(text: &str, context: &[NsDecl]) -> Result<(Tree, NodeId)> {
    let body = strip_declaration(text);
    let mut wrapped = String::with_capacity(body.len() + 64);
    wrapped.push('<');
    wrapped.push_str(FRAGMENT_WRAPPER);
    for d in context {
        match &d.prefix {
            Some(p) => wrapped.push_str(&format!(" xmlns:{p}=\"")),
            None => wrapped.push_str(" xmlns=\""),
        }
        wrapped.push_str(&crate::writer::escape_attr(&d.uri));
        wrapped.push('"');
    }
    wrapped.push('>');
    wrapped.push_str(body);
    wrapped.push_str("</");
    wrapped.push_str(FRAGMENT_WRAPPER);
    wrapped.push('>');

    let tree = parse(&wrapped)?;
    let wrapper = tree
        .root_element()
        .ok_or_else(|| Error::XmlParse("fragment produced no content".into()))?;
    Ok((tree, wrapper))
}

fn strip_declaration(text: &str) -> &str {
    let trimmed = text.trim_start_matches('\u{feff}');
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return &trimmed[end + 2..];
        }
    }
    trimmed
}

fn build(
    tree: &mut Tree,
    text: &str,
    node: roxmltree::Node<'_, '_>,
    parent: NodeId,
    parent_scope: &[NsDecl],
) -> Result<()> {
    let id = match node.node_type() {
        roxmltree::NodeType::Root => return Ok(()),
        roxmltree::NodeType::Text => tree.create_text(node.text().unwrap_or("")),
        roxmltree::NodeType::Comment => {
            tree.create(NodeKind::Comment(node.text().unwrap_or("").to_owned()))
        }
        roxmltree::NodeType::PI => {
            let (target, data) = match node.pi() {
                Some(pi) => (pi.target.to_owned(), pi.value.map(str::to_owned)),
                None => (String::new(), None),
            };
            tree.create(NodeKind::ProcessingInstruction { target, data })
        }
        roxmltree::NodeType::Element => {
            let scope = scope_of(node);
            let data = element_data(text, node, &scope, parent_scope);
            let id = tree.create(NodeKind::Element(data));
            tree.append_child(parent, id)?;
            for child in node.children() {
                build(tree, text, child, id, &scope)?;
            }
            return Ok(());
        }
    };
    tree.append_child(parent, id)
}

fn scope_of(node: roxmltree::Node<'_, '_>) -> Vec<NsDecl> {
    node.namespaces()
        .filter(|n| n.name() != Some("xml"))
        .map(|n| NsDecl {
            prefix: n.name().map(str::to_owned),
            uri: n.uri().to_owned(),
        })
        .collect()
}

fn element_data(
    text: &str,
    node: roxmltree::Node<'_, '_>,
    scope: &[NsDecl],
    parent_scope: &[NsDecl],
) -> ElementData {
    let mut namespaces: Vec<NsDecl> = scope
        .iter()
        .filter(|d| !parent_scope.contains(d))
        .cloned()
        .collect();
    let inherits_default = parent_scope
        .iter()
        .any(|d| d.prefix.is_none() && !d.uri.is_empty());
    let has_default = scope.iter().any(|d| d.prefix.is_none() && !d.uri.is_empty());
    if inherits_default && !has_default && !namespaces.iter().any(|d| d.prefix.is_none()) {
        namespaces.push(NsDecl {
            prefix: None,
            uri: String::new(),
        });
    }

    let tag = node.tag_name();
    let prefix = source_prefix(text, node)
        .or_else(|| tag.namespace().and_then(|uri| prefix_in(scope, uri, true)));
    let name = QName::new(tag.namespace(), prefix.as_deref(), tag.name());

    let attributes = node
        .attributes()
        .map(|a| {
            let prefix = match a.namespace() {
                Some(ns::XML) => Some("xml".to_owned()),
                Some(uri) => prefix_in(scope, uri, false),
                None => None,
            };
            Attribute {
                name: QName::new(a.namespace(), prefix.as_deref(), a.name()),
                value: a.value().to_owned(),
            }
        })
        .collect();

    ElementData {
        name,
        attributes,
        namespaces,
    }
}

/// The prefix written in the start tag, read back from the source text.
fn source_prefix(text: &str, node: roxmltree::Node<'_, '_>) -> Option<String> {
    let raw = text.get(node.range())?.strip_prefix('<')?;
    let end = raw
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(raw.len());
    let qname = &raw[..end];
    let (prefix, local) = qname.split_once(':')?;
    (local == node.tag_name().name()).then(|| prefix.to_owned())
}

fn prefix_in(scope: &[NsDecl], uri: &str, allow_default: bool) -> Option<String> {
    if scope
        .iter()
        .any(|d| allow_default && d.prefix.is_none() && d.uri == uri)
    {
        return None;
    }
    scope
        .iter()
        .find(|d| d.uri == uri && d.prefix.is_some())
        .and_then(|d| d.prefix.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_and_declarations() {
        let xml = r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo a:x="1" xmlns:a="urn:a"/></ds:Signature>"#;
        let tree = parse(xml).unwrap();
        let root = tree.root_element().unwrap();
        let sig = tree.name(root).unwrap();
        assert_eq!(sig.prefix.as_deref(), Some("ds"));
        assert!(sig.is(ns::DSIG, "Signature"));
        assert_eq!(tree.element(root).unwrap().namespaces.len(), 1);

        let si = tree.element_children(root).next().unwrap();
        let data = tree.element(si).unwrap();
        assert_eq!(data.namespaces.len(), 1);
        assert_eq!(data.namespaces[0].prefix.as_deref(), Some("a"));
        assert_eq!(data.attributes[0].name.qualified(), "a:x");
    }

    #[test]
    fn test_default_namespace_undeclaration() {
        let tree = parse(r#"<a xmlns="urn:x"><b xmlns=""/></a>"#).unwrap();
        let a = tree.root_element().unwrap();
        let b = tree.element_children(a).next().unwrap();
        assert_eq!(tree.lookup_namespace(b, None), None);
        assert_eq!(tree.name(b).unwrap().ns, None);
    }

    #[test]
    fn test_xml_attributes_keep_prefix() {
        let tree = parse(r#"<a xml:lang="en"/>"#).unwrap();
        let a = tree.root_element().unwrap();
        let attr = &tree.element(a).unwrap().attributes[0];
        assert_eq!(attr.name.qualified(), "xml:lang");
        assert_eq!(tree.attribute_ns(a, Some(ns::XML), "lang"), Some("en"));
    }

    #[test]
    fn test_fragment_in_context() {
        let ctx = [NsDecl {
            prefix: Some("p".into()),
            uri: "urn:p".into(),
        }];
        let (tree, wrapper) = parse_fragment("<?xml version=\"1.0\"?><p:x/>text", &ctx).unwrap();
        let children = tree.children(wrapper);
        assert_eq!(children.len(), 2);
        let x = children[0];
        assert!(tree.is_named(x, "urn:p", "x"));
        assert!(tree.element(x).unwrap().namespaces.is_empty());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(parse("<a>"), Err(Error::XmlParse(_))));
    }
}
