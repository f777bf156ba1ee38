#![forbid(unsafe_code)]

//! Dereferencing `<Reference URI="...">`.
//!
//! Same-document forms select node sets of the signed document; anything
//! else is fetched through the IO callback chain as octets.

use ulriksdal_core::{Error, Result};
use ulriksdal_xml::{Document, NodeSet};

use crate::io;
use crate::pipeline::TransformData;

/// A parsed reference URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceUri<'a> {
    /// `""`: the whole document without comments.
    Document,
    /// `#xpointer(/)`: the whole document, comments kept.
    DocumentWithComments,
    /// `#id` (comments dropped) or `#xpointer(id('id'))` (comments kept).
    Id { id: &'a str, with_comments: bool },
    External(&'a str),
}

pub fn parse(uri: &str) -> ReferenceUri<'_> {
    let Some(fragment) = uri.strip_prefix('#') else {
        return if uri.is_empty() {
            ReferenceUri::Document
        } else {
            ReferenceUri::External(uri)
        };
    };
    if fragment == "xpointer(/)" {
        return ReferenceUri::DocumentWithComments;
    }
    if let Some(id) = xpointer_id(fragment) {
        return ReferenceUri::Id {
            id,
            with_comments: true,
        };
    }
    ReferenceUri::Id {
        id: fragment,
        with_comments: false,
    }
}

fn xpointer_id(fragment: &str) -> Option<&str> {
    let inner = fragment.strip_prefix("xpointer(id(")?.strip_suffix("))")?;
    let quoted = inner
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))?;
    Some(quoted)
}

/// Resolve `uri` against `doc`.
pub fn resolve(doc: &Document, uri: &str) -> Result<TransformData> {
    let nodes = match parse(uri) {
        ReferenceUri::Document => NodeSet::all_without_comments(&doc.tree()),
        ReferenceUri::DocumentWithComments => NodeSet::all(&doc.tree()),
        ReferenceUri::Id { id, with_comments } => {
            let target = doc
                .find_by_id(id)
                .ok_or_else(|| Error::InvalidUri(format!("no element with ID {id:?}")))?;
            let tree = doc.tree();
            if with_comments {
                NodeSet::tree_with_comments(&tree, target.node_id())
            } else {
                NodeSet::tree_without_comments(&tree, target.node_id())
            }
        }
        ReferenceUri::External(location) => {
            tracing::debug!(uri = location, "fetching external reference");
            return Ok(TransformData::Binary(io::read_all(location)?));
        }
    };
    Ok(TransformData::Nodes {
        doc: doc.clone(),
        nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::PoisonError;

    #[test]
    fn test_parse_forms() {
        assert_eq!(parse(""), ReferenceUri::Document);
        assert_eq!(parse("#xpointer(/)"), ReferenceUri::DocumentWithComments);
        assert_eq!(
            parse("#obj"),
            ReferenceUri::Id {
                id: "obj",
                with_comments: false
            }
        );
        assert_eq!(
            parse("#xpointer(id('obj'))"),
            ReferenceUri::Id {
                id: "obj",
                with_comments: true
            }
        );
        assert_eq!(
            parse("#xpointer(id(\"obj\"))"),
            ReferenceUri::Id {
                id: "obj",
                with_comments: true
            }
        );
        assert_eq!(parse("data.bin"), ReferenceUri::External("data.bin"));
    }

    #[test]
    fn test_same_document_selection() {
        let doc = Document::parse(r#"<root><!--c--><item Id="a"><!--x--><v>1</v></item></root>"#).unwrap();
        let TransformData::Nodes { nodes: all, .. } = resolve(&doc, "").unwrap() else {
            panic!("expected nodes");
        };
        let TransformData::Nodes { nodes: with, .. } = resolve(&doc, "#xpointer(/)").unwrap() else {
            panic!("expected nodes");
        };
        assert_eq!(with.len(), all.len() + 2);

        let TransformData::Nodes { nodes: item, .. } = resolve(&doc, "#a").unwrap() else {
            panic!("expected nodes");
        };
        let TransformData::Nodes { nodes: item_c, .. } = resolve(&doc, "#xpointer(id('a'))").unwrap() else {
            panic!("expected nodes");
        };
        assert_eq!(item_c.len(), item.len() + 1);
        assert!(matches!(resolve(&doc, "#missing"), Err(Error::InvalidUri(_))));
    }

    #[test]
    fn test_external_goes_through_io_chain() {
        let _guard = io::tests::CHAIN_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        io::register_defaults();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.txt");
        std::fs::write(&path, b"external bytes").unwrap();
        let doc = Document::parse("<r/>").unwrap();
        let TransformData::Binary(data) = resolve(&doc, path.to_str().unwrap()).unwrap() else {
            panic!("expected octets");
        };
        assert_eq!(data, b"external bytes");
    }
}
