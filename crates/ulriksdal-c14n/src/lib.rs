#![forbid(unsafe_code)]

//! Canonical XML for signing and digesting.
//!
//! Three families, each with a comment-preserving twin: inclusive 1.0,
//! inclusive 1.1 and exclusive 1.0.

pub mod escape;
pub mod inclusive;
pub mod inclusive11;
pub mod exclusive;
pub mod render;

use ulriksdal_core::{algorithm, Error};
use ulriksdal_xml::{NodeId, NodeSet, Tree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C14nMode {
    Inclusive,
    InclusiveWithComments,
    Inclusive11,
    Inclusive11WithComments,
    Exclusive,
    ExclusiveWithComments,
}

const MODES: [(C14nMode, &str); 6] = [
    (C14nMode::Inclusive, algorithm::C14N),
    (C14nMode::InclusiveWithComments, algorithm::C14N_WITH_COMMENTS),
    (C14nMode::Inclusive11, algorithm::C14N11),
    (C14nMode::Inclusive11WithComments, algorithm::C14N11_WITH_COMMENTS),
    (C14nMode::Exclusive, algorithm::EXC_C14N),
    (C14nMode::ExclusiveWithComments, algorithm::EXC_C14N_WITH_COMMENTS),
];

impl C14nMode {
    /// The `Algorithm` URI naming this mode.
    pub fn uri(self) -> &'static str {
        MODES
            .iter()
            .find(|(mode, _)| *mode == self)
            .map(|(_, uri)| *uri)
            .unwrap_or_default()
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        MODES.iter().find(|(_, u)| *u == uri).map(|(mode, _)| *mode)
    }

    pub fn with_comments(self) -> bool {
        matches!(
            self,
            Self::InclusiveWithComments | Self::Inclusive11WithComments | Self::ExclusiveWithComments
        )
    }

    pub fn is_exclusive(self) -> bool {
        matches!(self, Self::Exclusive | Self::ExclusiveWithComments)
    }
}

/// Canonicalize the subtree at `start` (the document node for a whole
/// document).
///
/// - `node_set`: the document subset to output; `None` outputs everything
///   below `start`
/// - `inclusive_prefixes`: for exclusive C14N, the InclusiveNamespaces PrefixList
pub fn canonicalize(
    tree: &Tree,
    start: NodeId,
    mode: C14nMode,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    tracing::trace!(?mode, node = start.index(), "canonicalizing");
    match mode {
        C14nMode::Inclusive | C14nMode::InclusiveWithComments => {
            inclusive::canonicalize(tree, start, mode.with_comments(), node_set)
        }
        C14nMode::Inclusive11 | C14nMode::Inclusive11WithComments => {
            inclusive11::canonicalize(tree, start, mode.with_comments(), node_set)
        }
        C14nMode::Exclusive | C14nMode::ExclusiveWithComments => exclusive::canonicalize(
            tree,
            start,
            mode.with_comments(),
            node_set,
            inclusive_prefixes,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_mode_has_a_distinct_uri() {
        for (mode, uri) in MODES {
            assert_eq!(mode.uri(), uri);
            assert_eq!(C14nMode::from_uri(uri), Some(mode));
        }
        assert!(C14nMode::from_uri("urn:nope").is_none());
    }

    #[test]
    fn test_dispatch_strips_comments() {
        let tree = ulriksdal_xml::parse::parse("<a><!--x--><b/></a>").unwrap();
        let out = canonicalize(&tree, tree.document_node(), C14nMode::Exclusive, None, &[]).unwrap();
        assert_eq!(out, b"<a><b></b></a>");
    }
}
