#![forbid(unsafe_code)]

//! NodeSet type for canonicalization and signature transforms.
//!
//! A `NodeSet` is the document subset selected by a reference URI and
//! narrowed by transforms (e.g. enveloped-signature).

use crate::tree::{NodeId, NodeKind, Tree};
use std::collections::HashSet;

/// A set of nodes of one [`Tree`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet {
    nodes: HashSet<NodeId>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attached node, comments included.
    pub fn all(tree: &Tree) -> Self {
        Self::tree_with_comments(tree, tree.document_node())
    }

    /// Every attached node except comments; what `URI=""` selects.
    pub fn all_without_comments(tree: &Tree) -> Self {
        Self::tree_without_comments(tree, tree.document_node())
    }

    /// A subtree without its comments; what `URI="#id"` selects.
    pub fn tree_without_comments(tree: &Tree, root: NodeId) -> Self {
        Self::subtree(tree, root, false)
    }

    /// A subtree with its comments; what `#xpointer(...)` selects.
    pub fn tree_with_comments(tree: &Tree, root: NodeId) -> Self {
        Self::subtree(tree, root, true)
    }

    fn subtree(tree: &Tree, root: NodeId, include_comments: bool) -> Self {
        let nodes = tree
            .descendants(root)
            .into_iter()
            .filter(|n| include_comments || !matches!(tree.kind(*n), NodeKind::Comment(_)))
            .collect();
        Self { nodes }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    pub fn insert(&mut self, id: NodeId) {
        self.nodes.insert(id);
    }

    pub fn remove(&mut self, id: NodeId) {
        self.nodes.remove(&id);
    }

    /// Drop `root` and everything below it.
    pub fn remove_subtree(&mut self, tree: &Tree, root: NodeId) {
        for n in tree.descendants(root) {
            self.nodes.remove(&n);
        }
    }

    pub fn intersection(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.intersection(&other.nodes).copied().collect(),
        }
    }

    pub fn union(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.union(&other.nodes).copied().collect(),
        }
    }

    pub fn subtract(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.difference(&other.nodes).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}
