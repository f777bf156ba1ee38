#![forbid(unsafe_code)]

//! Arbiter between nodes detached by a mutating operation and the
//! document's handle cache.
//!
//! Operations that replace parts of a tree push the detached nodes onto a
//! [`ReplacedNodes`] list instead of freeing them. Draining the list frees
//! every node no handle refers into and marks the others orphan, leaving
//! their release to the last handle's drop. Dropping the list without
//! draining it drains it.

use crate::document::Document;
use crate::tree::NodeId;

/// What a drain did with each detached node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub freed: usize,
    pub orphaned: usize,
}

/// Nodes detached from `doc` and not yet settled.
#[must_use = "replaced nodes must be drained before the operation completes"]
pub struct ReplacedNodes {
    doc: Document,
    nodes: Vec<NodeId>,
}

impl ReplacedNodes {
    pub fn new(doc: &Document) -> Self {
        Self {
            doc: doc.clone(),
            nodes: Vec::new(),
        }
    }

    /// Queue a node the caller has just detached.
    pub fn push(&mut self, node: NodeId) {
        self.nodes.push(node);
    }

    pub fn extend(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        self.nodes.extend(nodes);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Settle every queued node.
    pub fn drain(mut self) -> DrainReport {
        self.settle()
    }

    fn settle(&mut self) -> DrainReport {
        let mut report = DrainReport::default();
        for node in std::mem::take(&mut self.nodes) {
            if self.doc.tree().is_freed(node) {
                continue;
            }
            if self.doc.release_detached(node) {
                report.orphaned += 1;
            } else {
                report.freed += 1;
            }
        }
        if report != DrainReport::default() {
            tracing::trace!(freed = report.freed, orphaned = report.orphaned, "replaced nodes drained");
        }
        report
    }
}

impl Drop for ReplacedNodes {
    fn drop(&mut self) {
        if !self.nodes.is_empty() {
            self.settle();
        }
    }
}

impl std::fmt::Debug for ReplacedNodes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplacedNodes")
            .field("pending", &self.nodes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::SlotState;

    fn detach_first_child(doc: &Document) -> NodeId {
        let mut tree = doc.tree_mut();
        let root = tree.root_element().unwrap();
        let first = tree.children(root)[0];
        tree.detach(first);
        first
    }

    #[test]
    fn test_unreferenced_nodes_are_freed() {
        let doc = Document::parse("<r><a><b/></a><c/></r>").unwrap();
        let mut replaced = ReplacedNodes::new(&doc);
        replaced.push(detach_first_child(&doc));
        let report = replaced.drain();
        assert_eq!(report, DrainReport { freed: 1, orphaned: 0 });
        assert_eq!(doc.to_xml().trim_end(), "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<r><c/></r>");
    }

    #[test]
    fn test_referenced_nodes_outlive_the_drain() {
        let doc = Document::parse("<r><a><b/></a><c/></r>").unwrap();
        let b = doc.root_element().unwrap().children()[0].children()[0].clone();
        let mut replaced = ReplacedNodes::new(&doc);
        let a = detach_first_child(&doc);
        replaced.push(a);
        assert_eq!(replaced.drain().orphaned, 1);

        // the handle still reads its node
        assert_eq!(b.local_name(), "b");
        assert_eq!(doc.tree().state(a), SlotState::Orphan);

        drop(b);
        assert!(doc.tree().is_freed(a));
    }

    #[test]
    fn test_drop_drains() {
        let doc = Document::parse("<r><a/></r>").unwrap();
        let a = {
            let mut replaced = ReplacedNodes::new(&doc);
            let a = detach_first_child(&doc);
            replaced.push(a);
            a
        };
        assert!(doc.tree().is_freed(a));
    }

    #[test]
    fn test_reattached_orphan_is_not_freed_by_handle_drop() {
        let doc = Document::parse("<r><a/><c/></r>").unwrap();
        let root = doc.root_element().unwrap();
        let a = root.children()[0].clone();
        let mut replaced = ReplacedNodes::new(&doc);
        replaced.push(detach_first_child(&doc));
        let _ = replaced.drain();
        root.append_child(&a).unwrap();
        let id = a.node_id();
        drop(a);
        assert_eq!(doc.tree().state(id), SlotState::Live);
    }
}
