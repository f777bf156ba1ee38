#![forbid(unsafe_code)]

//! Shared document handle and the element wrapper cache.
//!
//! A [`Document`] owns one arena [`Tree`]. Callers hold nodes through
//! [`Element`] handles obtained from [`Document::wrap`]. Wrapping is
//! identity-preserving: while any handle to a node is alive, wrapping the
//! node again returns a handle to the same object.
//!
//! Nodes detached by a mutating operation are either freed at once or, when
//! a handle still points into them, marked orphan. An orphan subtree is freed
//! as soon as the last handle into it is dropped.

use crate::parse;
use crate::tree::{NodeId, NodeKind, QName, SlotState, Tree};
use crate::writer;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use ulriksdal_core::{ns, Error, Result};

/// Attribute names tried when resolving `#id` references to elements whose
/// ID attribute was never registered.
pub const DEFAULT_ID_ATTRS: [&str; 3] = ["Id", "ID", "id"];

struct DocInner {
    tree: RefCell<Tree>,
    wrappers: RefCell<HashMap<NodeId, Weak<WrapToken>>>,
    /// Orphan roots whose release was postponed because the tree was borrowed.
    deferred: RefCell<Vec<NodeId>>,
}

/// A reference-counted XML document.
#[derive(Clone)]
pub struct Document {
    inner: Rc<DocInner>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.inner.tree.borrow().capacity())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::from_tree(Tree::new())
    }
}

impl Document {
    pub fn from_tree(tree: Tree) -> Self {
        Self {
            inner: Rc::new(DocInner {
                tree: RefCell::new(tree),
                wrappers: RefCell::new(HashMap::new()),
                deferred: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        parse::parse(text).map(Self::from_tree)
    }

    pub fn parse_bytes(data: &[u8]) -> Result<Self> {
        parse::parse_bytes(data).map(Self::from_tree)
    }

    pub fn parse_file(path: &std::path::Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::parse_bytes(&data)
    }

    /// A new document whose root element is `local` in namespace `ns_uri`.
    pub fn with_root(ns_uri: Option<&str>, prefix: Option<&str>, local: &str) -> Result<Self> {
        let mut tree = Tree::new();
        let root = tree.create_element(QName::new(ns_uri, prefix, local));
        if let Some(uri) = ns_uri {
            tree.declare_namespace(root, prefix, uri);
        }
        let top = tree.document_node();
        tree.append_child(top, root)?;
        Ok(Self::from_tree(tree))
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    pub fn tree(&self) -> Ref<'_, Tree> {
        self.inner.tree.borrow()
    }

    pub fn tree_mut(&self) -> RefMut<'_, Tree> {
        self.inner.tree.borrow_mut()
    }

    /// Handle for `node`, reusing the live handle if one exists.
    pub fn wrap(&self, node: NodeId) -> Element {
        let mut cache = self.inner.wrappers.borrow_mut();
        if let Some(token) = cache.get(&node).and_then(Weak::upgrade) {
            return Element { token };
        }
        let token = Rc::new(WrapToken {
            doc: self.clone(),
            node,
        });
        cache.insert(node, Rc::downgrade(&token));
        Element { token }
    }

    pub fn root_element(&self) -> Option<Element> {
        let root = self.tree().root_element()?;
        Some(self.wrap(root))
    }

    /// Whether any live handle refers to `node` or a node below it.
    ///
    /// Walks whichever is smaller: the handle cache or the subtree.
    pub fn has_live_wrapper_in(&self, node: NodeId) -> bool {
        let tree = self.tree();
        let cache = self.inner.wrappers.borrow();
        if cache.is_empty() {
            return false;
        }
        let live = |n: &NodeId| cache.get(n).is_some_and(|w| w.strong_count() > 0);
        if tree.children(node).is_empty() {
            return live(&node);
        }
        let subtree = tree.descendants(node);
        if subtree.len() <= cache.len() {
            subtree.iter().any(live)
        } else {
            cache
                .iter()
                .any(|(n, w)| w.strong_count() > 0 && tree.is_ancestor_or_self(node, *n))
        }
    }

    /// Number of nodes currently wrapped by a live handle.
    pub fn live_wrapper_count(&self) -> usize {
        self.inner
            .wrappers
            .borrow()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Free orphan subtrees that no handle refers into any more.
    pub fn collect_orphans(&self) {
        let pending: Vec<NodeId> = self.inner.deferred.borrow_mut().drain(..).collect();
        for node in pending {
            self.release_orphan(node);
        }
    }

    fn release_orphan(&self, node: NodeId) {
        let top = self.tree().top(node);
        if self.tree().state(top) != SlotState::Orphan || self.has_live_wrapper_in(top) {
            return;
        }
        self.tree_mut().free(top);
    }

    /// Settle a node detached by a mutation: orphan it while a handle still
    /// refers into it, free it otherwise. Returns true when it was orphaned.
    pub fn release_detached(&self, node: NodeId) -> bool {
        self.collect_orphans();
        let settled = {
            let tree = self.tree();
            tree.is_freed(node) || tree.is_attached(node)
        };
        if settled {
            return false;
        }
        if self.has_live_wrapper_in(node) {
            self.tree_mut().mark_orphan(node);
            true
        } else {
            self.tree_mut().free(node);
            false
        }
    }

    /// Serialize the whole document.
    pub fn to_xml(&self) -> String {
        writer::document_to_string(&self.tree())
    }

    /// Register `attr` of `node` as an ID attribute.
    pub fn register_id(&self, node: &Element, attr: &QName) -> Result<String> {
        self.tree_mut().register_id(node.node_id(), attr)
    }

    pub fn find_by_id(&self, id: &str) -> Option<Element> {
        let found = self.tree().find_by_id(id, &DEFAULT_ID_ATTRS)?;
        Some(self.wrap(found))
    }

    /// Deep-copy `node` (possibly from another document) into this document,
    /// detached.
    pub fn import(&self, node: &Element) -> Result<Element> {
        let copied = if Document::ptr_eq(self, &node.document()) {
            let snapshot = self.tree();
            let mut scratch = Tree::new();
            let tmp = scratch.import(&snapshot, node.node_id())?;
            drop(snapshot);
            self.tree_mut().import(&scratch, tmp)?
        } else {
            let src = node.document();
            let src_tree = src.tree();
            self.tree_mut().import(&src_tree, node.node_id())?
        };
        Ok(self.wrap(copied))
    }
}

/// Shared identity of every handle to one node.
struct WrapToken {
    doc: Document,
    node: NodeId,
}

impl Drop for WrapToken {
    fn drop(&mut self) {
        if let Ok(mut cache) = self.doc.inner.wrappers.try_borrow_mut() {
            if cache.get(&self.node).is_some_and(|w| w.strong_count() == 0) {
                cache.remove(&self.node);
            }
        }
        let orphaned = match self.doc.inner.tree.try_borrow() {
            Ok(tree) => tree.state(tree.top(self.node)) == SlotState::Orphan,
            Err(_) => true,
        };
        if !orphaned {
            return;
        }
        let tree_free = self.doc.inner.tree.try_borrow_mut().is_ok();
        let cache_free = self.doc.inner.wrappers.try_borrow_mut().is_ok();
        if tree_free && cache_free {
            self.doc.release_orphan(self.node);
        } else if let Ok(mut deferred) = self.doc.inner.deferred.try_borrow_mut() {
            deferred.push(self.node);
        }
    }
}

/// Handle to one node of a [`Document`].
///
/// Cloning shares the identity; equality is node identity.
#[derive(Clone)]
pub struct Element {
    token: Rc<WrapToken>,
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.token, &other.token)
    }
}

impl Eq for Element {}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.qualified_name();
        f.debug_struct("Element")
            .field("node", &self.token.node.index())
            .field("name", &name)
            .finish()
    }
}

impl Element {
    /// The raw arena node.
    pub fn node_id(&self) -> NodeId {
        self.token.node
    }

    pub fn document(&self) -> Document {
        self.token.doc.clone()
    }

    /// True when both handles are the same wrapped object.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.token, &b.token)
    }

    fn tree(&self) -> Ref<'_, Tree> {
        self.token.doc.tree()
    }

    fn tree_mut(&self) -> RefMut<'_, Tree> {
        self.token.doc.tree_mut()
    }

    pub fn is_element(&self) -> bool {
        self.tree().is_element(self.node_id())
    }

    pub fn is_freed(&self) -> bool {
        self.tree().is_freed(self.node_id())
    }

    pub fn state(&self) -> SlotState {
        self.tree().state(self.node_id())
    }

    pub fn name(&self) -> Option<QName> {
        self.tree().name(self.node_id()).cloned()
    }

    pub fn local_name(&self) -> String {
        self.name().map(|n| n.local).unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<String> {
        self.name().and_then(|n| n.ns)
    }

    pub fn qualified_name(&self) -> String {
        match self.tree().kind(self.node_id()) {
            NodeKind::Element(e) => e.name.qualified(),
            NodeKind::Document => "#document".into(),
            NodeKind::Text(_) => "#text".into(),
            NodeKind::Comment(_) => "#comment".into(),
            NodeKind::ProcessingInstruction { target, .. } => target.clone(),
        }
    }

    pub fn is_named(&self, ns: &str, local: &str) -> bool {
        self.tree().is_named(self.node_id(), ns, local)
    }

    pub fn parent(&self) -> Option<Element> {
        let parent = self.tree().parent_element(self.node_id())?;
        Some(self.token.doc.wrap(parent))
    }

    pub fn index_in_parent(&self) -> Option<usize> {
        self.tree().index_in_parent(self.node_id())
    }

    /// All child nodes, text included.
    pub fn child_nodes(&self) -> Vec<Element> {
        let ids = self.tree().children(self.node_id()).to_vec();
        ids.into_iter().map(|c| self.token.doc.wrap(c)).collect()
    }

    /// Child elements only.
    pub fn children(&self) -> Vec<Element> {
        let ids: Vec<NodeId> = self.tree().element_children(self.node_id()).collect();
        ids.into_iter().map(|c| self.token.doc.wrap(c)).collect()
    }

    pub fn child_at(&self, index: usize) -> Option<Element> {
        let id = self.tree().children(self.node_id()).get(index).copied()?;
        Some(self.token.doc.wrap(id))
    }

    pub fn attribute(&self, local: &str) -> Option<String> {
        self.tree().attribute(self.node_id(), local).map(str::to_owned)
    }

    pub fn attribute_ns(&self, ns: Option<&str>, local: &str) -> Option<String> {
        self.tree()
            .attribute_ns(self.node_id(), ns, local)
            .map(str::to_owned)
    }

    pub fn set_attribute(&self, local: &str, value: &str) {
        self.tree_mut()
            .set_attribute(self.node_id(), QName::local(local), value);
    }

    pub fn remove_attribute(&self, local: &str) {
        self.tree_mut().remove_attribute(self.node_id(), local);
    }

    pub fn text(&self) -> String {
        self.tree().text_content(self.node_id())
    }

    pub fn set_text(&self, text: &str) -> Result<()> {
        let old = self.tree_mut().set_text(self.node_id(), text)?;
        for node in old {
            self.token.doc.release_detached(node);
        }
        Ok(())
    }

    /// Create an element in namespace `ns_uri` and append it.
    ///
    /// The prefix already bound to `ns_uri` is reused; otherwise `prefix` is
    /// declared on the new element.
    pub fn append_element(&self, ns_uri: &str, prefix: Option<&str>, local: &str) -> Result<Element> {
        let id = {
            let mut tree = self.tree_mut();
            let bound = tree.lookup_prefix(self.node_id(), ns_uri);
            let id = match &bound {
                Some(p) if p.as_deref() == prefix || prefix.is_none() => {
                    tree.create_element(QName::new(Some(ns_uri), p.as_deref(), local))
                }
                _ => {
                    let id = tree.create_element(QName::new(Some(ns_uri), prefix, local));
                    tree.declare_namespace(id, prefix, ns_uri);
                    id
                }
            };
            tree.append_child(self.node_id(), id)?;
            id
        };
        Ok(self.token.doc.wrap(id))
    }

    /// Append a text node.
    pub fn append_text(&self, text: &str) -> Result<()> {
        let mut tree = self.tree_mut();
        let t = tree.create_text(text);
        tree.append_child(self.node_id(), t)
    }

    /// Move `child` (from this document) to be this node's last child.
    pub fn append_child(&self, child: &Element) -> Result<()> {
        if !Document::ptr_eq(&self.document(), &child.document()) {
            return Err(Error::XmlStructure("node belongs to another document".into()));
        }
        self.tree_mut().append_child(self.node_id(), child.node_id())
    }

    pub fn insert_child(&self, index: usize, child: &Element) -> Result<()> {
        if !Document::ptr_eq(&self.document(), &child.document()) {
            return Err(Error::XmlStructure("node belongs to another document".into()));
        }
        self.tree_mut()
            .insert_child(self.node_id(), index, child.node_id())
    }

    pub fn declare_namespace(&self, prefix: Option<&str>, uri: &str) {
        self.tree_mut().declare_namespace(self.node_id(), prefix, uri);
    }

    pub fn lookup_namespace(&self, prefix: Option<&str>) -> Option<String> {
        self.tree().lookup_namespace(self.node_id(), prefix)
    }

    /// Serialize this subtree so it stands alone.
    pub fn to_xml(&self) -> String {
        writer::node_to_string(&self.tree(), self.node_id())
    }

    /// Serialize this node's children.
    pub fn inner_xml(&self) -> String {
        writer::children_to_string(&self.tree(), self.node_id())
    }

    /// First child element named `local` in `ns`.
    pub fn find_child(&self, local: &str, ns: &str) -> Option<Element> {
        let id = self.tree().first_child_element(self.node_id(), ns, local)?;
        Some(self.token.doc.wrap(id))
    }

    /// This node or its closest ancestor named `local` in `ns`.
    pub fn find_parent(&self, local: &str, ns: &str) -> Option<Element> {
        let id = {
            let tree = self.tree();
            let mut current = Some(self.node_id());
            let mut found = None;
            while let Some(n) = current {
                if tree.is_named(n, ns, local) {
                    found = Some(n);
                    break;
                }
                current = tree.parent(n);
            }
            found?
        };
        Some(self.token.doc.wrap(id))
    }

    /// This node or its first descendant named `local` in `ns`, document order.
    pub fn find_node(&self, local: &str, ns: &str) -> Option<Element> {
        let id = {
            let tree = self.tree();
            tree.descendants(self.node_id())
                .into_iter()
                .find(|n| tree.is_named(*n, ns, local))?
        };
        Some(self.token.doc.wrap(id))
    }

    /// Register every attribute named in `attr_names` found in this subtree
    /// as an ID. Values already taken by another node are skipped.
    pub fn add_ids(&self, attr_names: &[&str]) -> usize {
        let mut tree = self.tree_mut();
        let mut added = 0;
        for n in tree.descendants(self.node_id()) {
            for name in attr_names {
                if tree.attribute(n, name).is_none() {
                    continue;
                }
                match tree.register_id(n, &QName::local(*name)) {
                    Ok(_) => added += 1,
                    Err(e) => tracing::debug!(attr = %name, error = %e, "skipping id"),
                }
            }
        }
        added
    }
}

/// XML-DSig namespace, the default for the find helpers.
pub const DEFAULT_FIND_NS: &str = ns::DSIG;

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<root xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:Signature><ds:SignedInfo Id="si"/></ds:Signature><data ID="d1">x</data></root>"#;

    #[test]
    fn test_wrap_is_identity_preserving() {
        let doc = Document::parse(DOC).unwrap();
        let a = doc.root_element().unwrap();
        let b = doc.root_element().unwrap();
        assert!(Element::ptr_eq(&a, &b));
        let child = a.children()[0].clone();
        assert!(Element::ptr_eq(&child.parent().unwrap(), &a));
        assert_eq!(doc.live_wrapper_count(), 2);
    }

    #[test]
    fn test_dropped_handles_leave_cache() {
        let doc = Document::parse(DOC).unwrap();
        {
            let root = doc.root_element().unwrap();
            let _kids = root.children();
            assert_eq!(doc.live_wrapper_count(), 3);
        }
        assert_eq!(doc.live_wrapper_count(), 0);
    }

    #[test]
    fn test_find_helpers() {
        let doc = Document::parse(DOC).unwrap();
        let root = doc.root_element().unwrap();
        let si = root.find_node("SignedInfo", DEFAULT_FIND_NS).unwrap();
        let sig = si.find_parent("Signature", DEFAULT_FIND_NS).unwrap();
        assert_eq!(sig.local_name(), "Signature");
        assert!(Element::ptr_eq(&si.find_parent("SignedInfo", DEFAULT_FIND_NS).unwrap(), &si));
        assert!(Element::ptr_eq(&sig.find_child("SignedInfo", DEFAULT_FIND_NS).unwrap(), &si));
        assert!(root.find_child("SignedInfo", DEFAULT_FIND_NS).is_none());
    }

    #[test]
    fn test_add_ids_and_lookup() {
        let doc = Document::parse(DOC).unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(root.add_ids(&["ID"]), 1);
        assert!(doc.tree().find_registered_id("d1").is_some());
        // default attribute names are tried for unregistered IDs
        assert_eq!(doc.find_by_id("si").unwrap().local_name(), "SignedInfo");
    }

    #[test]
    fn test_replaced_text_slots_are_recycled() {
        let doc = Document::parse(DOC).unwrap();
        let data = doc.root_element().unwrap().children()[1].clone();
        data.set_text("first").unwrap();
        let settled = doc.tree().capacity();
        for i in 0..100 {
            data.set_text(&format!("value {i}")).unwrap();
        }
        assert_eq!(doc.tree().capacity(), settled);
        assert_eq!(data.text(), "value 99");
    }

    #[test]
    fn test_live_wrapper_lookup_covers_the_subtree() {
        let doc = Document::parse(DOC).unwrap();
        let root_id = doc.tree().root_element().unwrap();
        assert!(!doc.has_live_wrapper_in(root_id));
        let si = doc.root_element().unwrap().find_node("SignedInfo", DEFAULT_FIND_NS).unwrap();
        // Only the SignedInfo handle is left; the root handle was temporary.
        assert_eq!(doc.live_wrapper_count(), 1);
        assert!(doc.has_live_wrapper_in(root_id));
        assert!(doc.has_live_wrapper_in(si.node_id()));
        let data = doc.tree().children(root_id)[1];
        assert!(!doc.has_live_wrapper_in(data));
        drop(si);
        assert!(!doc.has_live_wrapper_in(root_id));
    }

    #[test]
    fn test_reattached_node_is_not_released() {
        let doc = Document::parse(DOC).unwrap();
        let root = doc.root_element().unwrap();
        let data_id = doc.tree().children(root.node_id())[1];
        {
            let mut tree = doc.tree_mut();
            tree.detach(data_id);
            tree.append_child(root.node_id(), data_id).unwrap();
        }
        assert!(!doc.release_detached(data_id));
        assert!(!doc.tree().is_freed(data_id));
    }

    #[test]
    fn test_import_from_other_document() {
        let src = Document::parse(DOC).unwrap();
        let dst = Document::parse("<other/>").unwrap();
        let sig = src.root_element().unwrap().children()[0].clone();
        let copy = dst.import(&sig).unwrap();
        assert!(Document::ptr_eq(&copy.document(), &dst));
        assert!(copy.parent().is_none());
        dst.root_element().unwrap().append_child(&copy).unwrap();
        assert!(dst.to_xml().contains("<ds:Signature xmlns:ds="));
    }

    #[test]
    fn test_append_element_reuses_bound_prefix() {
        let doc = Document::parse(DOC).unwrap();
        let sig = doc.root_element().unwrap().children()[0].clone();
        let child = sig.append_element(ns::DSIG, Some("ds"), "Object").unwrap();
        assert_eq!(child.qualified_name(), "ds:Object");
        assert!(!child.to_xml().contains("xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\" xmlns:ds"));
    }
}
