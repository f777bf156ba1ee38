#![forbid(unsafe_code)]

//! Mutable arena XML tree.
//!
//! Nodes live in a `Vec` and are addressed by [`NodeId`]. A node that is
//! detached from its parent keeps its slot; it is only released when
//! [`Tree::free`] marks its subtree [`SlotState::Freed`]. Freed slots go on
//! a free list that [`Tree::create`] takes from, so a `NodeId` must not be
//! kept past the release of its subtree.

use std::collections::{HashMap, HashSet};
use ulriksdal_core::{ns, Error, Result};

/// Index of a node inside its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A namespace-qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub ns: Option<String>,
    pub prefix: Option<String>,
    pub local: String,
}

impl QName {
    /// A name in no namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            ns: None,
            prefix: None,
            local: local.into(),
        }
    }

    pub fn new(ns: Option<&str>, prefix: Option<&str>, local: &str) -> Self {
        Self {
            ns: ns.map(str::to_owned),
            prefix: prefix.filter(|p| !p.is_empty()).map(str::to_owned),
            local: local.to_owned(),
        }
    }

    /// `prefix:local` or `local`.
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{}", self.local),
            None => self.local.clone(),
        }
    }

    pub fn is(&self, ns: &str, local: &str) -> bool {
        self.local == local && self.ns.as_deref().unwrap_or("") == ns
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

/// A namespace declared on an element. `prefix == None` is the default namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    pub prefix: Option<String>,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    pub namespaces: Vec<NsDecl>,
}

impl ElementData {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            namespaces: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(ElementData),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: Option<String> },
}

/// Lifecycle of an arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Live,
    /// Detached by a mutating operation, kept until no handle refers into it.
    Orphan,
    Freed,
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    state: SlotState,
}

/// Attribute registered as an XML ID.
#[derive(Debug, Clone, PartialEq, Eq)]
struct IdEntry {
    node: NodeId,
    attr: QName,
}

/// The arena.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<NodeData>,
    free_slots: Vec<NodeId>,
    ids: HashMap<String, IdEntry>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// An empty tree holding only the document node.
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
                state: SlotState::Live,
            }],
            free_slots: Vec::new(),
            ids: HashMap::new(),
        }
    }

    pub fn document_node(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root_element(&self) -> Option<NodeId> {
        self.element_children(self.document_node()).next()
    }

    /// Number of slots allocated, freed ones included.
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Slots waiting on the free list.
    pub fn free_slot_count(&self) -> usize {
        self.free_slots.len()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn state(&self, id: NodeId) -> SlotState {
        self.nodes
            .get(id.0)
            .map_or(SlotState::Freed, |n| n.state)
    }

    pub fn is_freed(&self, id: NodeId) -> bool {
        self.state(id) == SlotState::Freed
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.0].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.nodes.get(id.0).map(|n| &n.kind) {
            Some(NodeKind::Element(e)) => Some(e),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.kind) {
            Some(NodeKind::Element(e)) => Some(e),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn name(&self, id: NodeId) -> Option<&QName> {
        self.element(id).map(|e| &e.name)
    }

    /// True when `id` is an element named `local` in namespace `ns`.
    pub fn is_named(&self, id: NodeId, ns: &str, local: &str) -> bool {
        self.name(id).is_some_and(|n| n.is(ns, local))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    /// Parent if it is an element (not the document node).
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|p| self.is_element(*p))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id.0).map_or(&[][..], |n| n.children.as_slice())
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |c| self.is_element(*c))
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    pub fn first_child_element(&self, id: NodeId, ns: &str, local: &str) -> Option<NodeId> {
        self.element_children(id).find(|c| self.is_named(*c, ns, local))
    }

    /// The node and all its descendants in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// Topmost ancestor-or-self of `id`: the document node when attached.
    pub fn top(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(p) = self.parent(current) {
            current = p;
        }
        current
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.top(id) == self.document_node()
    }

    // ── Construction ─────────────────────────────────────────────────

    /// Allocate a detached node, reusing a freed slot when there is one.
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        let data = NodeData {
            kind,
            parent: None,
            children: Vec::new(),
            state: SlotState::Live,
        };
        if let Some(id) = self.free_slots.pop() {
            self.nodes[id.0] = data;
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(data);
        id
    }

    pub fn create_element(&mut self, name: QName) -> NodeId {
        self.create(NodeKind::Element(ElementData::new(name)))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.create(NodeKind::Text(text.into()))
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.is_freed(parent) || self.is_freed(child) {
            return Err(Error::XmlStructure("node has been freed".into()));
        }
        if !matches!(self.kind(parent), NodeKind::Element(_) | NodeKind::Document) {
            return Err(Error::XmlStructure("parent cannot hold children".into()));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(Error::XmlStructure("cannot insert a node into itself".into()));
        }
        Ok(())
    }

    /// Append `child` (detaching it first if needed) as last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let at = self.children(parent).len();
        self.insert_child(parent, at, child)
    }

    /// Insert `child` at `index` (clamped) among `parent`'s children.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<()> {
        self.check_insert(parent, child)?;
        self.detach(child);
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
        let data = &mut self.nodes[child.0];
        data.parent = Some(parent);
        data.state = SlotState::Live;
        Ok(())
    }

    pub fn insert_before(&mut self, sibling: NodeId, node: NodeId) -> Result<()> {
        let parent = self
            .parent(sibling)
            .ok_or_else(|| Error::XmlStructure("sibling has no parent".into()))?;
        let index = self.index_in_parent(sibling).unwrap_or(0);
        self.insert_child(parent, index, node)
    }

    /// Unlink `id` from its parent; the subtree stays allocated.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.parent(id) {
            self.nodes[parent.0].children.retain(|c| *c != id);
            self.nodes[id.0].parent = None;
        }
    }

    /// Put `new` where `old` is and detach `old`.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        self.insert_before(old, new)?;
        self.detach(old);
        Ok(())
    }

    /// Detach and return all children of `id`.
    pub fn take_children(&mut self, id: NodeId) -> Vec<NodeId> {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for c in &children {
            self.nodes[c.0].parent = None;
        }
        children
    }

    /// Detach `id` and keep its subtree allocated for the handles still
    /// pointing into it. IDs registered inside it are dropped.
    pub fn mark_orphan(&mut self, id: NodeId) {
        self.detach(id);
        self.unregister_ids_in(id);
        if let Some(n) = self.nodes.get_mut(id.0) {
            if n.state == SlotState::Live {
                n.state = SlotState::Orphan;
            }
        }
    }

    /// Release a subtree: detach it, drop its content and its ID entries.
    pub fn free(&mut self, id: NodeId) {
        if self.is_freed(id) || id == self.document_node() {
            return;
        }
        self.detach(id);
        self.unregister_ids_in(id);
        for n in self.descendants(id) {
            let data = &mut self.nodes[n.0];
            data.kind = NodeKind::Text(String::new());
            data.children = Vec::new();
            data.parent = None;
            data.state = SlotState::Freed;
            self.free_slots.push(n);
        }
        tracing::trace!(node = id.0, "freed subtree");
    }

    // ── Attributes and text ──────────────────────────────────────────

    /// Value of the un-namespaced attribute `local`.
    pub fn attribute(&self, id: NodeId, local: &str) -> Option<&str> {
        self.attribute_ns(id, None, local)
    }

    pub fn attribute_ns(&self, id: NodeId, ns: Option<&str>, local: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|a| a.name.local == local && a.name.ns.as_deref() == ns)
            .map(|a| a.value.as_str())
    }

    pub fn set_attribute(&mut self, id: NodeId, name: QName, value: impl Into<String>) {
        let value = value.into();
        if let Some(e) = self.element_mut(id) {
            match e
                .attributes
                .iter_mut()
                .find(|a| a.name.local == name.local && a.name.ns == name.ns)
            {
                Some(a) => a.value = value,
                None => e.attributes.push(Attribute { name, value }),
            }
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, local: &str) {
        if let Some(e) = self.element_mut(id) {
            e.attributes.retain(|a| !(a.name.local == local && a.name.ns.is_none()));
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for n in self.descendants(id) {
            if let NodeKind::Text(t) = self.kind(n) {
                out.push_str(t);
            }
        }
        out
    }

    /// Replace the children of `id` with a single text node. The previous
    /// children are returned detached, not freed.
    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<Vec<NodeId>> {
        let old = self.take_children(id);
        if !text.is_empty() {
            let t = self.create_text(text);
            self.append_child(id, t)?;
        }
        Ok(old)
    }

    // ── Namespaces ───────────────────────────────────────────────────

    pub fn declare_namespace(&mut self, id: NodeId, prefix: Option<&str>, uri: &str) {
        if let Some(e) = self.element_mut(id) {
            let prefix = prefix.filter(|p| !p.is_empty()).map(str::to_owned);
            match e.namespaces.iter_mut().find(|d| d.prefix == prefix) {
                Some(d) => d.uri = uri.to_owned(),
                None => e.namespaces.push(NsDecl {
                    prefix,
                    uri: uri.to_owned(),
                }),
            }
        }
    }

    /// Namespaces in scope at `id`, closest declaration wins. An empty
    /// default-namespace URI (an undeclaration) is dropped.
    pub fn namespaces_in_scope(&self, id: NodeId) -> Vec<NsDecl> {
        let mut out: Vec<NsDecl> = Vec::new();
        let mut current = Some(id);
        while let Some(n) = current {
            if let Some(e) = self.element(n) {
                for d in &e.namespaces {
                    if !out.iter().any(|o| o.prefix == d.prefix) {
                        out.push(d.clone());
                    }
                }
            }
            current = self.parent(n);
        }
        out.retain(|d| !d.uri.is_empty() && d.prefix.as_deref() != Some("xml"));
        out
    }

    pub fn lookup_namespace(&self, id: NodeId, prefix: Option<&str>) -> Option<String> {
        if prefix == Some("xml") {
            return Some(ns::XML.to_owned());
        }
        self.namespaces_in_scope(id)
            .into_iter()
            .find(|d| d.prefix.as_deref() == prefix)
            .map(|d| d.uri)
    }

    /// A prefix bound to `uri` at `id`. `Some(None)` means the default namespace.
    pub fn lookup_prefix(&self, id: NodeId, uri: &str) -> Option<Option<String>> {
        if uri == ns::XML {
            return Some(Some("xml".to_owned()));
        }
        self.namespaces_in_scope(id)
            .into_iter()
            .find(|d| d.uri == uri)
            .map(|d| d.prefix)
    }

    // ── IDs ──────────────────────────────────────────────────────────

    /// Register attribute `attr` of `node` as an ID.
    ///
    /// Fails with `MissingAttribute` when the attribute is absent or empty and
    /// with `DuplicateId` when another attribute already owns the value.
    pub fn register_id(&mut self, node: NodeId, attr: &QName) -> Result<String> {
        let value = self
            .attribute_ns(node, attr.ns.as_deref(), &attr.local)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::MissingAttribute("missing attribute.".into()))?
            .to_owned();
        let entry = IdEntry {
            node,
            attr: QName::new(attr.ns.as_deref(), None, &attr.local),
        };
        match self.ids.get(&value) {
            Some(existing) if *existing == entry => {}
            // A detached owner no longer holds its value.
            Some(existing) if self.is_attached(existing.node) => {
                return Err(Error::DuplicateId(format!("duplicated id {value}")))
            }
            _ => {
                self.ids.insert(value.clone(), entry);
            }
        }
        Ok(value)
    }

    pub fn unregister_id(&mut self, value: &str) {
        if self.ids.remove(value).is_some() {
            tracing::trace!(id = value, "id unregistered");
        }
    }

    /// Drop every ID registered on `id` or below it.
    fn unregister_ids_in(&mut self, id: NodeId) {
        let subtree: HashSet<NodeId> = self.descendants(id).into_iter().collect();
        let values: Vec<String> = self
            .ids
            .iter()
            .filter(|(_, e)| subtree.contains(&e.node))
            .map(|(v, _)| v.clone())
            .collect();
        for value in values {
            self.unregister_id(&value);
        }
    }

    /// Element registered under `value`, if it is still in the document.
    pub fn find_registered_id(&self, value: &str) -> Option<NodeId> {
        self.ids
            .get(value)
            .map(|e| e.node)
            .filter(|n| !self.is_freed(*n) && self.is_attached(*n))
    }

    /// Element with ID `value`: the registered table first, then any attached
    /// element carrying one of `fallback_attrs` with that value.
    pub fn find_by_id(&self, value: &str, fallback_attrs: &[&str]) -> Option<NodeId> {
        if let Some(n) = self.find_registered_id(value) {
            return Some(n);
        }
        self.descendants(self.document_node()).into_iter().find(|n| {
            fallback_attrs
                .iter()
                .any(|a| self.attribute(*n, a) == Some(value))
        })
    }

    // ── Copying ──────────────────────────────────────────────────────

    /// Deep-copy `src_id` of `src` into this tree as a detached subtree.
    ///
    /// Namespaces in scope at the source are declared on the copied top
    /// element so the copy keeps its meaning wherever it is inserted.
    pub fn import(&mut self, src: &Tree, src_id: NodeId) -> Result<NodeId> {
        if src.is_freed(src_id) {
            return Err(Error::XmlStructure("cannot copy a freed node".into()));
        }
        let top = self.copy_rec(src, src_id);
        if src.is_element(src_id) {
            let in_scope = src.namespaces_in_scope(src_id);
            for d in in_scope {
                let declared = self
                    .element(top)
                    .is_some_and(|e| e.namespaces.iter().any(|x| x.prefix == d.prefix));
                if !declared {
                    self.declare_namespace(top, d.prefix.as_deref(), &d.uri);
                }
            }
        }
        Ok(top)
    }

    fn copy_rec(&mut self, src: &Tree, id: NodeId) -> NodeId {
        let copy = self.create(src.kind(id).clone());
        for child in src.children(id) {
            let c = self.copy_rec(src, *child);
            self.nodes[c.0].parent = Some(copy);
            self.nodes[copy.0].children.push(c);
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Tree, NodeId, NodeId, NodeId) {
        let mut t = Tree::new();
        let root = t.create_element(QName::local("root"));
        t.append_child(t.document_node(), root).unwrap();
        let a = t.create_element(QName::local("a"));
        let b = t.create_element(QName::local("b"));
        t.append_child(root, a).unwrap();
        t.append_child(root, b).unwrap();
        (t, root, a, b)
    }

    #[test]
    fn test_insert_and_index() {
        let (mut t, root, a, b) = sample();
        assert_eq!(t.root_element(), Some(root));
        assert_eq!(t.index_in_parent(b), Some(1));
        let c = t.create_text("x");
        t.insert_child(root, 1, c).unwrap();
        assert_eq!(t.children(root), &[a, c, b]);
        assert_eq!(t.index_in_parent(b), Some(2));
    }

    #[test]
    fn test_cannot_insert_into_self() {
        let (mut t, root, a, _) = sample();
        assert!(t.append_child(a, root).is_err());
    }

    #[test]
    fn test_free_releases_subtree_and_ids() {
        let (mut t, _root, a, _) = sample();
        t.set_attribute(a, QName::local("Id"), "x1");
        t.register_id(a, &QName::local("Id")).unwrap();
        t.free(a);
        assert!(t.is_freed(a));
        assert_eq!(t.find_registered_id("x1"), None);
    }

    #[test]
    fn test_register_id_rules() {
        let (mut t, _root, a, b) = sample();
        let id = QName::local("ID");
        assert!(matches!(t.register_id(a, &id), Err(Error::MissingAttribute(_))));
        t.set_attribute(a, id.clone(), "same");
        t.set_attribute(b, id.clone(), "same");
        t.register_id(a, &id).unwrap();
        // re-registering the same attribute is a no-op
        t.register_id(a, &id).unwrap();
        assert!(matches!(t.register_id(b, &id), Err(Error::DuplicateId(_))));
        t.set_attribute(b, id.clone(), "");
        assert!(matches!(t.register_id(b, &id), Err(Error::MissingAttribute(_))));
    }

    #[test]
    fn test_detached_id_owner_is_not_found() {
        let (mut t, root, a, b) = sample();
        let id = QName::local("Id");
        t.set_attribute(a, id.clone(), "x");
        t.register_id(a, &id).unwrap();
        t.detach(a);
        assert_eq!(t.find_registered_id("x"), None);

        // The value may now go to an attached element.
        t.set_attribute(b, id.clone(), "x");
        t.register_id(b, &id).unwrap();
        assert_eq!(t.find_registered_id("x"), Some(b));
        assert_eq!(t.find_by_id("x", &["Id"]), Some(b));
        assert_eq!(t.children(root), &[b]);
    }

    #[test]
    fn test_orphaning_unregisters_subtree_ids() {
        let (mut t, root, a, _) = sample();
        let inner = t.create_element(QName::local("inner"));
        t.append_child(a, inner).unwrap();
        t.set_attribute(inner, QName::local("Id"), "deep");
        t.register_id(inner, &QName::local("Id")).unwrap();
        t.mark_orphan(a);
        assert_eq!(t.state(a), SlotState::Orphan);
        assert_eq!(t.find_registered_id("deep"), None);

        t.unregister_id("never-registered");
        t.append_child(root, a).unwrap();
        assert_eq!(t.find_registered_id("deep"), None);
        assert_eq!(t.find_by_id("deep", &["Id"]), Some(inner));
    }

    #[test]
    fn test_freed_slots_are_reused() {
        let (mut t, root, a, _) = sample();
        let inner = t.create_text("gone");
        t.append_child(a, inner).unwrap();
        let before = t.capacity();
        t.free(a);
        assert_eq!(t.free_slot_count(), 2);

        let x = t.create_element(QName::local("x"));
        let y = t.create_text("y");
        assert_eq!(t.capacity(), before);
        assert_eq!(t.free_slot_count(), 0);
        assert!(!t.is_freed(x) && !t.is_freed(y));
        assert_eq!(t.parent(x), None);
        t.append_child(root, x).unwrap();
        t.append_child(x, y).unwrap();
        assert_eq!(t.text_content(root), "y");

        t.create_text("fresh");
        assert_eq!(t.capacity(), before + 1);
    }

    #[test]
    fn test_namespace_scope() {
        let (mut t, root, a, _) = sample();
        t.declare_namespace(root, Some("p"), "urn:p");
        t.declare_namespace(a, Some("p"), "urn:q");
        assert_eq!(t.lookup_namespace(a, Some("p")).as_deref(), Some("urn:q"));
        assert_eq!(t.lookup_namespace(root, Some("p")).as_deref(), Some("urn:p"));
        assert_eq!(t.lookup_prefix(root, "urn:p"), Some(Some("p".into())));
        assert_eq!(t.lookup_prefix(a, ns::XML), Some(Some("xml".into())));
    }

    #[test]
    fn test_import_carries_inherited_namespaces() {
        let (mut src, root, a, _) = sample();
        src.declare_namespace(root, None, "urn:default");
        let mut dst = Tree::new();
        let copy = dst.import(&src, a).unwrap();
        assert_eq!(
            dst.lookup_namespace(copy, None).as_deref(),
            Some("urn:default")
        );
        assert_eq!(dst.parent(copy), None);
    }

    #[test]
    fn test_set_text_replaces_children() {
        let (mut t, root, a, b) = sample();
        let old = t.set_text(root, "hello").unwrap();
        assert_eq!(old, vec![a, b]);
        assert_eq!(t.parent(a), None);
        assert_eq!(t.text_content(root), "hello");
    }
}
