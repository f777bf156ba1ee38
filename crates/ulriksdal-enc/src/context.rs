#![forbid(unsafe_code)]

//! `EncryptionContext`: key binding and the encrypt/decrypt entry points,
//! including the tree surgery that swaps plaintext and `<EncryptedData>`.

use std::sync::Arc;

use ulriksdal_core::registry;
use ulriksdal_core::sink::{self, ErrorKind};
use ulriksdal_core::{ns, Descriptor, EngineError, Error, KeyDataDescriptor, ReportExt, Result};
use ulriksdal_keys::{Key, KeysManager};
use ulriksdal_transforms::io;
use ulriksdal_xml::parse::parse_fragment;
use ulriksdal_xml::{Document, Element, NodeKind, ReplacedNodes};

/// The operation a context last ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Encrypt,
    Decrypt,
}

/// What `Type` says an `<EncryptedData>` stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataType {
    Element,
    Content,
}

impl DataType {
    fn of(enc: &Element) -> Option<Self> {
        match enc.attribute(ns::attr::TYPE).as_deref() {
            Some(ns::ENC_TYPE_ELEMENT) => Some(Self::Element),
            Some(ns::ENC_TYPE_CONTENT) => Some(Self::Content),
            _ => None,
        }
    }
}

/// Result of [`EncryptionContext::decrypt`].
#[derive(Debug)]
pub enum Decrypted {
    /// Plaintext octets; the tree was not touched.
    Binary(Vec<u8>),
    /// The decrypted XML now in the tree: the element that replaced the
    /// `<EncryptedData>`, its former parent for content, or the new root.
    Element(Element),
}

/// Engine-side outcome of a decrypt, before the result is located.
enum Outcome {
    Binary(Vec<u8>),
    Replaced(DataType),
}

/// Context for XML-Enc operations.
#[derive(Debug)]
pub struct EncryptionContext {
    pub(crate) key: Option<Key>,
    pub(crate) manager: Option<Arc<KeysManager>>,
    pub(crate) key_data: Vec<&'static KeyDataDescriptor>,
    operation: Option<Operation>,
    result_replaced: bool,
}

impl Default for EncryptionContext {
    fn default() -> Self {
        Self::new(None)
    }
}

impl EncryptionContext {
    pub fn new(manager: Option<Arc<KeysManager>>) -> Self {
        tracing::trace!(with_manager = manager.is_some(), "encryption context created");
        Self {
            key: None,
            manager,
            key_data: registry::default_key_data(),
            operation: None,
            result_replaced: false,
        }
    }

    pub fn operation(&self) -> Option<Operation> {
        self.operation
    }

    /// Whether the last operation swapped nodes in a document.
    pub fn result_replaced(&self) -> bool {
        self.result_replaced
    }

    pub fn manager(&self) -> Option<&KeysManager> {
        self.manager.as_deref()
    }

    /// A non-owning view of the bound key.
    pub fn key(&self) -> Option<Key> {
        self.key.as_ref().map(Key::view)
    }

    /// Bind a private copy of `key`.
    pub fn set_key(&mut self, key: &Key) -> Result<()> {
        if !key.has_handle() {
            return Err(Error::Type("empty key.".into()));
        }
        let copy = key.copy()?;
        if !copy.has_handle() {
            return Err(Error::Internal(EngineError::detached("failed to duplicate key")));
        }
        self.key = Some(copy);
        Ok(())
    }

    pub fn clear_key(&mut self) {
        self.key = None;
    }

    /// Replace the key-data kinds `<KeyInfo>` processing may use.
    pub fn set_enabled_key_data(&mut self, kinds: &[Descriptor]) -> Result<()> {
        let mut enabled = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match kind {
                Descriptor::KeyData(k) => enabled.push(*k),
                Descriptor::Transform(_) => {
                    return Err(Error::Type("expected list of KeyData constants.".into()));
                }
            }
        }
        self.key_data = enabled;
        Ok(())
    }

    pub fn enabled_key_data(&self) -> &[&'static KeyDataDescriptor] {
        &self.key_data
    }

    /// Forget the last operation. The key, keys manager and enabled key
    /// data stay.
    pub fn reset(&mut self) {
        self.operation = None;
        self.result_replaced = false;
    }

    fn begin(&mut self, operation: Operation) {
        self.reset();
        self.operation = Some(operation);
    }

    // ── Encryption ──────────────────────────────────────────────────

    /// Encrypt `data` into the `<EncryptedData>` template, which is filled
    /// in place and returned.
    pub fn encrypt_binary(&mut self, template: &Element, data: &[u8]) -> Result<Element> {
        self.begin(Operation::Encrypt);
        crate::encrypt::encrypt(self, template, data)
            .reported("EncryptionContext::encrypt_binary")
            .map_err(|_| sink::take_last_error(ErrorKind::Engine, "failed to encrypt binary"))?;
        Ok(template.clone())
    }

    /// Like [`encrypt_binary`](Self::encrypt_binary) with the plaintext read
    /// from `uri` through the IO callbacks.
    pub fn encrypt_uri(&mut self, template: &Element, uri: &str) -> Result<Element> {
        self.begin(Operation::Encrypt);
        let run = || -> Result<()> {
            let data = io::read_all(uri)?;
            tracing::debug!(uri, len = data.len(), "plaintext fetched");
            crate::encrypt::encrypt(self, template, &data)
        };
        run()
            .reported("EncryptionContext::encrypt_uri")
            .map_err(|_| sink::take_last_error(ErrorKind::Engine, "failed to encrypt URI"))?;
        Ok(template.clone())
    }

    /// Encrypt `node` (for `Type` Element) or its children (for `Type`
    /// Content) and put the filled template in their place.
    ///
    /// A template from another document is copied into `node`'s document
    /// first; the returned element is the one now in the tree.
    pub fn encrypt_xml(&mut self, template: &Element, node: &Element) -> Result<Element> {
        self.begin(Operation::Encrypt);
        let data_type = DataType::of(template).ok_or_else(|| {
            Error::UnsupportedType("unsupported `Type`, it should be `element` or `content`".into())
        })?;

        let doc = node.document();
        let template = if Document::ptr_eq(&template.document(), &doc) {
            template.clone()
        } else {
            doc.import(template).map_err(|e| {
                tracing::debug!(error = %e, "template copy failed");
                Error::Internal(EngineError::detached("could not copy template tree"))
            })?
        };

        self.encrypt_in_place(&doc, &template, node, data_type)
            .reported("EncryptionContext::encrypt_xml")
            .map_err(|_| sink::take_last_error(ErrorKind::Engine, "failed to encrypt xml"))?;
        self.result_replaced = true;
        Ok(template)
    }

    fn encrypt_in_place(&self, doc: &Document, template: &Element, node: &Element, data_type: DataType) -> Result<()> {
        if node.is_freed() {
            return Err(Error::XmlStructure("node has been freed".into()));
        }
        let plaintext = match data_type {
            DataType::Element => node.to_xml(),
            DataType::Content => node.inner_xml(),
        };
        crate::encrypt::encrypt(self, template, plaintext.as_bytes())?;

        let mut replaced = ReplacedNodes::new(doc);
        {
            let mut tree = doc.tree_mut();
            match data_type {
                DataType::Element => {
                    tree.replace(node.node_id(), template.node_id())?;
                    replaced.push(node.node_id());
                }
                DataType::Content => {
                    replaced.extend(tree.take_children(node.node_id()));
                    tree.append_child(node.node_id(), template.node_id())?;
                }
            }
        }
        let report = replaced.drain();
        tracing::debug!(freed = report.freed, orphaned = report.orphaned, "plaintext replaced");
        Ok(())
    }

    // ── Decryption ──────────────────────────────────────────────────

    /// Decrypt an `<EncryptedData>` or `<EncryptedKey>`.
    ///
    /// `<EncryptedData>` with `Type` Element or Content is replaced in the
    /// tree by its plaintext and the affected element is returned; anything
    /// else yields the plaintext octets.
    pub fn decrypt(&mut self, node: &Element) -> Result<Decrypted> {
        self.begin(Operation::Decrypt);
        let parent = node.parent();
        let index = node.index_in_parent();

        let outcome = self
            .decrypt_in_place(node)
            .reported("EncryptionContext::decrypt")
            .map_err(|_| sink::take_last_error(ErrorKind::Decrypt, "failed to decrypt"))?;
        let data_type = match outcome {
            Outcome::Binary(data) => return Ok(Decrypted::Binary(data)),
            Outcome::Replaced(data_type) => data_type,
        };
        self.result_replaced = true;

        let doc = node.document();
        let located = match (parent, data_type) {
            (None, _) => doc.root_element(),
            (Some(parent), DataType::Content) => Some(parent),
            (Some(parent), DataType::Element) => index.and_then(|i| parent.child_at(i)),
        };
        located
            .map(Decrypted::Element)
            .ok_or_else(|| Error::Structure("non well-formed document".into()))
    }

    fn decrypt_in_place(&self, node: &Element) -> Result<Outcome> {
        let plaintext = crate::decrypt::decrypt(self, node)?;
        let data_type = match DataType::of(node) {
            Some(t) if node.is_named(ns::ENC, ns::node::ENCRYPTED_DATA) => t,
            _ => return Ok(Outcome::Binary(plaintext)),
        };
        let text = String::from_utf8(plaintext)
            .map_err(|e| Error::XmlParse(format!("decrypted content is not UTF-8: {e}")))?;
        replace_with_fragment(node, &text)?;
        Ok(Outcome::Replaced(data_type))
    }
}

/// Put the nodes parsed from `text` where `node` is and settle `node`.
fn replace_with_fragment(node: &Element, text: &str) -> Result<()> {
    let doc = node.document();
    let target = node.node_id();
    let mut replaced = ReplacedNodes::new(&doc);
    {
        let mut tree = doc.tree_mut();
        let parent = tree
            .parent(target)
            .ok_or_else(|| Error::XmlStructure("EncryptedData is not in a document".into()))?;
        let at_top = parent == tree.document_node();
        let context = tree.namespaces_in_scope(parent);
        let (fragment, wrapper) = parse_fragment(text, &context)?;

        let mut position = tree.index_in_parent(target).unwrap_or(0);
        for top in fragment.children(wrapper).to_vec() {
            if at_top && is_blank_text(fragment.kind(top)) {
                continue;
            }
            let copied = tree.import(&fragment, top)?;
            if let Some(element) = tree.element_mut(copied) {
                element.namespaces.retain(|d| !context.contains(d));
            }
            tree.insert_child(parent, position, copied)?;
            position += 1;
        }
        tree.detach(target);
    }
    replaced.push(target);
    let report = replaced.drain();
    tracing::debug!(freed = report.freed, orphaned = report.orphaned, "EncryptedData replaced");
    Ok(())
}

fn is_blank_text(kind: &NodeKind) -> bool {
    matches!(kind, NodeKind::Text(t) if t.trim().is_empty())
}
