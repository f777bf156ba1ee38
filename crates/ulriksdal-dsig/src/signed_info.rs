#![forbid(unsafe_code)]

//! Pieces shared by signing and verification: locating the parts of a
//! `<Signature>`, digesting a `<Reference>`, canonicalizing `<SignedInfo>`
//! and finding the key.

use ulriksdal_c14n::C14nMode;
use ulriksdal_core::registry::{self, TransformUsage};
use ulriksdal_core::{ns, Error, Result, TransformDescriptor};
use ulriksdal_crypto::digest;
use ulriksdal_keys::{Key, KeyInfoReader};
use ulriksdal_transforms::pipeline::inclusive_prefixes;
use ulriksdal_transforms::{engine, uri, KeyUse, TransformPipeline};
use ulriksdal_xml::{Document, Element, NodeSet};

use crate::context::SignatureContext;

/// The parts of a `<Signature>` both directions work with.
pub(crate) struct SignatureParts {
    pub signature: Element,
    pub signed_info: Element,
    pub signature_value: Element,
    pub key_info: Option<Element>,
    pub c14n: C14nMode,
    pub c14n_prefixes: Vec<String>,
    pub method: &'static TransformDescriptor,
    pub references: Vec<Element>,
}

pub(crate) fn child(parent: &Element, local: &str) -> Result<Element> {
    parent
        .find_child(local, ns::DSIG)
        .ok_or_else(|| Error::MissingElement(local.into()))
}

/// The registered algorithm named by `node`'s `Algorithm`, which must be
/// usable as `usage`.
pub(crate) fn algorithm_of(node: &Element, usage: TransformUsage) -> Result<&'static TransformDescriptor> {
    let href = node
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingElement(format!("Algorithm on {}", node.local_name())))?;
    registry::transform_by_href(&href)
        .filter(|d| d.usage.contains(usage))
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("{}: {href}", node.local_name())))
}

impl SignatureParts {
    /// Read `signature`, registering the context's extra ID attributes in its
    /// document first.
    pub fn read(ctx: &SignatureContext, signature: &Element) -> Result<Self> {
        if signature.is_freed() || !signature.is_named(ns::DSIG, ns::node::SIGNATURE) {
            return Err(Error::XmlStructure(format!(
                "expected Signature, got {}",
                signature.qualified_name()
            )));
        }
        if !ctx.id_attrs.is_empty() {
            if let Some(root) = signature.document().root_element() {
                let names: Vec<&str> = ctx.id_attrs.iter().map(String::as_str).collect();
                root.add_ids(&names);
            }
        }

        let signed_info = child(signature, ns::node::SIGNED_INFO)?;
        let c14n_node = child(&signed_info, ns::node::CANONICALIZATION_METHOD)?;
        let c14n_desc = algorithm_of(&c14n_node, TransformUsage::C14N_METHOD)?;
        ctx.signature_transforms.check(c14n_desc, "canonicalization method")?;
        let c14n = c14n_desc
            .href
            .and_then(C14nMode::from_uri)
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("C14N: {}", c14n_desc.name)))?;

        let method_node = child(&signed_info, ns::node::SIGNATURE_METHOD)?;
        let method = algorithm_of(&method_node, TransformUsage::SIGNATURE_METHOD)?;
        ctx.signature_transforms.check(method, "signature method")?;

        let references: Vec<Element> = signed_info
            .children()
            .into_iter()
            .filter(|c| c.is_named(ns::DSIG, ns::node::REFERENCE))
            .collect();
        if references.is_empty() {
            return Err(Error::MissingElement("Reference".into()));
        }

        Ok(Self {
            signature_value: child(signature, ns::node::SIGNATURE_VALUE)?,
            key_info: signature.find_child(ns::node::KEY_INFO, ns::DSIG),
            c14n_prefixes: inclusive_prefixes(&c14n_node),
            signature: signature.clone(),
            signed_info,
            c14n,
            method,
            references,
        })
    }

    /// Canonical octets of `<SignedInfo>`, the input of the signature method.
    pub fn canonical_signed_info(&self) -> Result<Vec<u8>> {
        let doc = self.signed_info.document();
        let tree = doc.tree();
        let root = self.signed_info.node_id();
        let nodes = if self.c14n.with_comments() {
            NodeSet::tree_with_comments(&tree, root)
        } else {
            NodeSet::tree_without_comments(&tree, root)
        };
        ulriksdal_c14n::canonicalize(&tree, tree.document_node(), self.c14n, Some(&nodes), &self.c14n_prefixes)
    }

    /// Digest of the data `reference` points at, after its transforms.
    pub fn reference_digest(&self, ctx: &SignatureContext, doc: &Document, reference: &Element) -> Result<Vec<u8>> {
        let uri = reference.attribute(ns::attr::URI).unwrap_or_default();
        let digest_desc = algorithm_of(&child(reference, ns::node::DIGEST_METHOD)?, TransformUsage::DIGEST_METHOD)?;
        ctx.reference_transforms.check(digest_desc, "digest method")?;

        let mut data = uri::resolve(doc, &uri)?;
        if let Some(transforms) = reference.find_child(ns::node::TRANSFORMS, ns::DSIG) {
            let allowed = |d: &'static TransformDescriptor| ctx.reference_transforms.allows(d);
            let pipeline = TransformPipeline::from_element(&transforms, self.signature.node_id(), &allowed)?;
            data = pipeline.execute(data)?;
        }
        let bytes = data.to_binary()?;
        let href = digest_desc.href.unwrap_or_default();
        let computed = digest::digest(href, &bytes)?;
        tracing::trace!(uri = %uri, digest = digest_desc.name, len = bytes.len(), "reference digested");
        Ok(computed)
    }

    /// The key the signature method runs with: the context's key, else one
    /// found through `<KeyInfo>` and the keys manager.
    pub fn resolve_key(&self, ctx: &SignatureContext, usage: KeyUse) -> Result<Key> {
        let requirement = engine::key_requirement(self.method, usage)?;
        if let Some(key) = &ctx.key {
            if key.matches(&requirement) {
                return Ok(key.view());
            }
            return Err(Error::Key(format!("bound key cannot be used with {}", self.method.name)));
        }
        let reader = KeyInfoReader {
            manager: ctx.manager.as_deref(),
            enabled: &ctx.key_data,
            requirement,
        };
        reader
            .resolve(self.key_info.as_ref())?
            .ok_or_else(|| Error::Key(format!("no key found for {}", self.method.name)))
    }
}
