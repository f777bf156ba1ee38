#![forbid(unsafe_code)]

//! Transform pipeline and trait definitions.

use ulriksdal_c14n::C14nMode;
use ulriksdal_core::registry::{self, TransformUsage};
use ulriksdal_core::{algorithm, ns, Error, TransformDescriptor};
use ulriksdal_xml::{Document, Element, NodeId, NodeSet};

use crate::base64_transform::Base64DecodeTransform;
use crate::enveloped::EnvelopedSignatureTransform;

/// Data flowing through the transform pipeline.
pub enum TransformData {
    /// A subset of a live document.
    Nodes { doc: Document, nodes: NodeSet },
    /// Raw octets.
    Binary(Vec<u8>),
}

impl TransformData {
    /// Octets of this data; node sets go through inclusive C14N.
    pub fn to_binary(&self) -> Result<Vec<u8>, Error> {
        match self {
            TransformData::Binary(data) => Ok(data.clone()),
            TransformData::Nodes { doc, nodes } => {
                let tree = doc.tree();
                ulriksdal_c14n::canonicalize(&tree, tree.document_node(), C14nMode::Inclusive, Some(nodes), &[])
            }
        }
    }
}

/// Trait for individual transforms.
pub trait Transform: Send {
    /// The algorithm URI for this transform.
    fn uri(&self) -> &str;

    fn execute(&self, input: TransformData) -> Result<TransformData, Error>;
}

/// A pipeline of transforms executed in sequence.
#[derive(Default)]
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Build the pipeline described by a `<Transforms>` element.
    ///
    /// `signature` is the `<Signature>` the enveloped transform removes;
    /// `allowed` filters which registered transforms may appear.
    pub fn from_element(
        transforms: &Element,
        signature: NodeId,
        allowed: &dyn Fn(&'static TransformDescriptor) -> bool,
    ) -> Result<Self, Error> {
        let mut pipeline = Self::new();
        for node in transforms.children() {
            if !node.is_named(ns::DSIG, ns::node::TRANSFORM) {
                continue;
            }
            let uri = node
                .attribute(ns::attr::ALGORITHM)
                .ok_or_else(|| Error::MissingElement("Algorithm on Transform".into()))?;
            let desc = registry::transform_by_href(&uri)
                .filter(|d| d.usage.contains(TransformUsage::DSIG_TRANSFORM))
                .ok_or_else(|| Error::UnsupportedAlgorithm(format!("transform: {uri}")))?;
            if !allowed(desc) {
                return Err(Error::UnsupportedAlgorithm(format!("transform {} is not enabled", desc.name)));
            }
            pipeline.push(transform_for(desc, &node, signature)?);
        }
        Ok(pipeline)
    }

    pub fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let mut data = input;
        for transform in &self.transforms {
            tracing::trace!(transform = transform.uri(), "applying transform");
            data = transform.execute(data)?;
        }
        Ok(data)
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

fn transform_for(desc: &TransformDescriptor, node: &Element, signature: NodeId) -> Result<Box<dyn Transform>, Error> {
    let uri = desc.href.unwrap_or_default();
    if let Some(mode) = C14nMode::from_uri(uri) {
        return Ok(Box::new(C14nTransform::new(mode, inclusive_prefixes(node))));
    }
    match uri {
        algorithm::ENVELOPED_SIGNATURE => Ok(Box::new(EnvelopedSignatureTransform::new(signature))),
        algorithm::BASE64 => Ok(Box::new(Base64DecodeTransform)),
        _ => Err(Error::UnsupportedAlgorithm(format!("transform: {uri}"))),
    }
}

/// `PrefixList` of an `<ec:InclusiveNamespaces>` child; `#default` stands
/// for the default namespace.
pub fn inclusive_prefixes(method: &Element) -> Vec<String> {
    method
        .find_child(ns::node::INCLUSIVE_NAMESPACES, ns::EXC_C14N)
        .and_then(|n| n.attribute(ns::attr::PREFIX_LIST))
        .map(|list| list.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}

/// A canonicalization transform.
pub struct C14nTransform {
    mode: C14nMode,
    inclusive_prefixes: Vec<String>,
}

impl C14nTransform {
    pub fn new(mode: C14nMode, inclusive_prefixes: Vec<String>) -> Self {
        Self {
            mode,
            inclusive_prefixes,
        }
    }
}

impl Transform for C14nTransform {
    fn uri(&self) -> &str {
        self.mode.uri()
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let bytes = match input {
            TransformData::Nodes { doc, nodes } => {
                let tree = doc.tree();
                ulriksdal_c14n::canonicalize(
                    &tree,
                    tree.document_node(),
                    self.mode,
                    Some(&nodes),
                    &self.inclusive_prefixes,
                )?
            }
            TransformData::Binary(data) => {
                let doc = Document::parse_bytes(&data)?;
                let tree = doc.tree();
                ulriksdal_c14n::canonicalize(&tree, tree.document_node(), self.mode, None, &self.inclusive_prefixes)?
            }
        };
        Ok(TransformData::Binary(bytes))
    }
}
