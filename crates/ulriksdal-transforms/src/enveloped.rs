#![forbid(unsafe_code)]

//! Enveloped signature transform.
//!
//! Removes the `<Signature>` element being processed, and everything below
//! it, from the node set.

use ulriksdal_core::{algorithm, Error};
use ulriksdal_xml::NodeId;

use crate::pipeline::{Transform, TransformData};

pub struct EnvelopedSignatureTransform {
    signature: NodeId,
}

impl EnvelopedSignatureTransform {
    pub fn new(signature: NodeId) -> Self {
        Self { signature }
    }
}

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        match input {
            TransformData::Nodes { doc, mut nodes } => {
                nodes.remove_subtree(&doc.tree(), self.signature);
                Ok(TransformData::Nodes { doc, nodes })
            }
            TransformData::Binary(_) => Err(Error::Transform(
                "enveloped-signature transform requires a node set".into(),
            )),
        }
    }
}
