#![forbid(unsafe_code)]

//! Base64 decode transform.

use ulriksdal_core::{algorithm, encoding, Error};
use ulriksdal_xml::NodeKind;

use crate::pipeline::{Transform, TransformData};

/// Decodes its input; a node set contributes the text of its text nodes.
pub struct Base64DecodeTransform;

impl Transform for Base64DecodeTransform {
    fn uri(&self) -> &str {
        algorithm::BASE64
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let text = match &input {
            TransformData::Binary(data) => std::str::from_utf8(data)
                .map_err(|e| Error::Transform(format!("base64 input not UTF-8: {e}")))?
                .to_owned(),
            TransformData::Nodes { doc, nodes } => {
                let tree = doc.tree();
                let mut text = String::new();
                for n in tree.descendants(tree.document_node()) {
                    if let (true, NodeKind::Text(t)) = (nodes.contains(n), tree.kind(n)) {
                        text.push_str(t);
                    }
                }
                text
            }
        };
        Ok(TransformData::Binary(encoding::decode(&text)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulriksdal_xml::{Document, NodeSet};

    #[test]
    fn test_decodes_octets_and_text_nodes() {
        let out = Base64DecodeTransform
            .execute(TransformData::Binary(b"aGVs\nbG8=".to_vec()))
            .unwrap();
        assert!(matches!(out, TransformData::Binary(ref b) if b == b"hello"));

        let doc = Document::parse("<data>aGVs<b>bG8=</b></data>").unwrap();
        let nodes = NodeSet::all(&doc.tree());
        let out = Base64DecodeTransform
            .execute(TransformData::Nodes { doc, nodes })
            .unwrap();
        assert!(matches!(out, TransformData::Binary(ref b) if b == b"hello"));
    }
}
