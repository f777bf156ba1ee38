#![forbid(unsafe_code)]

//! XML-DSig signature creation.
//!
//! Fills a `<Signature>` template in place:
//! 1. Write the key information the template asks for into `<KeyInfo>`
//! 2. Digest every `<Reference>` and store its `<DigestValue>`
//! 3. Canonicalize `<SignedInfo>` and store the `<SignatureValue>`

use ulriksdal_core::{encoding, ns, Result};
use ulriksdal_keys::write_key_info;
use ulriksdal_transforms::KeyUse;
use ulriksdal_xml::Element;

use crate::context::SignatureContext;
use crate::signed_info::{child, SignatureParts};

pub(crate) fn sign(ctx: &SignatureContext, signature: &Element) -> Result<()> {
    let parts = SignatureParts::read(ctx, signature)?;
    let doc = signature.document();

    let key = parts.resolve_key(ctx, KeyUse::Sign)?;
    let material = key.material()?;

    // KeyInfo first so a reference may cover it.
    if let Some(key_info) = &parts.key_info {
        write_key_info(key_info, &key, &ctx.key_data)?;
    }

    for reference in &parts.references {
        let digest = parts.reference_digest(ctx, &doc, reference)?;
        child(reference, ns::node::DIGEST_VALUE)?
            .set_text(&encoding::encode(&digest))?;
    }

    let signed_info = parts.canonical_signed_info()?;
    let href = parts.method.href.unwrap_or_default();
    let method = ulriksdal_crypto::sign::from_uri(href)?;
    let value = method.sign(&material, &signed_info)?;
    parts.signature_value.set_text(&encoding::encode(&value))?;
    tracing::debug!(
        method = parts.method.name,
        references = parts.references.len(),
        "signature created"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use ulriksdal_core::registry::transform;
    use ulriksdal_core::{sink, Error, KeyDataClass};
    use ulriksdal_keys::{Key, KeysManager};
    use ulriksdal_template as tmpl;
    use ulriksdal_xml::Document;

    fn hmac_key() -> Key {
        Key::from_binary_data(KeyDataClass::Hmac, b"secret").unwrap()
    }

    fn hmac_template() -> (Document, Element) {
        let doc = Document::parse(r#"<Envelope xmlns="urn:envelope"><Data>Hello</Data></Envelope>"#).unwrap();
        let sig = tmpl::create_signature(&doc, &transform::EXCL_C14N, &transform::HMAC_SHA1, None, Some("ds")).unwrap();
        doc.root_element().unwrap().append_child(&sig).unwrap();
        let reference = tmpl::add_reference(&sig, &transform::SHA1, None, Some(""), None).unwrap();
        tmpl::add_transform(&reference, &transform::ENVELOPED).unwrap();
        (doc, sig)
    }

    #[test]
    fn test_sign_fills_template() {
        let (_doc, sig) = hmac_template();
        let mut ctx = SignatureContext::new(None);
        ctx.set_key(&hmac_key()).unwrap();
        ctx.sign(&sig).unwrap();

        let digest = sig.find_node("DigestValue", ns::DSIG).unwrap().text();
        let value = sig.find_node("SignatureValue", ns::DSIG).unwrap().text();
        assert_eq!(encoding::decode(&digest).unwrap().len(), 20);
        assert_eq!(encoding::decode(&value).unwrap().len(), 20);
    }

    #[test]
    fn test_sign_without_key_fails_with_sign_error() {
        sink::install_callback();
        let (_doc, sig) = hmac_template();
        let mut ctx = SignatureContext::new(None);
        let err = ctx.sign(&sig).unwrap_err();
        assert!(matches!(err, Error::Sign(ref e) if e.context == "failed to sign"));
        assert!(err.record().unwrap().message.contains("no key found"));
    }

    #[test]
    fn test_sign_uses_named_manager_key() {
        let key = hmac_key();
        key.set_name(Some("shared")).unwrap();
        let mut manager = KeysManager::new();
        manager.add_key(&key).unwrap();

        let (_doc, sig) = hmac_template();
        let key_info = tmpl::ensure_key_info(&sig, None).unwrap();
        tmpl::add_key_name(&key_info, Some("shared")).unwrap();

        let mut ctx = SignatureContext::new(Some(Arc::new(manager)));
        ctx.sign(&sig).unwrap();
        assert!(!sig.find_node("SignatureValue", ns::DSIG).unwrap().text().is_empty());
    }

    #[test]
    fn test_sign_refuses_disabled_reference_transform() {
        sink::install_callback();
        let (_doc, sig) = hmac_template();
        let mut ctx = SignatureContext::new(None);
        ctx.set_key(&hmac_key()).unwrap();
        ctx.enable_reference_transform(&transform::SHA1).unwrap();
        let err = ctx.sign(&sig).unwrap_err();
        assert!(matches!(err, Error::Sign(_)));
        assert!(err.record().unwrap().message.contains("not enabled"));
    }
}
