#![forbid(unsafe_code)]

//! XML-DSig signature verification.
//!
//! Processing order:
//! 1. Read `<SignedInfo>`: CanonicalizationMethod, SignatureMethod
//! 2. For each `<Reference>`: resolve URI, run transforms, digest, compare
//! 3. Resolve the verification key (context key, then `<KeyInfo>`)
//! 4. Canonicalize `<SignedInfo>` and check `<SignatureValue>`

use ulriksdal_core::{encoding, ns, Result};
use ulriksdal_transforms::KeyUse;
use ulriksdal_xml::Element;

use crate::context::SignatureContext;
use crate::signed_info::{child, SignatureParts};

/// Result of signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VerifyResult {
    /// Signature is valid.
    Valid,
    /// Signature is invalid.
    Invalid { reason: String },
}

/// Verify `signature` in place. Engine failures come back as errors, a
/// mismatch as [`VerifyResult::Invalid`].
pub(crate) fn verify(ctx: &SignatureContext, signature: &Element) -> Result<VerifyResult> {
    let parts = SignatureParts::read(ctx, signature)?;
    let doc = signature.document();

    for reference in &parts.references {
        let expected = encoding::decode(&child(reference, ns::node::DIGEST_VALUE)?.text())?;
        let computed = parts.reference_digest(ctx, &doc, reference)?;
        if computed != expected {
            let uri = reference.attribute(ns::attr::URI).unwrap_or_default();
            return Ok(VerifyResult::Invalid {
                reason: format!("URI={uri}: expected digest does not match computed digest"),
            });
        }
    }

    let key = parts.resolve_key(ctx, KeyUse::Verify)?;
    let material = key.material()?;

    let signed_info = parts.canonical_signed_info()?;
    let signature_value = encoding::decode(&parts.signature_value.text())?;
    let method = ulriksdal_crypto::sign::from_uri(parts.method.href.unwrap_or_default())?;
    if method.verify(&material, &signed_info, &signature_value)? {
        tracing::debug!(method = parts.method.name, "signature verified");
        Ok(VerifyResult::Valid)
    } else {
        Ok(VerifyResult::Invalid {
            reason: "signature value verification failed".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use ulriksdal_core::registry::{key_data, transform};
    use ulriksdal_core::{sink, Descriptor, Error, KeyDataClass};
    use ulriksdal_crypto::KeyMaterial;
    use std::time::{Duration, UNIX_EPOCH};
    use ulriksdal_keys::{CertType, Key, KeyFormat, KeysManager};
    use ulriksdal_template as tmpl;
    use ulriksdal_transforms::TransformStatus;
    use ulriksdal_xml::Document;

    const SAMPLE: &str = r#"<Envelope xmlns="urn:envelope"><Data Id="obj">Hello, World!</Data></Envelope>"#;

    fn hmac_key(secret: &[u8]) -> Key {
        Key::from_binary_data(KeyDataClass::Hmac, secret).unwrap()
    }

    /// An enveloped signature over the whole document, appended to the root.
    fn enveloped(doc: &Document, c14n: &'static ulriksdal_core::TransformDescriptor, method: &'static ulriksdal_core::TransformDescriptor) -> Element {
        let sig = tmpl::create_signature(doc, c14n, method, None, Some("ds")).unwrap();
        doc.root_element().unwrap().append_child(&sig).unwrap();
        let reference = tmpl::add_reference(&sig, &transform::SHA256, None, Some(""), None).unwrap();
        tmpl::add_transform(&reference, &transform::ENVELOPED).unwrap();
        sig
    }

    fn signature_of(doc: &Document) -> Element {
        doc.root_element().unwrap().find_node("Signature", ns::DSIG).unwrap()
    }

    /// An enveloped HMAC-SHA256 signature over `SAMPLE`, already signed.
    fn signed_hmac(secret: &[u8]) -> (Document, Element) {
        let doc = Document::parse(SAMPLE).unwrap();
        let sig = enveloped(&doc, &transform::EXCL_C14N, &transform::HMAC_SHA256);
        let mut signer = SignatureContext::new(None);
        signer.set_key(&hmac_key(secret)).unwrap();
        signer.sign(&sig).unwrap();
        (doc, sig)
    }

    fn flip_signature_value(sig: &Element, index: usize) {
        let value = sig.find_node("SignatureValue", ns::DSIG).unwrap();
        let mut bytes = encoding::decode(&value.text()).unwrap();
        let i = index % bytes.len();
        bytes[i] ^= 0x01;
        value.set_text(&encoding::encode(&bytes)).unwrap();
    }

    const CA_CERT: &[u8] = include_bytes!("../../ulriksdal-keys/testdata/ca-cert.pem");
    const INTERMEDIATE_CERT: &[u8] = include_bytes!("../../ulriksdal-keys/testdata/intermediate-cert.pem");
    const LEAF_CERT: &[u8] = include_bytes!("../../ulriksdal-keys/testdata/leaf-cert.pem");
    const LEAF_KEY: &[u8] = include_bytes!("../../ulriksdal-keys/testdata/leaf-key.pem");

    /// A document signed by the test leaf, its certificate in X509Data.
    fn signed_with_certificate() -> Document {
        let key = Key::from_memory(LEAF_KEY, KeyFormat::Pem, None).unwrap();
        key.load_cert_from_memory(LEAF_CERT, KeyFormat::CertPem).unwrap();
        let doc = Document::parse(SAMPLE).unwrap();
        let sig = enveloped(&doc, &transform::EXCL_C14N, &transform::RSA_SHA256);
        let key_info = tmpl::ensure_key_info(&sig, None).unwrap();
        tmpl::add_x509_data(&key_info).unwrap();
        let mut signer = SignatureContext::new(None);
        signer.set_key(&key).unwrap();
        signer.sign(&sig).unwrap();
        assert!(sig.find_node("X509Certificate", ns::DSIG).is_some());
        Document::parse(&doc.to_xml()).unwrap()
    }

    fn manager_at_2030(certs: &[(&[u8], CertType)]) -> Arc<KeysManager> {
        let mut manager = KeysManager::new();
        // 2030-01-01, inside the test certificates' validity.
        manager.set_verification_time(Some(UNIX_EPOCH + Duration::from_secs(1_893_456_000)));
        for (pem, kind) in certs {
            manager.load_cert_from_memory(pem, KeyFormat::CertPem, *kind).unwrap();
        }
        Arc::new(manager)
    }

    #[test]
    fn test_rsa_enveloped_round_trip_through_serialization() {
        sink::install_callback();
        let rsa = Key::from_material(KeyMaterial::generate_rsa(1024).unwrap());
        let doc = Document::parse(SAMPLE).unwrap();
        let sig = enveloped(&doc, &transform::EXCL_C14N, &transform::RSA_SHA256);
        let key_info = tmpl::ensure_key_info(&sig, None).unwrap();
        tmpl::add_key_value(&key_info).unwrap();

        let mut signer = SignatureContext::new(None);
        signer.set_key(&rsa).unwrap();
        signer.sign(&sig).unwrap();
        assert!(sig.find_node("Modulus", ns::DSIG).is_some());

        // The verifier only has the public key carried in KeyValue.
        let signed = Document::parse(&doc.to_xml()).unwrap();
        let mut verifier = SignatureContext::new(None);
        verifier.verify(&signature_of(&signed)).unwrap();
        assert_eq!(verifier.status(), TransformStatus::Succeeded);

        let data = signed.root_element().unwrap().children()[0].clone();
        data.set_text("Hello, World?").unwrap();
        let mut verifier = SignatureContext::new(None);
        let err = verifier.verify(&signature_of(&signed)).unwrap_err();
        assert!(err.is_verification_failure());
        assert_eq!(err.record().unwrap().message, "Signature is invalid.");
        assert_eq!(verifier.status(), TransformStatus::Failed);
    }

    #[test]
    fn test_reference_by_id_with_registered_attribute() {
        sink::install_callback();
        let doc = Document::parse(r#"<root><item ref="a1">value</item></root>"#).unwrap();
        let sig = tmpl::create_signature(&doc, &transform::INCLUSIVE_C14N, &transform::HMAC_SHA256, None, None).unwrap();
        doc.root_element().unwrap().append_child(&sig).unwrap();
        tmpl::add_reference(&sig, &transform::SHA1, None, Some("#a1"), None).unwrap();

        let item = doc.root_element().unwrap().children()[0].clone();
        let mut ctx = SignatureContext::new(None);
        ctx.set_key(&hmac_key(b"k")).unwrap();
        ctx.register_id(&item, "ref", None).unwrap();
        ctx.sign(&sig).unwrap();

        let mut verifier = SignatureContext::new(None);
        verifier.set_key(&hmac_key(b"k")).unwrap();
        verifier.verify(&sig).unwrap();

        let mut wrong = SignatureContext::new(None);
        wrong.set_key(&hmac_key(b"other")).unwrap();
        assert!(wrong.verify(&sig).unwrap_err().is_verification_failure());
    }

    #[test]
    fn test_unresolvable_reference_is_a_verification_error() {
        sink::install_callback();
        let doc = Document::parse(SAMPLE).unwrap();
        let sig = tmpl::create_signature(&doc, &transform::EXCL_C14N, &transform::HMAC_SHA1, None, None).unwrap();
        doc.root_element().unwrap().append_child(&sig).unwrap();
        tmpl::add_reference(&sig, &transform::SHA1, None, Some("#missing"), None).unwrap();

        let mut ctx = SignatureContext::new(None);
        ctx.set_key(&hmac_key(b"k")).unwrap();
        let err = ctx.verify(&sig).unwrap_err();
        assert!(matches!(err, Error::Verification(ref e) if e.context == "failed to verify"));
    }

    #[test]
    fn test_key_from_manager_by_name() {
        sink::install_callback();
        let key = hmac_key(b"named secret");
        key.set_name(Some("hmac")).unwrap();
        let mut manager = KeysManager::new();
        manager.add_key(&key).unwrap();
        let manager = Arc::new(manager);

        let doc = Document::parse(SAMPLE).unwrap();
        let sig = enveloped(&doc, &transform::EXCL_C14N, &transform::HMAC_SHA256);
        let key_info = tmpl::ensure_key_info(&sig, None).unwrap();
        tmpl::add_key_name(&key_info, None).unwrap();

        let mut signer = SignatureContext::new(None);
        signer.set_key(&key).unwrap();
        signer.sign(&sig).unwrap();
        assert_eq!(sig.find_node("KeyName", ns::DSIG).unwrap().text(), "hmac");

        let mut verifier = SignatureContext::new(Some(manager.clone()));
        verifier.verify(&sig).unwrap();

        // With key names disabled the manager falls back to its first key.
        let mut verifier = SignatureContext::new(Some(manager));
        verifier
            .set_enabled_key_data(&[Descriptor::KeyData(&key_data::VALUE_DATA)])
            .unwrap();
        verifier.verify(&sig).unwrap();
    }

    #[test]
    fn test_disabled_signature_method_is_refused() {
        sink::install_callback();
        let doc = Document::parse(SAMPLE).unwrap();
        let sig = enveloped(&doc, &transform::EXCL_C14N, &transform::HMAC_SHA256);
        let mut signer = SignatureContext::new(None);
        signer.set_key(&hmac_key(b"k")).unwrap();
        signer.sign(&sig).unwrap();

        let mut ctx = SignatureContext::new(None);
        ctx.set_key(&hmac_key(b"k")).unwrap();
        ctx.enable_signature_transform(&transform::EXCL_C14N).unwrap();
        let err = ctx.verify(&sig).unwrap_err();
        assert!(err.record().unwrap().message.contains("not enabled"));

        ctx.enable_signature_transform(&transform::HMAC_SHA256).unwrap();
        ctx.verify(&sig).unwrap();
    }

    #[test]
    fn test_certificate_key_verifies_against_trusted_root() {
        sink::install_callback();
        let signed = signed_with_certificate();
        let manager = manager_at_2030(&[(CA_CERT, CertType::Trusted), (INTERMEDIATE_CERT, CertType::Untrusted)]);
        let mut verifier = SignatureContext::new(Some(manager));
        verifier.verify(&signature_of(&signed)).unwrap();
        assert_eq!(verifier.status(), TransformStatus::Succeeded);
    }

    #[test]
    fn test_untrusted_certificate_key_is_rejected() {
        sink::install_callback();
        let signed = signed_with_certificate();

        let mut verifier = SignatureContext::new(None);
        assert!(verifier.verify(&signature_of(&signed)).unwrap_err().is_verification_failure());

        let empty = manager_at_2030(&[]);
        let mut verifier = SignatureContext::new(Some(empty));
        assert!(verifier.verify(&signature_of(&signed)).unwrap_err().is_verification_failure());

        // Without the intermediate the leaf does not reach the root.
        let root_only = manager_at_2030(&[(CA_CERT, CertType::Trusted)]);
        let mut verifier = SignatureContext::new(Some(root_only));
        assert!(verifier.verify(&signature_of(&signed)).unwrap_err().is_verification_failure());

        let leaf_untrusted = manager_at_2030(&[(LEAF_CERT, CertType::Untrusted)]);
        let mut verifier = SignatureContext::new(Some(leaf_untrusted));
        let err = verifier.verify(&signature_of(&signed)).unwrap_err();
        assert!(err.is_verification_failure());
        assert_eq!(verifier.status(), TransformStatus::Failed);
    }

    #[test]
    fn test_tampered_signature_value_is_rejected() {
        sink::install_callback();
        let (_doc, sig) = signed_hmac(b"k");
        flip_signature_value(&sig, 3);
        let mut verifier = SignatureContext::new(None);
        verifier.set_key(&hmac_key(b"k")).unwrap();
        let err = verifier.verify(&sig).unwrap_err();
        assert!(err.is_verification_failure());
        assert_eq!(err.record().unwrap().message, "Signature is invalid.");
    }

    #[test]
    fn test_trailing_whitespace_in_signed_content_is_rejected() {
        sink::install_callback();
        let (doc, sig) = signed_hmac(b"k");
        let mut verifier = SignatureContext::new(None);
        verifier.set_key(&hmac_key(b"k")).unwrap();
        verifier.verify(&sig).unwrap();

        let data = doc.root_element().unwrap().children()[0].clone();
        data.append_text(" \n").unwrap();
        let mut verifier = SignatureContext::new(None);
        verifier.set_key(&hmac_key(b"k")).unwrap();
        let err = verifier.verify(&sig).unwrap_err();
        assert!(err.is_verification_failure());
        assert_eq!(verifier.status(), TransformStatus::Failed);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn test_hmac_binary_round_trip(
            secret in proptest::collection::vec(any::<u8>(), 1..64),
            data in proptest::collection::vec(any::<u8>(), 0..256),
            flip in any::<usize>(),
        ) {
            let key = hmac_key(&secret);
            let mut signer = SignatureContext::new(None);
            signer.set_key(&key).unwrap();
            let sig = signer.sign_binary(&data, &transform::HMAC_SHA256).unwrap();

            let mut verifier = SignatureContext::new(None);
            verifier.set_key(&key).unwrap();
            prop_assert!(verifier.verify_binary(&data, &transform::HMAC_SHA256, &sig).is_ok());

            let mut tampered = sig.clone();
            let i = flip % tampered.len();
            tampered[i] ^= 0x01;
            let mut verifier = SignatureContext::new(None);
            verifier.set_key(&key).unwrap();
            let err = verifier.verify_binary(&data, &transform::HMAC_SHA256, &tampered).unwrap_err();
            prop_assert!(err.is_verification_failure());
        }

        #[test]
        fn test_stored_signature_value_tampering(
            secret in proptest::collection::vec(any::<u8>(), 1..64),
            flip in any::<usize>(),
        ) {
            let (_doc, sig) = signed_hmac(&secret);
            flip_signature_value(&sig, flip);
            let mut verifier = SignatureContext::new(None);
            verifier.set_key(&hmac_key(&secret)).unwrap();
            let err = verifier.verify(&sig).unwrap_err();
            prop_assert!(err.is_verification_failure());
        }
    }
}
