#![forbid(unsafe_code)]

//! Typed errors without any explicit sink setup. Nothing in this binary
//! installs the error callback or runs library init.

use ulriksdal_core::registry::transform;
use ulriksdal_core::{ns, sink, Error};
use ulriksdal_dsig::SignatureContext;
use ulriksdal_keys::{Key, KeyFormat};
use ulriksdal_template as tmpl;
use ulriksdal_xml::Document;

#[test]
fn test_sign_without_key_is_a_sign_error() {
    assert!(sink::is_installed());
    let doc = Document::parse("<root><item>value</item></root>").unwrap();
    let sig = tmpl::create_signature(&doc, &transform::EXCL_C14N, &transform::HMAC_SHA256, None, None).unwrap();
    doc.root_element().unwrap().append_child(&sig).unwrap();
    tmpl::add_reference(&sig, &transform::SHA256, None, Some(""), None).unwrap();

    let mut ctx = SignatureContext::new(None);
    let err = ctx.sign(&sig).unwrap_err();
    assert!(matches!(err, Error::Sign(ref e) if e.context == "failed to sign"), "{err:?}");
    assert!(err.record().is_some());
}

#[test]
fn test_missing_reference_is_a_verification_error() {
    let doc = Document::parse("<root><item>value</item></root>").unwrap();
    let sig = tmpl::create_signature(&doc, &transform::EXCL_C14N, &transform::HMAC_SHA256, None, None).unwrap();
    doc.root_element().unwrap().append_child(&sig).unwrap();
    tmpl::add_reference(&sig, &transform::SHA256, None, Some("#missing"), None).unwrap();
    assert!(doc.root_element().unwrap().find_node("Reference", ns::DSIG).is_some());

    let mut ctx = SignatureContext::new(None);
    ctx.set_key(&Key::generate(ulriksdal_core::KeyDataClass::Hmac, 128).unwrap()).unwrap();
    let err = ctx.verify(&sig).unwrap_err();
    assert!(err.is_verification_failure(), "{err:?}");
}

#[test]
fn test_garbage_key_is_a_load_error() {
    let err = Key::from_memory(b"garbage", KeyFormat::Pem, None).unwrap_err();
    assert!(matches!(err, Error::Load(_)), "{err:?}");
}
