#![forbid(unsafe_code)]

//! `<Signature>` templates and the `<KeyInfo>` children they carry.

use ulriksdal_core::ns::{self, attr, node};
use ulriksdal_core::{Result, TransformDescriptor};
use ulriksdal_xml::{Document, Element};

use crate::{append_method, create_detached, expect_node, finish, set_optional};

/// Create a detached `<Signature>` in `doc` with `<SignedInfo>` (holding the
/// canonicalization and signature methods) and an empty `<SignatureValue>`.
///
/// With no `ns_prefix` the XML-DSig namespace becomes the default namespace.
#[track_caller]
pub fn create_signature(
    doc: &Document,
    c14n_method: &'static TransformDescriptor,
    sign_method: &'static TransformDescriptor,
    id: Option<&str>,
    ns_prefix: Option<&str>,
) -> Result<Element> {
    let build = || -> Result<Element> {
        let signature = create_detached(doc, ns::DSIG, ns_prefix, node::SIGNATURE);
        set_optional(&signature, attr::ID, id);
        let signed_info = signature.append_element(ns::DSIG, None, node::SIGNED_INFO)?;
        append_method(&signed_info, ns::DSIG, node::CANONICALIZATION_METHOD, c14n_method)?;
        append_method(&signed_info, ns::DSIG, node::SIGNATURE_METHOD, sign_method)?;
        signature.append_element(ns::DSIG, None, node::SIGNATURE_VALUE)?;
        Ok(signature)
    };
    finish(build(), "create_signature", "cannot create template.")
}

/// Append a `<Reference>` with its `<DigestMethod>` and empty
/// `<DigestValue>` to the signature's `<SignedInfo>`.
#[track_caller]
pub fn add_reference(
    signature: &Element,
    digest_method: &'static TransformDescriptor,
    id: Option<&str>,
    uri: Option<&str>,
    type_: Option<&str>,
) -> Result<Element> {
    let build = || -> Result<Element> {
        expect_node(signature, ns::DSIG, node::SIGNATURE)?;
        let signed_info = signature
            .find_child(node::SIGNED_INFO, ns::DSIG)
            .ok_or_else(|| ulriksdal_core::Error::MissingElement(node::SIGNED_INFO.into()))?;
        let reference = signed_info.append_element(ns::DSIG, None, node::REFERENCE)?;
        set_optional(&reference, attr::ID, id);
        set_optional(&reference, attr::URI, uri);
        set_optional(&reference, attr::TYPE, type_);
        append_method(&reference, ns::DSIG, node::DIGEST_METHOD, digest_method)?;
        reference.append_element(ns::DSIG, None, node::DIGEST_VALUE)?;
        Ok(reference)
    };
    finish(build(), "add_reference", "cannot add reference.")
}

/// Append a `<Transform>` to the reference's `<Transforms>`, creating that
/// list in front of `<DigestMethod>` if needed.
#[track_caller]
pub fn add_transform(reference: &Element, transform: &'static TransformDescriptor) -> Result<Element> {
    let build = || -> Result<Element> {
        expect_node(reference, ns::DSIG, node::REFERENCE)?;
        let transforms = match reference.find_child(node::TRANSFORMS, ns::DSIG) {
            Some(t) => t,
            None => {
                let t = reference.append_element(ns::DSIG, None, node::TRANSFORMS)?;
                reference.insert_child(0, &t)?;
                t
            }
        };
        append_method(&transforms, ns::DSIG, node::TRANSFORM, transform)
    };
    finish(build(), "add_transform", "cannot add transform.")
}

/// Add `<ec:InclusiveNamespaces PrefixList="...">` under a transform or
/// canonicalization method node.
#[track_caller]
pub fn add_c14n_inclusive_namespaces(method: &Element, prefixes: &[&str]) -> Result<Element> {
    let build = || -> Result<Element> {
        if method.attribute(attr::ALGORITHM).is_none() {
            return Err(ulriksdal_core::Error::XmlStructure(format!(
                "{} has no Algorithm",
                method.qualified_name()
            )));
        }
        if method.find_child(node::INCLUSIVE_NAMESPACES, ns::EXC_C14N).is_some() {
            return Err(ulriksdal_core::Error::XmlStructure("InclusiveNamespaces already present".into()));
        }
        let list = method.append_element(ns::EXC_C14N, Some(ns::EXC_C14N_PREFIX), node::INCLUSIVE_NAMESPACES)?;
        list.set_attribute(attr::PREFIX_LIST, &prefixes.join(" "));
        Ok(list)
    };
    finish(build(), "add_c14n_inclusive_namespaces", "cannot add inclusive namespaces.")
}

/// The signature's `<KeyInfo>`, added after `<SignatureValue>` if missing.
#[track_caller]
pub fn ensure_key_info(signature: &Element, id: Option<&str>) -> Result<Element> {
    let build = || -> Result<Element> {
        expect_node(signature, ns::DSIG, node::SIGNATURE)?;
        if let Some(existing) = signature.find_child(node::KEY_INFO, ns::DSIG) {
            return Ok(existing);
        }
        let value = signature
            .find_child(node::SIGNATURE_VALUE, ns::DSIG)
            .ok_or_else(|| ulriksdal_core::Error::MissingElement(node::SIGNATURE_VALUE.into()))?;
        let key_info = signature.append_element(ns::DSIG, None, node::KEY_INFO)?;
        let after_value = value.index_in_parent().map_or(0, |i| i + 1);
        signature.insert_child(after_value, &key_info)?;
        set_optional(&key_info, attr::ID, id);
        Ok(key_info)
    };
    finish(build(), "ensure_key_info", "cannot ensure key info.")
}

fn key_info_child(key_info: &Element, local: &str) -> Result<Element> {
    expect_node(key_info, ns::DSIG, node::KEY_INFO)?;
    key_info.append_element(ns::DSIG, None, local)
}

#[track_caller]
pub fn add_key_name(key_info: &Element, name: Option<&str>) -> Result<Element> {
    let build = || -> Result<Element> {
        let key_name = key_info_child(key_info, node::KEY_NAME)?;
        if let Some(name) = name {
            key_name.set_text(name)?;
        }
        Ok(key_name)
    };
    finish(build(), "add_key_name", "cannot add key name.")
}

#[track_caller]
pub fn add_key_value(key_info: &Element) -> Result<Element> {
    finish(key_info_child(key_info, node::KEY_VALUE), "add_key_value", "cannot add key value.")
}

#[track_caller]
pub fn add_x509_data(key_info: &Element) -> Result<Element> {
    finish(key_info_child(key_info, node::X509_DATA), "add_x509_data", "cannot add x509 data.")
}

fn x509_child(x509_data: &Element, local: &str) -> Result<Element> {
    expect_node(x509_data, ns::DSIG, node::X509_DATA)?;
    x509_data.append_element(ns::DSIG, None, local)
}

#[track_caller]
pub fn x509_data_add_issuer_serial(x509_data: &Element) -> Result<Element> {
    finish(
        x509_child(x509_data, node::X509_ISSUER_SERIAL),
        "x509_data_add_issuer_serial",
        "cannot add x509 issuer serial.",
    )
}

#[track_caller]
pub fn x509_data_add_subject_name(x509_data: &Element) -> Result<Element> {
    finish(
        x509_child(x509_data, node::X509_SUBJECT_NAME),
        "x509_data_add_subject_name",
        "cannot add x509 subject name.",
    )
}

#[track_caller]
pub fn x509_data_add_ski(x509_data: &Element) -> Result<Element> {
    finish(x509_child(x509_data, node::X509_SKI), "x509_data_add_ski", "cannot add x509 SKI.")
}

#[track_caller]
pub fn x509_data_add_certificate(x509_data: &Element) -> Result<Element> {
    finish(
        x509_child(x509_data, node::X509_CERTIFICATE),
        "x509_data_add_certificate",
        "cannot add x509 certificate.",
    )
}

#[track_caller]
pub fn x509_data_add_crl(x509_data: &Element) -> Result<Element> {
    finish(x509_child(x509_data, node::X509_CRL), "x509_data_add_crl", "cannot add x509 CRL.")
}

fn issuer_serial_child(issuer_serial: &Element, local: &str, text: Option<&str>) -> Result<Element> {
    expect_node(issuer_serial, ns::DSIG, node::X509_ISSUER_SERIAL)?;
    let child = issuer_serial.append_element(ns::DSIG, None, local)?;
    if let Some(text) = text {
        child.set_text(text)?;
    }
    Ok(child)
}

#[track_caller]
pub fn x509_issuer_serial_add_issuer_name(issuer_serial: &Element, name: Option<&str>) -> Result<Element> {
    finish(
        issuer_serial_child(issuer_serial, node::X509_ISSUER_NAME, name),
        "x509_issuer_serial_add_issuer_name",
        "cannot add x509 issuer serial name.",
    )
}

#[track_caller]
pub fn x509_issuer_serial_add_serial_number(issuer_serial: &Element, serial: Option<&str>) -> Result<Element> {
    finish(
        issuer_serial_child(issuer_serial, node::X509_SERIAL_NUMBER, serial),
        "x509_issuer_serial_add_serial_number",
        "cannot add x509 issuer serial number.",
    )
}
