#![forbid(unsafe_code)]

//! Template builders for the Ulriksdal XML Security library.
//!
//! These functions grow `<Signature>` and `<EncryptedData>` skeletons that
//! the signature and encryption contexts later fill in. They perform no
//! cryptography. A structural failure (wrong parent, freed node) surfaces
//! as [`Error::Template`](ulriksdal_core::Error::Template) carrying the
//! engine diagnostic.

pub mod encryption;
pub mod signature;

pub use encryption::{
    add_encrypted_key, create_encrypted_data, encrypted_data_ensure_cipher_value,
    encrypted_data_ensure_key_info, EncryptedDataOptions,
};
pub use signature::{
    add_c14n_inclusive_namespaces, add_key_name, add_key_value, add_reference, add_transform,
    add_x509_data, create_signature, ensure_key_info, x509_data_add_certificate, x509_data_add_crl,
    x509_data_add_issuer_serial, x509_data_add_ski, x509_data_add_subject_name,
    x509_issuer_serial_add_issuer_name, x509_issuer_serial_add_serial_number,
};

use ulriksdal_core::sink::{self, ErrorKind};
use ulriksdal_core::{Error, ReportExt, Result, TransformDescriptor};
use ulriksdal_xml::{Document, Element, QName};

/// Report a structural failure and surface it as a template error.
#[track_caller]
pub(crate) fn finish<T>(result: Result<T>, function: &str, message: &str) -> Result<T> {
    match result.reported(function) {
        Ok(v) => {
            tracing::trace!(function, "template node added");
            Ok(v)
        }
        Err(_) => Err(sink::take_last_error(ErrorKind::Template, message)),
    }
}

/// A new element of `doc`, not yet attached, declaring its own namespace.
pub(crate) fn create_detached(doc: &Document, ns_uri: &str, prefix: Option<&str>, local: &str) -> Element {
    let id = {
        let mut tree = doc.tree_mut();
        let id = tree.create_element(QName::new(Some(ns_uri), prefix, local));
        tree.declare_namespace(id, prefix, ns_uri);
        id
    };
    doc.wrap(id)
}

/// `node` must be `local` in `ns_uri`.
pub(crate) fn expect_node(node: &Element, ns_uri: &str, local: &str) -> Result<()> {
    if node.is_freed() {
        return Err(Error::XmlStructure(format!("{local} node has been freed")));
    }
    if !node.is_named(ns_uri, local) {
        return Err(Error::XmlStructure(format!(
            "expected {local}, got {}",
            node.qualified_name()
        )));
    }
    Ok(())
}

/// Append `local` with its `Algorithm` attribute set to `method`.
pub(crate) fn append_method(parent: &Element, ns_uri: &str, local: &str, method: &TransformDescriptor) -> Result<Element> {
    let href = method
        .href
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("{} has no algorithm URI", method.name)))?;
    let node = parent.append_element(ns_uri, None, local)?;
    node.set_attribute(ulriksdal_core::ns::attr::ALGORITHM, href);
    Ok(node)
}

pub(crate) fn set_optional(node: &Element, attr: &str, value: Option<&str>) {
    if let Some(v) = value {
        node.set_attribute(attr, v);
    }
}
