#![forbid(unsafe_code)]

//! `<EncryptedData>` and `<EncryptedKey>` templates.

use ulriksdal_core::ns::{self, attr, node};
use ulriksdal_core::{Error, Result, TransformDescriptor};
use ulriksdal_xml::{Document, Element};

use crate::{append_method, create_detached, expect_node, finish, set_optional};

/// Optional attributes of a new `<EncryptedData>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncryptedDataOptions<'a> {
    pub id: Option<&'a str>,
    /// `Type`, normally [`ns::ENC_TYPE_ELEMENT`] or [`ns::ENC_TYPE_CONTENT`].
    pub type_: Option<&'a str>,
    pub mime_type: Option<&'a str>,
    pub encoding: Option<&'a str>,
    pub ns_prefix: Option<&'a str>,
}

/// `EncryptionMethod` (if any) followed by an empty `CipherData`.
fn prepare(enc: &Element, method: Option<&'static TransformDescriptor>) -> Result<()> {
    if let Some(method) = method {
        append_method(enc, ns::ENC, node::ENCRYPTION_METHOD, method)?;
    }
    enc.append_element(ns::ENC, None, node::CIPHER_DATA)?;
    Ok(())
}

/// Create a detached `<EncryptedData>` in `doc`.
#[track_caller]
pub fn create_encrypted_data(
    doc: &Document,
    method: &'static TransformDescriptor,
    options: EncryptedDataOptions<'_>,
) -> Result<Element> {
    let build = || -> Result<Element> {
        let enc = create_detached(doc, ns::ENC, options.ns_prefix, node::ENCRYPTED_DATA);
        set_optional(&enc, attr::ID, options.id);
        set_optional(&enc, attr::TYPE, options.type_);
        set_optional(&enc, attr::MIME_TYPE, options.mime_type);
        set_optional(&enc, attr::ENCODING, options.encoding);
        prepare(&enc, Some(method))?;
        Ok(enc)
    };
    finish(build(), "create_encrypted_data", "cannot create encrypted data.")
}

/// The `<ds:KeyInfo>` of an `<EncryptedData>`, placed before `<CipherData>`
/// if missing.
#[track_caller]
pub fn encrypted_data_ensure_key_info(enc: &Element, id: Option<&str>, ns_prefix: Option<&str>) -> Result<Element> {
    let build = || -> Result<Element> {
        expect_node(enc, ns::ENC, node::ENCRYPTED_DATA)?;
        if let Some(existing) = enc.find_child(node::KEY_INFO, ns::DSIG) {
            set_optional(&existing, attr::ID, id);
            return Ok(existing);
        }
        let key_info = enc.append_element(ns::DSIG, ns_prefix, node::KEY_INFO)?;
        let position = match enc.find_child(node::ENCRYPTION_METHOD, ns::ENC) {
            Some(method) => method.index_in_parent().map_or(0, |i| i + 1),
            None => 0,
        };
        enc.insert_child(position, &key_info)?;
        set_optional(&key_info, attr::ID, id);
        Ok(key_info)
    };
    finish(build(), "encrypted_data_ensure_key_info", "cannot ensure key info for encrypted data.")
}

/// The `<CipherValue>` under `<CipherData>` of an `<EncryptedData>` or
/// `<EncryptedKey>`. Fails when the cipher data is a `<CipherReference>`.
#[track_caller]
pub fn encrypted_data_ensure_cipher_value(enc: &Element) -> Result<Element> {
    let build = || -> Result<Element> {
        if !(enc.is_named(ns::ENC, node::ENCRYPTED_DATA) || enc.is_named(ns::ENC, node::ENCRYPTED_KEY)) {
            return Err(Error::XmlStructure(format!(
                "expected EncryptedData or EncryptedKey, got {}",
                enc.qualified_name()
            )));
        }
        let cipher_data = match enc.find_child(node::CIPHER_DATA, ns::ENC) {
            Some(cd) => cd,
            None => enc.append_element(ns::ENC, None, node::CIPHER_DATA)?,
        };
        if let Some(existing) = cipher_data.find_child(node::CIPHER_VALUE, ns::ENC) {
            return Ok(existing);
        }
        if cipher_data.find_child(node::CIPHER_REFERENCE, ns::ENC).is_some() {
            return Err(Error::XmlStructure("CipherData already holds a CipherReference".into()));
        }
        cipher_data.append_element(ns::ENC, None, node::CIPHER_VALUE)
    };
    finish(build(), "encrypted_data_ensure_cipher_value", "cannot ensure cipher value for encrypted data.")
}

/// Append an `<xenc:EncryptedKey>` to a `<KeyInfo>`.
#[track_caller]
pub fn add_encrypted_key(
    key_info: &Element,
    method: &'static TransformDescriptor,
    id: Option<&str>,
    type_: Option<&str>,
    recipient: Option<&str>,
) -> Result<Element> {
    let build = || -> Result<Element> {
        expect_node(key_info, ns::DSIG, node::KEY_INFO)?;
        let enc_key = key_info.append_element(ns::ENC, Some(ns::ENC_PREFIX), node::ENCRYPTED_KEY)?;
        set_optional(&enc_key, attr::ID, id);
        set_optional(&enc_key, attr::TYPE, type_);
        set_optional(&enc_key, attr::RECIPIENT, recipient);
        prepare(&enc_key, Some(method))?;
        Ok(enc_key)
    };
    finish(build(), "add_encrypted_key", "cannot add encrypted key.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulriksdal_core::registry::transform;
    use ulriksdal_core::sink;

    fn doc() -> Document {
        Document::parse("<Envelope><Data>x</Data></Envelope>").unwrap()
    }

    #[test]
    fn test_encrypted_data_attributes() {
        let doc = doc();
        let enc = create_encrypted_data(
            &doc,
            &transform::DES3_CBC,
            EncryptedDataOptions {
                id: Some("Id"),
                type_: Some("Type"),
                mime_type: Some("MimeType"),
                encoding: Some("Encoding"),
                ns_prefix: Some("test"),
            },
        )
        .unwrap();
        for a in ["Id", "Type", "MimeType", "Encoding"] {
            assert_eq!(enc.attribute(a).as_deref(), Some(a));
        }
        assert_eq!(enc.name().unwrap().prefix.as_deref(), Some("test"));
        let names: Vec<String> = enc.children().iter().map(|c| c.local_name()).collect();
        assert_eq!(names, ["EncryptionMethod", "CipherData"]);
        assert!(enc.parent().is_none());
    }

    #[test]
    fn test_ensure_key_info_and_cipher_value() {
        let doc = doc();
        let enc = create_encrypted_data(&doc, &transform::AES128_CBC, EncryptedDataOptions::default()).unwrap();
        let cv = encrypted_data_ensure_cipher_value(&enc).unwrap();
        assert!(Element::ptr_eq(&cv, &encrypted_data_ensure_cipher_value(&enc).unwrap()));

        let ki = encrypted_data_ensure_key_info(&enc, None, Some("dsig")).unwrap();
        assert_eq!(ki.name().unwrap().prefix.as_deref(), Some("dsig"));
        let again = encrypted_data_ensure_key_info(&enc, Some("Id"), None).unwrap();
        assert!(Element::ptr_eq(&ki, &again));
        assert_eq!(again.attribute("Id").as_deref(), Some("Id"));
        let names: Vec<String> = enc.children().iter().map(|c| c.local_name()).collect();
        assert_eq!(names, ["EncryptionMethod", "KeyInfo", "CipherData"]);

        let ek = add_encrypted_key(&ki, &transform::RSA_OAEP, Some("Id"), Some("Type"), Some("Recipient")).unwrap();
        for a in ["Id", "Type", "Recipient"] {
            assert_eq!(ek.attribute(a).as_deref(), Some(a));
        }
        encrypted_data_ensure_cipher_value(&ek).unwrap();
        assert!(ek.to_xml().contains(r#"Algorithm="http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p""#));
    }

    #[test]
    fn test_cipher_reference_blocks_cipher_value() {
        sink::install_callback();
        let doc = Document::parse(
            r#"<EncryptedData xmlns="http://www.w3.org/2001/04/xmlenc#"><CipherData><CipherReference URI="x"/></CipherData></EncryptedData>"#,
        )
        .unwrap();
        let enc = doc.root_element().unwrap();
        let err = encrypted_data_ensure_cipher_value(&enc).unwrap_err();
        assert!(matches!(err, Error::Template(ref e) if e.context == "cannot ensure cipher value for encrypted data."));
        assert!(matches!(
            encrypted_data_ensure_key_info(&doc.root_element().unwrap().children()[0], None, None),
            Err(Error::Template(_))
        ));
    }
}
