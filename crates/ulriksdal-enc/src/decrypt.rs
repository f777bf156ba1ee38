#![forbid(unsafe_code)]

//! XML Encryption: recovering the plaintext of `<EncryptedData>` and
//! `<EncryptedKey>` elements.
//!
//! For `<EncryptedData>`, every `<EncryptedKey>` under `<KeyInfo>` is tried
//! first; the first one that yields a session key the cipher accepts wins.
//! Then the context key and the rest of `<KeyInfo>` are tried.

use ulriksdal_core::{ns, Error, Result};
use ulriksdal_crypto::cipher;
use ulriksdal_transforms::KeyUse;
use ulriksdal_xml::Element;

use crate::context::EncryptionContext;
use crate::keys::{encrypted_keys, find_key, href, key_info_of, method_of, open_session_key, read_cipher_data, symmetric};

/// Plaintext octets of `node`, an `<EncryptedData>` or `<EncryptedKey>`.
pub(crate) fn decrypt(ctx: &EncryptionContext, node: &Element) -> Result<Vec<u8>> {
    if node.is_freed() {
        return Err(Error::XmlStructure("node has been freed".into()));
    }
    if node.is_named(ns::ENC, ns::node::ENCRYPTED_KEY) {
        return open_session_key(ctx, node);
    }
    if !node.is_named(ns::ENC, ns::node::ENCRYPTED_DATA) {
        return Err(Error::XmlStructure(format!(
            "expected EncryptedData or EncryptedKey, got {}",
            node.qualified_name()
        )));
    }

    let desc = method_of(node)?;
    let algorithm = cipher::from_uri(href(desc)?)?;
    let ciphertext = read_cipher_data(node)?;
    let key_info = key_info_of(node);

    for carrier in encrypted_keys(key_info.as_ref()) {
        match open_session_key(ctx, &carrier) {
            Ok(mut session) => {
                // Some producers carry more key material than the cipher uses.
                if session.len() > algorithm.key_size() {
                    session.truncate(algorithm.key_size());
                }
                match algorithm.decrypt(&session, &ciphertext) {
                    Ok(plaintext) => return Ok(plaintext),
                    Err(e) => tracing::debug!(error = %e, "session key rejected by cipher"),
                }
            }
            Err(e) => tracing::debug!(error = %e, "EncryptedKey could not be opened"),
        }
    }

    let key = find_key(ctx, ctx.key.as_ref(), desc, KeyUse::Decrypt, key_info.as_ref())?;
    let plaintext = algorithm.decrypt(symmetric(&key.material()?)?, &ciphertext)?;
    tracing::debug!(method = desc.name, len = plaintext.len(), "data decrypted");
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulriksdal_core::registry::transform;
    use ulriksdal_core::{encoding, KeyDataClass};
    use ulriksdal_crypto::KeyMaterial;
    use ulriksdal_keys::Key;
    use ulriksdal_template::{self as tmpl, EncryptedDataOptions};
    use ulriksdal_xml::Document;

    fn aes_key(byte: u8) -> Key {
        Key::from_binary_data(KeyDataClass::Aes, &[byte; 16]).unwrap()
    }

    fn encrypted(doc: &Document, method: &'static ulriksdal_core::TransformDescriptor, key: &Key, data: &[u8]) -> Element {
        let enc = tmpl::create_encrypted_data(doc, method, EncryptedDataOptions::default()).unwrap();
        let mut ctx = EncryptionContext::new(None);
        ctx.set_key(key).unwrap();
        crate::encrypt::encrypt(&ctx, &enc, data).unwrap();
        enc
    }

    #[test]
    fn test_context_key_decrypts() {
        let doc = Document::parse("<Envelope/>").unwrap();
        let enc = encrypted(&doc, &transform::AES128_CBC, &aes_key(1), b"payload");
        let mut ctx = EncryptionContext::new(None);
        ctx.set_key(&aes_key(1)).unwrap();
        assert_eq!(decrypt(&ctx, &enc).unwrap(), b"payload");
    }

    #[test]
    fn test_wrong_key_fails() {
        let doc = Document::parse("<Envelope/>").unwrap();
        // GCM authenticates, so a wrong key can never pass by chance.
        let enc = encrypted(&doc, &transform::AES128_GCM, &aes_key(1), b"payload");
        let mut ctx = EncryptionContext::new(None);
        ctx.set_key(&aes_key(2)).unwrap();
        assert!(decrypt(&ctx, &enc).is_err());
    }

    #[test]
    fn test_encrypted_key_node_yields_session_key() {
        let doc = Document::parse("<Envelope/>").unwrap();
        let enc = tmpl::create_encrypted_data(&doc, &transform::AES256_CBC, EncryptedDataOptions::default()).unwrap();
        let key_info = tmpl::encrypted_data_ensure_key_info(&enc, None, None).unwrap();
        let carrier = tmpl::add_encrypted_key(&key_info, &transform::KW_AES128, None, None, None).unwrap();

        // The bound key is too short for AES-256, so it wraps a fresh session key.
        let mut ctx = EncryptionContext::new(None);
        ctx.set_key(&aes_key(9)).unwrap();
        crate::encrypt::encrypt(&ctx, &enc, b"secret").unwrap();

        let session = decrypt(&ctx, &carrier).unwrap();
        assert_eq!(session.len(), 32);
        assert_eq!(decrypt(&ctx, &enc).unwrap(), b"secret");
    }

    #[test]
    fn test_cipher_reference_to_local_data() {
        let key = aes_key(3);
        let ciphertext = cipher::from_uri(transform::AES128_CBC.href.unwrap())
            .unwrap()
            .encrypt(&[3u8; 16], b"referenced")
            .unwrap();
        let xml = format!(
            concat!(
                r#"<root><blob Id="c">{}</blob>"#,
                r#"<e:EncryptedData xmlns:e="http://www.w3.org/2001/04/xmlenc#">"#,
                r#"<e:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes128-cbc"/>"#,
                r##"<e:CipherData><e:CipherReference URI="#c"><e:Transforms>"##,
                r#"<ds:Transform xmlns:ds="http://www.w3.org/2000/09/xmldsig#" Algorithm="http://www.w3.org/2000/09/xmldsig#base64"/>"#,
                r#"</e:Transforms></e:CipherReference></e:CipherData></e:EncryptedData></root>"#
            ),
            encoding::encode(&ciphertext)
        );
        let doc = Document::parse(&xml).unwrap();
        let enc = doc.root_element().unwrap().find_node("EncryptedData", ns::ENC).unwrap();
        let mut ctx = EncryptionContext::new(None);
        ctx.set_key(&key).unwrap();
        assert_eq!(decrypt(&ctx, &enc).unwrap(), b"referenced");
    }

    #[test]
    fn test_session_key_longer_than_cipher_key_is_truncated() {
        let kek = aes_key(5);
        let session = KeyMaterial::random_bytes(256).unwrap();
        let ciphertext = cipher::from_uri(transform::AES128_CBC.href.unwrap())
            .unwrap()
            .encrypt(&session[..16], b"short key")
            .unwrap();
        let wrapped = ulriksdal_crypto::keywrap::from_uri(transform::KW_AES128.href.unwrap())
            .unwrap()
            .wrap(&[5u8; 16], &session)
            .unwrap();
        let xml = format!(
            concat!(
                r#"<e:EncryptedData xmlns:e="http://www.w3.org/2001/04/xmlenc#" xmlns:ds="http://www.w3.org/2000/09/xmldsig#">"#,
                r#"<e:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes128-cbc"/>"#,
                r#"<ds:KeyInfo><e:EncryptedKey>"#,
                r#"<e:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#kw-aes128"/>"#,
                r#"<e:CipherData><e:CipherValue>{}</e:CipherValue></e:CipherData></e:EncryptedKey></ds:KeyInfo>"#,
                r#"<e:CipherData><e:CipherValue>{}</e:CipherValue></e:CipherData></e:EncryptedData>"#
            ),
            encoding::encode(&wrapped),
            encoding::encode(&ciphertext)
        );
        let doc = Document::parse(&xml).unwrap();
        let mut ctx = EncryptionContext::new(None);
        ctx.set_key(&kek).unwrap();
        assert_eq!(decrypt(&ctx, &doc.root_element().unwrap()).unwrap(), b"short key");
    }
}
