#![forbid(unsafe_code)]

//! XML Encryption: filling an `<EncryptedData>` template.
//!
//! 1. Read the `EncryptionMethod` and instantiate its cipher
//! 2. Pick the data key: with `<EncryptedKey>` children under `<KeyInfo>`, a
//!    session key that each `<EncryptedKey>` then carries; otherwise the
//!    context key or one found through `<KeyInfo>`
//! 3. Encrypt and store the ciphertext in `<CipherValue>`

use ulriksdal_core::{encoding, ns, Error, Result};
use ulriksdal_crypto::{cipher, KeyMaterial};
use ulriksdal_keys::write_key_info;
use ulriksdal_transforms::{engine, KeyUse};
use ulriksdal_xml::Element;

use crate::context::EncryptionContext;
use crate::keys::{cipher_value_of, encrypted_keys, find_key, href, key_info_of, method_of, seal_session_key, symmetric};

/// Encrypt `plaintext` into the `<EncryptedData>` template `enc`.
pub(crate) fn encrypt(ctx: &EncryptionContext, enc: &Element, plaintext: &[u8]) -> Result<()> {
    if enc.is_freed() || !enc.is_named(ns::ENC, ns::node::ENCRYPTED_DATA) {
        return Err(Error::XmlStructure(format!(
            "expected EncryptedData, got {}",
            enc.qualified_name()
        )));
    }
    let desc = method_of(enc)?;
    let algorithm = cipher::from_uri(href(desc)?)?;
    let key_info = key_info_of(enc);
    let carriers = encrypted_keys(key_info.as_ref());

    let data_key = if carriers.is_empty() {
        let key = find_key(ctx, ctx.key.as_ref(), desc, KeyUse::Encrypt, key_info.as_ref())?;
        let bytes = symmetric(&key.material()?)?.to_vec();
        if let Some(key_info) = &key_info {
            write_key_info(key_info, &key, &ctx.key_data)?;
        }
        bytes
    } else {
        let requirement = engine::key_requirement(desc, KeyUse::Encrypt)?;
        let bound = ctx.key.as_ref().filter(|k| k.matches(&requirement));
        let session = match bound {
            Some(key) => symmetric(&key.material()?)?.to_vec(),
            None => KeyMaterial::random_bytes(algorithm.key_size() * 8)?,
        };
        // A bound key used as the session key must not also protect it.
        let sealer = if bound.is_some() { None } else { ctx.key.as_ref() };
        for carrier in &carriers {
            if carrier_is_filled(carrier) {
                continue;
            }
            seal_session_key(ctx, sealer, carrier, &session)?;
        }
        session
    };

    let ciphertext = algorithm.encrypt(&data_key, plaintext)?;
    cipher_value_of(enc)?.set_text(&encoding::encode(&ciphertext))?;
    tracing::debug!(
        method = desc.name,
        plaintext = plaintext.len(),
        ciphertext = ciphertext.len(),
        carriers = carriers.len(),
        "data encrypted"
    );
    Ok(())
}

/// An `<EncryptedKey>` that already holds cipher data is left alone.
fn carrier_is_filled(carrier: &Element) -> bool {
    carrier
        .find_child(ns::node::CIPHER_DATA, ns::ENC)
        .and_then(|cd| cd.find_child(ns::node::CIPHER_VALUE, ns::ENC))
        .is_some_and(|cv| !cv.text().trim().is_empty())
}
