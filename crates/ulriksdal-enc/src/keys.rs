#![forbid(unsafe_code)]

//! Key selection for encryption methods and `<EncryptedKey>` processing.

use ulriksdal_core::registry::{self, TransformUsage};
use ulriksdal_core::{encoding, ns, Error, Result, TransformDescriptor};
use ulriksdal_crypto::{cipher, keytransport, keywrap, KeyMaterial};
use ulriksdal_keys::{Key, KeyInfoReader};
use ulriksdal_transforms::{engine, uri, KeyUse, TransformPipeline};
use ulriksdal_xml::Element;

use crate::context::EncryptionContext;

/// The `EncryptionMethod` of an `<EncryptedData>`/`<EncryptedKey>`.
pub(crate) fn method_of(enc: &Element) -> Result<&'static TransformDescriptor> {
    let method = enc
        .find_child(ns::node::ENCRYPTION_METHOD, ns::ENC)
        .ok_or_else(|| Error::MissingElement("EncryptionMethod".into()))?;
    let href = method
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingElement("Algorithm on EncryptionMethod".into()))?;
    registry::transform_by_href(&href)
        .filter(|d| d.usage.contains(TransformUsage::ENCRYPTION_METHOD))
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("encryption method: {href}")))
}

pub(crate) fn href(desc: &TransformDescriptor) -> Result<&'static str> {
    desc.href
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("{} has no algorithm URI", desc.name)))
}

pub(crate) fn key_info_of(enc: &Element) -> Option<Element> {
    enc.find_child(ns::node::KEY_INFO, ns::DSIG)
}

/// `<EncryptedKey>` children of a `<KeyInfo>`.
pub(crate) fn encrypted_keys(key_info: Option<&Element>) -> Vec<Element> {
    key_info
        .map(|ki| {
            ki.children()
                .into_iter()
                .filter(|c| c.is_named(ns::ENC, ns::node::ENCRYPTED_KEY))
                .collect()
        })
        .unwrap_or_default()
}

/// The key `desc` runs with for `usage`: `bound` when it fits, otherwise
/// one found through `key_info` and the keys manager.
pub(crate) fn find_key(
    ctx: &EncryptionContext,
    bound: Option<&Key>,
    desc: &TransformDescriptor,
    usage: KeyUse,
    key_info: Option<&Element>,
) -> Result<Key> {
    let requirement = engine::key_requirement(desc, usage)?;
    if let Some(key) = bound.filter(|k| k.matches(&requirement)) {
        return Ok(key.view());
    }
    let reader = KeyInfoReader {
        manager: ctx.manager.as_deref(),
        enabled: &ctx.key_data,
        requirement,
    };
    reader
        .resolve(key_info)?
        .ok_or_else(|| Error::Key(format!("no key found for {}", desc.name)))
}

pub(crate) fn symmetric(material: &KeyMaterial) -> Result<&[u8]> {
    material
        .symmetric_bytes()
        .ok_or_else(|| Error::Key(format!("{:?} key has no symmetric bytes", material.class())))
}

/// Octets held by `<CipherData>`: an inline `<CipherValue>` or whatever a
/// `<CipherReference>` resolves to after its transforms.
pub(crate) fn read_cipher_data(enc: &Element) -> Result<Vec<u8>> {
    let cipher_data = enc
        .find_child(ns::node::CIPHER_DATA, ns::ENC)
        .ok_or_else(|| Error::MissingElement("CipherData".into()))?;
    if let Some(value) = cipher_data.find_child(ns::node::CIPHER_VALUE, ns::ENC) {
        return encoding::decode(&value.text());
    }
    let reference = cipher_data
        .find_child(ns::node::CIPHER_REFERENCE, ns::ENC)
        .ok_or_else(|| Error::MissingElement("CipherValue or CipherReference".into()))?;
    let target = reference
        .attribute(ns::attr::URI)
        .ok_or_else(|| Error::MissingElement("URI on CipherReference".into()))?;
    let mut data = uri::resolve(&enc.document(), &target)?;
    let transforms = reference
        .find_child(ns::node::TRANSFORMS, ns::ENC)
        .or_else(|| reference.find_child(ns::node::TRANSFORMS, ns::DSIG));
    if let Some(transforms) = transforms {
        let pipeline = TransformPipeline::from_element(&transforms, enc.node_id(), &|_| true)?;
        data = pipeline.execute(data)?;
    }
    data.to_binary()
}

/// Protect `secret` with the method of `encrypted_key` and store the result
/// in its `<CipherValue>`. `bound` is the context key unless it already is
/// the session key.
pub(crate) fn seal_session_key(
    ctx: &EncryptionContext,
    bound: Option<&Key>,
    encrypted_key: &Element,
    secret: &[u8],
) -> Result<()> {
    let desc = method_of(encrypted_key)?;
    let uri = href(desc)?;
    let key = find_key(ctx, bound, desc, KeyUse::Encrypt, key_info_of(encrypted_key).as_ref())?;
    let material = key.material()?;
    let sealed = if let Ok(transport) = keytransport::from_uri(uri) {
        transport.encrypt(&material, secret)?
    } else if let Ok(kw) = keywrap::from_uri(uri) {
        kw.wrap(symmetric(&material)?, secret)?
    } else {
        cipher::from_uri(uri)?.encrypt(symmetric(&material)?, secret)?
    };
    cipher_value_of(encrypted_key)?.set_text(&encoding::encode(&sealed))?;
    tracing::debug!(method = desc.name, "session key sealed");
    Ok(())
}

/// Recover the key carried by `encrypted_key`.
pub(crate) fn open_session_key(ctx: &EncryptionContext, encrypted_key: &Element) -> Result<Vec<u8>> {
    let desc = method_of(encrypted_key)?;
    let uri = href(desc)?;
    let sealed = read_cipher_data(encrypted_key)?;
    let key = find_key(ctx, ctx.key.as_ref(), desc, KeyUse::Decrypt, key_info_of(encrypted_key).as_ref())?;
    let material = key.material()?;
    let secret = if let Ok(transport) = keytransport::from_uri(uri) {
        transport.decrypt(&material, &sealed)?
    } else if let Ok(kw) = keywrap::from_uri(uri) {
        kw.unwrap(symmetric(&material)?, &sealed)?
    } else {
        cipher::from_uri(uri)?.decrypt(symmetric(&material)?, &sealed)?
    };
    tracing::debug!(method = desc.name, len = secret.len(), "session key recovered");
    Ok(secret)
}

/// The `<CipherValue>` to fill, created under an empty `<CipherData>`.
pub(crate) fn cipher_value_of(enc: &Element) -> Result<Element> {
    let cipher_data = match enc.find_child(ns::node::CIPHER_DATA, ns::ENC) {
        Some(cd) => cd,
        None => enc.append_element(ns::ENC, None, ns::node::CIPHER_DATA)?,
    };
    if let Some(value) = cipher_data.find_child(ns::node::CIPHER_VALUE, ns::ENC) {
        return Ok(value);
    }
    if cipher_data.find_child(ns::node::CIPHER_REFERENCE, ns::ENC).is_some() {
        return Err(Error::XmlStructure("cannot write ciphertext over a CipherReference".into()));
    }
    cipher_data.append_element(ns::ENC, None, ns::node::CIPHER_VALUE)
}
