#![forbid(unsafe_code)]

//! Reading keys out of `<KeyInfo>` and filling `<KeyInfo>` templates.
//!
//! `<EncryptedKey>` children are left to the encryption context, which
//! needs a decryption pass to recover them.

use rsa::traits::PublicKeyParts;
use ulriksdal_core::ns::{self, attr, node};
use ulriksdal_core::{encoding, Error, KeyDataClass, KeyDataDescriptor, Result};
use ulriksdal_crypto::KeyMaterial;
use ulriksdal_xml::Element;

use crate::key::{Key, KeyHandle, KeyRequirement};
use crate::loader;
use crate::manager::KeysManager;

const CURVE_P256: &str = "urn:oid:1.2.840.10045.3.1.7";
const CURVE_P384: &str = "urn:oid:1.3.132.0.34";

/// Where `<KeyInfo>` lookups may search.
pub struct KeyInfoReader<'a> {
    pub manager: Option<&'a KeysManager>,
    pub enabled: &'a [&'static KeyDataDescriptor],
    pub requirement: KeyRequirement,
}

impl KeyInfoReader<'_> {
    fn enabled(&self, class: KeyDataClass) -> bool {
        self.enabled.iter().any(|d| d.class == class)
    }

    /// Resolve a key from `key_info` (which may be absent), falling back to
    /// the first manager key that meets the requirement.
    pub fn resolve(&self, key_info: Option<&Element>) -> Result<Option<Key>> {
        if let Some(ki) = key_info {
            for child in ki.children() {
                if let Some(key) = self.read_child(&child)? {
                    if key.matches(&self.requirement) {
                        return Ok(Some(key));
                    }
                    tracing::debug!(child = %child.local_name(), "KeyInfo key does not fit the method");
                }
            }
        }
        match self.manager.and_then(|m| m.find_matching(&self.requirement, None)) {
            Some(k) => k.copy().map(Some),
            None => Ok(None),
        }
    }

    fn read_child(&self, child: &Element) -> Result<Option<Key>> {
        if child.is_named(ns::DSIG, node::KEY_NAME) {
            if !self.enabled(KeyDataClass::Name) {
                return Ok(None);
            }
            let name = child.text();
            let name = name.trim();
            return match self.manager.and_then(|m| m.find_matching(&self.requirement, Some(name))) {
                Some(k) => k.copy().map(Some),
                None => Ok(None),
            };
        }
        if child.is_named(ns::DSIG, node::KEY_VALUE) {
            if !self.enabled(KeyDataClass::Value) {
                return Ok(None);
            }
            return Ok(self.read_key_value(child)?.map(Key::from_material));
        }
        if child.is_named(ns::DSIG, node::X509_DATA) {
            if !self.enabled(KeyDataClass::X509) {
                return Ok(None);
            }
            return self.read_x509_data(child);
        }
        Ok(None)
    }

    fn read_key_value(&self, key_value: &Element) -> Result<Option<KeyMaterial>> {
        for value in key_value.children() {
            if value.is_named(ns::DSIG, node::RSA_KEY_VALUE) && self.enabled(KeyDataClass::Rsa) {
                return parse_rsa_key_value(&value).map(Some);
            }
            let is_ec = value.is_named(ns::DSIG11, node::EC_KEY_VALUE)
                || value.is_named(ns::DSIG, node::EC_KEY_VALUE);
            if is_ec && self.enabled(KeyDataClass::Ec) {
                return parse_ec_key_value(&value).map(Some);
            }
        }
        Ok(None)
    }

    /// The leaf certificate's key, provided the leaf chains to a trusted
    /// certificate of the manager.
    fn read_x509_data(&self, x509: &Element) -> Result<Option<Key>> {
        let mut certs = Vec::new();
        for cert in x509.children() {
            if cert.is_named(ns::DSIG, node::X509_CERTIFICATE) {
                certs.push(encoding::decode(&cert.text())?);
            }
        }
        let Some(leaf) = certs.first() else {
            return Ok(None);
        };
        let Some(manager) = self.manager else {
            tracing::debug!("no keys manager to verify X509Data against");
            return Ok(None);
        };
        if let Err(e) = manager.verify_cert(leaf, &certs) {
            tracing::debug!(error = %e, "X509Data certificate not trusted");
            return Ok(None);
        }
        let material = loader::cert_public_key(leaf)?;
        Ok(Some(Key::from_handle(KeyHandle {
            material,
            name: None,
            certs,
        })))
    }
}

fn child_text(parent: &Element, local: &str) -> Result<String> {
    parent
        .children()
        .into_iter()
        .find(|c| c.local_name() == local)
        .map(|c| c.text())
        .ok_or_else(|| Error::MissingElement(local.into()))
}

pub fn parse_rsa_key_value(rsa_kv: &Element) -> Result<KeyMaterial> {
    let n = encoding::decode(&child_text(rsa_kv, node::RSA_MODULUS)?)?;
    let e = encoding::decode(&child_text(rsa_kv, node::RSA_EXPONENT)?)?;
    let public = rsa::RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(&n),
        rsa::BigUint::from_bytes_be(&e),
    )
    .map_err(|err| Error::Key(format!("invalid RSA public key: {err}")))?;
    Ok(KeyMaterial::rsa_public(public))
}

pub fn parse_ec_key_value(ec_kv: &Element) -> Result<KeyMaterial> {
    let curve = ec_kv
        .children()
        .into_iter()
        .find(|c| c.local_name() == node::NAMED_CURVE)
        .and_then(|c| c.attribute(attr::URI))
        .ok_or_else(|| Error::MissingElement(node::NAMED_CURVE.into()))?;
    let point = encoding::decode(&child_text(ec_kv, node::PUBLIC_KEY)?)?;
    match curve.as_str() {
        CURVE_P256 => {
            let public = p256::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                .map_err(|e| Error::Key(format!("invalid P-256 point: {e}")))?;
            Ok(KeyMaterial::EcP256 {
                private: None,
                public,
            })
        }
        CURVE_P384 => {
            let public = p384::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                .map_err(|e| Error::Key(format!("invalid P-384 point: {e}")))?;
            Ok(KeyMaterial::EcP384 {
                private: None,
                public,
            })
        }
        other => Err(Error::UnsupportedAlgorithm(format!("EC curve: {other}"))),
    }
}

/// Fill the empty `KeyName`, `KeyValue` and `X509Data` children of a
/// `<KeyInfo>` template from `key`.
pub fn write_key_info(key_info: &Element, key: &Key, enabled: &[&'static KeyDataDescriptor]) -> Result<()> {
    let allowed = |class: KeyDataClass| enabled.iter().any(|d| d.class == class);
    let (material, name, certs) = key.read(|h| (h.material.clone(), h.name.clone(), h.certs.clone()))?;
    for child in key_info.children() {
        let is_empty = child.child_nodes().is_empty();
        if !is_empty {
            continue;
        }
        if child.is_named(ns::DSIG, node::KEY_NAME) && allowed(KeyDataClass::Name) {
            if let Some(name) = &name {
                child.set_text(name)?;
            }
        } else if child.is_named(ns::DSIG, node::KEY_VALUE) && allowed(KeyDataClass::Value) {
            write_key_value(&child, &material)?;
        } else if child.is_named(ns::DSIG, node::X509_DATA) && allowed(KeyDataClass::X509) {
            for der in &certs {
                let prefix = child.name().and_then(|q| q.prefix);
                child
                    .append_element(ns::DSIG, prefix.as_deref(), node::X509_CERTIFICATE)?
                    .set_text(&encoding::encode(der))?;
            }
        }
    }
    Ok(())
}

fn write_key_value(key_value: &Element, material: &KeyMaterial) -> Result<()> {
    let prefix = key_value.name().and_then(|q| q.prefix);
    let prefix = prefix.as_deref();
    match material {
        KeyMaterial::Rsa { public, .. } => {
            let rsa_kv = key_value.append_element(ns::DSIG, prefix, node::RSA_KEY_VALUE)?;
            rsa_kv
                .append_element(ns::DSIG, prefix, node::RSA_MODULUS)?
                .set_text(&encoding::encode(&public.n().to_bytes_be()))?;
            rsa_kv
                .append_element(ns::DSIG, prefix, node::RSA_EXPONENT)?
                .set_text(&encoding::encode(&public.e().to_bytes_be()))?;
        }
        KeyMaterial::EcP256 { public, .. } => {
            let point = public.to_encoded_point(false);
            write_ec_key_value(key_value, CURVE_P256, point.as_bytes())?;
        }
        KeyMaterial::EcP384 { public, .. } => {
            let point = public.to_encoded_point(false);
            write_ec_key_value(key_value, CURVE_P384, point.as_bytes())?;
        }
        // symmetric keys are never published
        _ => {}
    }
    Ok(())
}

fn write_ec_key_value(key_value: &Element, curve: &str, point: &[u8]) -> Result<()> {
    let ec_kv = key_value.append_element(ns::DSIG11, Some("dsig11"), node::EC_KEY_VALUE)?;
    ec_kv
        .append_element(ns::DSIG11, Some("dsig11"), node::NAMED_CURVE)?
        .set_attribute(attr::URI, curve);
    ec_kv
        .append_element(ns::DSIG11, Some("dsig11"), node::PUBLIC_KEY)?
        .set_text(&encoding::encode(point))?;
    Ok(())
}
