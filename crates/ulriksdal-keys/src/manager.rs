#![forbid(unsafe_code)]

//! Keys manager: trusted keys and certificates consulted while resolving
//! `<KeyInfo>`.

use std::path::Path;
use std::time::SystemTime;

use ulriksdal_core::sink::{self, ErrorKind};
use ulriksdal_core::{Error, ReportExt, Result};

use crate::key::{Key, KeyRequirement};
use crate::loader::{self, KeyFormat};
use crate::x509::{self, TrustStore};

/// Trust level of a loaded certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertType {
    Trusted,
    Untrusted,
}

#[derive(Debug, Default)]
pub struct KeysManager {
    keys: Vec<Key>,
    trusted_certs: Vec<Vec<u8>>,
    untrusted_certs: Vec<Vec<u8>>,
    verification_time: Option<SystemTime>,
}

impl KeysManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a duplicate of `key`; the caller's key stays independent.
    pub fn add_key(&mut self, key: &Key) -> Result<()> {
        if !key.has_handle() {
            return Err(Error::Value("key has no handle".into()));
        }
        let duplicate = key.copy()?;
        self.adopt(duplicate)
            .reported("KeysManager::add_key")
            .map_err(|_| sink::take_last_error(ErrorKind::Adoption, "cannot adopt key"))
    }

    /// Take ownership of `key`. On failure the key is dropped, releasing
    /// its handle.
    fn adopt(&mut self, key: Key) -> Result<()> {
        key.read(|h| h.material.validate())??;
        tracing::debug!(name = ?key.name().ok().flatten(), total = self.keys.len() + 1, "key adopted");
        self.keys.push(key);
        Ok(())
    }

    pub fn load_cert(&mut self, path: impl AsRef<Path>, format: KeyFormat, kind: CertType) -> Result<()> {
        let path = path.as_ref();
        let der = std::fs::read(path)
            .map_err(Error::from)
            .and_then(|data| loader::cert_der(&data, format))
            .reported("KeysManager::load_cert")
            .map_err(|_| {
                sink::take_last_error(
                    ErrorKind::Load,
                    &format!("cannot load certificate from {}", path.display()),
                )
            })?;
        self.push_cert(der, kind);
        Ok(())
    }

    pub fn load_cert_from_memory(&mut self, data: &[u8], format: KeyFormat, kind: CertType) -> Result<()> {
        let der = loader::cert_der(data, format)
            .reported("KeysManager::load_cert_from_memory")
            .map_err(|_| sink::take_last_error(ErrorKind::Load, "cannot load certificate"))?;
        self.push_cert(der, kind);
        Ok(())
    }

    fn push_cert(&mut self, der: Vec<u8>, kind: CertType) {
        match kind {
            CertType::Trusted => self.trusted_certs.push(der),
            CertType::Untrusted => self.untrusted_certs.push(der),
        }
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Key> {
        self.keys
            .iter()
            .find(|k| k.name().ok().flatten().as_deref() == Some(name))
    }

    /// First key meeting `req`, restricted to `name` when given.
    pub fn find_matching(&self, req: &KeyRequirement, name: Option<&str>) -> Option<&Key> {
        self.keys.iter().find(|k| {
            k.matches(req) && name.map_or(true, |n| k.name().ok().flatten().as_deref() == Some(n))
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Check certificate validity periods at `at` instead of the current
    /// time.
    pub fn set_verification_time(&mut self, at: Option<SystemTime>) {
        self.verification_time = at;
    }

    /// Check that the DER certificate `leaf` chains to a trusted
    /// certificate, using `carried` and the untrusted certificates as
    /// intermediates.
    pub fn verify_cert(&self, leaf: &[u8], carried: &[Vec<u8>]) -> Result<()> {
        let store = TrustStore {
            trusted: &self.trusted_certs,
            untrusted: &self.untrusted_certs,
            at: self.verification_time.unwrap_or_else(SystemTime::now),
        };
        x509::validate_chain(leaf, carried, &store)
    }

    pub fn trusted_certs(&self) -> &[Vec<u8>] {
        &self.trusted_certs
    }

    pub fn untrusted_certs(&self) -> &[Vec<u8>] {
        &self.untrusted_certs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulriksdal_core::KeyDataClass;
    use ulriksdal_crypto::KeyMaterial;

    #[test]
    fn test_added_key_is_a_copy() {
        let key = Key::generate(KeyDataClass::Aes, 256).unwrap();
        key.set_name(Some("session")).unwrap();
        let mut mngr = KeysManager::new();
        mngr.add_key(&key).unwrap();

        key.set_name(Some("changed")).unwrap();
        assert!(mngr.find_by_name("session").is_some());
        assert!(mngr.find_by_name("changed").is_none());
        assert!(mngr.find_by_name("session").unwrap().owns_handle());
    }

    #[test]
    fn test_add_rejects_empty_and_invalid_keys() {
        sink::install_callback();
        let mut mngr = KeysManager::new();
        assert!(matches!(mngr.add_key(&Key::empty()), Err(Error::Value(_))));

        let bad = Key::from_material(KeyMaterial::Hmac(Vec::new()));
        assert!(matches!(mngr.add_key(&bad), Err(Error::Adoption(_))));
        assert!(mngr.is_empty());
        assert!(bad.has_handle());
    }

    #[test]
    fn test_find_matching() {
        let mut mngr = KeysManager::new();
        let hmac = Key::generate(KeyDataClass::Hmac, 160).unwrap();
        hmac.set_name(Some("mac")).unwrap();
        mngr.add_key(&hmac).unwrap();
        mngr.add_key(&Key::generate(KeyDataClass::Aes, 128).unwrap()).unwrap();

        let aes = KeyRequirement::of(KeyDataClass::Aes).with_bits(128);
        assert!(mngr.find_matching(&aes, None).is_some());
        assert!(mngr.find_matching(&aes, Some("mac")).is_none());
        let mac = KeyRequirement::of(KeyDataClass::Hmac);
        assert!(mngr.find_matching(&mac, Some("mac")).is_some());
        assert_eq!(mngr.len(), 2);
    }

    #[test]
    fn test_certificates_by_trust() {
        sink::install_callback();
        let mut mngr = KeysManager::new();
        let pem = include_bytes!("../testdata/rsa-cert.pem");
        mngr.load_cert_from_memory(pem, KeyFormat::CertPem, CertType::Trusted).unwrap();
        assert_eq!(mngr.trusted_certs().len(), 1);
        assert!(mngr.untrusted_certs().is_empty());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cert.der");
        std::fs::write(&path, include_bytes!("../testdata/rsa-cert.der")).unwrap();
        mngr.load_cert(&path, KeyFormat::CertDer, CertType::Untrusted).unwrap();
        assert_eq!(mngr.untrusted_certs()[0], mngr.trusted_certs()[0]);

        assert!(matches!(
            mngr.load_cert_from_memory(b"garbage", KeyFormat::CertPem, CertType::Trusted),
            Err(Error::Load(_))
        ));
    }
}
