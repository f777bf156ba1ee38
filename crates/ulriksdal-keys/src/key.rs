#![forbid(unsafe_code)]

//! Key handles.
//!
//! A [`Key`] either owns its handle, borrows one owned elsewhere (a view
//! handed out by a context), or is empty. Copying always duplicates the
//! handle; two owning keys never share one.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use ulriksdal_core::sink::{self, ErrorKind};
use ulriksdal_core::{EngineError, Error, KeyDataClass, ReportExt, Result};
use ulriksdal_crypto::KeyMaterial;

use crate::loader::{self, KeyFormat};

/// Key material plus the metadata that travels with it.
#[derive(Debug, Clone)]
pub struct KeyHandle {
    pub material: KeyMaterial,
    pub name: Option<String>,
    /// DER certificates, leaf first.
    pub certs: Vec<Vec<u8>>,
}

impl KeyHandle {
    pub fn new(material: KeyMaterial) -> Self {
        Self {
            material,
            name: None,
            certs: Vec::new(),
        }
    }
}

type Shared = Arc<RwLock<KeyHandle>>;

enum Slot {
    Empty,
    Owned(Shared),
    Borrowed(Weak<RwLock<KeyHandle>>),
}

/// What a caller needs from a key before an algorithm runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyRequirement {
    pub class: Option<KeyDataClass>,
    /// Signing and decryption need the private half.
    pub private: bool,
    pub bits: Option<usize>,
}

impl KeyRequirement {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn of(class: KeyDataClass) -> Self {
        Self {
            class: Some(class),
            ..Self::default()
        }
    }

    pub fn with_private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    pub fn with_bits(mut self, bits: usize) -> Self {
        self.bits = Some(bits);
        self
    }

    pub fn matches(&self, material: &KeyMaterial) -> bool {
        self.class.map_or(true, |c| c == material.class())
            && (!self.private || material.has_private())
            && self.bits.map_or(true, |b| b == material.bits())
    }
}

pub struct Key {
    slot: Slot,
}

impl Default for Key {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Key");
        d.field("owns_handle", &self.owns_handle());
        match self.handle() {
            Ok(h) => {
                let h = h.read().unwrap_or_else(PoisonError::into_inner);
                d.field("name", &h.name).field("material", &h.material);
            }
            Err(_) => {
                d.field("handle", &None::<()>);
            }
        }
        d.finish()
    }
}

impl Key {
    /// A key without a handle, usable as a template.
    pub fn empty() -> Self {
        Self { slot: Slot::Empty }
    }

    pub fn from_material(material: KeyMaterial) -> Self {
        Self::from_handle(KeyHandle::new(material))
    }

    pub fn from_handle(handle: KeyHandle) -> Self {
        Self {
            slot: Slot::Owned(Arc::new(RwLock::new(handle))),
        }
    }

    /// A non-owning alias of this key's handle. Dropping the view never
    /// releases the handle; using it after the owner is gone fails.
    pub fn view(&self) -> Key {
        let slot = match &self.slot {
            Slot::Empty => Slot::Empty,
            Slot::Owned(h) => Slot::Borrowed(Arc::downgrade(h)),
            Slot::Borrowed(w) => Slot::Borrowed(w.clone()),
        };
        Key { slot }
    }

    pub fn owns_handle(&self) -> bool {
        matches!(self.slot, Slot::Owned(_))
    }

    /// True when a live handle is reachable.
    pub fn has_handle(&self) -> bool {
        self.handle().is_ok()
    }

    fn handle(&self) -> Result<Shared> {
        match &self.slot {
            Slot::Empty => Err(Error::State("key has no handle".into())),
            Slot::Owned(h) => Ok(h.clone()),
            Slot::Borrowed(w) => w
                .upgrade()
                .ok_or_else(|| Error::State("key handle has been released".into())),
        }
    }

    /// Run `f` against the handle.
    pub fn read<T>(&self, f: impl FnOnce(&KeyHandle) -> T) -> Result<T> {
        let h = self.handle()?;
        let guard: RwLockReadGuard<'_, KeyHandle> =
            h.read().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&guard))
    }

    fn write<T>(&self, f: impl FnOnce(&mut KeyHandle) -> T) -> Result<T> {
        let h = self.handle()?;
        let mut guard: RwLockWriteGuard<'_, KeyHandle> =
            h.write().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&mut guard))
    }

    /// Duplicate the handle into a new owning key.
    ///
    /// An empty key copies to an empty key.
    pub fn copy(&self) -> Result<Key> {
        if matches!(self.slot, Slot::Empty) {
            return Ok(Key::empty());
        }
        let handle = self
            .duplicate_handle()
            .reported("Key::copy")
            .map_err(|_| sink::take_last_error(ErrorKind::Duplication, "cannot duplicate key"))?;
        Ok(Key::from_handle(handle))
    }

    pub(crate) fn duplicate_handle(&self) -> Result<KeyHandle> {
        self.read(KeyHandle::clone)
    }

    pub fn name(&self) -> Result<Option<String>> {
        self.read(|h| h.name.clone())
    }

    pub fn set_name(&self, name: Option<&str>) -> Result<()> {
        self.write(|h| h.name = name.map(str::to_owned))
    }

    pub fn material(&self) -> Result<KeyMaterial> {
        self.read(|h| h.material.clone())
    }

    pub fn class(&self) -> Result<KeyDataClass> {
        self.read(|h| h.material.class())
    }

    pub fn certs(&self) -> Result<Vec<Vec<u8>>> {
        self.read(|h| h.certs.clone())
    }

    pub fn matches(&self, req: &KeyRequirement) -> bool {
        self.read(|h| req.matches(&h.material)).unwrap_or(false)
    }

    pub fn from_memory(data: &[u8], format: KeyFormat, password: Option<&str>) -> Result<Key> {
        let loaded = loader::load(data, format, password)
            .reported("Key::from_memory")
            .map_err(|_| sink::take_last_error(ErrorKind::Load, "cannot load key"))?;
        tracing::debug!(class = ?loaded.material.class(), bits = loaded.material.bits(), "key loaded");
        Ok(Key::from_handle(KeyHandle {
            material: loaded.material,
            name: None,
            certs: loaded.certs,
        }))
    }

    pub fn from_file(path: impl AsRef<Path>, format: KeyFormat, password: Option<&str>) -> Result<Key> {
        let path = path.as_ref();
        let loaded = std::fs::read(path)
            .map_err(Error::from)
            .and_then(|data| loader::load(&data, format, password))
            .reported("Key::from_file")
            .map_err(|_| {
                sink::take_last_error(
                    ErrorKind::Load,
                    &format!("cannot load key from {}", path.display()),
                )
            })?;
        Ok(Key::from_handle(KeyHandle {
            material: loaded.material,
            name: None,
            certs: loaded.certs,
        }))
    }

    /// Generate a fresh key of `class` and `bits`.
    pub fn generate(class: KeyDataClass, bits: usize) -> Result<Key> {
        let material = generate_material(class, bits)
            .reported("Key::generate")
            .map_err(|_| sink::take_last_error(ErrorKind::Load, "cannot generate key"))?;
        Ok(Key::from_material(material))
    }

    pub fn from_binary_data(class: KeyDataClass, data: &[u8]) -> Result<Key> {
        let material = loader::binary(class, data)
            .reported("Key::from_binary_data")
            .map_err(|_| sink::take_last_error(ErrorKind::Load, "cannot load binary key"))?;
        Ok(Key::from_material(material))
    }

    pub fn from_binary_file(class: KeyDataClass, path: impl AsRef<Path>) -> Result<Key> {
        let path = path.as_ref();
        let material = std::fs::read(path)
            .map_err(Error::from)
            .and_then(|data| loader::binary(class, &data))
            .reported("Key::from_binary_file")
            .map_err(|_| {
                sink::take_last_error(
                    ErrorKind::Load,
                    &format!("cannot load binary key from {}", path.display()),
                )
            })?;
        Ok(Key::from_material(material))
    }

    /// Attach a certificate to this key.
    pub fn load_cert_from_memory(&self, data: &[u8], format: KeyFormat) -> Result<()> {
        if !self.has_handle() {
            return Err(Error::Load(EngineError::detached("key has no handle")));
        }
        let der = loader::cert_der(data, format)
            .reported("Key::load_cert_from_memory")
            .map_err(|_| sink::take_last_error(ErrorKind::Load, "cannot load certificate"))?;
        self.write(|h| h.certs.push(der))
    }

    pub fn load_cert_from_file(&self, path: impl AsRef<Path>, format: KeyFormat) -> Result<()> {
        if !self.has_handle() {
            return Err(Error::Load(EngineError::detached("key has no handle")));
        }
        let path = path.as_ref();
        let der = std::fs::read(path)
            .map_err(Error::from)
            .and_then(|data| loader::cert_der(&data, format))
            .reported("Key::load_cert_from_file")
            .map_err(|_| {
                sink::take_last_error(
                    ErrorKind::Load,
                    &format!("cannot load certificate from {}", path.display()),
                )
            })?;
        self.write(|h| h.certs.push(der))
    }
}

fn generate_material(class: KeyDataClass, bits: usize) -> Result<KeyMaterial> {
    let material = match (class, bits) {
        (KeyDataClass::Aes, 128 | 192 | 256) => KeyMaterial::Aes(KeyMaterial::random_bytes(bits)?),
        (KeyDataClass::Des, 192) => KeyMaterial::Des3(KeyMaterial::random_bytes(bits)?),
        (KeyDataClass::Hmac, _) => KeyMaterial::Hmac(KeyMaterial::random_bytes(bits)?),
        (KeyDataClass::Rsa, _) => KeyMaterial::generate_rsa(bits)?,
        (KeyDataClass::Ec, 256) => {
            KeyMaterial::p256_private(p256::ecdsa::SigningKey::random(&mut rand::thread_rng()))
        }
        (KeyDataClass::Ec, 384) => {
            KeyMaterial::p384_private(p384::ecdsa::SigningKey::random(&mut rand::thread_rng()))
        }
        (class, bits) => {
            return Err(Error::Key(format!(
                "cannot generate a {bits}-bit {class:?} key"
            )))
        }
    };
    Ok(material)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() {
        sink::install_callback();
        sink::clear_last_error();
    }

    #[test]
    fn test_copy_is_independent() {
        let key = Key::generate(KeyDataClass::Aes, 128).unwrap();
        key.set_name(Some("first")).unwrap();
        let copy = key.copy().unwrap();
        assert!(copy.owns_handle());
        key.set_name(Some("renamed")).unwrap();
        assert_eq!(copy.name().unwrap().as_deref(), Some("first"));
        assert_eq!(copy.material().unwrap().symmetric_bytes(), key.material().unwrap().symmetric_bytes());
    }

    #[test]
    fn test_empty_key() {
        let key = Key::empty();
        assert!(!key.has_handle());
        assert!(matches!(key.name(), Err(Error::State(_))));
        assert!(matches!(key.set_name(Some("x")), Err(Error::State(_))));
        assert!(!key.copy().unwrap().has_handle());
        assert!(matches!(
            key.load_cert_from_memory(b"", KeyFormat::CertPem),
            Err(Error::Load(_))
        ));
    }

    #[test]
    fn test_view_does_not_own() {
        let key = Key::generate(KeyDataClass::Hmac, 256).unwrap();
        let view = key.view();
        assert!(!view.owns_handle());
        view.set_name(Some("shared")).unwrap();
        assert_eq!(key.name().unwrap().as_deref(), Some("shared"));
        drop(view);
        assert!(key.has_handle());

        let view = key.view();
        drop(key);
        assert!(matches!(view.name(), Err(Error::State(m)) if m.contains("released")));
    }

    #[test]
    fn test_copy_of_released_view_is_duplication_error() {
        setup();
        let key = Key::generate(KeyDataClass::Hmac, 128).unwrap();
        let view = key.view();
        drop(key);
        assert!(matches!(view.copy(), Err(Error::Duplication(_))));
    }

    #[test]
    fn test_generate_rules() {
        setup();
        assert_eq!(Key::generate(KeyDataClass::Des, 192).unwrap().material().unwrap().bits(), 192);
        assert!(matches!(Key::generate(KeyDataClass::Aes, 100), Err(Error::Load(_))));
        assert!(Key::generate(KeyDataClass::Rsa, 512).is_err());
        let ec = Key::generate(KeyDataClass::Ec, 256).unwrap();
        assert!(ec.matches(&KeyRequirement::of(KeyDataClass::Ec).with_private(true).with_bits(256)));
        assert!(!ec.matches(&KeyRequirement::of(KeyDataClass::Ec).with_bits(384)));
    }

    #[test]
    fn test_load_error_carries_engine_record() {
        setup();
        let err = Key::from_memory(b"junk", KeyFormat::Pem, None).unwrap_err();
        let Error::Load(e) = err else { panic!("expected a load error") };
        assert_eq!(e.context, "cannot load key");
        assert_eq!(e.record.function, "Key::from_memory");
        assert!(e.record.message.contains("PEM"));
    }

    #[test]
    fn test_files_and_certs() {
        setup();
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("aes.bin");
        std::fs::write(&bin, [3u8; 32]).unwrap();
        let key = Key::from_binary_file(KeyDataClass::Aes, &bin).unwrap();
        assert_eq!(key.material().unwrap().bits(), 256);
        assert!(matches!(
            Key::from_binary_file(KeyDataClass::Aes, dir.path().join("missing")),
            Err(Error::Load(_))
        ));

        let pem = dir.path().join("key.pem");
        std::fs::write(&pem, include_str!("../testdata/rsa-key.pem")).unwrap();
        let rsa = Key::from_file(&pem, KeyFormat::Pem, None).unwrap();
        rsa.load_cert_from_memory(include_bytes!("../testdata/rsa-cert.der"), KeyFormat::CertDer)
            .unwrap();
        assert_eq!(rsa.certs().unwrap().len(), 1);
        assert!(rsa.load_cert_from_memory(b"nope", KeyFormat::CertDer).is_err());
    }
}
