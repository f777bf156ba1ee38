#![forbid(unsafe_code)]

//! Engine facade: lifecycle, per-operation status, capability matching and
//! direct (binary) execution of signature methods.
//!
//! Entry points here return [`EngineResult`]; failures have already been
//! handed to the global error callback when they come back as
//! [`Reported`](ulriksdal_core::Reported).

use std::sync::atomic::{AtomicBool, Ordering};

use ulriksdal_core::registry::TransformUsage;
use ulriksdal_core::sink;
use ulriksdal_core::{EngineResult, Error, KeyDataClass, ReportExt, Result, TransformDescriptor};
use ulriksdal_crypto::{cipher, keytransport, keywrap, sign, KeyMaterial, SignatureAlgorithm};
use ulriksdal_keys::KeyRequirement;

use crate::io;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Outcome recorded by a transform after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformStatus {
    #[default]
    None,
    Succeeded,
    Failed,
}

/// What a key is about to be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUse {
    Sign,
    Verify,
    Encrypt,
    Decrypt,
}

impl KeyUse {
    fn needs_private(self) -> bool {
        matches!(self, Self::Sign | Self::Decrypt)
    }
}

/// Initialize the engine.
///
/// Resets the global error callback and empties the IO callback chain; the
/// caller re-installs both afterwards.
pub fn init() -> EngineResult<()> {
    sink::reset_callback();
    io::cleanup();
    INITIALIZED.store(true, Ordering::Release);
    tracing::debug!("transform engine initialized");
    Ok(())
}

/// Shut the engine down. Safe to call repeatedly.
pub fn shutdown() {
    if INITIALIZED.swap(false, Ordering::AcqRel) {
        io::cleanup();
        tracing::debug!("transform engine shut down");
    }
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}

fn href(desc: &TransformDescriptor) -> Result<&'static str> {
    desc.href
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("{} has no algorithm URI", desc.name)))
}

/// The key a method needs for `usage`.
pub fn key_requirement(desc: &TransformDescriptor, usage: KeyUse) -> Result<KeyRequirement> {
    let uri = href(desc)?;
    let private = usage.needs_private();
    if desc.usage.contains(TransformUsage::SIGNATURE_METHOD) {
        let method = sign::from_uri(uri)?;
        return Ok(KeyRequirement::of(method.key_class()).with_private(private));
    }
    if !desc.usage.contains(TransformUsage::ENCRYPTION_METHOD) {
        return Err(Error::UnsupportedAlgorithm(format!("{} takes no key", desc.name)));
    }
    if let Ok(c) = cipher::from_uri(uri) {
        return Ok(KeyRequirement::of(c.key_class()).with_bits(c.key_size() * 8));
    }
    if let Ok(kw) = keywrap::from_uri(uri) {
        return Ok(KeyRequirement::of(KeyDataClass::Aes).with_bits(kw.kek_size() * 8));
    }
    keytransport::from_uri(uri)?;
    Ok(KeyRequirement::of(KeyDataClass::Rsa).with_private(private))
}

/// A signature method instantiated for one direct execution over raw bytes.
///
/// Running it consumes it.
pub struct SignatureTransform {
    descriptor: &'static TransformDescriptor,
    method: Box<dyn SignatureAlgorithm>,
}

impl std::fmt::Debug for SignatureTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureTransform")
            .field("method", &self.descriptor.name)
            .finish()
    }
}

impl SignatureTransform {
    #[track_caller]
    pub fn create(descriptor: &'static TransformDescriptor) -> EngineResult<Self> {
        href(descriptor)
            .and_then(sign::from_uri)
            .map(|method| Self { descriptor, method })
            .reported("SignatureTransform::create")
    }

    pub fn descriptor(&self) -> &'static TransformDescriptor {
        self.descriptor
    }

    /// Whether `key` can serve this method for `usage`.
    pub fn accepts(&self, key: &KeyMaterial, usage: KeyUse) -> bool {
        self.method.accepts(key) && (!usage.needs_private() || key.has_private())
    }

    #[track_caller]
    pub fn sign(self, key: &KeyMaterial, data: &[u8]) -> EngineResult<Vec<u8>> {
        let out = self.method.sign(key, data).reported("SignatureTransform::sign")?;
        tracing::trace!(method = self.descriptor.name, len = out.len(), "binary signature computed");
        Ok(out)
    }

    /// Run the method over `data` and compare with `signature`.
    ///
    /// A mismatch is not an engine failure; it shows up in the returned status.
    #[track_caller]
    pub fn verify(self, key: &KeyMaterial, data: &[u8], signature: &[u8]) -> EngineResult<TransformStatus> {
        let valid = self
            .method
            .verify(key, data, signature)
            .reported("SignatureTransform::verify")?;
        let status = if valid {
            TransformStatus::Succeeded
        } else {
            TransformStatus::Failed
        };
        tracing::trace!(method = self.descriptor.name, ?status, "binary signature checked");
        Ok(status)
    }
}
