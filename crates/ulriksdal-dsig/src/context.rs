#![forbid(unsafe_code)]

//! `SignatureContext`: key binding, allow-lists and the sign/verify entry
//! points over `<Signature>` trees and raw octets.

use std::sync::Arc;

use ulriksdal_core::registry::{self, TransformUsage};
use ulriksdal_core::sink::{self, ErrorKind};
use ulriksdal_core::{
    Descriptor, EngineError, Error, KeyDataDescriptor, ReportExt, Result, TransformDescriptor,
};
use ulriksdal_keys::{Key, KeysManager};
use ulriksdal_transforms::engine;
use ulriksdal_transforms::{KeyUse, SignatureTransform, TransformStatus};
use ulriksdal_xml::{Element, QName};

use crate::verify::VerifyResult;

/// Lifecycle of a context with respect to its bound key and the one-shot
/// binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// No key bound.
    Idle,
    /// A key is bound and no binary operation ran yet.
    Ready,
    /// A binary operation instantiated its signature method. Further binary
    /// calls fail; tree operations are still allowed.
    Used,
}

/// The operation a context last ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Sign,
    Verify,
}

/// Set of transforms a context accepts.
///
/// Everything the registry knows is allowed until the first explicit
/// enable; from then on only the enabled transforms are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AllowList {
    #[default]
    All,
    Only(Vec<&'static TransformDescriptor>),
}

impl AllowList {
    pub fn allows(&self, desc: &TransformDescriptor) -> bool {
        match self {
            Self::All => true,
            Self::Only(list) => list.iter().any(|d| *d == desc),
        }
    }

    fn enable(&mut self, desc: &'static TransformDescriptor) {
        match self {
            Self::All => *self = Self::Only(vec![desc]),
            Self::Only(list) => {
                if !list.contains(&desc) {
                    list.push(desc);
                }
            }
        }
    }

    /// `desc` must be on the list; the error names `what` it was used as.
    pub(crate) fn check(&self, desc: &TransformDescriptor, what: &str) -> Result<()> {
        if self.allows(desc) {
            Ok(())
        } else {
            Err(Error::UnsupportedAlgorithm(format!("{what} {} is not enabled", desc.name)))
        }
    }
}

/// Context for XML-DSig operations.
///
/// A context is cheap and meant for one signature. The keys manager may be
/// shared between contexts; it is never modified through them.
#[derive(Debug)]
pub struct SignatureContext {
    pub(crate) key: Option<Key>,
    pub(crate) manager: Option<Arc<KeysManager>>,
    pub(crate) reference_transforms: AllowList,
    pub(crate) signature_transforms: AllowList,
    pub(crate) key_data: Vec<&'static KeyDataDescriptor>,
    /// Extra ID attribute names registered before processing.
    pub(crate) id_attrs: Vec<String>,
    state: ContextState,
    operation: Option<Operation>,
    status: TransformStatus,
}

impl Default for SignatureContext {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SignatureContext {
    /// Create a new DSig context, optionally backed by a keys manager.
    pub fn new(manager: Option<Arc<KeysManager>>) -> Self {
        tracing::trace!(with_manager = manager.is_some(), "signature context created");
        Self {
            key: None,
            manager,
            reference_transforms: AllowList::All,
            signature_transforms: AllowList::All,
            key_data: registry::default_key_data(),
            id_attrs: Vec::new(),
            state: ContextState::Idle,
            operation: None,
            status: TransformStatus::None,
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn operation(&self) -> Option<Operation> {
        self.operation
    }

    /// Status left behind by the last `verify`/`verify_binary`.
    pub fn status(&self) -> TransformStatus {
        self.status
    }

    pub fn manager(&self) -> Option<&KeysManager> {
        self.manager.as_deref()
    }

    // ── Key binding ─────────────────────────────────────────────────

    /// A non-owning view of the bound key. It stops working once the
    /// context drops or replaces its key.
    pub fn key(&self) -> Option<Key> {
        self.key.as_ref().map(Key::view)
    }

    /// Bind a private copy of `key`; later changes to `key` do not reach the
    /// context.
    pub fn set_key(&mut self, key: &Key) -> Result<()> {
        if !key.has_handle() {
            return Err(Error::Type("empty key.".into()));
        }
        let copy = key.copy()?;
        if !copy.has_handle() {
            return Err(Error::Internal(EngineError::detached("failed to duplicate key")));
        }
        self.key = Some(copy);
        if self.state == ContextState::Idle {
            self.state = ContextState::Ready;
        }
        Ok(())
    }

    pub fn clear_key(&mut self) {
        self.key = None;
        if self.state == ContextState::Ready {
            self.state = ContextState::Idle;
        }
    }

    // ── Configuration ───────────────────────────────────────────────

    /// Mark `id_attr` (in `id_ns`, if given) of `node` as an ID attribute of
    /// its document. Registering the same attribute twice is a no-op.
    pub fn register_id(&self, node: &Element, id_attr: &str, id_ns: Option<&str>) -> Result<()> {
        let name = QName::new(id_ns, None, id_attr);
        match node.document().register_id(node, &name) {
            Ok(value) => {
                tracing::trace!(id = %value, attr = id_attr, "id registered");
                Ok(())
            }
            Err(Error::DuplicateId(_)) => Err(Error::DuplicateId("duplicated id.".into())),
            Err(e) => Err(e),
        }
    }

    /// Register `name` as an ID attribute throughout each processed document.
    pub fn add_id_attr(&mut self, name: &str) {
        self.id_attrs.push(name.to_owned());
    }

    /// Allow `transform` inside `<Reference>` elements. The first call
    /// restricts references to the enabled transforms.
    pub fn enable_reference_transform(&mut self, transform: &'static TransformDescriptor) -> Result<()> {
        let usable = TransformUsage::DSIG_TRANSFORM | TransformUsage::DIGEST_METHOD;
        if !transform.usage.intersects(usable) {
            return Err(refuse(transform, "cannot enable reference transform."));
        }
        self.reference_transforms.enable(transform);
        Ok(())
    }

    /// Allow `transform` as a `<SignedInfo>` canonicalization or signature
    /// method. The first call restricts `<SignedInfo>` to the enabled ones.
    pub fn enable_signature_transform(&mut self, transform: &'static TransformDescriptor) -> Result<()> {
        let usable = TransformUsage::C14N_METHOD | TransformUsage::SIGNATURE_METHOD;
        if !transform.usage.intersects(usable) {
            return Err(refuse(transform, "cannot enable signature transform."));
        }
        self.signature_transforms.enable(transform);
        Ok(())
    }

    /// Replace the key-data kinds `<KeyInfo>` processing may use.
    pub fn set_enabled_key_data(&mut self, kinds: &[Descriptor]) -> Result<()> {
        let mut enabled = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match kind {
                Descriptor::KeyData(k) => enabled.push(*k),
                Descriptor::Transform(_) => {
                    return Err(Error::Type("expected list of KeyData constants.".into()));
                }
            }
        }
        self.key_data = enabled;
        Ok(())
    }

    pub fn enabled_key_data(&self) -> &[&'static KeyDataDescriptor] {
        &self.key_data
    }

    // ── Tree operations ─────────────────────────────────────────────

    /// Fill in the `<Signature>` template `signature`: digests, optional
    /// key information and the signature value.
    pub fn sign(&mut self, signature: &Element) -> Result<()> {
        self.operation = Some(Operation::Sign);
        crate::sign::sign(self, signature)
            .reported("SignatureContext::sign")
            .map_err(|_| sink::take_last_error(ErrorKind::Sign, "failed to sign"))
    }

    /// Check the `<Signature>` element `signature`.
    ///
    /// Every failure is a verification error: a digest or signature value
    /// mismatch carries "Signature is invalid.", anything the engine could
    /// not process carries its diagnostic.
    pub fn verify(&mut self, signature: &Element) -> Result<()> {
        self.operation = Some(Operation::Verify);
        self.status = TransformStatus::Failed;
        let result = crate::verify::verify(self, signature)
            .reported("SignatureContext::verify")
            .map_err(|_| sink::take_last_error(ErrorKind::Verification, "failed to verify"))?;
        match result {
            VerifyResult::Valid => {
                self.status = TransformStatus::Succeeded;
                Ok(())
            }
            VerifyResult::Invalid { reason } => {
                tracing::info!(%reason, "signature rejected");
                Err(invalid_signature())
            }
        }
    }

    // ── Binary operations ───────────────────────────────────────────

    /// Sign `data` directly with `method` and the bound key.
    pub fn sign_binary(&mut self, data: &[u8], method: &'static TransformDescriptor) -> Result<Vec<u8>> {
        self.operation = Some(Operation::Sign);
        let (transform, material) = self.prepare_binary(method, KeyUse::Sign)?;
        transform
            .sign(&material, data)
            .map_err(|_| sink::take_last_error(ErrorKind::Engine, "failed to transform."))
    }

    /// Check `signature` over `data` with `method` and the bound key.
    pub fn verify_binary(
        &mut self,
        data: &[u8],
        method: &'static TransformDescriptor,
        signature: &[u8],
    ) -> Result<()> {
        self.operation = Some(Operation::Verify);
        self.status = TransformStatus::Failed;
        let (transform, material) = self.prepare_binary(method, KeyUse::Verify)?;
        let status = transform
            .verify(&material, data, signature)
            .map_err(|_| sink::take_last_error(ErrorKind::Verification, "Cannot verify signature."))?;
        self.status = status;
        if status == TransformStatus::Succeeded {
            Ok(())
        } else {
            Err(invalid_signature())
        }
    }

    fn prepare_binary(
        &mut self,
        method: &'static TransformDescriptor,
        usage: KeyUse,
    ) -> Result<(SignatureTransform, ulriksdal_crypto::KeyMaterial)> {
        if !method.is_signature_method() {
            return Err(Error::IncompatibleMethod("incompatible signature method".into()));
        }
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| Error::InappropriateKey("Sign key is not specified.".into()))?;
        if self.state == ContextState::Used {
            return Err(Error::State(
                "Signature context already used; it is designed for one use only.".into(),
            ));
        }
        let transform = SignatureTransform::create(method)
            .map_err(|_| sink::take_last_error(ErrorKind::Engine, "could not create signature transform."))?;
        self.state = ContextState::Used;

        let requirement = engine::key_requirement(method, usage)?;
        if !key.matches(&requirement) {
            return Err(Error::InappropriateKey("inappropriate key type.".into()));
        }
        let material = key.material()?;
        if !transform.accepts(&material, usage) {
            return Err(Error::InappropriateKey("key does not fit the signature method.".into()));
        }
        Ok((transform, material))
    }
}

fn invalid_signature() -> Error {
    Error::Verification(EngineError::detached("Signature is invalid."))
}

fn refuse(transform: &TransformDescriptor, message: &str) -> Error {
    tracing::debug!(transform = transform.name, "transform cannot be used in this role");
    Error::Value(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulriksdal_core::registry::{key_data, transform};
    use ulriksdal_core::KeyDataClass;

    fn hmac_key() -> Key {
        Key::from_binary_data(KeyDataClass::Hmac, b"secret-secret-secret").unwrap()
    }

    #[test]
    fn test_state_follows_key_binding() {
        let mut ctx = SignatureContext::new(None);
        assert_eq!(ctx.state(), ContextState::Idle);
        assert!(ctx.key().is_none());

        ctx.set_key(&hmac_key()).unwrap();
        assert_eq!(ctx.state(), ContextState::Ready);
        assert!(ctx.key().unwrap().has_handle());

        ctx.clear_key();
        assert_eq!(ctx.state(), ContextState::Idle);
    }

    #[test]
    fn test_set_key_takes_a_copy() {
        let key = hmac_key();
        key.set_name(Some("first")).unwrap();
        let mut ctx = SignatureContext::new(None);
        ctx.set_key(&key).unwrap();
        key.set_name(Some("second")).unwrap();
        assert_eq!(ctx.key().unwrap().name().unwrap().as_deref(), Some("first"));

        assert!(matches!(ctx.set_key(&Key::empty()), Err(Error::Type(m)) if m == "empty key."));
    }

    #[test]
    fn test_key_view_dies_with_context() {
        let mut ctx = SignatureContext::new(None);
        ctx.set_key(&hmac_key()).unwrap();
        let view = ctx.key().unwrap();
        assert!(!view.owns_handle());
        drop(ctx);
        assert!(!view.has_handle());
    }

    #[test]
    fn test_allow_list_switches_on_first_enable() {
        let mut ctx = SignatureContext::new(None);
        assert!(ctx.reference_transforms.allows(&transform::BASE64));
        ctx.enable_reference_transform(&transform::ENVELOPED).unwrap();
        ctx.enable_reference_transform(&transform::ENVELOPED).unwrap();
        assert!(ctx.reference_transforms.allows(&transform::ENVELOPED));
        assert!(!ctx.reference_transforms.allows(&transform::BASE64));
        assert_eq!(ctx.reference_transforms, AllowList::Only(vec![&transform::ENVELOPED]));

        assert!(ctx.signature_transforms.allows(&transform::RSA_SHA1));
        ctx.enable_signature_transform(&transform::EXCL_C14N).unwrap();
        assert!(!ctx.signature_transforms.allows(&transform::RSA_SHA1));
    }

    #[test]
    fn test_enable_rejects_wrong_role() {
        let mut ctx = SignatureContext::new(None);
        let err = ctx.enable_signature_transform(&transform::AES128_CBC).unwrap_err();
        assert!(matches!(err, Error::Value(m) if m == "cannot enable signature transform."));
        let err = ctx.enable_reference_transform(&transform::KW_AES128).unwrap_err();
        assert!(matches!(err, Error::Value(m) if m == "cannot enable reference transform."));
        assert_eq!(ctx.signature_transforms, AllowList::All);
    }

    #[test]
    fn test_enabled_key_data_must_be_key_data() {
        let mut ctx = SignatureContext::new(None);
        ctx.set_enabled_key_data(&[Descriptor::KeyData(&key_data::NAME)]).unwrap();
        assert_eq!(ctx.enabled_key_data(), &[&key_data::NAME]);

        let err = ctx
            .set_enabled_key_data(&[
                Descriptor::KeyData(&key_data::NAME),
                Descriptor::Transform(&transform::SHA1),
            ])
            .unwrap_err();
        assert!(matches!(err, Error::Type(m) if m == "expected list of KeyData constants."));
        assert_eq!(ctx.enabled_key_data(), &[&key_data::NAME]);
    }

    #[test]
    fn test_register_id() {
        let doc = ulriksdal_xml::Document::parse(r#"<root><a ID="x"/><b id="x"/><c/></root>"#).unwrap();
        let root = doc.root_element().unwrap();
        let children = root.children();
        let ctx = SignatureContext::new(None);

        ctx.register_id(&children[0], "ID", None).unwrap();
        ctx.register_id(&children[0], "ID", None).unwrap();
        assert!(Element::ptr_eq(&doc.find_by_id("x").unwrap(), &children[0]));

        let err = ctx.register_id(&children[1], "id", None).unwrap_err();
        assert!(matches!(err, Error::DuplicateId(m) if m == "duplicated id."));
        let err = ctx.register_id(&children[2], "ID", None).unwrap_err();
        assert!(matches!(err, Error::MissingAttribute(m) if m == "missing attribute."));
    }

    #[test]
    fn test_binary_sign_is_one_shot() {
        sink::install_callback();
        let mut ctx = SignatureContext::new(None);
        ctx.set_key(&hmac_key()).unwrap();
        let sig = ctx.sign_binary(b"data", &transform::HMAC_SHA256).unwrap();
        assert_eq!(sig.len(), 32);
        assert_eq!(ctx.state(), ContextState::Used);

        let err = ctx.sign_binary(b"data", &transform::HMAC_SHA256).unwrap_err();
        assert!(matches!(err, Error::State(m) if m.contains("designed for one use only")));

        let mut verifier = SignatureContext::new(None);
        verifier.set_key(&hmac_key()).unwrap();
        verifier.verify_binary(b"data", &transform::HMAC_SHA256, &sig).unwrap();
        assert_eq!(verifier.status(), TransformStatus::Succeeded);
    }

    #[test]
    fn test_binary_argument_checks() {
        let mut ctx = SignatureContext::new(None);
        let err = ctx.sign_binary(b"data", &transform::SHA256).unwrap_err();
        assert!(matches!(err, Error::IncompatibleMethod(_)));

        let err = ctx.sign_binary(b"data", &transform::HMAC_SHA1).unwrap_err();
        assert!(matches!(err, Error::InappropriateKey(m) if m == "Sign key is not specified."));
        assert_eq!(ctx.state(), ContextState::Idle);

        ctx.set_key(&hmac_key()).unwrap();
        let err = ctx.sign_binary(b"data", &transform::RSA_SHA256).unwrap_err();
        assert!(matches!(err, Error::InappropriateKey(m) if m == "inappropriate key type."));
        assert_eq!(ctx.state(), ContextState::Used);
    }

    #[test]
    fn test_binary_method_checks_the_curve() {
        let p384 = Key::generate(KeyDataClass::Ec, 384).unwrap();
        let mut ctx = SignatureContext::new(None);
        ctx.set_key(&p384).unwrap();
        let err = ctx.sign_binary(b"data", &transform::ECDSA_SHA256).unwrap_err();
        assert!(matches!(err, Error::InappropriateKey(m) if m.contains("does not fit")));

        let mut ctx = SignatureContext::new(None);
        ctx.set_key(&p384).unwrap();
        let sig = ctx.sign_binary(b"data", &transform::ECDSA_SHA384).unwrap();
        assert_eq!(sig.len(), 96);
    }

    #[test]
    fn test_binary_verify_rejects_tampering() {
        let mut signer = SignatureContext::new(None);
        signer.set_key(&hmac_key()).unwrap();
        let sig = signer.sign_binary(b"data", &transform::HMAC_SHA1).unwrap();

        let mut ctx = SignatureContext::new(None);
        ctx.set_key(&hmac_key()).unwrap();
        let err = ctx.verify_binary(b"dato", &transform::HMAC_SHA1, &sig).unwrap_err();
        assert!(err.is_verification_failure());
        assert_eq!(err.record().unwrap().message, "Signature is invalid.");
        assert_eq!(ctx.status(), TransformStatus::Failed);
    }
}
