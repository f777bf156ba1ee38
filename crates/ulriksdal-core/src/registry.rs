#![forbid(unsafe_code)]

//! Process-wide catalogs of transform and key-data descriptors.
//!
//! Descriptors are immutable statics. Callers select algorithms by handing
//! a `&'static` descriptor to a context or template builder; identity is
//! the descriptor's `name`.

use std::fmt;
use std::ops::BitOr;

/// Bitmask describing where a transform may be used.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransformUsage(u32);

impl TransformUsage {
    pub const NONE: Self = Self(0);
    /// May appear in a `<Reference>`'s `<Transforms>`.
    pub const DSIG_TRANSFORM: Self = Self(0x0001);
    pub const C14N_METHOD: Self = Self(0x0002);
    pub const DIGEST_METHOD: Self = Self(0x0004);
    pub const SIGNATURE_METHOD: Self = Self(0x0008);
    pub const ENCRYPTION_METHOD: Self = Self(0x0010);
    pub const ANY: Self = Self(0xFFFF);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// True when every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// True when `self` and `other` share a bit.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for TransformUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Debug for TransformUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransformUsage({:#06x})", self.0)
    }
}

/// Bitmask describing where a key-data kind may be read or written.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyDataUsage(u32);

impl KeyDataUsage {
    pub const NONE: Self = Self(0);
    pub const KEY_INFO_READ: Self = Self(0x0001);
    pub const KEY_INFO_WRITE: Self = Self(0x0002);
    pub const KEY_VALUE_READ: Self = Self(0x0004);
    pub const KEY_VALUE_WRITE: Self = Self(0x0008);
    pub const KEY_INFO: Self = Self(0x0003);
    pub const KEY_VALUE: Self = Self(0x000C);
    pub const ANY: Self = Self(0xFFFF);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for KeyDataUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Debug for KeyDataUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyDataUsage({:#06x})", self.0)
    }
}

/// An algorithm known to the engine.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TransformDescriptor {
    pub name: &'static str,
    pub href: Option<&'static str>,
    pub usage: TransformUsage,
}

impl TransformDescriptor {
    pub fn is_signature_method(&self) -> bool {
        self.usage.contains(TransformUsage::SIGNATURE_METHOD)
    }
}

impl fmt::Display for TransformDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(href) = self.href {
            write!(f, " ({href})")?;
        }
        Ok(())
    }
}

/// What a key-data kind describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyDataClass {
    Name,
    Value,
    EncryptedKey,
    Aes,
    Des,
    Hmac,
    Rsa,
    Ec,
    X509,
    RawX509Cert,
}

/// A kind of key material or `<KeyInfo>` child the engine understands.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct KeyDataDescriptor {
    pub name: &'static str,
    pub href: Option<&'static str>,
    pub usage: KeyDataUsage,
    pub class: KeyDataClass,
}

impl fmt::Display for KeyDataDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Either kind of registry entry, as returned by [`lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    Transform(&'static TransformDescriptor),
    KeyData(&'static KeyDataDescriptor),
}

impl Descriptor {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Transform(t) => t.name,
            Self::KeyData(k) => k.name,
        }
    }
}

impl From<&'static TransformDescriptor> for Descriptor {
    fn from(t: &'static TransformDescriptor) -> Self {
        Self::Transform(t)
    }
}

impl From<&'static KeyDataDescriptor> for Descriptor {
    fn from(k: &'static KeyDataDescriptor) -> Self {
        Self::KeyData(k)
    }
}

macro_rules! transform {
    ($ident:ident, $name:literal, $href:expr, $usage:expr) => {
        pub static $ident: TransformDescriptor = TransformDescriptor {
            name: $name,
            href: Some($href),
            usage: $usage,
        };
    };
}

/// Transform descriptors.
pub mod transform {
    use super::{TransformDescriptor, TransformUsage as U};
    use crate::algorithm;

    const C14N: U = U::DSIG_TRANSFORM.union(U::C14N_METHOD);

    transform!(INCLUSIVE_C14N, "c14n", algorithm::C14N, C14N);
    transform!(INCLUSIVE_C14N_WITH_COMMENTS, "c14n-with-comments", algorithm::C14N_WITH_COMMENTS, C14N);
    transform!(INCLUSIVE_C14N11, "c14n11", algorithm::C14N11, C14N);
    transform!(INCLUSIVE_C14N11_WITH_COMMENTS, "c14n11-with-comments", algorithm::C14N11_WITH_COMMENTS, C14N);
    transform!(EXCL_C14N, "exc-c14n", algorithm::EXC_C14N, C14N);
    transform!(EXCL_C14N_WITH_COMMENTS, "exc-c14n-with-comments", algorithm::EXC_C14N_WITH_COMMENTS, C14N);
    transform!(ENVELOPED, "enveloped-signature", algorithm::ENVELOPED_SIGNATURE, U::DSIG_TRANSFORM);
    transform!(BASE64, "base64", algorithm::BASE64, U::DSIG_TRANSFORM);

    transform!(SHA1, "sha1", algorithm::SHA1, U::DIGEST_METHOD);
    transform!(SHA224, "sha224", algorithm::SHA224, U::DIGEST_METHOD);
    transform!(SHA256, "sha256", algorithm::SHA256, U::DIGEST_METHOD);
    transform!(SHA384, "sha384", algorithm::SHA384, U::DIGEST_METHOD);
    transform!(SHA512, "sha512", algorithm::SHA512, U::DIGEST_METHOD);

    transform!(RSA_SHA1, "rsa-sha1", algorithm::RSA_SHA1, U::SIGNATURE_METHOD);
    transform!(RSA_SHA224, "rsa-sha224", algorithm::RSA_SHA224, U::SIGNATURE_METHOD);
    transform!(RSA_SHA256, "rsa-sha256", algorithm::RSA_SHA256, U::SIGNATURE_METHOD);
    transform!(RSA_SHA384, "rsa-sha384", algorithm::RSA_SHA384, U::SIGNATURE_METHOD);
    transform!(RSA_SHA512, "rsa-sha512", algorithm::RSA_SHA512, U::SIGNATURE_METHOD);
    transform!(ECDSA_SHA256, "ecdsa-sha256", algorithm::ECDSA_SHA256, U::SIGNATURE_METHOD);
    transform!(ECDSA_SHA384, "ecdsa-sha384", algorithm::ECDSA_SHA384, U::SIGNATURE_METHOD);
    transform!(HMAC_SHA1, "hmac-sha1", algorithm::HMAC_SHA1, U::SIGNATURE_METHOD);
    transform!(HMAC_SHA224, "hmac-sha224", algorithm::HMAC_SHA224, U::SIGNATURE_METHOD);
    transform!(HMAC_SHA256, "hmac-sha256", algorithm::HMAC_SHA256, U::SIGNATURE_METHOD);
    transform!(HMAC_SHA384, "hmac-sha384", algorithm::HMAC_SHA384, U::SIGNATURE_METHOD);
    transform!(HMAC_SHA512, "hmac-sha512", algorithm::HMAC_SHA512, U::SIGNATURE_METHOD);

    transform!(AES128_CBC, "aes128-cbc", algorithm::AES128_CBC, U::ENCRYPTION_METHOD);
    transform!(AES192_CBC, "aes192-cbc", algorithm::AES192_CBC, U::ENCRYPTION_METHOD);
    transform!(AES256_CBC, "aes256-cbc", algorithm::AES256_CBC, U::ENCRYPTION_METHOD);
    transform!(AES128_GCM, "aes128-gcm", algorithm::AES128_GCM, U::ENCRYPTION_METHOD);
    transform!(AES192_GCM, "aes192-gcm", algorithm::AES192_GCM, U::ENCRYPTION_METHOD);
    transform!(AES256_GCM, "aes256-gcm", algorithm::AES256_GCM, U::ENCRYPTION_METHOD);
    transform!(DES3_CBC, "tripledes-cbc", algorithm::TRIPLEDES_CBC, U::ENCRYPTION_METHOD);
    transform!(KW_AES128, "kw-aes128", algorithm::KW_AES128, U::ENCRYPTION_METHOD);
    transform!(KW_AES192, "kw-aes192", algorithm::KW_AES192, U::ENCRYPTION_METHOD);
    transform!(KW_AES256, "kw-aes256", algorithm::KW_AES256, U::ENCRYPTION_METHOD);
    transform!(RSA_PKCS1, "rsa-1_5", algorithm::RSA_PKCS1, U::ENCRYPTION_METHOD);
    transform!(RSA_OAEP, "rsa-oaep-mgf1p", algorithm::RSA_OAEP, U::ENCRYPTION_METHOD);

    /// Every registered transform, in registration order.
    pub static ALL: &[&TransformDescriptor] = &[
        &INCLUSIVE_C14N,
        &INCLUSIVE_C14N_WITH_COMMENTS,
        &INCLUSIVE_C14N11,
        &INCLUSIVE_C14N11_WITH_COMMENTS,
        &EXCL_C14N,
        &EXCL_C14N_WITH_COMMENTS,
        &ENVELOPED,
        &BASE64,
        &SHA1,
        &SHA224,
        &SHA256,
        &SHA384,
        &SHA512,
        &RSA_SHA1,
        &RSA_SHA224,
        &RSA_SHA256,
        &RSA_SHA384,
        &RSA_SHA512,
        &ECDSA_SHA256,
        &ECDSA_SHA384,
        &HMAC_SHA1,
        &HMAC_SHA224,
        &HMAC_SHA256,
        &HMAC_SHA384,
        &HMAC_SHA512,
        &AES128_CBC,
        &AES192_CBC,
        &AES256_CBC,
        &AES128_GCM,
        &AES192_GCM,
        &AES256_GCM,
        &DES3_CBC,
        &KW_AES128,
        &KW_AES192,
        &KW_AES256,
        &RSA_PKCS1,
        &RSA_OAEP,
    ];
}

macro_rules! key_data {
    ($ident:ident, $name:literal, $href:expr, $usage:expr, $class:ident) => {
        pub static $ident: KeyDataDescriptor = KeyDataDescriptor {
            name: $name,
            href: $href,
            usage: $usage,
            class: KeyDataClass::$class,
        };
    };
}

/// Key-data descriptors.
pub mod key_data {
    use super::{KeyDataClass, KeyDataDescriptor, KeyDataUsage as U};
    use crate::algorithm;

    const VALUE: U = U::KEY_VALUE.union(U::KEY_INFO);

    key_data!(NAME, "key-name", None, U::KEY_INFO, Name);
    key_data!(VALUE_DATA, "key-value", None, U::KEY_INFO, Value);
    key_data!(ENCRYPTED_KEY, "enc-key", Some(algorithm::ENCRYPTED_KEY), U::KEY_INFO, EncryptedKey);
    key_data!(AES, "aes", None, VALUE, Aes);
    key_data!(DES, "des", None, VALUE, Des);
    key_data!(HMAC, "hmac", None, VALUE, Hmac);
    key_data!(RSA, "rsa", Some(algorithm::RSA_KEY_VALUE), VALUE, Rsa);
    key_data!(ECDSA, "ecdsa", Some(algorithm::EC_KEY_VALUE), VALUE, Ec);
    key_data!(X509, "x509", Some(algorithm::X509_DATA), U::KEY_INFO, X509);
    key_data!(RAW_X509_CERT, "raw-x509-cert", Some(algorithm::RAW_X509_CERT), U::NONE, RawX509Cert);

    /// Every registered key-data kind.
    pub static ALL: &[&KeyDataDescriptor] = &[
        &NAME,
        &VALUE_DATA,
        &ENCRYPTED_KEY,
        &AES,
        &DES,
        &HMAC,
        &RSA,
        &ECDSA,
        &X509,
        &RAW_X509_CERT,
    ];
}

/// Find a transform by its registry name (e.g. `"rsa-sha256"`).
pub fn transform_by_name(name: &str) -> Option<&'static TransformDescriptor> {
    transform::ALL.iter().copied().find(|t| t.name == name)
}

/// Find a transform by its `Algorithm` URI.
pub fn transform_by_href(href: &str) -> Option<&'static TransformDescriptor> {
    transform::ALL.iter().copied().find(|t| t.href == Some(href))
}

pub fn key_data_by_name(name: &str) -> Option<&'static KeyDataDescriptor> {
    key_data::ALL.iter().copied().find(|k| k.name == name)
}

/// Find any descriptor by name; transforms shadow key data on a clash.
pub fn lookup(name: &str) -> Option<Descriptor> {
    transform_by_name(name)
        .map(Descriptor::Transform)
        .or_else(|| key_data_by_name(name).map(Descriptor::KeyData))
}

/// Default key-data kinds honoured while reading `<KeyInfo>`.
pub fn default_key_data() -> Vec<&'static KeyDataDescriptor> {
    key_data::ALL
        .iter()
        .copied()
        .filter(|k| k.usage.intersects(KeyDataUsage::KEY_INFO_READ))
        .collect()
}

/// Whether `href` names a signature method.
pub fn is_signature_method(href: &str) -> bool {
    transform_by_href(href).is_some_and(|t| t.is_signature_method())
}
