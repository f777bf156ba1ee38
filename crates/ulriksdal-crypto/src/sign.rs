#![forbid(unsafe_code)]

//! Signature methods: RSA PKCS#1 v1.5, ECDSA over P-256/P-384, and HMAC.

use signature::{SignatureEncoding, Signer, Verifier};
use ulriksdal_core::{algorithm, Error, KeyDataClass};

use crate::material::KeyMaterial;

/// A `<SignatureMethod>` implementation.
pub trait SignatureAlgorithm: Send {
    fn uri(&self) -> &'static str;

    /// Family of key this method needs.
    fn key_class(&self) -> KeyDataClass;

    /// Whether `key` has the right family and shape for this method.
    fn accepts(&self, key: &KeyMaterial) -> bool;

    fn sign(&self, key: &KeyMaterial, data: &[u8]) -> Result<Vec<u8>, Error>;

    /// `Ok(false)` for a well-formed call whose signature does not match.
    fn verify(&self, key: &KeyMaterial, data: &[u8], signature: &[u8]) -> Result<bool, Error>;
}

pub fn from_uri(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
    use HashType::*;

    let method: Box<dyn SignatureAlgorithm> = match uri {
        algorithm::RSA_SHA1 => Box::new(RsaPkcs1v15 {
            uri: algorithm::RSA_SHA1,
            hash: Sha1,
        }),
        algorithm::RSA_SHA224 => Box::new(RsaPkcs1v15 {
            uri: algorithm::RSA_SHA224,
            hash: Sha224,
        }),
        algorithm::RSA_SHA256 => Box::new(RsaPkcs1v15 {
            uri: algorithm::RSA_SHA256,
            hash: Sha256,
        }),
        algorithm::RSA_SHA384 => Box::new(RsaPkcs1v15 {
            uri: algorithm::RSA_SHA384,
            hash: Sha384,
        }),
        algorithm::RSA_SHA512 => Box::new(RsaPkcs1v15 {
            uri: algorithm::RSA_SHA512,
            hash: Sha512,
        }),
        algorithm::ECDSA_SHA256 => Box::new(EcdsaP256),
        algorithm::ECDSA_SHA384 => Box::new(EcdsaP384),
        algorithm::HMAC_SHA1 => Box::new(HmacMethod {
            uri: algorithm::HMAC_SHA1,
            hash: Sha1,
        }),
        algorithm::HMAC_SHA224 => Box::new(HmacMethod {
            uri: algorithm::HMAC_SHA224,
            hash: Sha224,
        }),
        algorithm::HMAC_SHA256 => Box::new(HmacMethod {
            uri: algorithm::HMAC_SHA256,
            hash: Sha256,
        }),
        algorithm::HMAC_SHA384 => Box::new(HmacMethod {
            uri: algorithm::HMAC_SHA384,
            hash: Sha384,
        }),
        algorithm::HMAC_SHA512 => Box::new(HmacMethod {
            uri: algorithm::HMAC_SHA512,
            hash: Sha512,
        }),
        _ => {
            return Err(Error::UnsupportedAlgorithm(format!(
                "signature method: {uri}"
            )))
        }
    };
    Ok(method)
}

#[derive(Debug, Clone, Copy)]
enum HashType {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

// ── RSA PKCS#1 v1.5 ─────────────────────────────────────────────────

struct RsaPkcs1v15 {
    uri: &'static str,
    hash: HashType,
}

impl SignatureAlgorithm for RsaPkcs1v15 {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn key_class(&self) -> KeyDataClass {
        KeyDataClass::Rsa
    }

    fn accepts(&self, key: &KeyMaterial) -> bool {
        matches!(key, KeyMaterial::Rsa { .. })
    }

    fn sign(&self, key: &KeyMaterial, data: &[u8]) -> Result<Vec<u8>, Error> {
        let KeyMaterial::Rsa {
            private: Some(private),
            ..
        } = key
        else {
            return Err(Error::Key("RSA private key required".into()));
        };
        macro_rules! sign_with {
            ($hasher:ty) => {{
                let signer = rsa::pkcs1v15::SigningKey::<$hasher>::new(private.clone());
                signer
                    .try_sign(data)
                    .map(|sig| sig.to_vec())
                    .map_err(|e| Error::Crypto(format!("RSA sign: {e}")))
            }};
        }
        match self.hash {
            HashType::Sha1 => sign_with!(sha1::Sha1),
            HashType::Sha224 => sign_with!(sha2::Sha224),
            HashType::Sha256 => sign_with!(sha2::Sha256),
            HashType::Sha384 => sign_with!(sha2::Sha384),
            HashType::Sha512 => sign_with!(sha2::Sha512),
        }
    }

    fn verify(&self, key: &KeyMaterial, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let KeyMaterial::Rsa { public, .. } = key else {
            return Err(Error::Key("RSA key required".into()));
        };
        let Ok(sig) = rsa::pkcs1v15::Signature::try_from(sig_bytes) else {
            return Ok(false);
        };
        macro_rules! verify_with {
            ($hasher:ty) => {{
                let verifier = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public.clone());
                Ok(verifier.verify(data, &sig).is_ok())
            }};
        }
        match self.hash {
            HashType::Sha1 => verify_with!(sha1::Sha1),
            HashType::Sha224 => verify_with!(sha2::Sha224),
            HashType::Sha256 => verify_with!(sha2::Sha256),
            HashType::Sha384 => verify_with!(sha2::Sha384),
            HashType::Sha512 => verify_with!(sha2::Sha512),
        }
    }
}

// ── ECDSA ────────────────────────────────────────────────────────────
//
// XML-DSig carries ECDSA signatures as the fixed-width concatenation r || s.

macro_rules! ecdsa_method {
    ($name:ident, $curve:ident, $variant:ident, $uri:expr, $width:expr) => {
        struct $name;

        impl SignatureAlgorithm for $name {
            fn uri(&self) -> &'static str {
                $uri
            }

            fn key_class(&self) -> KeyDataClass {
                KeyDataClass::Ec
            }

            fn accepts(&self, key: &KeyMaterial) -> bool {
                matches!(key, KeyMaterial::$variant { .. })
            }

            fn sign(&self, key: &KeyMaterial, data: &[u8]) -> Result<Vec<u8>, Error> {
                let KeyMaterial::$variant {
                    private: Some(private),
                    ..
                } = key
                else {
                    return Err(Error::Key(concat!(stringify!($curve), " private key required").into()));
                };
                let sig: $curve::ecdsa::Signature = private
                    .try_sign(data)
                    .map_err(|e| Error::Crypto(format!("ECDSA sign: {e}")))?;
                Ok(sig.to_bytes().to_vec())
            }

            fn verify(&self, key: &KeyMaterial, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
                let KeyMaterial::$variant { public, .. } = key else {
                    return Err(Error::Key(concat!(stringify!($curve), " key required").into()));
                };
                if sig_bytes.len() != 2 * $width {
                    return Ok(false);
                }
                let r = $curve::FieldBytes::clone_from_slice(&sig_bytes[..$width]);
                let s = $curve::FieldBytes::clone_from_slice(&sig_bytes[$width..]);
                let Ok(sig) = $curve::ecdsa::Signature::from_scalars(r, s) else {
                    return Ok(false);
                };
                Ok(public.verify(data, &sig).is_ok())
            }
        }
    };
}

ecdsa_method!(EcdsaP256, p256, EcP256, algorithm::ECDSA_SHA256, 32);
ecdsa_method!(EcdsaP384, p384, EcP384, algorithm::ECDSA_SHA384, 48);

// ── HMAC ─────────────────────────────────────────────────────────────

struct HmacMethod {
    uri: &'static str,
    hash: HashType,
}

macro_rules! with_mac {
    ($hash:expr, $key:expr, |$mac:ident| $body:expr) => {{
        use hmac::Mac;
        macro_rules! run {
            ($hasher:ty) => {{
                let mut $mac = hmac::Hmac::<$hasher>::new_from_slice($key)
                    .map_err(|e| Error::Key(format!("HMAC key: {e}")))?;
                $body
            }};
        }
        match $hash {
            HashType::Sha1 => run!(sha1::Sha1),
            HashType::Sha224 => run!(sha2::Sha224),
            HashType::Sha256 => run!(sha2::Sha256),
            HashType::Sha384 => run!(sha2::Sha384),
            HashType::Sha512 => run!(sha2::Sha512),
        }
    }};
}

impl SignatureAlgorithm for HmacMethod {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn key_class(&self) -> KeyDataClass {
        KeyDataClass::Hmac
    }

    fn accepts(&self, key: &KeyMaterial) -> bool {
        matches!(key, KeyMaterial::Hmac(k) if !k.is_empty())
    }

    fn sign(&self, key: &KeyMaterial, data: &[u8]) -> Result<Vec<u8>, Error> {
        let KeyMaterial::Hmac(secret) = key else {
            return Err(Error::Key("HMAC key required".into()));
        };
        with_mac!(self.hash, secret, |mac| {
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        })
    }

    fn verify(&self, key: &KeyMaterial, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let KeyMaterial::Hmac(secret) = key else {
            return Err(Error::Key("HMAC key required".into()));
        };
        with_mac!(self.hash, secret, |mac| {
            mac.update(data);
            Ok(mac.verify_slice(sig_bytes).is_ok())
        })
    }
}
