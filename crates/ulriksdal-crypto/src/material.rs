#![forbid(unsafe_code)]

//! Raw key values the algorithms operate on.
//!
//! Everything above this crate (names, certificates, stores) wraps a
//! [`KeyMaterial`]; the algorithms only ever see this enum.

use std::fmt;

use rsa::traits::PublicKeyParts;
use ulriksdal_core::{Error, KeyDataClass};

/// Smallest RSA modulus accepted for generation and adoption.
pub const MIN_RSA_BITS: usize = 1024;

/// Key value in one of the supported algorithm families.
#[derive(Clone)]
pub enum KeyMaterial {
    Rsa {
        private: Option<rsa::RsaPrivateKey>,
        public: rsa::RsaPublicKey,
    },
    EcP256 {
        private: Option<p256::ecdsa::SigningKey>,
        public: p256::ecdsa::VerifyingKey,
    },
    EcP384 {
        private: Option<p384::ecdsa::SigningKey>,
        public: p384::ecdsa::VerifyingKey,
    },
    Hmac(Vec<u8>),
    Aes(Vec<u8>),
    Des3(Vec<u8>),
}

impl KeyMaterial {
    pub fn rsa_private(key: rsa::RsaPrivateKey) -> Self {
        let public = key.to_public_key();
        Self::Rsa {
            private: Some(key),
            public,
        }
    }

    pub fn rsa_public(public: rsa::RsaPublicKey) -> Self {
        Self::Rsa {
            private: None,
            public,
        }
    }

    pub fn p256_private(key: p256::ecdsa::SigningKey) -> Self {
        let public = *key.verifying_key();
        Self::EcP256 {
            private: Some(key),
            public,
        }
    }

    pub fn p384_private(key: p384::ecdsa::SigningKey) -> Self {
        let public = *key.verifying_key();
        Self::EcP384 {
            private: Some(key),
            public,
        }
    }

    /// Generate a fresh RSA key pair.
    pub fn generate_rsa(bits: usize) -> Result<Self, Error> {
        if bits < MIN_RSA_BITS {
            return Err(Error::Key(format!(
                "RSA key size {bits} is below the {MIN_RSA_BITS}-bit minimum"
            )));
        }
        let mut rng = rand::thread_rng();
        let key = rsa::RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| Error::Crypto(format!("RSA key generation: {e}")))?;
        Ok(Self::rsa_private(key))
    }

    /// Random bytes for a symmetric key of `bits` bits.
    pub fn random_bytes(bits: usize) -> Result<Vec<u8>, Error> {
        use rand::RngCore;

        if bits == 0 || bits % 8 != 0 {
            return Err(Error::Key(format!(
                "symmetric key size must be a positive multiple of 8, got {bits}"
            )));
        }
        let mut bytes = vec![0u8; bits / 8];
        rand::thread_rng().fill_bytes(&mut bytes);
        Ok(bytes)
    }

    pub fn class(&self) -> KeyDataClass {
        match self {
            Self::Rsa { .. } => KeyDataClass::Rsa,
            Self::EcP256 { .. } | Self::EcP384 { .. } => KeyDataClass::Ec,
            Self::Hmac(_) => KeyDataClass::Hmac,
            Self::Aes(_) => KeyDataClass::Aes,
            Self::Des3(_) => KeyDataClass::Des,
        }
    }

    /// Key size in bits.
    pub fn bits(&self) -> usize {
        match self {
            Self::Rsa { public, .. } => public.size() * 8,
            Self::EcP256 { .. } => 256,
            Self::EcP384 { .. } => 384,
            Self::Hmac(k) | Self::Aes(k) | Self::Des3(k) => k.len() * 8,
        }
    }

    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::Hmac(_) | Self::Aes(_) | Self::Des3(_))
    }

    /// True when the material can sign or decrypt.
    pub fn has_private(&self) -> bool {
        match self {
            Self::Rsa { private, .. } => private.is_some(),
            Self::EcP256 { private, .. } => private.is_some(),
            Self::EcP384 { private, .. } => private.is_some(),
            _ => true,
        }
    }

    pub fn symmetric_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Hmac(k) | Self::Aes(k) | Self::Des3(k) => Some(k),
            _ => None,
        }
    }

    /// The same key with any private half removed.
    pub fn to_public(&self) -> Self {
        match self {
            Self::Rsa { public, .. } => Self::rsa_public(public.clone()),
            Self::EcP256 { public, .. } => Self::EcP256 {
                private: None,
                public: *public,
            },
            Self::EcP384 { public, .. } => Self::EcP384 {
                private: None,
                public: *public,
            },
            other => other.clone(),
        }
    }

    /// Reject values no algorithm could use.
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Self::Rsa { public, .. } if public.size() * 8 < MIN_RSA_BITS => Err(Error::Key(
                format!("RSA key of {} bits is too small", public.size() * 8),
            )),
            Self::Hmac(k) if k.is_empty() => Err(Error::Key("empty HMAC key".into())),
            Self::Aes(k) if !matches!(k.len(), 16 | 24 | 32) => Err(Error::Key(format!(
                "AES key must be 16, 24 or 32 bytes, got {}",
                k.len()
            ))),
            Self::Des3(k) if k.len() != 24 => Err(Error::Key(format!(
                "3DES key must be 24 bytes, got {}",
                k.len()
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("class", &self.class())
            .field("bits", &self.bits())
            .field("private", &self.has_private())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_validation() {
        assert!(KeyMaterial::Aes(vec![0; 16]).validate().is_ok());
        assert!(KeyMaterial::Aes(vec![0; 15]).validate().is_err());
        assert!(KeyMaterial::Des3(vec![0; 24]).validate().is_ok());
        assert!(KeyMaterial::Hmac(Vec::new()).validate().is_err());
        assert_eq!(KeyMaterial::Hmac(vec![1; 20]).bits(), 160);
    }

    #[test]
    fn test_random_bytes_size() {
        assert_eq!(KeyMaterial::random_bytes(192).unwrap().len(), 24);
        assert!(KeyMaterial::random_bytes(0).is_err());
        assert!(KeyMaterial::random_bytes(12).is_err());
    }

    #[test]
    fn test_rsa_generation_and_public_half() {
        assert!(KeyMaterial::generate_rsa(512).is_err());
        let key = KeyMaterial::generate_rsa(1024).unwrap();
        assert_eq!(key.class(), KeyDataClass::Rsa);
        assert_eq!(key.bits(), 1024);
        assert!(key.has_private());
        let public = key.to_public();
        assert!(!public.has_private());
        assert!(public.validate().is_ok());
    }

    #[test]
    fn test_debug_hides_key_bytes() {
        let text = format!("{:?}", KeyMaterial::Hmac(b"secret".to_vec()));
        assert!(!text.contains("115"));
        assert!(text.contains("Hmac"));
    }
}
