#![forbid(unsafe_code)]

//! RSA key transport for `<EncryptedKey>`: PKCS#1 v1.5 and OAEP with
//! SHA-1 digest and MGF1-SHA-1.

use rsa::{Oaep, Pkcs1v15Encrypt};
use ulriksdal_core::{algorithm, Error};

use crate::material::KeyMaterial;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaTransport {
    Pkcs1v15,
    OaepMgf1p,
}

pub fn from_uri(uri: &str) -> Result<RsaTransport, Error> {
    match uri {
        algorithm::RSA_PKCS1 => Ok(RsaTransport::Pkcs1v15),
        algorithm::RSA_OAEP => Ok(RsaTransport::OaepMgf1p),
        _ => Err(Error::UnsupportedAlgorithm(format!("key transport: {uri}"))),
    }
}

impl RsaTransport {
    pub fn uri(self) -> &'static str {
        match self {
            Self::Pkcs1v15 => algorithm::RSA_PKCS1,
            Self::OaepMgf1p => algorithm::RSA_OAEP,
        }
    }

    pub fn accepts(self, key: &KeyMaterial) -> bool {
        matches!(key, KeyMaterial::Rsa { .. })
    }

    /// Encrypt `secret` to the public half of `key`.
    pub fn encrypt(self, key: &KeyMaterial, secret: &[u8]) -> Result<Vec<u8>, Error> {
        let KeyMaterial::Rsa { public, .. } = key else {
            return Err(Error::Key("RSA key required for key transport".into()));
        };
        let mut rng = rand::thread_rng();
        let out = match self {
            Self::Pkcs1v15 => public.encrypt(&mut rng, Pkcs1v15Encrypt, secret),
            Self::OaepMgf1p => public.encrypt(&mut rng, Oaep::new::<sha1::Sha1>(), secret),
        };
        out.map_err(|e| Error::Crypto(format!("RSA encrypt: {e}")))
    }

    pub fn decrypt(self, key: &KeyMaterial, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
        let KeyMaterial::Rsa {
            private: Some(private),
            ..
        } = key
        else {
            return Err(Error::Key("RSA private key required to decrypt".into()));
        };
        let out = match self {
            Self::Pkcs1v15 => private.decrypt(Pkcs1v15Encrypt, encrypted),
            Self::OaepMgf1p => private.decrypt(Oaep::new::<sha1::Sha1>(), encrypted),
        };
        out.map_err(|e| Error::Crypto(format!("RSA decrypt: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_paddings_round_trip() {
        let key = KeyMaterial::generate_rsa(1024).unwrap();
        let public = key.to_public();
        for uri in [algorithm::RSA_PKCS1, algorithm::RSA_OAEP] {
            let t = from_uri(uri).unwrap();
            assert_eq!(t.uri(), uri);
            let ct = t.encrypt(&public, &[5u8; 16]).unwrap();
            assert_eq!(ct.len(), 128);
            assert_eq!(t.decrypt(&key, &ct).unwrap(), [5u8; 16]);
        }
    }

    #[test]
    fn test_public_key_cannot_decrypt() {
        let key = KeyMaterial::generate_rsa(1024).unwrap();
        let t = RsaTransport::OaepMgf1p;
        let ct = t.encrypt(&key, b"k").unwrap();
        assert!(matches!(t.decrypt(&key.to_public(), &ct), Err(Error::Key(_))));
        assert!(!t.accepts(&KeyMaterial::Aes(vec![0; 16])));
    }
}
