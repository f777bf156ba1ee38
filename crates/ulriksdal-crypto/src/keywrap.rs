#![forbid(unsafe_code)]

//! AES key wrap (RFC 3394) for `<EncryptedKey>` under a symmetric KEK.

use aes_kw::Kek;
use ulriksdal_core::{algorithm, Error};

use crate::material::KeyMaterial;

pub struct AesKeyWrap {
    kek_size: usize,
    uri: &'static str,
}

pub fn from_uri(uri: &str) -> Result<AesKeyWrap, Error> {
    let (kek_size, uri) = match uri {
        algorithm::KW_AES128 => (16, algorithm::KW_AES128),
        algorithm::KW_AES192 => (24, algorithm::KW_AES192),
        algorithm::KW_AES256 => (32, algorithm::KW_AES256),
        _ => return Err(Error::UnsupportedAlgorithm(format!("key wrap: {uri}"))),
    };
    Ok(AesKeyWrap { kek_size, uri })
}

macro_rules! with_kek {
    ($size:expr, $bytes:expr, |$kek:ident| $body:expr) => {
        match $size {
            16 => {
                let $kek = Kek::<aes::Aes128>::new($bytes.into());
                $body
            }
            24 => {
                let $kek = Kek::<aes::Aes192>::new($bytes.into());
                $body
            }
            _ => {
                let $kek = Kek::<aes::Aes256>::new($bytes.into());
                $body
            }
        }
    };
}

impl AesKeyWrap {
    pub fn uri(&self) -> &'static str {
        self.uri
    }

    pub fn kek_size(&self) -> usize {
        self.kek_size
    }

    pub fn accepts(&self, key: &KeyMaterial) -> bool {
        matches!(key, KeyMaterial::Aes(k) if k.len() == self.kek_size)
    }

    fn check(&self, kek: &[u8]) -> Result<(), Error> {
        if kek.len() != self.kek_size {
            return Err(Error::Key(format!(
                "expected {} byte key-encryption key, got {}",
                self.kek_size,
                kek.len()
            )));
        }
        Ok(())
    }

    pub fn wrap(&self, kek: &[u8], key: &[u8]) -> Result<Vec<u8>, Error> {
        self.check(kek)?;
        if key.len() < 16 || key.len() % 8 != 0 {
            return Err(Error::Crypto(format!(
                "cannot wrap a {} byte key; AES-KW needs a multiple of 8, at least 16",
                key.len()
            )));
        }
        let mut out = vec![0u8; key.len() + 8];
        with_kek!(self.kek_size, kek, |k| k
            .wrap(key, &mut out)
            .map_err(|e| Error::Crypto(format!("AES-KW wrap: {e}")))?);
        Ok(out)
    }

    pub fn unwrap(&self, kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>, Error> {
        self.check(kek)?;
        if wrapped.len() < 24 || wrapped.len() % 8 != 0 {
            return Err(Error::Crypto(format!(
                "wrapped key of {} bytes is malformed",
                wrapped.len()
            )));
        }
        let mut out = vec![0u8; wrapped.len() - 8];
        with_kek!(self.kek_size, kek, |k| k
            .unwrap(wrapped, &mut out)
            .map_err(|_| Error::Crypto("AES-KW integrity check failed".into()))?);
        Ok(out)
    }
}
