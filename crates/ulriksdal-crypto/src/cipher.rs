#![forbid(unsafe_code)]

//! Block encryption methods for `<EncryptionMethod>`.
//!
//! Output layouts follow XML Encryption: CBC modes prepend the IV, GCM
//! prepends a 12-byte nonce and appends the 16-byte tag.

use rand::RngCore;
use ulriksdal_core::{algorithm, Error, KeyDataClass};

use crate::material::KeyMaterial;

pub trait CipherAlgorithm: Send {
    fn uri(&self) -> &'static str;
    fn key_class(&self) -> KeyDataClass;
    /// Required key length in bytes.
    fn key_size(&self) -> usize;
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error>;
    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error>;

    fn accepts(&self, key: &KeyMaterial) -> bool {
        key.class() == self.key_class()
            && key.symmetric_bytes().map(<[u8]>::len) == Some(self.key_size())
    }
}

pub fn from_uri(uri: &str) -> Result<Box<dyn CipherAlgorithm>, Error> {
    let cipher: Box<dyn CipherAlgorithm> = match uri {
        algorithm::AES128_CBC => Box::new(AesCbc::new(16, algorithm::AES128_CBC)),
        algorithm::AES192_CBC => Box::new(AesCbc::new(24, algorithm::AES192_CBC)),
        algorithm::AES256_CBC => Box::new(AesCbc::new(32, algorithm::AES256_CBC)),
        algorithm::AES128_GCM => Box::new(AesGcm::new(16, algorithm::AES128_GCM)),
        algorithm::AES192_GCM => Box::new(AesGcm::new(24, algorithm::AES192_GCM)),
        algorithm::AES256_GCM => Box::new(AesGcm::new(32, algorithm::AES256_GCM)),
        algorithm::TRIPLEDES_CBC => Box::new(TripleDesCbc),
        _ => return Err(Error::UnsupportedAlgorithm(format!("encryption method: {uri}"))),
    };
    Ok(cipher)
}

fn check_key(expected: usize, key: &[u8]) -> Result<(), Error> {
    if key.len() != expected {
        return Err(Error::Key(format!(
            "expected {expected} byte key, got {}",
            key.len()
        )));
    }
    Ok(())
}

fn random<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

// ── CBC ──────────────────────────────────────────────────────────────

macro_rules! cbc_encrypt {
    ($cipher:ty, $key:expr, $iv:expr, $buf:expr) => {{
        use cbc::cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit};
        let len = $buf.len();
        cbc::Encryptor::<$cipher>::new_from_slices($key, $iv)
            .map_err(|e| Error::Crypto(format!("CBC init: {e}")))?
            .encrypt_padded_mut::<NoPadding>(&mut $buf, len)
            .map_err(|e| Error::Crypto(format!("CBC encrypt: {e}")))?;
    }};
}

macro_rules! cbc_decrypt {
    ($cipher:ty, $key:expr, $iv:expr, $buf:expr) => {{
        use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};
        cbc::Decryptor::<$cipher>::new_from_slices($key, $iv)
            .map_err(|e| Error::Crypto(format!("CBC init: {e}")))?
            .decrypt_padded_mut::<NoPadding>(&mut $buf)
            .map_err(|e| Error::Crypto(format!("CBC decrypt: {e}")))?;
    }};
}

struct AesCbc {
    key_size: usize,
    uri: &'static str,
}

impl AesCbc {
    fn new(key_size: usize, uri: &'static str) -> Self {
        Self { key_size, uri }
    }
}

impl CipherAlgorithm for AesCbc {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn key_class(&self) -> KeyDataClass {
        KeyDataClass::Aes
    }

    fn key_size(&self) -> usize {
        self.key_size
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        check_key(self.key_size, key)?;
        let iv = random::<16>();
        let mut buf = pad(plaintext, 16);
        match self.key_size {
            16 => cbc_encrypt!(aes::Aes128, key, &iv, buf),
            24 => cbc_encrypt!(aes::Aes192, key, &iv, buf),
            _ => cbc_encrypt!(aes::Aes256, key, &iv, buf),
        }
        Ok([iv.as_slice(), &buf].concat())
    }

    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        check_key(self.key_size, key)?;
        if data.len() < 32 || data.len() % 16 != 0 {
            return Err(Error::Crypto(format!(
                "AES-CBC ciphertext of {} bytes is not IV plus whole blocks",
                data.len()
            )));
        }
        let (iv, body) = data.split_at(16);
        let mut buf = body.to_vec();
        match self.key_size {
            16 => cbc_decrypt!(aes::Aes128, key, iv, buf),
            24 => cbc_decrypt!(aes::Aes192, key, iv, buf),
            _ => cbc_decrypt!(aes::Aes256, key, iv, buf),
        }
        unpad(buf, 16)
    }
}

struct TripleDesCbc;

impl CipherAlgorithm for TripleDesCbc {
    fn uri(&self) -> &'static str {
        algorithm::TRIPLEDES_CBC
    }

    fn key_class(&self) -> KeyDataClass {
        KeyDataClass::Des
    }

    fn key_size(&self) -> usize {
        24
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        check_key(24, key)?;
        let iv = random::<8>();
        let mut buf = pad(plaintext, 8);
        cbc_encrypt!(des::TdesEde3, key, &iv, buf);
        Ok([iv.as_slice(), &buf].concat())
    }

    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        check_key(24, key)?;
        if data.len() < 16 || data.len() % 8 != 0 {
            return Err(Error::Crypto(format!(
                "3DES-CBC ciphertext of {} bytes is not IV plus whole blocks",
                data.len()
            )));
        }
        let (iv, body) = data.split_at(8);
        let mut buf = body.to_vec();
        cbc_decrypt!(des::TdesEde3, key, iv, buf);
        unpad(buf, 8)
    }
}

/// Pad to a whole block; the last byte holds the pad length.
fn pad(data: &[u8], block: usize) -> Vec<u8> {
    let n = block - data.len() % block;
    let mut out = Vec::with_capacity(data.len() + n);
    out.extend_from_slice(data);
    out.resize(data.len() + n, n as u8);
    out
}

/// Strip XML Encryption padding. Only the final byte is significant, so
/// ISO 10126 random fill is accepted as well as PKCS#7.
fn unpad(mut data: Vec<u8>, block: usize) -> Result<Vec<u8>, Error> {
    let Some(&last) = data.last() else {
        return Err(Error::Crypto("empty CBC plaintext".into()));
    };
    let n = last as usize;
    if n == 0 || n > block || n > data.len() {
        return Err(Error::Crypto("invalid block padding".into()));
    }
    data.truncate(data.len() - n);
    Ok(data)
}

// ── GCM ──────────────────────────────────────────────────────────────

const GCM_NONCE: usize = 12;
const GCM_TAG: usize = 16;

struct AesGcm {
    key_size: usize,
    uri: &'static str,
}

impl AesGcm {
    fn new(key_size: usize, uri: &'static str) -> Self {
        Self { key_size, uri }
    }
}

macro_rules! gcm {
    ($self:expr, $key:expr, |$cipher:ident| $body:expr) => {{
        use aes_gcm::{aead::consts::U12, KeyInit};
        macro_rules! run {
            ($aead:ty) => {{
                let $cipher = <$aead>::new_from_slice($key)
                    .map_err(|e| Error::Crypto(format!("AES-GCM init: {e}")))?;
                $body
            }};
        }
        match $self.key_size {
            16 => run!(aes_gcm::Aes128Gcm),
            24 => run!(aes_gcm::AesGcm<aes::Aes192, U12>),
            _ => run!(aes_gcm::Aes256Gcm),
        }
    }};
}

impl CipherAlgorithm for AesGcm {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn key_class(&self) -> KeyDataClass {
        KeyDataClass::Aes
    }

    fn key_size(&self) -> usize {
        self.key_size
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        use aes_gcm::aead::Aead;

        check_key(self.key_size, key)?;
        let nonce = random::<GCM_NONCE>();
        let sealed = gcm!(self, key, |cipher| cipher
            .encrypt(aes_gcm::Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| Error::Crypto(format!("AES-GCM encrypt: {e}")))?);
        Ok([nonce.as_slice(), &sealed].concat())
    }

    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        use aes_gcm::aead::Aead;

        check_key(self.key_size, key)?;
        if data.len() < GCM_NONCE + GCM_TAG {
            return Err(Error::Crypto("AES-GCM ciphertext too short".into()));
        }
        let (nonce, sealed) = data.split_at(GCM_NONCE);
        let opened = gcm!(self, key, |cipher| cipher
            .decrypt(aes_gcm::Nonce::from_slice(nonce), sealed)
            .map_err(|_| Error::Crypto("AES-GCM authentication failed".into()))?);
        Ok(opened)
    }
}
