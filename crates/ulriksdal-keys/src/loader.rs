#![forbid(unsafe_code)]

//! Parse key and certificate files into [`KeyMaterial`].
//!
//! These are engine-level helpers returning low-level [`Error`]s; the
//! [`Key`](crate::Key) constructors report them and surface `Load`.

use der::{Decode, Encode};
use pkcs8::DecodePrivateKey;
use spki::DecodePublicKey;
use ulriksdal_core::{Error, KeyDataClass};
use ulriksdal_crypto::KeyMaterial;

/// Encoding of key or certificate bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// Any PEM block: PKCS#8, PKCS#1, SPKI or a certificate.
    Pem,
    /// Any DER structure, tried in the same order as `Pem`.
    Der,
    Pkcs8Pem,
    Pkcs8Der,
    CertPem,
    CertDer,
    /// Raw symmetric key bytes.
    Binary,
}

/// What a key file yielded.
pub struct Loaded {
    pub material: KeyMaterial,
    /// DER certificates that came with the key, leaf first.
    pub certs: Vec<Vec<u8>>,
}

impl Loaded {
    fn bare(material: KeyMaterial) -> Self {
        Self {
            material,
            certs: Vec::new(),
        }
    }
}

pub fn load(data: &[u8], format: KeyFormat, password: Option<&str>) -> Result<Loaded, Error> {
    match format {
        KeyFormat::Pem | KeyFormat::Pkcs8Pem | KeyFormat::CertPem => {
            let (label, der) = decode_pem(data)?;
            match (format, label.as_str()) {
                (KeyFormat::CertPem, "CERTIFICATE") | (KeyFormat::Pem, "CERTIFICATE") => {
                    from_cert_der(&der)
                }
                (KeyFormat::CertPem, other) => {
                    Err(Error::Key(format!("expected a CERTIFICATE block, found {other}")))
                }
                (_, "ENCRYPTED PRIVATE KEY") => {
                    encrypted_pkcs8_der(&der, password).map(Loaded::bare)
                }
                (_, "PRIVATE KEY") => pkcs8_der(&der).map(Loaded::bare),
                (KeyFormat::Pem, "RSA PRIVATE KEY") => {
                    use pkcs1::DecodeRsaPrivateKey;
                    let key = rsa::RsaPrivateKey::from_pkcs1_der(&der)
                        .map_err(|e| Error::Key(format!("PKCS#1 private key: {e}")))?;
                    Ok(Loaded::bare(KeyMaterial::rsa_private(key)))
                }
                (KeyFormat::Pem, "RSA PUBLIC KEY") => {
                    use pkcs1::DecodeRsaPublicKey;
                    let key = rsa::RsaPublicKey::from_pkcs1_der(&der)
                        .map_err(|e| Error::Key(format!("PKCS#1 public key: {e}")))?;
                    Ok(Loaded::bare(KeyMaterial::rsa_public(key)))
                }
                (KeyFormat::Pem, "PUBLIC KEY") => spki_der(&der).map(Loaded::bare),
                (_, other) => Err(Error::Key(format!("unsupported PEM block: {other}"))),
            }
        }
        KeyFormat::Pkcs8Der => match password {
            Some(_) => encrypted_pkcs8_der(data, password).map(Loaded::bare),
            None => pkcs8_der(data).map(Loaded::bare),
        },
        KeyFormat::CertDer => from_cert_der(data),
        KeyFormat::Der => {
            if let Ok(m) = pkcs8_der(data) {
                return Ok(Loaded::bare(m));
            }
            {
                use pkcs1::DecodeRsaPrivateKey;
                if let Ok(k) = rsa::RsaPrivateKey::from_pkcs1_der(data) {
                    return Ok(Loaded::bare(KeyMaterial::rsa_private(k)));
                }
            }
            if let Ok(m) = spki_der(data) {
                return Ok(Loaded::bare(m));
            }
            if password.is_some() {
                if let Ok(m) = encrypted_pkcs8_der(data, password) {
                    return Ok(Loaded::bare(m));
                }
            }
            from_cert_der(data).map_err(|_| Error::Key("unrecognized DER key data".into()))
        }
        KeyFormat::Binary => Err(Error::Key(
            "binary key data needs a key kind; load it with from_binary_data".into(),
        )),
    }
}

/// Build symmetric material of `class` from raw bytes.
pub fn binary(class: KeyDataClass, bytes: &[u8]) -> Result<KeyMaterial, Error> {
    let material = match class {
        KeyDataClass::Aes => KeyMaterial::Aes(bytes.to_vec()),
        KeyDataClass::Des => KeyMaterial::Des3(bytes.to_vec()),
        KeyDataClass::Hmac => KeyMaterial::Hmac(bytes.to_vec()),
        other => {
            return Err(Error::Key(format!(
                "{other:?} keys cannot be loaded from raw binary data"
            )))
        }
    };
    material.validate()?;
    Ok(material)
}

/// Normalize certificate bytes to DER, checking they parse.
pub fn cert_der(data: &[u8], format: KeyFormat) -> Result<Vec<u8>, Error> {
    let der = match format {
        KeyFormat::Pem | KeyFormat::CertPem => {
            let (label, der) = decode_pem(data)?;
            if label != "CERTIFICATE" {
                return Err(Error::Certificate(format!(
                    "expected a CERTIFICATE block, found {label}"
                )));
            }
            der
        }
        KeyFormat::Der | KeyFormat::CertDer => data.to_vec(),
        other => {
            return Err(Error::Certificate(format!(
                "{other:?} is not a certificate format"
            )))
        }
    };
    x509_cert::Certificate::from_der(&der)
        .map_err(|e| Error::Certificate(format!("cannot parse certificate: {e}")))?;
    Ok(der)
}

/// The public key inside a DER certificate.
pub fn cert_public_key(der: &[u8]) -> Result<KeyMaterial, Error> {
    let cert = x509_cert::Certificate::from_der(der)
        .map_err(|e| Error::Certificate(format!("cannot parse certificate: {e}")))?;
    let spki = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::Certificate(format!("cannot encode public key info: {e}")))?;
    spki_der(&spki)
}

fn from_cert_der(der: &[u8]) -> Result<Loaded, Error> {
    Ok(Loaded {
        material: cert_public_key(der)?,
        certs: vec![der.to_vec()],
    })
}

fn decode_pem(data: &[u8]) -> Result<(String, Vec<u8>), Error> {
    let text = std::str::from_utf8(data)
        .map_err(|e| Error::Key(format!("PEM data is not UTF-8: {e}")))?;
    let (label, der) = pem_rfc7468::decode_vec(text.trim().as_bytes())
        .map_err(|e| Error::Key(format!("malformed PEM: {e}")))?;
    Ok((label.to_owned(), der))
}

fn pkcs8_der(der: &[u8]) -> Result<KeyMaterial, Error> {
    if let Ok(k) = rsa::RsaPrivateKey::from_pkcs8_der(der) {
        return Ok(KeyMaterial::rsa_private(k));
    }
    if let Ok(k) = p256::ecdsa::SigningKey::from_pkcs8_der(der) {
        return Ok(KeyMaterial::p256_private(k));
    }
    if let Ok(k) = p384::ecdsa::SigningKey::from_pkcs8_der(der) {
        return Ok(KeyMaterial::p384_private(k));
    }
    Err(Error::Key(
        "PKCS#8 key is not RSA, P-256 or P-384".into(),
    ))
}

fn encrypted_pkcs8_der(der: &[u8], password: Option<&str>) -> Result<KeyMaterial, Error> {
    let password =
        password.ok_or_else(|| Error::Key("encrypted private key needs a password".into()))?;
    let info = pkcs8::EncryptedPrivateKeyInfo::from_der(der)
        .map_err(|e| Error::Key(format!("encrypted PKCS#8: {e}")))?;
    let plain = info
        .decrypt(password)
        .map_err(|e| Error::Key(format!("cannot decrypt private key: {e}")))?;
    pkcs8_der(plain.as_bytes())
}

pub(crate) fn spki_der(der: &[u8]) -> Result<KeyMaterial, Error> {
    if let Ok(k) = rsa::RsaPublicKey::from_public_key_der(der) {
        return Ok(KeyMaterial::rsa_public(k));
    }
    if let Ok(public) = p256::ecdsa::VerifyingKey::from_public_key_der(der) {
        return Ok(KeyMaterial::EcP256 {
            private: None,
            public,
        });
    }
    if let Ok(public) = p384::ecdsa::VerifyingKey::from_public_key_der(der) {
        return Ok(KeyMaterial::EcP384 {
            private: None,
            public,
        });
    }
    Err(Error::Key(
        "public key is not RSA, P-256 or P-384".into(),
    ))
}
