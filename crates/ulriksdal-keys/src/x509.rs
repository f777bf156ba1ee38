#![forbid(unsafe_code)]

//! X.509 chain building against the keys manager's certificate store.
//!
//! A leaf is accepted when it is itself a trusted certificate, or when a
//! path of issuer signatures leads from it to one. Certificates carried in
//! `<X509Data>` and the manager's untrusted certificates serve as
//! intermediates only.

use std::time::{SystemTime, UNIX_EPOCH};

use der::{Decode, Encode};
use spki::ObjectIdentifier;
use ulriksdal_core::{algorithm, Error};
use x509_cert::Certificate;

use crate::loader;

const RSA_METHODS: [(ObjectIdentifier, &str); 5] = [
    (ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5"), algorithm::RSA_SHA1),
    (ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.14"), algorithm::RSA_SHA224),
    (ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11"), algorithm::RSA_SHA256),
    (ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12"), algorithm::RSA_SHA384),
    (ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13"), algorithm::RSA_SHA512),
];
const ECDSA_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");

const MAX_DEPTH: usize = 10;

/// Certificates a chain may be built from.
pub struct TrustStore<'a> {
    /// Chain ends; DER.
    pub trusted: &'a [Vec<u8>],
    /// Possible intermediates; DER.
    pub untrusted: &'a [Vec<u8>],
    /// Instant the validity periods are checked at.
    pub at: SystemTime,
}

struct Parsed<'a> {
    cert: Certificate,
    der: &'a [u8],
}

fn parse_all(ders: &[Vec<u8>]) -> Vec<Parsed<'_>> {
    ders.iter()
        .filter_map(|der| match Certificate::from_der(der) {
            Ok(cert) => Some(Parsed { cert, der }),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparsable certificate");
                None
            }
        })
        .collect()
}

/// Check that `leaf_der` chains to a trusted certificate.
///
/// `carried` are the other certificates from the same `<X509Data>`.
pub fn validate_chain(leaf_der: &[u8], carried: &[Vec<u8>], store: &TrustStore<'_>) -> Result<(), Error> {
    let leaf = Certificate::from_der(leaf_der)
        .map_err(|e| Error::Certificate(format!("cannot parse certificate: {e}")))?;
    let trusted = parse_all(store.trusted);
    if trusted.is_empty() {
        return Err(Error::Certificate("no trusted certificates available".into()));
    }
    let pool: Vec<Parsed<'_>> = parse_all(carried)
        .into_iter()
        .chain(parse_all(store.untrusted))
        .filter(|p| p.der != leaf_der)
        .collect();
    let now = der_time(store.at)?;

    let mut current = leaf;
    let mut visited: Vec<&[u8]> = vec![leaf_der];
    for _ in 0..MAX_DEPTH {
        check_validity(&current, &now)?;
        let current_der = visited.last().copied().unwrap_or(leaf_der);
        if trusted.iter().any(|t| t.der == current_der) {
            return Ok(());
        }
        if let Some(anchor) = trusted.iter().find(|t| issued_by(&current, &t.cert)) {
            check_validity(&anchor.cert, &now)?;
            tracing::debug!(anchor = %anchor.cert.tbs_certificate.subject, "certificate chain verified");
            return Ok(());
        }
        let issuer = pool
            .iter()
            .find(|p| !visited.contains(&p.der) && issued_by(&current, &p.cert))
            .ok_or_else(|| {
                Error::Certificate(format!(
                    "no trusted issuer for {}",
                    current.tbs_certificate.subject
                ))
            })?;
        visited.push(issuer.der);
        current = issuer.cert.clone();
    }
    Err(Error::Certificate("certificate chain too long".into()))
}

fn der_time(at: SystemTime) -> Result<der::DateTime, Error> {
    let since_epoch = at
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::Certificate(format!("system time error: {e}")))?;
    der::DateTime::from_unix_duration(since_epoch)
        .map_err(|e| Error::Certificate(format!("time conversion error: {e}")))
}

fn check_validity(cert: &Certificate, now: &der::DateTime) -> Result<(), Error> {
    let validity = &cert.tbs_certificate.validity;
    if *now < validity.not_before.to_date_time() {
        return Err(Error::Certificate(format!(
            "{} is not yet valid",
            cert.tbs_certificate.subject
        )));
    }
    if *now > validity.not_after.to_date_time() {
        return Err(Error::Certificate(format!("{} has expired", cert.tbs_certificate.subject)));
    }
    Ok(())
}

fn issued_by(cert: &Certificate, issuer: &Certificate) -> bool {
    if cert.tbs_certificate.issuer != issuer.tbs_certificate.subject {
        return false;
    }
    match verify_signature(cert, issuer) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::debug!(error = %e, "issuer candidate rejected");
            false
        }
    }
}

/// Check the signature on `cert` with the public key of `issuer`.
fn verify_signature(cert: &Certificate, issuer: &Certificate) -> Result<bool, Error> {
    let tbs = cert
        .tbs_certificate
        .to_der()
        .map_err(|e| Error::Certificate(format!("cannot encode certificate body: {e}")))?;
    let signature = cert
        .signature
        .as_bytes()
        .ok_or_else(|| Error::Certificate("certificate signature is not octet aligned".into()))?;
    let spki = issuer
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::Certificate(format!("cannot encode issuer key: {e}")))?;
    let issuer_key = loader::spki_der(&spki)?;

    // XML-DSig ECDSA methods take r || s; certificates carry a DER sequence.
    let oid = cert.signature_algorithm.oid;
    let (uri, signature) = if let Some((_, uri)) = RSA_METHODS.iter().find(|(o, _)| *o == oid) {
        (*uri, signature.to_vec())
    } else if oid == ECDSA_SHA256 {
        let sig = p256::ecdsa::Signature::from_der(signature)
            .map_err(|e| Error::Certificate(format!("malformed ECDSA signature: {e}")))?;
        (algorithm::ECDSA_SHA256, sig.to_bytes().to_vec())
    } else if oid == ECDSA_SHA384 {
        let sig = p384::ecdsa::Signature::from_der(signature)
            .map_err(|e| Error::Certificate(format!("malformed ECDSA signature: {e}")))?;
        (algorithm::ECDSA_SHA384, sig.to_bytes().to_vec())
    } else {
        return Err(Error::Certificate(format!(
            "unsupported certificate signature algorithm {oid}"
        )));
    };
    ulriksdal_crypto::sign::from_uri(uri)?.verify(&issuer_key, &tbs, &signature)
}
