#![forbid(unsafe_code)]

//! Key handles and key management for the Ulriksdal XML Security library.
//!
//! Keys load from PEM, DER, PKCS#8 (plain or encrypted), X.509 certificates
//! and raw binary files. A [`KeysManager`] owns duplicates of the keys added
//! to it and answers `<KeyInfo>` lookups; keys taken from `<X509Data>`
//! must chain to one of its trusted certificates.

pub mod key;
pub mod keyinfo;
pub mod loader;
pub mod manager;
pub mod x509;

pub use key::{Key, KeyHandle, KeyRequirement};
pub use keyinfo::{write_key_info, KeyInfoReader};
pub use loader::KeyFormat;
pub use manager::{CertType, KeysManager};
