#![forbid(unsafe_code)]

//! XML Encryption (XML-Enc) contexts.
//!
//! [`EncryptionContext`] fills `<EncryptedData>` templates from octets,
//! files or document nodes, and decrypts `<EncryptedData>`/`<EncryptedKey>`
//! back into octets or into the tree they were taken from.

pub mod context;
mod decrypt;
mod encrypt;
mod keys;

pub use context::{Decrypted, EncryptionContext, Operation};
