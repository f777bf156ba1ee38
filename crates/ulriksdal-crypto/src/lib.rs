#![forbid(unsafe_code)]

//! Algorithm backends for Ulriksdal XML Security.
//!
//! Digests, signature methods, block ciphers, AES key wrap and RSA key
//! transport, all selected by their XML algorithm URI and operating on
//! [`KeyMaterial`].

pub mod cipher;
pub mod digest;
pub mod keytransport;
pub mod keywrap;
pub mod material;
pub mod sign;

pub use cipher::CipherAlgorithm;
pub use digest::Hasher;
pub use material::{KeyMaterial, MIN_RSA_BITS};
pub use sign::SignatureAlgorithm;
