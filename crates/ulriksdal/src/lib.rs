#![forbid(unsafe_code)]

//! Ulriksdal: XML Signature and XML Encryption over a mutable XML tree.
//!
//! The member crates are re-exported under short names. [`init`] and
//! [`shutdown`] bracket the process-wide state: the engine, its error
//! callback and the IO callback chain.

pub mod lifecycle;

pub use ulriksdal_c14n as c14n;
pub use ulriksdal_core as core;
pub use ulriksdal_crypto as crypto;
pub use ulriksdal_dsig as dsig;
pub use ulriksdal_enc as enc;
pub use ulriksdal_keys as keys;
pub use ulriksdal_template as template;
pub use ulriksdal_transforms as transforms;
pub use ulriksdal_xml as xml;

pub use lifecycle::{init, is_initialized, shutdown, Stage};
pub use ulriksdal_core::encoding::{base64_default_line_size, set_base64_default_line_size};
pub use ulriksdal_core::sink::enable_debug_trace;
pub use ulriksdal_core::{Error, Result};
pub use ulriksdal_dsig::SignatureContext;
pub use ulriksdal_enc::{Decrypted, EncryptionContext};
pub use ulriksdal_keys::{Key, KeysManager};
