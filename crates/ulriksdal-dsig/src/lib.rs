#![forbid(unsafe_code)]

//! XML Digital Signature (XML-DSig) contexts.
//!
//! [`SignatureContext`] signs `<Signature>` templates built with
//! `ulriksdal-template`, verifies signed documents, and runs signature
//! methods directly over octets.

pub mod context;
pub mod sign;
mod signed_info;
pub mod verify;

pub use context::{AllowList, ContextState, Operation, SignatureContext};
