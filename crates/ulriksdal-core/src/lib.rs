#![forbid(unsafe_code)]

//! Shared foundation for the Ulriksdal XML Security library.
//!
//! Holds the error types, the per-thread error sink, algorithm and
//! namespace constants, the transform/key-data registries and the
//! process-wide base64 settings.

pub mod algorithm;
pub mod encoding;
pub mod error;
pub mod ns;
pub mod registry;
pub mod sink;

pub use error::{EngineError, EngineResult, Error, ErrorRecord, ReportExt, Reported, Result};
pub use registry::{
    Descriptor, KeyDataClass, KeyDataDescriptor, KeyDataUsage, TransformDescriptor, TransformUsage,
};
