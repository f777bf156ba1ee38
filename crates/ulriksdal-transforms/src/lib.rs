#![forbid(unsafe_code)]

//! Transform engine for the Ulriksdal XML Security library.
//!
//! Reference resolution, the `<Transforms>` pipeline, direct execution of
//! signature methods, and the IO callback chain that serves external URIs.

pub mod base64_transform;
pub mod engine;
pub mod enveloped;
pub mod io;
pub mod pipeline;
pub mod uri;

pub use engine::{KeyUse, SignatureTransform, TransformStatus};
pub use io::ResolvedInput;
pub use pipeline::{Transform, TransformData, TransformPipeline};
