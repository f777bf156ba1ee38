#![forbid(unsafe_code)]

//! Error types shared by every Ulriksdal crate.
//!
//! Two layers of failure exist. Engine diagnostics (parser, canonicalizer,
//! crypto backends) are raised as the low-level variants below and are
//! routed through the global error callback into the per-thread
//! [`sink`](crate::sink). The orchestration layer (keys, contexts,
//! templates) then surfaces a typed kind, attaching the captured
//! [`ErrorRecord`] where one exists.

use std::fmt;

/// Reason codes attached to engine diagnostics.
pub mod reason {
    /// No diagnostic was left behind by the engine.
    pub const UNKNOWN: i32 = -1;
    pub const XML_FAILED: i32 = 2;
    pub const CRYPTO_FAILED: i32 = 4;
    pub const IO_FAILED: i32 = 7;
    pub const INVALID_ALGORITHM: i32 = 12;
    pub const INVALID_NODE: i32 = 21;
    pub const NODE_NOT_FOUND: i32 = 25;
    pub const INVALID_ATTRIBUTE: i32 = 26;
    pub const INVALID_KEY_DATA: i32 = 41;
    pub const KEY_NOT_FOUND: i32 = 45;
    pub const CERT_FAILED: i32 = 51;
    pub const INVALID_DATA: i32 = 61;
    pub const INVALID_FORMAT: i32 = 62;
    pub const TRANSFORM_FAILED: i32 = 71;
    pub const INVALID_URI_TYPE: i32 = 81;
    pub const DATA_NOT_MATCH: i32 = 91;
}

/// Structured diagnostic captured from the engine's error callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub reason: i32,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub function: String,
    pub subject: String,
    pub object: String,
}

impl ErrorRecord {
    /// A record for a failure the engine did not describe.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            reason: reason::UNKNOWN,
            message: message.into(),
            file: "-".into(),
            line: 0,
            function: "-".into(),
            subject: "-".into(),
            object: "-".into(),
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}) {} [{}:{} {}; subject={}, object={}]",
            self.reason, self.message, self.file, self.line, self.function, self.subject, self.object
        )
    }
}

/// An orchestration-level failure wrapping the engine's last diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    /// What the calling operation was doing, e.g. `"failed to sign"`.
    pub context: String,
    pub record: ErrorRecord,
}

impl EngineError {
    pub fn new(context: impl Into<String>, record: ErrorRecord) -> Self {
        Self {
            context: context.into(),
            record,
        }
    }

    /// An error with a synthesized record (reason code -1).
    pub fn detached(context: impl Into<String>) -> Self {
        let context = context.into();
        let record = ErrorRecord::unknown(context.clone());
        Self { context, record }
    }

    pub fn reason(&self) -> i32 {
        self.record.reason
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.record)
    }
}

/// Errors produced by the Ulriksdal XML Security library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // ── Engine diagnostics ───────────────────────────────────────────
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("invalid XML structure: {0}")]
    XmlStructure(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("transform error: {0}")]
    Transform(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    // ── Orchestration ────────────────────────────────────────────────
    #[error("cannot load key material: {0}")]
    Load(EngineError),

    #[error("cannot duplicate key: {0}")]
    Duplication(EngineError),

    #[error("cannot adopt key: {0}")]
    Adoption(EngineError),

    #[error("template error: {0}")]
    Template(EngineError),

    #[error("signing failed: {0}")]
    Sign(EngineError),

    #[error("verification failed: {0}")]
    Verification(EngineError),

    #[error("decryption failed: {0}")]
    Decrypt(EngineError),

    #[error("{0}")]
    Engine(EngineError),

    #[error("internal error: {0}")]
    Internal(EngineError),

    #[error("invalid key state: {0}")]
    State(String),

    #[error("missing attribute: {0}")]
    MissingAttribute(String),

    #[error("duplicated id: {0}")]
    DuplicateId(String),

    #[error("incompatible method: {0}")]
    IncompatibleMethod(String),

    #[error("inappropriate key: {0}")]
    InappropriateKey(String),

    #[error("structure error: {0}")]
    Structure(String),

    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("value error: {0}")]
    Value(String),
}

impl Error {
    /// Reason code used when this error is reported as an engine diagnostic.
    pub fn reason_code(&self) -> i32 {
        match self {
            Self::XmlParse(_) | Self::XmlStructure(_) => reason::XML_FAILED,
            Self::UnsupportedAlgorithm(_) => reason::INVALID_ALGORITHM,
            Self::Crypto(_) => reason::CRYPTO_FAILED,
            Self::Key(_) => reason::INVALID_KEY_DATA,
            Self::Canonicalization(_) | Self::Transform(_) => reason::TRANSFORM_FAILED,
            Self::Base64(_) => reason::INVALID_DATA,
            Self::Io(_) => reason::IO_FAILED,
            Self::MissingElement(_) => reason::NODE_NOT_FOUND,
            Self::InvalidUri(_) => reason::INVALID_URI_TYPE,
            Self::Certificate(_) => reason::CERT_FAILED,
            Self::Load(e)
            | Self::Duplication(e)
            | Self::Adoption(e)
            | Self::Template(e)
            | Self::Sign(e)
            | Self::Verification(e)
            | Self::Decrypt(e)
            | Self::Engine(e)
            | Self::Internal(e) => e.reason(),
            _ => reason::UNKNOWN,
        }
    }

    /// The captured engine record, for the kinds that carry one.
    pub fn record(&self) -> Option<&ErrorRecord> {
        match self {
            Self::Load(e)
            | Self::Duplication(e)
            | Self::Adoption(e)
            | Self::Template(e)
            | Self::Sign(e)
            | Self::Verification(e)
            | Self::Decrypt(e)
            | Self::Engine(e)
            | Self::Internal(e) => Some(&e.record),
            _ => None,
        }
    }

    /// True when data was cryptographically rejected, as opposed to being
    /// malformed or the library misbehaving.
    pub fn is_verification_failure(&self) -> bool {
        matches!(self, Self::Verification(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Marker returned by engine entry points after the failure has been
/// handed to the global error callback.
///
/// The orchestration layer turns it into a typed [`Error`] with
/// [`sink::take_last_error`](crate::sink::take_last_error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reported;

impl fmt::Display for Reported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("engine failure reported to the error callback")
    }
}

/// Result type of engine entry points.
pub type EngineResult<T> = std::result::Result<T, Reported>;

/// Converts low-level engine errors into reported failures.
pub trait ReportExt<T> {
    /// Report the error (if any) under `function` and collapse it to [`Reported`].
    fn reported(self, function: &str) -> EngineResult<T>;
}

impl<T> ReportExt<T> for Result<T> {
    #[track_caller]
    fn reported(self, function: &str) -> EngineResult<T> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => {
                let location = std::panic::Location::caller();
                crate::sink::report(ErrorRecord {
                    reason: e.reason_code(),
                    message: e.to_string(),
                    file: location.file().to_owned(),
                    line: location.line(),
                    function: function.to_owned(),
                    subject: "-".into(),
                    object: "-".into(),
                });
                Err(Reported)
            }
        }
    }
}
