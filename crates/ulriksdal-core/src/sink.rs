#![forbid(unsafe_code)]

//! Per-thread error sink fed by the engine's global error callback.
//!
//! The engine reports every diagnostic through a single process-wide
//! callback. That callback starts out as [`capture`], which stores the
//! record in the calling thread's slot, replacing any record that was never
//! consumed. [`take_last_error`] empties the slot and turns the record into
//! a typed [`Error`]. Threads never observe each other's diagnostics.
//!
//! Engine initialization resets the callback to one that only traces (see
//! [`reset_callback`]), so the library re-installs the sink after every
//! engine init and again on shutdown.

use crate::error::{EngineError, Error, ErrorRecord};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

/// Signature of the global engine error callback.
pub type ErrorCallback = fn(&ErrorRecord);

static CALLBACK: RwLock<Option<ErrorCallback>> = RwLock::new(Some(capture as ErrorCallback));
static INSTALLED: AtomicBool = AtomicBool::new(true);
static DEBUG_TRACE: AtomicBool = AtomicBool::new(false);

thread_local! {
    static LAST_ERROR: RefCell<Option<ErrorRecord>> = const { RefCell::new(None) };
}

/// The typed error [`take_last_error`] builds around a captured record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Load,
    Duplication,
    Adoption,
    Template,
    Sign,
    Verification,
    Decrypt,
    Engine,
    Internal,
}

impl ErrorKind {
    fn wrap(self, e: EngineError) -> Error {
        match self {
            Self::Load => Error::Load(e),
            Self::Duplication => Error::Duplication(e),
            Self::Adoption => Error::Adoption(e),
            Self::Template => Error::Template(e),
            Self::Sign => Error::Sign(e),
            Self::Verification => Error::Verification(e),
            Self::Decrypt => Error::Decrypt(e),
            Self::Engine => Error::Engine(e),
            Self::Internal => Error::Internal(e),
        }
    }
}

/// Point the engine's global error callback at the per-thread sink.
///
/// Idempotent; calling it again after the engine reset its callbacks is
/// required and safe.
pub fn install_callback() {
    store_callback(Some(capture), true);
}

/// Drop back to the engine's built-in callback, which only traces.
pub fn reset_callback() {
    store_callback(None, false);
}

fn store_callback(callback: Option<ErrorCallback>, is_sink: bool) {
    let mut slot = CALLBACK.write().unwrap_or_else(PoisonError::into_inner);
    *slot = callback;
    INSTALLED.store(is_sink, Ordering::Release);
}

/// Whether the sink callback is the active one.
pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::Acquire)
}

/// Hand a diagnostic to the active callback. Called by engine code only.
pub fn report(record: ErrorRecord) {
    let callback = *CALLBACK.read().unwrap_or_else(PoisonError::into_inner);
    match callback {
        Some(cb) => cb(&record),
        None => trace(&record),
    }
}

/// The sink callback: stores `record` in this thread's slot.
pub fn capture(record: &ErrorRecord) {
    trace(record);
    // an unconsumed earlier record is discarded here
    let _previous = exchange_last_error(Some(record.clone()));
}

/// Swap the contents of this thread's slot.
pub fn exchange_last_error(new: Option<ErrorRecord>) -> Option<ErrorRecord> {
    LAST_ERROR.with(|slot| slot.replace(new))
}

/// Empty this thread's slot, discarding any pending record.
pub fn clear_last_error() {
    exchange_last_error(None);
}

/// Empty this thread's slot and build a typed error from it.
///
/// If nothing was captured, an [`Error::Internal`] with reason code -1 and
/// `context` as message is returned, so a known failure never surfaces as
/// "no error".
pub fn take_last_error(kind: ErrorKind, context: &str) -> Error {
    match exchange_last_error(None) {
        Some(record) => kind.wrap(EngineError::new(context, record)),
        None => {
            tracing::warn!(context, "engine failed without leaving a diagnostic");
            Error::Internal(EngineError::detached(context))
        }
    }
}

/// Toggle the one-line trace emitted for each engine diagnostic.
pub fn enable_debug_trace(enabled: bool) {
    DEBUG_TRACE.store(enabled, Ordering::Relaxed);
}

pub fn debug_trace_enabled() -> bool {
    DEBUG_TRACE.load(Ordering::Relaxed)
}

fn trace(record: &ErrorRecord) {
    if debug_trace_enabled() {
        tracing::warn!(
            target: "ulriksdal::errors",
            "func={}:file={}:line={}:obj={}:subj={}:error={}:{}",
            record.function,
            record.file,
            record.line,
            record.object,
            record.subject,
            record.reason,
            record.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::reason;

    fn record(msg: &str) -> ErrorRecord {
        ErrorRecord {
            reason: reason::CRYPTO_FAILED,
            message: msg.into(),
            file: "engine.rs".into(),
            line: 1,
            function: "sign".into(),
            subject: "-".into(),
            object: "-".into(),
        }
    }

    #[test]
    fn test_take_empties_the_slot() {
        clear_last_error();
        capture(&record("first"));
        let err = take_last_error(ErrorKind::Sign, "failed to sign");
        match err {
            Error::Sign(e) => {
                assert_eq!(e.context, "failed to sign");
                assert_eq!(e.record.message, "first");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(exchange_last_error(None).is_none());
    }

    #[test]
    fn test_empty_slot_synthesizes_internal() {
        clear_last_error();
        let err = take_last_error(ErrorKind::Decrypt, "failed to decrypt");
        match err {
            Error::Internal(e) => {
                assert_eq!(e.reason(), -1);
                assert_eq!(e.context, "failed to decrypt");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_newer_record_replaces_unconsumed_one() {
        clear_last_error();
        capture(&record("old"));
        capture(&record("new"));
        let err = take_last_error(ErrorKind::Engine, "op");
        assert_eq!(err.record().map(|r| r.message.as_str()), Some("new"));
    }

    #[test]
    fn test_slots_are_per_thread() {
        clear_last_error();
        capture(&record("main thread"));
        let other = std::thread::spawn(|| {
            let seen = exchange_last_error(None);
            capture(&record("worker"));
            seen
        })
        .join()
        .unwrap();
        assert!(other.is_none());
        let mine = exchange_last_error(None).unwrap();
        assert_eq!(mine.message, "main thread");
    }

    #[test]
    fn test_report_captures_without_install() {
        assert!(is_installed());
        clear_last_error();
        report(record("no install needed"));
        let err = take_last_error(ErrorKind::Load, "cannot load");
        assert!(matches!(err, Error::Load(ref e) if e.record.message == "no install needed"));
    }

    #[test]
    fn test_install_is_idempotent() {
        install_callback();
        install_callback();
        assert!(is_installed());
        clear_last_error();
        report(record("via callback"));
        assert_eq!(exchange_last_error(None).unwrap().message, "via callback");
    }
}
