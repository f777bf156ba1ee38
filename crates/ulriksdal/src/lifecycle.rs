#![forbid(unsafe_code)]

//! Process-wide initialization and shutdown.
//!
//! Initialization runs in stages and remembers how far it got, so a
//! partial [`init`] can still be undone by [`shutdown`].

use std::sync::{Mutex, PoisonError};

use ulriksdal_core::sink::{self, ErrorKind};
use ulriksdal_core::{ReportExt, Result};
use ulriksdal_crypto::KeyMaterial;
use ulriksdal_transforms::{engine, io};

/// The last initialization stage that completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    None,
    Tree,
    Engine,
    Crypto,
}

static STAGE: Mutex<Stage> = Mutex::new(Stage::None);

/// Bring up the tree library, the transform engine and the crypto backend.
///
/// After the engine stage the error callback and the default IO callbacks
/// are installed again, since engine init clears both. Calling `init` on an
/// initialized library does nothing.
pub fn init() -> Result<()> {
    let mut stage = STAGE.lock().unwrap_or_else(PoisonError::into_inner);
    if *stage == Stage::Crypto {
        return Ok(());
    }

    if *stage < Stage::Tree {
        *stage = Stage::Tree;
        tracing::trace!("tree library ready");
    }

    if *stage < Stage::Engine {
        engine::init()
            .map_err(|_| sink::take_last_error(ErrorKind::Internal, "could not initialize transform engine"))?;
        sink::install_callback();
        io::register_defaults();
        *stage = Stage::Engine;
    }

    // The crypto backend is usable once the OS random source answers.
    KeyMaterial::random_bytes(128)
        .reported("init")
        .map_err(|_| sink::take_last_error(ErrorKind::Internal, "could not initialize crypto backend"))?;
    *stage = Stage::Crypto;
    tracing::debug!("ulriksdal initialized");
    Ok(())
}

/// Undo whatever [`init`] reached. Safe to call any number of times.
///
/// The error sink stays installed, so failures after shutdown still carry
/// their typed kind.
pub fn shutdown() {
    let mut stage = STAGE.lock().unwrap_or_else(PoisonError::into_inner);
    if *stage >= Stage::Engine {
        engine::shutdown();
        sink::install_callback();
    }
    if *stage != Stage::None {
        tracing::debug!(reached = ?*stage, "ulriksdal shut down");
    }
    *stage = Stage::None;
}

pub fn is_initialized() -> bool {
    stage() == Stage::Crypto
}

pub fn stage() -> Stage {
    *STAGE.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_and_shutdown_are_paired_and_repeatable() {
        shutdown();
        assert_eq!(stage(), Stage::None);

        init().unwrap();
        assert!(is_initialized());
        assert!(engine::is_initialized());
        assert!(sink::is_installed());
        assert_eq!(io::len(), 1);

        init().unwrap();
        assert_eq!(io::len(), 1);

        shutdown();
        assert!(!is_initialized());
        assert!(!engine::is_initialized());
        assert!(sink::is_installed());
        assert_eq!(io::len(), 0);
        shutdown();
        assert_eq!(stage(), Stage::None);

        init().unwrap();
        assert!(sink::is_installed());
        shutdown();
    }
}
