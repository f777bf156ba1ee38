#![forbid(unsafe_code)]

//! Process-wide chain of IO callbacks used to dereference external URIs.
//!
//! Each registered set is a `(match, open, read, close)` quadruple. The most
//! recently registered set is consulted first; the first whose `match`
//! accepts a URI serves it. [`open`] hands back a [`ResolvedInput`] that
//! carries the selected set and its per-URI context, so reading and closing
//! never depend on shared "current" state.
//!
//! Registering or clearing callbacks while a resolution is in flight is not
//! supported.

use std::any::Any;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use ulriksdal_core::{Error, Result};

type Context = Box<dyn Any + Send>;
type MatchFn = Box<dyn Fn(&str) -> bool + Send + Sync>;
type OpenFn = Box<dyn Fn(&str) -> io::Result<Context> + Send + Sync>;
type ReadFn = Box<dyn Fn(&mut Context, &mut [u8]) -> io::Result<usize> + Send + Sync>;
type CloseFn = Box<dyn Fn(Context) -> io::Result<()> + Send + Sync>;

struct CallbackSet {
    matches: MatchFn,
    open: OpenFn,
    read: ReadFn,
    close: CloseFn,
}

/// Oldest first; dispatch walks it backwards.
static CHAIN: RwLock<Vec<Arc<CallbackSet>>> = RwLock::new(Vec::new());

fn context_mismatch() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "IO callback context has an unexpected type")
}

/// Register a callback set in front of every existing one.
///
/// `open` creates the per-URI context `C` that `read` and `close` receive.
pub fn register<C, M, O, R, X>(matches: M, open: O, read: R, close: X)
where
    C: Send + 'static,
    M: Fn(&str) -> bool + Send + Sync + 'static,
    O: Fn(&str) -> io::Result<C> + Send + Sync + 'static,
    R: Fn(&mut C, &mut [u8]) -> io::Result<usize> + Send + Sync + 'static,
    X: Fn(C) -> io::Result<()> + Send + Sync + 'static,
{
    let set = CallbackSet {
        matches: Box::new(matches),
        open: Box::new(move |uri| open(uri).map(|c| Box::new(c) as Context)),
        read: Box::new(move |ctx, buf| {
            let ctx = ctx.downcast_mut::<C>().ok_or_else(context_mismatch)?;
            read(ctx, buf)
        }),
        close: Box::new(move |ctx| {
            let ctx = ctx.downcast::<C>().map_err(|_| context_mismatch())?;
            close(*ctx)
        }),
    };
    let mut chain = CHAIN.write().unwrap_or_else(PoisonError::into_inner);
    chain.push(Arc::new(set));
    tracing::debug!(registered = chain.len(), "IO callbacks registered");
}

/// Remove every callback set.
pub fn cleanup() {
    CHAIN.write().unwrap_or_else(PoisonError::into_inner).clear();
}

/// Clear the chain and install the built-in file handler.
pub fn register_defaults() {
    cleanup();
    register(
        |uri| file_path(uri).is_some(),
        |uri| {
            let path = file_path(uri)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("not a file URI: {uri}")))?;
            File::open(path)
        },
        |file: &mut File, buf| file.read(buf),
        |_file| Ok(()),
    );
}

pub fn len() -> usize {
    CHAIN.read().unwrap_or_else(PoisonError::into_inner).len()
}

/// `file:` URIs and plain paths. Anything else with a scheme is refused.
fn file_path(uri: &str) -> Option<PathBuf> {
    if let Some(rest) = uri.strip_prefix("file://") {
        return Some(PathBuf::from(rest));
    }
    if let Some(rest) = uri.strip_prefix("file:") {
        return Some(PathBuf::from(rest));
    }
    if uri.contains("://") || uri.starts_with('#') || uri.is_empty() {
        return None;
    }
    Some(PathBuf::from(uri))
}

/// An opened URI. Closed explicitly with [`ResolvedInput::close`] or on drop.
pub struct ResolvedInput {
    uri: String,
    set: Arc<CallbackSet>,
    context: Option<Context>,
}

impl fmt::Debug for ResolvedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedInput")
            .field("uri", &self.uri)
            .field("open", &self.context.is_some())
            .finish()
    }
}

impl ResolvedInput {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn close(mut self) -> io::Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> io::Result<()> {
        match self.context.take() {
            Some(ctx) => (self.set.close)(ctx),
            None => Ok(()),
        }
    }
}

impl Read for ResolvedInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.context.as_mut() {
            Some(ctx) => (self.set.read)(ctx, buf),
            None => Ok(0),
        }
    }
}

impl Drop for ResolvedInput {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::debug!(uri = %self.uri, error = %e, "closing IO callback input failed");
        }
    }
}

/// Find the newest callback set matching `uri` and open it.
pub fn open(uri: &str) -> Result<ResolvedInput> {
    let set = {
        let chain = CHAIN.read().unwrap_or_else(PoisonError::into_inner);
        chain.iter().rev().find(|s| (s.matches)(uri)).cloned()
    };
    let set = set.ok_or_else(|| Error::InvalidUri(format!("no IO callback accepts {uri}")))?;
    let context = (set.open)(uri)?;
    tracing::trace!(uri, "external URI opened");
    Ok(ResolvedInput {
        uri: uri.to_owned(),
        set,
        context: Some(context),
    })
}

/// Open `uri`, read it to the end and close it.
pub fn read_all(uri: &str) -> Result<Vec<u8>> {
    let mut input = open(uri)?;
    let mut data = Vec::new();
    input.read_to_end(&mut data)?;
    input.close()?;
    Ok(data)
}
