#![forbid(unsafe_code)]

//! Base64 output settings shared by every crate that writes
//! `<DigestValue>`, `<SignatureValue>` or `<CipherValue>` text.

use crate::error::{Error, Result};
use base64::Engine;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default number of characters per line of base64 output.
pub const DEFAULT_LINE_SIZE: usize = 64;

static LINE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_LINE_SIZE);

/// Set the process-wide base64 line width. Zero disables wrapping.
pub fn set_base64_default_line_size(size: i64) -> Result<()> {
    let size = usize::try_from(size)
        .map_err(|_| Error::Value(format!("base64 line size must be non-negative, got {size}")))?;
    LINE_SIZE.store(size, Ordering::Relaxed);
    tracing::debug!(size, "base64 line size changed");
    Ok(())
}

pub fn base64_default_line_size() -> usize {
    LINE_SIZE.load(Ordering::Relaxed)
}

/// Encode `data` wrapped at the current line size.
pub fn encode(data: &[u8]) -> String {
    encode_wrapped(data, base64_default_line_size())
}

/// Encode `data`, inserting `\n` every `line_size` characters.
pub fn encode_wrapped(data: &[u8], line_size: usize) -> String {
    let flat = base64::engine::general_purpose::STANDARD.encode(data);
    if line_size == 0 || flat.len() <= line_size {
        return flat;
    }
    let mut out = String::with_capacity(flat.len() + flat.len() / line_size + 1);
    for (i, chunk) in flat.as_bytes().chunks(line_size).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        // base64 output is ASCII, so any byte boundary is a char boundary
        out.push_str(&String::from_utf8_lossy(chunk));
    }
    out
}

/// Decode base64 text, ignoring embedded whitespace.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| Error::Base64(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wrap_at_line_size() {
        let data = vec![0xABu8; 100];
        let text = encode_wrapped(&data, 64);
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 64);
        assert!(!text.ends_with('\n'));
    }

    #[test]
    fn test_zero_disables_wrapping() {
        let text = encode_wrapped(&[1u8; 200], 0);
        assert!(!text.contains('\n'));
    }

    #[test]
    fn test_negative_line_size_is_rejected() {
        let before = base64_default_line_size();
        assert!(matches!(set_base64_default_line_size(-1), Err(Error::Value(_))));
        assert_eq!(base64_default_line_size(), before);
    }

    #[test]
    fn test_decode_ignores_whitespace() {
        assert_eq!(decode(" aGVs\n bG8=\r\n").unwrap(), b"hello");
        assert!(matches!(decode("!!!"), Err(Error::Base64(_))));
    }

    proptest! {
        #[test]
        fn prop_wrapped_text_decodes(data in proptest::collection::vec(any::<u8>(), 0..300), width in 0usize..100) {
            let text = encode_wrapped(&data, width);
            prop_assert_eq!(decode(&text).unwrap(), data);
            if width > 0 {
                prop_assert!(text.split('\n').all(|l| l.len() <= width));
            }
        }
    }
}
