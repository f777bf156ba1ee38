#![forbid(unsafe_code)]

//! Digest methods usable in `<DigestMethod>`.

use digest::Digest;
use ulriksdal_core::{algorithm, Error};

/// An in-progress hash over a transform pipeline's output.
pub trait Hasher: Send {
    fn update(&mut self, data: &[u8]);
    fn finish(self: Box<Self>) -> Vec<u8>;
    fn uri(&self) -> &'static str;
    fn output_size(&self) -> usize;
}

pub fn from_uri(uri: &str) -> Result<Box<dyn Hasher>, Error> {
    let hasher: Box<dyn Hasher> = match uri {
        algorithm::SHA1 => Box::new(Sha1Hasher(sha1::Sha1::new())),
        algorithm::SHA224 => Box::new(Sha224Hasher(sha2::Sha224::new())),
        algorithm::SHA256 => Box::new(Sha256Hasher(sha2::Sha256::new())),
        algorithm::SHA384 => Box::new(Sha384Hasher(sha2::Sha384::new())),
        algorithm::SHA512 => Box::new(Sha512Hasher(sha2::Sha512::new())),
        _ => return Err(Error::UnsupportedAlgorithm(format!("digest method: {uri}"))),
    };
    Ok(hasher)
}

/// Hash `data` in one call.
pub fn digest(uri: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut hasher = from_uri(uri)?;
    hasher.update(data);
    Ok(hasher.finish())
}

macro_rules! hasher {
    ($name:ident, $inner:ty, $uri:expr) => {
        struct $name($inner);

        impl Hasher for $name {
            fn update(&mut self, data: &[u8]) {
                Digest::update(&mut self.0, data);
            }

            fn finish(self: Box<Self>) -> Vec<u8> {
                self.0.finalize().to_vec()
            }

            fn uri(&self) -> &'static str {
                $uri
            }

            fn output_size(&self) -> usize {
                <$inner as Digest>::output_size()
            }
        }
    };
}

hasher!(Sha1Hasher, sha1::Sha1, algorithm::SHA1);
hasher!(Sha224Hasher, sha2::Sha224, algorithm::SHA224);
hasher!(Sha256Hasher, sha2::Sha256, algorithm::SHA256);
hasher!(Sha384Hasher, sha2::Sha384, algorithm::SHA384);
hasher!(Sha512Hasher, sha2::Sha512, algorithm::SHA512);

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn test_known_answers() {
        assert_eq!(
            hex(&digest(algorithm::SHA1, b"abc").unwrap()),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            hex(&digest(algorithm::SHA256, b"abc").unwrap()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut h = from_uri(algorithm::SHA512).unwrap();
        assert_eq!(h.output_size(), 64);
        h.update(b"hello ");
        h.update(b"world");
        assert_eq!(h.finish(), digest(algorithm::SHA512, b"hello world").unwrap());
    }

    #[test]
    fn test_unknown_uri() {
        assert!(matches!(
            from_uri("urn:nope"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }
}
