//! Content hashing using SHA-256
//!
//! Entry states identify contents by their SHA-256 digest, so comparing a
//! target with what is on disk never needs a byte-for-byte diff.

use sha2::{Digest, Sha256};
use std::cell::OnceCell;

/// Hash content using SHA-256
///
/// # Examples
///
/// ```
/// use tilde_engine::hash::sha256;
///
/// let digest = sha256(b"");
/// assert_eq!(
///     hex::encode(digest),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
#[must_use]
pub fn sha256(content: &[u8]) -> [u8; 32] {
    Sha256::digest(content).into()
}

/// Hex encoded SHA-256 of `content`
#[must_use]
pub fn sha256_hex(content: &[u8]) -> String {
    hex::encode(sha256(content))
}

/// Fully computed contents with a digest computed on first use
#[derive(Debug, Clone, Default)]
pub struct Contents {
    bytes: Vec<u8>,
    digest: OnceCell<[u8; 32]>,
}

impl Contents {
    /// Wrap `bytes`
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            digest: OnceCell::new(),
        }
    }

    /// The raw bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// SHA-256 digest of the bytes
    pub fn sha256(&self) -> &[u8; 32] {
        self.digest.get_or_init(|| sha256(&self.bytes))
    }

    /// Whether the contents are empty or only whitespace
    pub fn is_blank(&self) -> bool {
        self.bytes.iter().all(u8::is_ascii_whitespace)
    }
}

impl PartialEq for Contents {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Contents {}
