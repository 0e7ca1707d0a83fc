//! # Tilde Crypto
//!
//! Encryption backends for encrypted source files: [`AgeEncryption`] using
//! age keys and [`NullEncryption`], which passes contents through unchanged.

pub mod age;
pub mod identity;
pub mod recipient;

pub use age::{decrypt, encrypt};
pub use identity::{Identity, load_identities};
pub use recipient::Recipient;

use thiserror::Error;

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, Error>;

/// Crypto errors
#[derive(Error, Debug)]
pub enum Error {
    /// Error reported by age
    #[error("age: {0}")]
    Age(String),

    /// Nothing to encrypt to
    #[error("no age recipients configured; set [age] recipient in the config file")]
    NoRecipients,

    /// Nothing to decrypt with
    #[error("no age identity configured; set [age] identity in the config file")]
    NoIdentity,

    /// Identity file does not exist
    #[error("{path}: identity file not found")]
    IdentityNotFound { path: String },

    /// Identity file could not be read
    #[error("{path}: {source}")]
    IdentityFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Identity could not be parsed
    #[error("{path}: invalid identity: {reason}")]
    InvalidIdentity { reason: String, path: String },

    /// Recipient could not be parsed
    #[error("{recipient}: invalid recipient: {reason}")]
    InvalidRecipient { recipient: String, reason: String },

    /// None of the identities matches the ciphertext
    #[error("decryption failed: wrong key or corrupted data")]
    WrongKey,

    /// Ciphertext is malformed
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Error> for tilde_core::Error {
    fn from(e: Error) -> Self {
        tilde_core::Error::Message(e.to_string())
    }
}

/// age backend for [`tilde_core::Encryption`]
pub struct AgeEncryption {
    recipients: Vec<Recipient>,
    identities: Vec<Identity>,
}

impl AgeEncryption {
    /// Encrypt to `recipients` and decrypt with `identities`
    #[must_use]
    pub fn new(recipients: Vec<Recipient>, identities: Vec<Identity>) -> Self {
        Self {
            recipients,
            identities,
        }
    }

    /// Build from configured identity files and recipient strings
    ///
    /// With no recipients configured, files are encrypted to the public
    /// keys of the identities.
    ///
    /// # Errors
    ///
    /// Returns error if an identity file or a recipient is invalid
    pub fn load<P: AsRef<std::path::Path>>(
        identity_paths: &[P],
        recipients: &[String],
    ) -> Result<Self> {
        let mut identities = Vec::new();
        for path in identity_paths {
            identities.extend(load_identities(path.as_ref())?);
        }
        let mut parsed = recipients
            .iter()
            .map(|r| r.parse())
            .collect::<Result<Vec<Recipient>>>()?;
        if parsed.is_empty() {
            parsed = identities.iter().map(Identity::to_public).collect();
        }
        Ok(Self::new(parsed, identities))
    }
}

impl tilde_core::Encryption for AgeEncryption {
    fn encrypt(&self, plaintext: &[u8]) -> tilde_core::Result<Vec<u8>> {
        Ok(encrypt(plaintext, &self.recipients)?)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> tilde_core::Result<Vec<u8>> {
        Ok(decrypt(ciphertext, &self.identities)?)
    }
}

/// Passes contents through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEncryption;

impl tilde_core::Encryption for NullEncryption {
    fn encrypt(&self, plaintext: &[u8]) -> tilde_core::Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> tilde_core::Result<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use tilde_core::Encryption;

    #[test]
    fn test_age_encryption_trait() {
        let identity = Identity::generate();
        let encryption = AgeEncryption::new(vec![identity.to_public()], vec![identity]);
        let ciphertext = encryption.encrypt(b"secret message").unwrap();
        assert_ne!(ciphertext, b"secret message");
        assert_eq!(encryption.decrypt(&ciphertext).unwrap(), b"secret message");
    }

    #[test]
    fn test_errors_keep_their_message() {
        let encryption = AgeEncryption::new(Vec::new(), Vec::new());
        let err = encryption.encrypt(b"data").unwrap_err();
        assert!(err.to_string().contains("no age recipients"));
    }

    #[test]
    fn test_null_encryption() {
        assert_eq!(NullEncryption.encrypt(b"x").unwrap(), b"x");
        assert_eq!(NullEncryption.decrypt(b"x").unwrap(), b"x");
    }
}
