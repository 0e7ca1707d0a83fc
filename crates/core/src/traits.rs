//! Capabilities the engine consumes without owning
//!
//! Encryption backends and external command execution are chosen by the
//! caller and handed to the engine as trait objects.

use crate::Result;
use std::fs;
use std::path::Path;

/// Encryption backend
///
/// # Examples
///
/// ```ignore
/// fn encrypt_secret(encryption: &dyn Encryption, secret: &str) -> Result<Vec<u8>> {
///     encryption.encrypt(secret.as_bytes())
/// }
/// ```
pub trait Encryption: Send + Sync {
    /// Encrypt data
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt data
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt `ciphertext` and write the plaintext to `path`
    fn decrypt_to_file(&self, path: &Path, ciphertext: &[u8]) -> Result<()> {
        let plaintext = self.decrypt(ciphertext)?;
        fs::write(path, plaintext)?;
        Ok(())
    }

    /// Read and encrypt the file at `path`
    fn encrypt_file(&self, path: &Path) -> Result<Vec<u8>> {
        let plaintext = fs::read(path)?;
        self.encrypt(&plaintext)
    }
}

/// Runs external commands and captures their standard output
///
/// Used by template functions that shell out, so tests can substitute a
/// canned implementation.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and return its standard output
    fn output(&self, program: &str, args: &[String]) -> Result<Vec<u8>>;
}
