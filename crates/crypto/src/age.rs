//! age encryption and decryption
//!
//! Ciphertext is written ASCII armored so encrypted source files stay
//! diffable. Decryption accepts both armored and binary input.

use crate::{Error, Identity, Recipient, Result};
use std::io::{Read, Write};

fn age_error<E: std::fmt::Display>(e: E) -> Error {
    Error::Age(e.to_string())
}

fn map_decrypt_error(e: age::DecryptError) -> Error {
    match e {
        age::DecryptError::NoMatchingKeys
        | age::DecryptError::InvalidMac
        | age::DecryptError::KeyDecryptionFailed => Error::WrongKey,
        age::DecryptError::InvalidHeader => Error::DecryptionFailed {
            reason: "invalid age header".to_string(),
        },
        age::DecryptError::UnknownFormat => Error::DecryptionFailed {
            reason: "unknown age format".to_string(),
        },
        age::DecryptError::Io(e) => Error::Io(e),
        other => Error::DecryptionFailed {
            reason: other.to_string(),
        },
    }
}

/// Encrypt `data` to every recipient
///
/// # Errors
///
/// Returns [`Error::NoRecipients`] if `recipients` is empty
///
/// # Examples
///
/// ```
/// use tilde_crypto::{Identity, decrypt, encrypt};
///
/// let identity = Identity::generate();
/// let ciphertext = encrypt(b"secret", &[identity.to_public()]).unwrap();
/// assert_eq!(decrypt(&ciphertext, &[identity]).unwrap(), b"secret");
/// ```
pub fn encrypt(data: &[u8], recipients: &[Recipient]) -> Result<Vec<u8>> {
    if recipients.is_empty() {
        return Err(Error::NoRecipients);
    }
    let boxed: Vec<Box<dyn age::Recipient + Send>> =
        recipients.iter().map(Recipient::to_boxed).collect();
    let encryptor = age::Encryptor::with_recipients(
        boxed.iter().map(|r| r.as_ref() as &dyn age::Recipient),
    )
    .map_err(age_error)?;

    let mut encrypted = Vec::new();
    let armor =
        age::armor::ArmoredWriter::wrap_output(&mut encrypted, age::armor::Format::AsciiArmor)
            .map_err(age_error)?;
    let mut writer = encryptor.wrap_output(armor).map_err(age_error)?;
    writer.write_all(data).map_err(age_error)?;
    writer
        .finish()
        .and_then(age::armor::ArmoredWriter::finish)
        .map_err(age_error)?;
    Ok(encrypted)
}

/// Decrypt `data` with the first identity that fits
///
/// # Errors
///
/// Returns [`Error::NoIdentity`] if `identities` is empty and
/// [`Error::WrongKey`] if none of them can decrypt `data`
pub fn decrypt(data: &[u8], identities: &[Identity]) -> Result<Vec<u8>> {
    if identities.is_empty() {
        return Err(Error::NoIdentity);
    }
    let decryptor =
        age::Decryptor::new(age::armor::ArmoredReader::new(data)).map_err(map_decrypt_error)?;
    let mut reader = decryptor
        .decrypt(identities.iter().map(Identity::as_dyn_identity))
        .map_err(map_decrypt_error)?;
    let mut decrypted = Vec::new();
    reader.read_to_end(&mut decrypted)?;
    Ok(decrypted)
}
