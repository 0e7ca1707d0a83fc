//! Loading keys from disk and using them through the encryption trait

#![allow(clippy::unwrap_used, clippy::panic)]

use std::fs;
use tempfile::TempDir;
use tilde_core::Encryption;
use tilde_crypto::{AgeEncryption, Identity};

#[test]
fn test_load_encrypts_to_identity_when_no_recipients() {
    let temp = TempDir::new().unwrap();
    let key = temp.path().join("key.txt");
    let identity = Identity::generate();
    fs::write(&key, format!("{identity}\n")).unwrap();

    let encryption = AgeEncryption::load(&[&key], &[]).unwrap();
    let ciphertext = encryption.encrypt(b"export TOKEN=1\n").unwrap();
    assert_eq!(encryption.decrypt(&ciphertext).unwrap(), b"export TOKEN=1\n");
}

#[test]
fn test_configured_recipient_without_identity() {
    let reader = Identity::generate();
    let writer = AgeEncryption::load::<&std::path::Path>(&[], &[reader.to_public().to_string()])
        .unwrap();
    let ciphertext = writer.encrypt(b"team secret").unwrap();
    assert!(writer.decrypt(&ciphertext).is_err());

    let temp = TempDir::new().unwrap();
    let key = temp.path().join("key.txt");
    fs::write(&key, format!("{reader}\n")).unwrap();
    let decrypting = AgeEncryption::load(&[&key], &[]).unwrap();
    assert_eq!(decrypting.decrypt(&ciphertext).unwrap(), b"team secret");
}

#[test]
fn test_invalid_recipient_is_rejected() {
    let result = AgeEncryption::load::<&std::path::Path>(&[], &["nonsense".to_string()]);
    assert!(result.is_err());
}
