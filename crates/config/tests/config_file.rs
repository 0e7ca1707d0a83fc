//! Loading configuration files from disk

#![allow(clippy::unwrap_used, clippy::panic)]

use std::fs;
use tempfile::TempDir;
use tilde_config::{Config, EncryptionKind};

#[test]
fn test_missing_file_yields_defaults() {
    let temp = TempDir::new().unwrap();
    let config = Config::load_or_default(&temp.path().join("tilde.toml")).unwrap();
    assert!(config.general.source_dir.is_none());
    assert_eq!(config.general.encryption, EncryptionKind::None);
}

#[test]
fn test_relative_paths_resolve_against_config_dir() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("tilde.toml");
    fs::write(
        &path,
        "[general]\nsourceDir = \"src\"\n\n[age]\nidentity = \"key.txt\"\n",
    )
    .unwrap();

    let config = Config::load_or_default(&path).unwrap();
    assert_eq!(config.general.source_dir, Some(temp.path().join("src")));
    assert_eq!(config.age_identity_paths(), [temp.path().join("key.txt")]);
}

#[test]
fn test_parse_error_names_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("tilde.toml");
    fs::write(&path, "[general\n").unwrap();
    let err = Config::load_or_default(&path).unwrap_err();
    assert!(err.to_string().contains("tilde.toml"), "{err}");
}
