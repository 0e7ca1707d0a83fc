//! Configuration for tilde
//!
//! - The `tilde.toml` configuration file
//! - XDG directory defaults
//! - Logging initialization

pub mod config;
pub mod dirs;
pub mod logging;

pub use tilde_core::{Error, Result};

pub use config::{AgeConfig, Config, EncryptionKind, GeneralConfig};
pub use dirs::{config_dir, default_config_file, default_source_dir, default_state_file, state_dir};
