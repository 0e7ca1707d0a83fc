//! The `tilde.toml` configuration file
//!
//! ```toml
//! [general]
//! sourceDir = "~/dotfiles"
//! destDir = "~"
//! umask = "022"
//! keepGoing = false
//! encryption = "age"
//!
//! [age]
//! identity = "~/.config/tilde/key.txt"
//! recipient = "age1ql3z7hjy54pw3hyww5ayyfg7zqgvc7w3j2elw8zmrj2kg5sfn9aqmcac8p"
//!
//! [data]
//! email = "me@example.com"
//! ```
//!
//! Relative paths and `~` are resolved against the directory holding the
//! file and the home directory.

use crate::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tilde_core::Umask;
use tracing::debug;

/// Encryption backend for encrypted source files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionKind {
    /// age keys from the `[age]` section
    Age,
    /// Contents are stored as-is
    #[default]
    None,
}

/// `[general]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralConfig {
    /// Source directory
    #[serde(default)]
    pub source_dir: Option<PathBuf>,

    /// Destination directory
    #[serde(default)]
    pub dest_dir: Option<PathBuf>,

    /// Octal umask overriding the process umask
    #[serde(default)]
    pub umask: Option<String>,

    /// Continue with the next target after an error
    #[serde(default)]
    pub keep_going: bool,

    /// Backend for `encrypted_` files
    #[serde(default)]
    pub encryption: EncryptionKind,
}

/// `[age]`
///
/// `identity` and `identities` are merged, as are `recipient` and
/// `recipients`. With no recipients, files are encrypted to the
/// identities' public keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgeConfig {
    /// Identity file, age or SSH
    #[serde(default)]
    pub identity: Option<PathBuf>,

    /// More identity files
    #[serde(default)]
    pub identities: Vec<PathBuf>,

    /// Recipient public key
    #[serde(default)]
    pub recipient: Option<String>,

    /// More recipient public keys
    #[serde(default)]
    pub recipients: Vec<String>,
}

/// tilde configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// age encryption settings
    #[serde(default)]
    pub age: AgeConfig,

    /// Template data that overrides `.chezmoidata` files
    #[serde(default)]
    pub data: IndexMap<String, serde_json::Value>,
}

impl Config {
    /// Load the configuration file at `path`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Message(format!("{}: cannot read config file: {e}", path.display()))
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&content, base_dir)
            .map_err(|e| Error::Message(format!("{}: {e}", path.display())))
    }

    /// Load `path`, or the defaults if it does not exist
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match fs::metadata(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            _ => Self::load(path),
        }
    }

    /// Parse TOML, resolving relative paths against `base_dir`
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is invalid
    pub fn from_toml_str(content: &str, base_dir: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(content)
            .map_err(|e| Error::Message(format!("invalid config: {e}")))?;
        config.resolve_relative_paths(base_dir);
        Ok(config)
    }

    fn resolve_relative_paths(&mut self, base_dir: &Path) {
        let paths = [
            self.general.source_dir.as_mut(),
            self.general.dest_dir.as_mut(),
            self.age.identity.as_mut(),
        ];
        for path in paths.into_iter().flatten().chain(&mut self.age.identities) {
            *path = resolve_path(path, base_dir);
        }
    }

    /// The configured umask, if any
    ///
    /// # Errors
    ///
    /// Returns error if the value is not an octal umask
    pub fn umask(&self) -> Result<Option<Umask>> {
        self.general.umask.as_deref().map(Umask::parse).transpose()
    }

    /// Every configured identity file
    #[must_use]
    pub fn age_identity_paths(&self) -> Vec<PathBuf> {
        self.age
            .identity
            .iter()
            .chain(&self.age.identities)
            .cloned()
            .collect()
    }

    /// Every configured recipient
    #[must_use]
    pub fn age_recipients(&self) -> Vec<String> {
        self.age
            .recipient
            .iter()
            .chain(&self.age.recipients)
            .cloned()
            .collect()
    }

    /// `[data]` as a JSON object
    #[must_use]
    pub fn data_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn resolve_path(path: &Path, base_dir: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    if let Some(stripped) = path_str.strip_prefix("~/") {
        if let Some(home) = ::dirs::home_dir() {
            return home.join(stripped);
        }
    } else if path_str == "~"
        && let Some(home) = ::dirs::home_dir()
    {
        return home;
    }

    if path.is_relative() {
        base_dir.join(path)
    } else {
        path.to_path_buf()
    }
}
