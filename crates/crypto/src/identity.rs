//! Private keys used for decryption
//!
//! An identity file is either an age key file (one `AGE-SECRET-KEY-1...`
//! per line, `#` comments allowed) or an SSH private key with its public
//! key next to it as `<path>.pub`.

use crate::{Error, Recipient, Result};
use age::secrecy::ExposeSecret;
use age::x25519;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

const SSH_KEY_MARKER: &str = "PRIVATE KEY-----";

/// An age or SSH private key
#[derive(Clone)]
pub enum Identity {
    /// Native age x25519 identity
    Age(x25519::Identity),
    /// SSH private key and the recipient it decrypts for
    Ssh {
        identity: age::ssh::Identity,
        recipient: Box<age::ssh::Recipient>,
    },
}

impl Identity {
    /// Generate a random age identity
    pub fn generate() -> Self {
        Self::Age(x25519::Identity::generate())
    }

    /// The public key matching this identity
    pub fn to_public(&self) -> Recipient {
        match self {
            Self::Age(identity) => Recipient::Age(identity.to_public()),
            Self::Ssh { recipient, .. } => Recipient::Ssh((**recipient).clone()),
        }
    }

    pub(crate) fn as_dyn_identity(&self) -> &dyn age::Identity {
        match self {
            Self::Age(identity) => identity,
            Self::Ssh { identity, .. } => identity,
        }
    }
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<x25519::Identity>()
            .map(Self::Age)
            .map_err(|e| Error::InvalidIdentity {
                reason: e.to_string(),
                path: "<string>".to_string(),
            })
    }
}

impl fmt::Display for Identity {
    /// The secret key for age identities; SSH keys print a placeholder
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Age(identity) => f.write_str(identity.to_string().expose_secret()),
            Self::Ssh { .. } => f.write_str("[SSH identity]"),
        }
    }
}

fn read_identity_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            Error::IdentityNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::IdentityFile {
                path: path.display().to_string(),
                source: e,
            }
        }
    })
}

/// Load every identity in the file at `path`
///
/// # Errors
///
/// Returns error if the file cannot be read or holds no valid identity
pub fn load_identities(path: &Path) -> Result<Vec<Identity>> {
    let content = read_identity_file(path)?;
    let text = String::from_utf8_lossy(&content);
    if text.contains(SSH_KEY_MARKER) {
        return load_ssh_identity(path, &content).map(|identity| vec![identity]);
    }

    let mut identities = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.parse::<Identity>() {
            Ok(identity) => identities.push(identity),
            Err(e) => warn!(path = %path.display(), line = index + 1, "Skipping invalid identity: {e}"),
        }
    }
    if identities.is_empty() {
        return Err(Error::InvalidIdentity {
            reason: "no valid identities found".to_string(),
            path: path.display().to_string(),
        });
    }
    debug!(path = %path.display(), count = identities.len(), "Loaded identities");
    Ok(identities)
}

fn load_ssh_identity(path: &Path, content: &[u8]) -> Result<Identity> {
    let invalid = |reason: String| Error::InvalidIdentity {
        reason,
        path: path.display().to_string(),
    };
    let identity = age::ssh::Identity::from_buffer(content, Some(path.display().to_string()))
        .map_err(|e| invalid(format!("cannot parse SSH key: {e}")))?;

    let public_path = format!("{}.pub", path.display());
    let public = fs::read_to_string(&public_path)
        .map_err(|e| invalid(format!("{public_path}: {e}")))?;
    let recipient = public
        .trim()
        .parse::<age::ssh::Recipient>()
        .map_err(|e| invalid(format!("{public_path}: {e:?}")))?;

    Ok(Identity::Ssh {
        identity,
        recipient: Box::new(recipient),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_age_key_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("key.txt");
        let identity = Identity::generate();
        fs::write(
            &path,
            format!(
                "# created: today\n# public key: {}\n{identity}\nnot-a-key\n",
                identity.to_public()
            ),
        )
        .unwrap();

        let loaded = load_identities(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].to_string(), identity.to_string());
    }

    #[test]
    fn test_missing_key_file() {
        let temp = TempDir::new().unwrap();
        let err = load_identities(&temp.path().join("missing")).err().unwrap();
        assert!(matches!(err, Error::IdentityNotFound { .. }));
    }

    #[test]
    fn test_file_without_identities() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("key.txt");
        fs::write(&path, "# nothing here\n").unwrap();
        let err = load_identities(&path).err().unwrap();
        assert!(matches!(err, Error::InvalidIdentity { .. }));
    }
}
