//! Public keys files are encrypted to

use crate::{Error, Result};
use age::{ssh, x25519};
use std::fmt;
use std::str::FromStr;

/// A native age or SSH public key
#[derive(Clone)]
pub enum Recipient {
    /// `age1...`
    Age(x25519::Recipient),
    /// `ssh-ed25519 ...` or `ssh-rsa ...`
    Ssh(ssh::Recipient),
}

impl Recipient {
    pub(crate) fn to_boxed(&self) -> Box<dyn age::Recipient + Send> {
        match self {
            Self::Age(r) => Box::new(r.clone()),
            Self::Ssh(r) => Box::new(r.clone()),
        }
    }
}

impl From<x25519::Recipient> for Recipient {
    fn from(r: x25519::Recipient) -> Self {
        Self::Age(r)
    }
}

impl From<ssh::Recipient> for Recipient {
    fn from(r: ssh::Recipient) -> Self {
        Self::Ssh(r)
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Age(r) => write!(f, "{r}"),
            Self::Ssh(r) => write!(f, "{r}"),
        }
    }
}

impl FromStr for Recipient {
    type Err = Error;

    /// Parse an age recipient, falling back to an SSH public key
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(recipient) = s.parse::<x25519::Recipient>() {
            return Ok(Self::Age(recipient));
        }
        if let Ok(recipient) = s.parse::<ssh::Recipient>() {
            return Ok(Self::Ssh(recipient));
        }
        Err(Error::InvalidRecipient {
            recipient: s.to_string(),
            reason: "expected age1... or ssh-... format".to_string(),
        })
    }
}
