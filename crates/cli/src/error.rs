//! Error types for CLI commands

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during command execution
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CommandError {
    /// Failed to set up encryption
    #[error("Failed to load age identities: {0}")]
    IdentityLoadError(#[from] tilde_crypto::Error),

    /// A path argument could not be resolved
    #[error("Invalid path {path}: {reason}")]
    InvalidPath {
        /// The path as given
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// Some targets failed with `--keep-going`
    #[error("{failed} of {total} targets failed")]
    ApplyFailed {
        /// Number of targets that failed
        failed: usize,
        /// Number of targets attempted
        total: usize,
    },

    /// Source state or reconciliation error
    #[error(transparent)]
    Engine(#[from] tilde_engine::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Anything else
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<tilde_core::Error> for CommandError {
    fn from(err: tilde_core::Error) -> Self {
        Self::Engine(err.into())
    }
}

/// Result type alias for command operations
pub type Result<T> = std::result::Result<T, CommandError>;

impl CommandError {
    /// An unresolvable path argument
    pub fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this is the skip sentinel from a pre-apply hook
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Engine(e) if e.is_skip())
    }
}
