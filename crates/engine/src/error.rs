//! Error types for tilde-engine
//!
//! Every filesystem error carries the path it concerns. `SkipEntry` is a
//! control signal rather than a failure: callers test for it with
//! [`Error::is_skip`].

use std::io;
use thiserror::Error;
use tilde_core::path::{AbsPath, RelPath};

/// Result type alias for tilde-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tilde-engine
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading a file
    #[error("{path}: read failed: {source}")]
    FileRead {
        path: AbsPath,
        #[source]
        source: io::Error,
    },

    /// Error writing a file
    #[error("{path}: write failed: {source}")]
    FileWrite {
        path: AbsPath,
        #[source]
        source: io::Error,
    },

    /// Error creating a directory
    #[error("{path}: mkdir failed: {source}")]
    DirectoryCreate {
        path: AbsPath,
        #[source]
        source: io::Error,
    },

    /// Error reading a directory
    #[error("{path}: read directory failed: {source}")]
    DirectoryRead {
        path: AbsPath,
        #[source]
        source: io::Error,
    },

    /// Error with file metadata
    #[error("{path}: stat failed: {source}")]
    Metadata {
        path: AbsPath,
        #[source]
        source: io::Error,
    },

    /// Error removing a path
    #[error("{path}: remove failed: {source}")]
    Remove {
        path: AbsPath,
        #[source]
        source: io::Error,
    },

    /// Error renaming a path
    #[error("{from}: rename to {to} failed: {source}")]
    Rename {
        from: AbsPath,
        to: AbsPath,
        #[source]
        source: io::Error,
    },

    /// Error changing permissions
    #[error("{path}: chmod failed: {source}")]
    Chmod {
        path: AbsPath,
        #[source]
        source: io::Error,
    },

    /// Error creating or reading a symlink
    #[error("{path}: symlink failed: {source}")]
    Symlink {
        path: AbsPath,
        #[source]
        source: io::Error,
    },

    /// A command could not be started
    #[error("{program}: {source}")]
    Command {
        program: String,
        #[source]
        source: io::Error,
    },

    /// A command exited unsuccessfully
    #[error("{program}: {status}")]
    CommandFailed { program: String, status: String },

    /// A script could not be started
    #[error("{name}: {source}")]
    Script {
        name: RelPath,
        #[source]
        source: io::Error,
    },

    /// A script exited unsuccessfully
    #[error("{name}: {status}")]
    ScriptFailed { name: RelPath, status: String },

    /// More than one source entry claims the same target, one line per target
    #[error("{}", .0.join("\n"))]
    DuplicateTargets(Vec<String>),

    /// Named pipes, sockets and devices cannot be managed
    #[error("{path}: unsupported file type {kind}")]
    UnsupportedFileType { path: AbsPath, kind: String },

    /// A path that must be a directory is something else
    #[error("{path}: not a directory")]
    NotADirectory { path: AbsPath },

    /// The parent of an added entry is not managed
    #[error("{path}: parent directory not in source state")]
    MissingParent { path: RelPath },

    /// A target has no entry in the source state
    #[error("{path}: not in source state")]
    NotManaged { path: RelPath },

    /// A path that must exist does not
    #[error("{path}: not found")]
    NotFound { path: AbsPath },

    /// Template rendering error
    #[error("{path}: {source}")]
    TemplateRender {
        path: String,
        #[source]
        source: tilde_template::Error,
    },

    /// Decryption error
    #[error("{path}: decryption failed: {message}")]
    Decryption { path: String, message: String },

    /// Encryption error
    #[error("{path}: encryption failed: {message}")]
    Encryption { path: String, message: String },

    /// A template data file could not be parsed
    #[error("{path}: {message}")]
    InvalidData { path: AbsPath, message: String },

    /// A template data file has an unrecognized extension
    #[error("{path}: unknown format")]
    UnknownFormat { path: AbsPath },

    /// A glob pattern could not be compiled
    #[error("{location}: {message}")]
    InvalidPattern { location: String, message: String },

    /// A version string could not be parsed
    #[error("{value:?}: invalid version: {message}")]
    Version { value: String, message: String },

    /// The source directory needs a newer version
    #[error("source state requires version {required} or later, running {running}")]
    MinVersion { required: String, running: String },

    /// Unknown attribute in an attribute modifier
    #[error("{0}: unknown attribute")]
    InvalidAttribute(String),

    /// State persistence error
    #[error("State persistence error: {0}")]
    State(String),

    /// The persistent state was used after it was closed
    #[error("persistent state closed")]
    Closed,

    /// A write was attempted through a read-only persistent state
    #[error("persistent state is read-only")]
    ReadOnlyState,

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Skip this entry and continue with the next
    #[error("skip")]
    SkipEntry,

    /// Error from tilde-core
    #[error(transparent)]
    Core(#[from] tilde_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    Other {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    /// Create an error with additional context
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Other {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this is the skip signal, possibly wrapped in context
    pub fn is_skip(&self) -> bool {
        match self {
            Error::SkipEntry => true,
            Error::Other { source, .. } => source
                .downcast_ref::<Error>()
                .is_some_and(Error::is_skip),
            _ => false,
        }
    }

    /// The kind of the underlying I/O error, if there is one
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Error::FileRead { source, .. }
            | Error::FileWrite { source, .. }
            | Error::DirectoryCreate { source, .. }
            | Error::DirectoryRead { source, .. }
            | Error::Metadata { source, .. }
            | Error::Remove { source, .. }
            | Error::Rename { source, .. }
            | Error::Chmod { source, .. }
            | Error::Symlink { source, .. }
            | Error::Command { source, .. }
            | Error::Script { source, .. }
            | Error::Io(source) => Some(source.kind()),
            Error::Core(tilde_core::Error::Io(source)) => Some(source.kind()),
            Error::Other { source, .. } => source.downcast_ref::<Error>().and_then(Error::io_kind),
            _ => None,
        }
    }

    /// Whether the underlying I/O error is "not found"
    pub fn is_not_found(&self) -> bool {
        self.io_kind() == Some(io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    fn path() -> AbsPath {
        AbsPath::new("/home/user/.bashrc".into()).unwrap()
    }

    #[test]
    fn test_skip_survives_context() {
        assert!(Error::SkipEntry.is_skip());
        assert!(Error::SkipEntry.context(".bashrc").is_skip());
        assert!(!Error::Closed.is_skip());
    }

    #[test]
    fn test_not_found_identity() {
        let err = Error::Metadata {
            path: path(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(err.is_not_found());
        assert!(err.context("status").is_not_found());

        let err = Error::Chmod {
            path: path(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(!err.is_not_found());
        assert_eq!(err.io_kind(), Some(io::ErrorKind::PermissionDenied));
    }

    #[test]
    fn test_messages_name_the_path() {
        let err = Error::FileWrite {
            path: path(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().starts_with("/home/user/.bashrc: write failed"));

        let err = Error::DuplicateTargets(vec![
            "a: duplicate target (a, a.tmpl)".to_string(),
            "b: duplicate target (b, b.tmpl)".to_string(),
        ]);
        assert_eq!(err.to_string().lines().count(), 2);
    }
}
