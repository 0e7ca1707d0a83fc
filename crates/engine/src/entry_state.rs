//! Persisted entry fingerprints
//!
//! An [`EntryState`] summarizes an entry by type, permissions and the
//! SHA-256 of its contents. The `entryState` bucket stores one per target
//! path as JSON, recording what was last written there.

use serde::{Deserialize, Serialize};
use std::fmt;
use tilde_core::Umask;

/// The kind of entry an [`EntryState`] describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStateType {
    /// Nothing exists at the path
    Absent,
    /// A directory
    Dir,
    /// A regular file
    File,
    /// A file that only has to exist
    Present,
    /// A script
    Script,
    /// A symbolic link
    Symlink,
}

impl fmt::Display for EntryStateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryStateType::Absent => "absent",
            EntryStateType::Dir => "dir",
            EntryStateType::File => "file",
            EntryStateType::Present => "present",
            EntryStateType::Script => "script",
            EntryStateType::Symlink => "symlink",
        };
        f.write_str(name)
    }
}

/// Content-addressed fingerprint of an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryState {
    /// Entry kind
    #[serde(rename = "type")]
    pub entry_type: EntryStateType,
    /// Permission bits, for directories and files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    /// Hex SHA-256 of the contents, or of the link target for symlinks
    #[serde(
        default,
        rename = "contentsSHA256",
        skip_serializing_if = "String::is_empty"
    )]
    pub contents_sha256: String,
}

impl EntryState {
    /// Entry state of a missing entry
    pub fn absent() -> Self {
        Self::new(EntryStateType::Absent, None, String::new())
    }

    /// Create an entry state
    pub fn new(entry_type: EntryStateType, mode: Option<u32>, contents_sha256: String) -> Self {
        Self {
            entry_type,
            mode,
            contents_sha256,
        }
    }

    /// Whether `self` and `other` describe the same entry under `umask`
    ///
    /// Types and digests must match and permissions must match after
    /// masking. A present entry is satisfied by any regular file.
    ///
    /// # Examples
    ///
    /// ```
    /// use tilde_core::Umask;
    /// use tilde_engine::entry_state::{EntryState, EntryStateType};
    ///
    /// let written = EntryState::new(EntryStateType::File, Some(0o666), "ab".into());
    /// let actual = EntryState::new(EntryStateType::File, Some(0o644), "ab".into());
    /// assert!(written.equivalent(&actual, Umask::new(0o022)));
    /// ```
    pub fn equivalent(&self, other: &EntryState, umask: Umask) -> bool {
        use EntryStateType::{File, Present};
        match (self.entry_type, other.entry_type) {
            (Present, File | Present) | (File, Present) => true,
            (a, b) if a != b => false,
            _ => {
                umask.mask(self.mode.unwrap_or(0)) == umask.mask(other.mode.unwrap_or(0))
                    && self.contents_sha256 == other.contents_sha256
            }
        }
    }

    /// JSON encoding as stored in the `entryState` bucket
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decode the JSON stored in the `entryState` bucket
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not a valid entry state
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Compare two optional entry states, `None` only matching `None`
pub fn equivalent(a: Option<&EntryState>, b: Option<&EntryState>, umask: Umask) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.equivalent(b, umask),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    const UMASK: Umask = Umask::new(0o022);

    fn file(mode: u32, sha: &str) -> EntryState {
        EntryState::new(EntryStateType::File, Some(mode), sha.to_string())
    }

    #[test]
    fn test_permission_masking() {
        assert!(file(0o666, "a").equivalent(&file(0o644, "a"), UMASK));
        assert!(!file(0o666, "a").equivalent(&file(0o600, "a"), UMASK));
        assert!(!file(0o755, "a").equivalent(&file(0o644, "a"), UMASK));
    }

    #[test]
    fn test_type_and_digest_must_match() {
        assert!(!file(0o644, "a").equivalent(&file(0o644, "b"), UMASK));
        let dir = EntryState::new(EntryStateType::Dir, Some(0o644), "a".to_string());
        assert!(!file(0o644, "a").equivalent(&dir, UMASK));
        assert!(EntryState::absent().equivalent(&EntryState::absent(), UMASK));
    }

    #[test]
    fn test_present_accepts_any_file() {
        let present = EntryState::new(EntryStateType::Present, None, String::new());
        assert!(present.equivalent(&file(0o600, "x"), UMASK));
        assert!(file(0o600, "x").equivalent(&present, UMASK));
        assert!(!present.equivalent(&EntryState::absent(), UMASK));
    }

    #[test]
    fn test_json_shape() {
        let state = file(0o644, "ab");
        let json = String::from_utf8(state.to_bytes().unwrap()).unwrap();
        assert_eq!(json, r#"{"type":"file","mode":420,"contentsSHA256":"ab"}"#);
        assert_eq!(EntryState::from_bytes(json.as_bytes()).unwrap(), state);

        let json = String::from_utf8(EntryState::absent().to_bytes().unwrap()).unwrap();
        assert_eq!(json, r#"{"type":"absent"}"#);
    }

    #[test]
    fn test_optional_equivalence() {
        let a = file(0o644, "a");
        assert!(equivalent(None, None, UMASK));
        assert!(!equivalent(Some(&a), None, UMASK));
        assert!(equivalent(Some(&a), Some(&a), UMASK));
    }
}
