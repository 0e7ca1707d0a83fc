//! Desired state of a single target
//!
//! A [`TargetStateEntry`] is what a source entry evaluates to: its contents
//! are already rendered and decrypted. Applying it makes the minimal change
//! that turns the actual entry into the target.

use crate::actual::ActualStateEntry;
use crate::entry_state::{EntryState, EntryStateType};
use crate::error::Result;
use crate::hash::{Contents, sha256, sha256_hex};
use crate::persistent::{PersistentState, SCRIPT_STATE_BUCKET, ScriptState};
use crate::system::System;
use chrono::Utc;
use tilde_core::Umask;
use tilde_core::path::RelPath;
use tracing::debug;

/// The desired state of a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetStateEntry {
    /// Nothing should exist
    Absent,
    /// A directory with `perm` before the umask
    Dir { perm: u32 },
    /// A file with exactly these contents
    File { contents: Contents, perm: u32 },
    /// A file that must exist; `contents` are only written if it does not
    Present { contents: Contents, perm: u32 },
    /// Rename the sibling `old` to `new` within the entry's directory
    RenameDir { old: String, new: String },
    /// A script to run
    Script {
        name: RelPath,
        contents: Contents,
        once: bool,
    },
    /// A symlink pointing at `linkname`
    Symlink { linkname: String },
}

impl TargetStateEntry {
    /// Fingerprint recorded after this entry is applied
    ///
    /// Renames have no fingerprint.
    pub fn entry_state(&self) -> Option<EntryState> {
        let state = match self {
            TargetStateEntry::Absent => EntryState::absent(),
            TargetStateEntry::Dir { perm } => {
                EntryState::new(EntryStateType::Dir, Some(*perm), String::new())
            }
            TargetStateEntry::File { contents, perm } => EntryState::new(
                EntryStateType::File,
                Some(*perm),
                hex::encode(contents.sha256()),
            ),
            TargetStateEntry::Present { .. } => {
                EntryState::new(EntryStateType::Present, None, String::new())
            }
            TargetStateEntry::RenameDir { .. } => return None,
            TargetStateEntry::Script { contents, .. } => {
                EntryState::new(EntryStateType::Script, None, hex::encode(contents.sha256()))
            }
            TargetStateEntry::Symlink { linkname } => EntryState::new(
                EntryStateType::Symlink,
                None,
                sha256_hex(linkname.as_bytes()),
            ),
        };
        Some(state)
    }

    /// Whether `actual` already satisfies this entry
    ///
    /// Scripts are always considered satisfied and renames never are.
    ///
    /// # Errors
    ///
    /// Returns error if the actual contents cannot be read
    pub fn equal(&self, actual: &ActualStateEntry<'_>, umask: Umask) -> Result<bool> {
        Ok(match (self, actual) {
            (TargetStateEntry::Absent, ActualStateEntry::Absent { .. }) => true,
            (TargetStateEntry::Dir { perm }, ActualStateEntry::Dir { perm: actual, .. }) => {
                umask.perm_eq(*perm, *actual)
            }
            (
                TargetStateEntry::File { contents, perm },
                ActualStateEntry::File {
                    perm: actual_perm,
                    contents: actual_contents,
                    ..
                },
            ) => {
                umask.perm_eq(*perm, *actual_perm)
                    && sha256(actual_contents.get()?) == *contents.sha256()
            }
            (
                TargetStateEntry::Present { perm, .. },
                ActualStateEntry::File {
                    perm: actual_perm, ..
                },
            ) => umask.perm_eq(*perm, *actual_perm),
            (TargetStateEntry::Script { .. }, _) => true,
            (
                TargetStateEntry::Symlink { linkname },
                ActualStateEntry::Symlink {
                    linkname: actual, ..
                },
            ) => actual.get()? == linkname,
            _ => false,
        })
    }

    /// Make `actual` match this entry
    ///
    /// # Errors
    ///
    /// Returns error if any filesystem operation fails or a script fails
    pub fn apply(
        &self,
        system: &dyn System,
        persistent: &dyn PersistentState,
        actual: &ActualStateEntry<'_>,
        umask: Umask,
    ) -> Result<()> {
        let path = actual.path();
        match self {
            TargetStateEntry::Absent => actual.remove(system),
            TargetStateEntry::Dir { perm } => {
                if let ActualStateEntry::Dir { perm: actual, .. } = actual {
                    if !umask.perm_eq(*perm, *actual) {
                        system.chmod(path, umask.mask(*perm))?;
                    }
                    return Ok(());
                }
                actual.remove(system)?;
                system.mkdir(path, *perm)
            }
            TargetStateEntry::File { contents, perm } => {
                if let ActualStateEntry::File {
                    perm: actual_perm,
                    contents: actual_contents,
                    ..
                } = actual
                {
                    if sha256(actual_contents.get()?) == *contents.sha256() {
                        if !umask.perm_eq(*perm, *actual_perm) {
                            system.chmod(path, umask.mask(*perm))?;
                        }
                        return Ok(());
                    }
                    return system.write_file(path, contents.bytes(), *perm);
                }
                actual.remove(system)?;
                system.write_file(path, contents.bytes(), *perm)
            }
            TargetStateEntry::Present { contents, perm } => {
                if let ActualStateEntry::File {
                    perm: actual_perm, ..
                } = actual
                {
                    if !umask.perm_eq(*perm, *actual_perm) {
                        system.chmod(path, umask.mask(*perm))?;
                    }
                    return Ok(());
                }
                actual.remove(system)?;
                system.write_file(path, contents.bytes(), *perm)
            }
            TargetStateEntry::RenameDir { old, new } => {
                let dir = path.dir();
                system.rename(&dir.join_name(old), &dir.join_name(new))
            }
            TargetStateEntry::Script {
                name,
                contents,
                once,
            } => {
                if contents.is_blank() {
                    debug!(script = %name, "Skipping empty script");
                    return Ok(());
                }
                let key = hex::encode(contents.sha256());
                if *once && persistent.get(SCRIPT_STATE_BUCKET, key.as_bytes())?.is_some() {
                    debug!(script = %name, "Script already run");
                    return Ok(());
                }
                system.run_script(name, &path.dir(), contents.bytes())?;
                if *once {
                    let state = ScriptState {
                        name: name.to_string(),
                        run_at: Utc::now(),
                    };
                    persistent.set(
                        SCRIPT_STATE_BUCKET,
                        key.as_bytes(),
                        &serde_json::to_vec(&state)?,
                    )?;
                }
                Ok(())
            }
            TargetStateEntry::Symlink { linkname } => {
                if let ActualStateEntry::Symlink {
                    linkname: actual_linkname,
                    ..
                } = actual
                    && actual_linkname.get()? == linkname
                {
                    return Ok(());
                }
                actual.remove(system)?;
                system.write_symlink(linkname, path)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::persistent::MockPersistentState;
    use crate::system::{DryRunSystem, Operation, RealSystem};
    use tempfile::TempDir;
    use tilde_core::path::AbsPath;

    const UMASK: Umask = Umask::new(0o022);

    fn setup() -> (TempDir, AbsPath, RealSystem) {
        let temp = TempDir::new().unwrap();
        let root = AbsPath::new(temp.path().to_path_buf()).unwrap();
        (temp, root, RealSystem::new(UMASK))
    }

    fn file(contents: &[u8], perm: u32) -> TargetStateEntry {
        TargetStateEntry::File {
            contents: Contents::new(contents.to_vec()),
            perm,
        }
    }

    fn apply(system: &dyn System, target: &TargetStateEntry, path: &AbsPath) {
        let actual = ActualStateEntry::read(system, path).unwrap();
        target
            .apply(system, &MockPersistentState::new(), &actual, UMASK)
            .unwrap();
    }

    #[test]
    fn test_file_write_then_equal() {
        let (_temp, root, system) = setup();
        let path = root.join_name("f");
        let target = file(b"x\n", 0o666);
        apply(&system, &target, &path);

        let actual = ActualStateEntry::read(&system, &path).unwrap();
        assert!(target.equal(&actual, UMASK).unwrap());
        assert_eq!(system.read_file(&path).unwrap(), b"x\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_file_perm_only_change_is_chmod() {
        let (_temp, root, system) = setup();
        let path = root.join_name("f");
        system.write_file(&path, b"x\n", 0o644).unwrap();

        let dry = DryRunSystem::new(&system);
        apply(&dry, &file(b"x\n", 0o777), &path);
        assert!(matches!(
            dry.operations().as_slice(),
            [Operation::Chmod { perm: 0o755, .. }]
        ));
    }

    #[test]
    fn test_unchanged_file_is_untouched() {
        let (_temp, root, system) = setup();
        let path = root.join_name("f");
        system.write_file(&path, b"x\n", 0o666).unwrap();

        let dry = DryRunSystem::new(&system);
        apply(&dry, &file(b"x\n", 0o666), &path);
        assert!(!dry.is_modified());
    }

    #[test]
    fn test_dir_replaces_file() {
        let (_temp, root, system) = setup();
        let path = root.join_name("d");
        system.write_file(&path, b"", 0o644).unwrap();
        apply(&system, &TargetStateEntry::Dir { perm: 0o777 }, &path);
        assert!(system.lstat(&path).unwrap().is_dir());
    }

    #[test]
    fn test_present_keeps_existing_contents() {
        let (_temp, root, system) = setup();
        let path = root.join_name("p");
        system.write_file(&path, b"local\n", 0o644).unwrap();
        let target = TargetStateEntry::Present {
            contents: Contents::new(b"default\n".to_vec()),
            perm: 0o666,
        };
        apply(&system, &target, &path);
        assert_eq!(system.read_file(&path).unwrap(), b"local\n");

        system.remove_all(&path).unwrap();
        apply(&system, &target, &path);
        assert_eq!(system.read_file(&path).unwrap(), b"default\n");
    }

    #[test]
    fn test_absent_removes() {
        let (_temp, root, system) = setup();
        let path = root.join_name("gone");
        system.write_file(&path, b"", 0o644).unwrap();
        apply(&system, &TargetStateEntry::Absent, &path);
        assert!(system.lstat(&path).unwrap_err().is_not_found());
        apply(&system, &TargetStateEntry::Absent, &path);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_replaced_only_when_different() {
        let (_temp, root, system) = setup();
        let path = root.join_name("l");
        let target = TargetStateEntry::Symlink {
            linkname: "a".to_string(),
        };
        apply(&system, &target, &path);
        assert_eq!(system.readlink(&path).unwrap(), "a");

        let dry = DryRunSystem::new(&system);
        apply(&dry, &target, &path);
        assert!(!dry.is_modified());
    }

    #[test]
    fn test_rename_dir() {
        let (_temp, root, system) = setup();
        system.mkdir(&root.join_name("old"), 0o755).unwrap();
        let target = TargetStateEntry::RenameDir {
            old: "old".to_string(),
            new: "new".to_string(),
        };
        apply(&system, &target, &root.join_name("new"));
        assert!(system.lstat(&root.join_name("new")).unwrap().is_dir());
        assert!(target.entry_state().is_none());
    }

    #[test]
    fn test_once_script_records_state() {
        let (_temp, root, system) = setup();
        let persistent = MockPersistentState::new();
        let target = TargetStateEntry::Script {
            name: RelPath::from_slash("install.sh").unwrap(),
            contents: Contents::new(b"#!/bin/sh\ntrue\n".to_vec()),
            once: true,
        };
        let dry = DryRunSystem::new(&system);
        let actual = ActualStateEntry::read(&dry, &root.join_name("install.sh")).unwrap();
        target.apply(&dry, &persistent, &actual, UMASK).unwrap();
        target.apply(&dry, &persistent, &actual, UMASK).unwrap();
        assert_eq!(dry.operations().len(), 1);

        let key = hex::encode(sha256(b"#!/bin/sh\ntrue\n"));
        let stored = persistent.get(SCRIPT_STATE_BUCKET, key.as_bytes()).unwrap().unwrap();
        let state: ScriptState = serde_json::from_slice(&stored).unwrap();
        assert_eq!(state.name, "install.sh");
    }

    #[test]
    fn test_blank_script_is_skipped() {
        let (_temp, root, system) = setup();
        let dry = DryRunSystem::new(&system);
        let target = TargetStateEntry::Script {
            name: RelPath::from_slash("noop").unwrap(),
            contents: Contents::new(b"  \n".to_vec()),
            once: false,
        };
        apply(&dry, &target, &root.join_name("noop"));
        assert!(!dry.is_modified());
    }

    #[test]
    fn test_entry_states() {
        let state = file(b"", 0o644).entry_state().unwrap();
        assert_eq!(state.entry_type, EntryStateType::File);
        assert_eq!(state.mode, Some(0o644));
        assert_eq!(
            TargetStateEntry::Absent.entry_state(),
            Some(EntryState::absent())
        );
    }
}
