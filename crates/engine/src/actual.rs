//! What is currently on disk at a target path
//!
//! Contents and link targets are read lazily: most comparisons only need
//! the entry type and permissions.

use crate::entry_state::{EntryState, EntryStateType};
use crate::error::{Error, Result};
use crate::hash::sha256_hex;
use crate::lazy::Lazy;
use crate::system::{FileType, System};
use tilde_core::path::AbsPath;

/// An entry as found on disk
#[derive(Debug)]
pub enum ActualStateEntry<'a> {
    /// Nothing exists at the path
    Absent { path: AbsPath },
    /// A directory
    Dir { path: AbsPath, perm: u32 },
    /// A regular file
    File {
        path: AbsPath,
        perm: u32,
        contents: Lazy<'a, Vec<u8>>,
    },
    /// A symbolic link
    Symlink {
        path: AbsPath,
        linkname: Lazy<'a, String>,
    },
}

impl<'a> ActualStateEntry<'a> {
    /// Inspect `path` without following a final symlink
    ///
    /// # Errors
    ///
    /// Returns error if `path` cannot be inspected or is not a directory,
    /// file or symlink
    pub fn read(system: &'a dyn System, path: &AbsPath) -> Result<Self> {
        let info = match system.lstat(path) {
            Ok(info) => info,
            Err(e) if e.is_not_found() => return Ok(ActualStateEntry::Absent { path: path.clone() }),
            Err(e) => return Err(e),
        };
        match info.file_type {
            FileType::Dir => Ok(ActualStateEntry::Dir {
                path: path.clone(),
                perm: info.perm,
            }),
            FileType::File => {
                let read_path = path.clone();
                Ok(ActualStateEntry::File {
                    path: path.clone(),
                    perm: info.perm,
                    contents: Lazy::new(move || system.read_file(&read_path)),
                })
            }
            FileType::Symlink => {
                let read_path = path.clone();
                Ok(ActualStateEntry::Symlink {
                    path: path.clone(),
                    linkname: Lazy::new(move || system.readlink(&read_path)),
                })
            }
            other => Err(Error::UnsupportedFileType {
                path: path.clone(),
                kind: other.to_string(),
            }),
        }
    }

    /// The path this entry was read from
    pub fn path(&self) -> &AbsPath {
        match self {
            ActualStateEntry::Absent { path }
            | ActualStateEntry::Dir { path, .. }
            | ActualStateEntry::File { path, .. }
            | ActualStateEntry::Symlink { path, .. } => path,
        }
    }

    /// Fingerprint of the entry
    ///
    /// # Errors
    ///
    /// Returns error if file contents or the link target cannot be read
    pub fn entry_state(&self) -> Result<EntryState> {
        Ok(match self {
            ActualStateEntry::Absent { .. } => EntryState::absent(),
            ActualStateEntry::Dir { perm, .. } => {
                EntryState::new(EntryStateType::Dir, Some(*perm), String::new())
            }
            ActualStateEntry::File { perm, contents, .. } => {
                EntryState::new(EntryStateType::File, Some(*perm), sha256_hex(contents.get()?))
            }
            ActualStateEntry::Symlink { linkname, .. } => EntryState::new(
                EntryStateType::Symlink,
                None,
                sha256_hex(linkname.get()?.as_bytes()),
            ),
        })
    }

    /// Remove the entry, recursively for directories
    ///
    /// # Errors
    ///
    /// Returns error if removal fails
    pub fn remove(&self, system: &dyn System) -> Result<()> {
        match self {
            ActualStateEntry::Absent { .. } => Ok(()),
            _ => system.remove_all(self.path()),
        }
    }
}
