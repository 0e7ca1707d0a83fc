//! Entries of the source state
//!
//! Each managed target is produced by one [`SourceStateEntry`]. Directories,
//! removals and renames know their target state up front. A file's target
//! state depends on decryption and template rendering and is computed on
//! first use by [`SourceState::target_state_entry`](crate::source_state::SourceState::target_state_entry).

use crate::target::TargetStateEntry;
use std::cell::OnceCell;
use tilde_core::attr::{DirAttr, FileAttr};
use tilde_core::path::{AbsPath, RelPath, SourceRelPath};

/// A directory in the source directory
#[derive(Debug, Clone)]
pub struct SourceStateDir {
    /// Path relative to the source directory
    pub source_rel_path: SourceRelPath,
    /// Attributes decoded from the name
    pub attr: DirAttr,
    pub(crate) target: TargetStateEntry,
}

impl SourceStateDir {
    /// Create a directory entry; its target is a directory with `perm`
    pub fn new(source_rel_path: SourceRelPath, attr: DirAttr, perm: u32) -> Self {
        Self {
            source_rel_path,
            attr,
            target: TargetStateEntry::Dir { perm },
        }
    }
}

/// A file in the source directory
#[derive(Debug, Clone)]
pub struct SourceStateFile {
    /// Path relative to the source directory
    pub source_rel_path: SourceRelPath,
    /// Attributes decoded from the name
    pub attr: FileAttr,
    pub(crate) origin: Option<AbsPath>,
    pub(crate) target: OnceCell<TargetStateEntry>,
}

impl SourceStateFile {
    /// A file whose contents are read from `origin` when first needed
    pub fn from_origin(source_rel_path: SourceRelPath, attr: FileAttr, origin: AbsPath) -> Self {
        Self {
            source_rel_path,
            attr,
            origin: Some(origin),
            target: OnceCell::new(),
        }
    }

    /// A file whose target state is already known
    pub fn with_target(
        source_rel_path: SourceRelPath,
        attr: FileAttr,
        target: TargetStateEntry,
    ) -> Self {
        Self {
            source_rel_path,
            attr,
            origin: None,
            target: OnceCell::from(target),
        }
    }
}

/// A target to delete
#[derive(Debug, Clone)]
pub struct SourceStateRemove {
    /// The target to delete
    pub target_rel_path: RelPath,
    pub(crate) target: TargetStateEntry,
}

impl SourceStateRemove {
    /// Delete `target_rel_path`
    pub fn new(target_rel_path: RelPath) -> Self {
        Self {
            target_rel_path,
            target: TargetStateEntry::Absent,
        }
    }
}

/// A source directory to rename when its attributes change
#[derive(Debug, Clone)]
pub struct SourceStateRenameDir {
    /// Current path
    pub old: SourceRelPath,
    /// Path after the rename
    pub new: SourceRelPath,
    pub(crate) target: TargetStateEntry,
}

impl SourceStateRenameDir {
    /// Rename `old` to `new`; both must share a parent
    pub fn new(old: SourceRelPath, new: SourceRelPath) -> Self {
        let target = TargetStateEntry::RenameDir {
            old: old.file_name().unwrap_or_default().to_string(),
            new: new.file_name().unwrap_or_default().to_string(),
        };
        Self { old, new, target }
    }
}

/// One entry of the source state
#[derive(Debug, Clone)]
pub enum SourceStateEntry {
    Dir(SourceStateDir),
    File(SourceStateFile),
    Remove(SourceStateRemove),
    RenameDir(SourceStateRenameDir),
}

impl SourceStateEntry {
    /// Position in apply order; lower runs first
    pub fn order(&self) -> i32 {
        match self {
            SourceStateEntry::Dir(_) | SourceStateEntry::Remove(_) => 0,
            SourceStateEntry::File(file) => file.attr.order,
            SourceStateEntry::RenameDir(_) => -1,
        }
    }

    /// The source path that produces this entry
    ///
    /// Removals have no source path.
    pub fn source_rel_path(&self) -> Option<&SourceRelPath> {
        match self {
            SourceStateEntry::Dir(dir) => Some(&dir.source_rel_path),
            SourceStateEntry::File(file) => Some(&file.source_rel_path),
            SourceStateEntry::Remove(_) => None,
            SourceStateEntry::RenameDir(rename) => Some(&rename.new),
        }
    }

    /// Short description of where the entry comes from, for messages
    pub fn origin_name(&self) -> String {
        match self {
            SourceStateEntry::Remove(remove) => format!("remove {}", remove.target_rel_path),
            _ => self
                .source_rel_path()
                .map(ToString::to_string)
                .unwrap_or_default(),
        }
    }

    /// Whether this is a directory entry
    pub fn is_dir(&self) -> bool {
        matches!(self, SourceStateEntry::Dir(_))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    fn source(path: &str, is_dir: bool) -> SourceRelPath {
        SourceRelPath::new(path.into(), is_dir).unwrap()
    }

    #[test]
    fn test_order() {
        let name = "run_last_cleanup.sh";
        let script = SourceStateEntry::File(SourceStateFile::from_origin(
            source(name, false),
            FileAttr::parse(name),
            AbsPath::new("/src/run_last_cleanup.sh".into()).unwrap(),
        ));
        assert_eq!(script.order(), 1);

        let rename = SourceStateEntry::RenameDir(SourceStateRenameDir::new(
            source("dot_ssh", true),
            source("private_dot_ssh", true),
        ));
        assert_eq!(rename.order(), -1);
        assert_eq!(rename.origin_name(), "private_dot_ssh");
    }

    #[test]
    fn test_rename_target_uses_base_names() {
        let rename = SourceStateRenameDir::new(
            source("dot_config/nvim", true),
            source("dot_config/exact_nvim", true),
        );
        assert_eq!(
            rename.target,
            TargetStateEntry::RenameDir {
                old: "nvim".to_string(),
                new: "exact_nvim".to_string(),
            }
        );
    }

    #[test]
    fn test_remove_has_no_source() {
        let remove = SourceStateEntry::Remove(SourceStateRemove::new(
            RelPath::from_slash(".old").unwrap(),
        ));
        assert!(remove.source_rel_path().is_none());
        assert_eq!(remove.origin_name(), "remove .old");
    }
}
