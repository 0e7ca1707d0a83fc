//! Cat command implementation
//!
//! Print what `apply` would write for each target: decrypted, rendered
//! file contents, script contents or a symlink's destination.

use anyhow::anyhow;
use clap::Args;
use std::io::{self, Write};
use std::path::PathBuf;
use tilde_engine::{Error, ReadOnlySystem, TargetStateEntry};

use crate::command::Command;
use crate::common::RuntimeContext;
use crate::error::Result;

/// Print the target contents of files, scripts and symlinks
#[derive(Debug, Clone, Args)]
pub struct CatCommand {
    /// Targets to print
    #[arg(required = true, value_name = "TARGETS")]
    pub targets: Vec<PathBuf>,
}

impl Command for CatCommand {
    type Output = ();

    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let system = context.system();
        let source_system = ReadOnlySystem::new(&*system);
        let state = context.read_source_state(&source_system)?;

        let mut stdout = io::stdout().lock();
        for arg in &self.targets {
            let target = context.target_rel_path(arg)?;
            let entry = state
                .entry(&target)
                .ok_or_else(|| Error::NotManaged {
                    path: target.clone(),
                })?;
            let target_state = state
                .target_state_entry(entry)
                .map_err(|e| e.context(target.to_string()))?;
            let contents = target_contents(target_state)
                .map_err(|kind| anyhow!("{target}: {kind} has no contents"))?;
            stdout.write_all(&contents)?;
        }
        stdout.flush()?;
        Ok(())
    }
}

/// The bytes `cat` prints, or the kind of entry that has none
fn target_contents(target_state: &TargetStateEntry) -> std::result::Result<Vec<u8>, &'static str> {
    match target_state {
        TargetStateEntry::File { contents, .. }
        | TargetStateEntry::Present { contents, .. }
        | TargetStateEntry::Script { contents, .. } => Ok(contents.bytes().to_vec()),
        TargetStateEntry::Symlink { linkname } => Ok(format!("{linkname}\n").into_bytes()),
        TargetStateEntry::Absent => Err("removed target"),
        TargetStateEntry::Dir { .. } | TargetStateEntry::RenameDir { .. } => Err("directory"),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use tilde_engine::hash::Contents;

    #[test]
    fn test_file_contents() {
        let entry = TargetStateEntry::File {
            contents: Contents::new(b"export EDITOR=vi\n".to_vec()),
            perm: 0o644,
        };
        assert_eq!(target_contents(&entry).unwrap(), b"export EDITOR=vi\n");
    }

    #[test]
    fn test_symlink_prints_destination() {
        let entry = TargetStateEntry::Symlink {
            linkname: ".dotfiles/vimrc".to_string(),
        };
        assert_eq!(target_contents(&entry).unwrap(), b".dotfiles/vimrc\n");
    }

    #[test]
    fn test_directory_has_no_contents() {
        assert_eq!(
            target_contents(&TargetStateEntry::Dir { perm: 0o755 }).unwrap_err(),
            "directory"
        );
        assert_eq!(
            target_contents(&TargetStateEntry::Absent).unwrap_err(),
            "removed target"
        );
    }
}
