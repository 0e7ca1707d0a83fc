//! Status command implementation
//!
//! Show which targets differ, without changing anything.
//!
//! Each line has two status columns and the target name. The first column
//! compares what tilde last wrote with what is there now, the second
//! compares what is there now with what `apply` would produce:
//!
//! - `A` added
//! - `D` deleted
//! - `M` modified
//! - `R` script to run

use clap::Args;
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::path::PathBuf;
use tilde_core::Umask;
use tilde_core::path::RelPath;
use tilde_engine::{
    ApplyOptions, DryRunSystem, EntryState, EntryStateType, Error, IncludeSet, PersistentState,
    ReadOnlySystem, SCRIPT_STATE_BUCKET, SourceState, SourceStateEntry,
};

use crate::command::Command;
use crate::common::{RuntimeContext, StateAccess};
use crate::error::Result;

/// Show the status of managed targets
#[derive(Debug, Clone, Args)]
pub struct StatusCommand {
    /// Targets to check, with everything below them (all if not specified)
    #[arg(value_name = "TARGETS")]
    pub targets: Vec<PathBuf>,

    /// Entry types to check
    #[arg(short, long, default_value = "all")]
    pub include: IncludeSet,
}

impl Command for StatusCommand {
    type Output = ();

    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let system = context.system();
        let source_system = ReadOnlySystem::new(&*system);
        let state = context.read_source_state(&source_system)?;
        let targets = context.selected_targets(&state, &self.targets)?;
        let persistent = context.persistent_state(StateAccess::Snapshot)?;
        let dry_run = DryRunSystem::new(&*system);

        let umask = context.umask;
        let color = std::io::stdout().is_terminal();
        let report = |target: &RelPath,
                      target_state: Option<&EntryState>,
                      last_written: Option<&EntryState>,
                      actual: &EntryState|
         -> tilde_engine::Result<()> {
            let Some(target_state) = target_state else {
                return Err(Error::SkipEntry);
            };
            if target_state.entry_type == EntryStateType::Script
                && script_already_run(&state, &*persistent, target, target_state)?
            {
                return Err(Error::SkipEntry);
            }
            if let Some((x, y)) = status_columns(last_written, actual, target_state, umask) {
                println!("{}{} {target}", paint(x, color), paint(y, color));
            }
            Err(Error::SkipEntry)
        };
        let options = ApplyOptions {
            include: self.include,
            umask,
            pre_apply: Some(&report),
        };

        context.for_each_target(&targets, |target| {
            state.apply(&dry_run, &*persistent, context.dest_dir(), target, &options)
        })?;
        Ok(())
    }
}

fn script_already_run(
    state: &SourceState<'_>,
    persistent: &dyn PersistentState,
    target: &RelPath,
    target_state: &EntryState,
) -> tilde_engine::Result<bool> {
    let once = matches!(state.entry(target), Some(SourceStateEntry::File(file)) if file.attr.once);
    if !once {
        return Ok(false);
    }
    Ok(persistent
        .get(SCRIPT_STATE_BUCKET, target_state.contents_sha256.as_bytes())?
        .is_some())
}

/// The two status letters, or `None` when there is nothing to report
fn status_columns(
    last_written: Option<&EntryState>,
    actual: &EntryState,
    target: &EntryState,
    umask: Umask,
) -> Option<(char, char)> {
    let x = last_written.map_or(' ', |last_written| status_letter(last_written, actual, umask));
    let y = status_letter(actual, target, umask);
    (x != ' ' || y != ' ').then_some((x, y))
}

fn status_letter(from: &EntryState, to: &EntryState, umask: Umask) -> char {
    if from.equivalent(to, umask) {
        return ' ';
    }
    match to.entry_type {
        EntryStateType::Absent => 'D',
        EntryStateType::Dir
        | EntryStateType::File
        | EntryStateType::Present
        | EntryStateType::Symlink => {
            if from.entry_type == EntryStateType::Absent {
                'A'
            } else {
                'M'
            }
        }
        EntryStateType::Script => 'R',
    }
}

fn paint(letter: char, color: bool) -> String {
    if !color {
        return letter.to_string();
    }
    match letter {
        'A' => letter.green().to_string(),
        'D' => letter.red().to_string(),
        'M' => letter.yellow().to_string(),
        'R' => letter.blue().to_string(),
        _ => letter.to_string(),
    }
}
