//! Apply command implementation
//!
//! Apply the source state to the destination directory.

use clap::Args;
use std::path::PathBuf;
use tilde_core::Umask;
use tilde_core::path::RelPath;
use tilde_engine::{
    ApplyOptions, DryRunSystem, EntryState, EntryStateType, Error, IncludeSet, PreApplyFn,
    ReadOnlySystem, System,
};
use tracing::{info, warn};

use crate::command::Command;
use crate::common::{RuntimeContext, StateAccess};
use crate::error::Result;

/// Apply the source state to the destination
#[derive(Debug, Clone, Args)]
pub struct ApplyCommand {
    /// Targets to apply, with everything below them (all if not specified)
    #[arg(value_name = "TARGETS")]
    pub targets: Vec<PathBuf>,

    /// Entry types to apply, e.g. `files,dirs` or `noscripts`
    #[arg(short, long, default_value = "all")]
    pub include: IncludeSet,
}

impl Command for ApplyCommand {
    type Output = ();

    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let system = context.system();
        let source_system = ReadOnlySystem::new(&*system);
        let state = context.read_source_state(&source_system)?;
        let targets = context.selected_targets(&state, &self.targets)?;
        let persistent = context.persistent_state(StateAccess::ReadWrite)?;

        let dry_run = DryRunSystem::new(&*system);
        let target_system: &dyn System = if context.options.dry_run {
            &dry_run
        } else {
            &*system
        };

        let umask = context.umask;
        let keep_changes = move |target: &RelPath,
                                 target_state: Option<&EntryState>,
                                 last_written: Option<&EntryState>,
                                 actual: &EntryState| {
            check_overwrite(target, target_state, last_written, actual, umask)
        };
        let pre_apply: Option<&PreApplyFn<'_>> = if context.options.force {
            None
        } else {
            Some(&keep_changes)
        };
        let options = ApplyOptions {
            include: self.include,
            umask,
            pre_apply,
        };

        context.for_each_target(&targets, |target| {
            state.apply(
                target_system,
                &*persistent,
                context.dest_dir(),
                target,
                &options,
            )
        })?;

        if context.options.dry_run {
            super::print_operations(&dry_run);
        } else {
            info!(targets = targets.len(), "Applied");
        }
        persistent.close()?;
        Ok(())
    }
}

/// Skip targets changed by someone else since tilde last wrote them
///
/// A target that already matches, a script, or a target never written
/// before is always applied.
fn check_overwrite(
    target: &RelPath,
    target_state: Option<&EntryState>,
    last_written: Option<&EntryState>,
    actual: &EntryState,
    umask: Umask,
) -> tilde_engine::Result<()> {
    if let Some(target_state) = target_state
        && (target_state.entry_type == EntryStateType::Script
            || target_state.equivalent(actual, umask))
    {
        return Ok(());
    }
    match last_written {
        Some(last_written) if !last_written.equivalent(actual, umask) => {
            warn!(path = %target, "Target has changed since it was last written, skipping (use --force to overwrite)");
            Err(Error::SkipEntry)
        }
        _ => Ok(()),
    }
}
