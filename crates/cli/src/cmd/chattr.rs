//! Chattr command implementation
//!
//! Change the attributes of managed targets by renaming their source
//! entries.

use clap::Args;
use std::path::PathBuf;
use tilde_engine::{AttrModifier, DryRunSystem, System};
use tracing::info;

use crate::command::Command;
use crate::common::RuntimeContext;
use crate::error::Result;

/// Change the attributes of targets
///
/// Attributes are a comma-separated list. `+attr` or `attr` sets an
/// attribute, `-attr` or `noattr` clears it: `private,-executable`,
/// `noempty,last`, `+template`.
#[derive(Debug, Clone, Args)]
pub struct ChattrCommand {
    /// Attribute changes: empty, encrypted, exact, executable, first,
    /// last, once, private, template
    #[arg(value_name = "ATTRIBUTES", allow_hyphen_values = true)]
    pub modifier: AttrModifier,

    /// Targets to change
    #[arg(required = true, value_name = "TARGETS")]
    pub targets: Vec<PathBuf>,
}

impl Command for ChattrCommand {
    type Output = ();

    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let system = context.system();
        let state = context.read_source_state(&*system)?;
        let targets = self
            .targets
            .iter()
            .map(|arg| context.target_rel_path(arg))
            .collect::<Result<Vec<_>>>()?;

        let dry_run = DryRunSystem::new(&*system);
        let source_system: &dyn System = if context.options.dry_run {
            &dry_run
        } else {
            &*system
        };
        state.chattr(source_system, &self.modifier, &targets)?;

        if context.options.dry_run {
            super::print_operations(&dry_run);
        } else {
            info!(targets = targets.len(), "Changed attributes");
        }
        Ok(())
    }
}
