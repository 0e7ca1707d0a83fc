//! Data command implementation
//!
//! Print the template data every template is rendered with.

use clap::Args;
use std::io::{self, Write};
use tilde_engine::ReadOnlySystem;

use super::Format;
use crate::command::Command;
use crate::common::RuntimeContext;
use crate::error::Result;

/// Print the template data
#[derive(Debug, Clone, Args)]
pub struct DataCommand {
    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    pub format: Format,
}

impl Command for DataCommand {
    type Output = ();

    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let system = context.system();
        let source_system = ReadOnlySystem::new(&*system);
        let state = context.read_source_state(&source_system)?;
        let out = self.format.render(state.template_data())?;
        io::stdout().write_all(out.as_bytes())?;
        Ok(())
    }
}
