//! Command trait for tilde CLI
//!
//! Every subcommand that needs configuration and resolved directories
//! implements [`Command`], so dispatch in [`run`](crate::run) stays uniform.

use crate::common::RuntimeContext;
use crate::error::Result;

/// A subcommand executed against a [`RuntimeContext`]
///
/// ```rust,ignore
/// use crate::command::Command;
/// use crate::common::RuntimeContext;
/// use crate::error::Result;
/// use clap::Args;
///
/// #[derive(Debug, Args)]
/// pub struct MyCommand {
///     #[arg(short, long)]
///     pub some_flag: bool,
/// }
///
/// impl Command for MyCommand {
///     type Output = ();
///
///     fn execute(&self, context: &RuntimeContext) -> Result<()> {
///         let system = context.system();
///         let state = context.read_source_state(&system)?;
///         Ok(())
///     }
/// }
/// ```
pub trait Command {
    /// The type returned by this command
    type Output;

    /// Execute the command with the given runtime context
    ///
    /// # Errors
    ///
    /// Returns a `CommandError` if the command fails
    fn execute(&self, context: &RuntimeContext) -> Result<Self::Output>;
}
