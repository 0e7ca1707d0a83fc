//! State command implementation
//!
//! Inspect and clear the persistent state.

use std::io::{self, Write};
use tilde_engine::persistent::dump as dump_state;
use tilde_engine::{ENTRY_STATE_BUCKET, SCRIPT_STATE_BUCKET};
use tracing::info;

use super::Format;
use crate::common::{RuntimeContext, StateAccess};
use crate::error::Result;

/// Print every bucket of the persistent state
///
/// # Errors
///
/// Returns an error if the state cannot be read or encoded
pub fn dump(context: &RuntimeContext, format: Format) -> Result<()> {
    let persistent = context.persistent_state(StateAccess::Snapshot)?;
    let dump = dump_state(&*persistent)?;
    let out = format.render(&dump)?;
    io::stdout().write_all(out.as_bytes())?;
    Ok(())
}

/// Delete `bucket`, or every bucket tilde uses
///
/// # Errors
///
/// Returns an error if the state cannot be opened or written
pub fn reset(context: &RuntimeContext, bucket: Option<&str>) -> Result<()> {
    let persistent = context.persistent_state(StateAccess::ReadWrite)?;
    let buckets = match bucket {
        Some(bucket) => vec![bucket],
        None => vec![ENTRY_STATE_BUCKET, SCRIPT_STATE_BUCKET],
    };
    for bucket in buckets {
        persistent.delete_bucket(bucket)?;
        info!(bucket, "Reset persistent state bucket");
    }
    persistent.close()?;
    Ok(())
}
