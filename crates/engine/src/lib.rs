//! # Tilde Engine
//!
//! Source state resolution and reconciliation for the tilde dotfile manager.
//!
//! - **Source state**: the source directory read into one entry per target
//! - **Target state**: what each target should be after an apply
//! - **Actual state**: what is on disk now, probed lazily
//! - **Entry state**: fingerprints persisted after each write
//! - **System**: filesystem and process access, with read-only, dry-run and
//!   logging wrappers
//!
//! ```no_run
//! use tilde_engine::{ApplyOptions, MockPersistentState, RealSystem, SourceState};
//! use tilde_core::path::AbsPath;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let system = RealSystem::default();
//! let source = AbsPath::new("/home/user/.local/share/chezmoi".into())?;
//! let dest = AbsPath::new("/home/user".into())?;
//! let mut state = SourceState::new(&system, source, dest.clone());
//! state.read()?;
//! state.apply_all(&system, &MockPersistentState::new(), &dest, &ApplyOptions::default())?;
//! # Ok(())
//! # }
//! ```

pub mod actual;
pub mod attr_modifier;
pub mod entry_state;
pub mod error;
pub mod hash;
pub mod include;
pub mod lazy;
pub mod patterns;
pub mod persistent;
pub mod source_entry;
pub mod source_state;
pub mod system;
pub mod target;
pub mod version;

pub use actual::ActualStateEntry;
pub use attr_modifier::AttrModifier;
pub use entry_state::{EntryState, EntryStateType};
pub use error::{Error, Result};
pub use include::IncludeSet;
pub use persistent::{
    ENTRY_STATE_BUCKET, MockPersistentState, NullPersistentState, PersistentState,
    RedbPersistentState, SCRIPT_STATE_BUCKET,
};
pub use source_entry::SourceStateEntry;
pub use source_state::{AddOptions, ApplyOptions, PreApplyFn, SourceState};
pub use system::{DryRunSystem, FileInfo, FileType, ReadOnlySystem, RealSystem, System};
pub use target::TargetStateEntry;
pub use version::Version;
