//! Add command implementation
//!
//! Import destination entries into the source directory.

use anyhow::Context;
use clap::Args;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tilde_core::path::AbsPath;
use tilde_engine::system::mkdir_all;
use tilde_engine::{AddOptions, DryRunSystem, FileInfo, IncludeSet, SourceState, System};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::command::Command;
use crate::common::{RuntimeContext, StateAccess};
use crate::error::Result;

/// Add targets to the source directory
#[derive(Debug, Clone, Args)]
#[allow(clippy::struct_excessive_bools)]
pub struct AddCommand {
    /// Destination paths to add
    #[arg(required = true, value_name = "TARGETS")]
    pub targets: Vec<PathBuf>,

    /// Add directories with everything in them
    #[arg(short, long)]
    pub recursive: bool,

    /// Keep empty files
    #[arg(short, long)]
    pub empty: bool,

    /// Encrypt files
    #[arg(long)]
    pub encrypt: bool,

    /// Mark directories exact, so unmanaged entries in them are removed
    #[arg(short = 'x', long)]
    pub exact: bool,

    /// Mark files as templates
    #[arg(short = 'T', long)]
    pub template: bool,

    /// Entry types to add
    #[arg(short, long, default_value = "all")]
    pub include: IncludeSet,
}

impl Command for AddCommand {
    type Output = ();

    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let system = context.system();
        if !context.options.dry_run {
            mkdir_all(&*system, context.source_dir(), 0o700)?;
        }
        let state = context.read_source_state(&*system)?;

        let mut infos = BTreeMap::new();
        for arg in &self.targets {
            let dest_path = context.dest_path(arg)?;
            self.collect(context, &state, &*system, &dest_path, &mut infos)?;
        }
        if infos.is_empty() {
            warn!("Nothing to add");
            return Ok(());
        }

        let options = AddOptions {
            empty: self.empty,
            encrypt: self.encrypt,
            exact: self.exact,
            include: self.include,
            template: self.template,
            umask: context.umask,
        };
        let persistent = context.persistent_state(StateAccess::ReadWrite)?;
        let dry_run = DryRunSystem::new(&*system);
        let source_system: &dyn System = if context.options.dry_run {
            &dry_run
        } else {
            &*system
        };

        state.add(source_system, &*persistent, &*system, &infos, &options)?;

        if context.options.dry_run {
            super::print_operations(&dry_run);
        } else {
            info!(entries = infos.len(), "Added");
        }
        persistent.close()?;
        Ok(())
    }
}

impl AddCommand {
    /// Collect `dest_path`, its unmanaged parents and, when recursive, its
    /// contents
    fn collect(
        &self,
        context: &RuntimeContext,
        state: &SourceState<'_>,
        system: &dyn System,
        dest_path: &AbsPath,
        infos: &mut BTreeMap<AbsPath, FileInfo>,
    ) -> Result<()> {
        if skipped(context, state, dest_path.as_path()) {
            return Ok(());
        }
        state.add_dest_path_infos(infos, system, dest_path, None)?;

        let is_dir = infos.get(dest_path).is_some_and(FileInfo::is_dir);
        if !self.recursive || !is_dir {
            return Ok(());
        }
        let walker = WalkDir::new(dest_path.as_path())
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !skipped(context, state, entry.path()));
        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to walk {dest_path}"))?;
            let path = AbsPath::new(entry.path().to_path_buf())?;
            state.add_dest_path_infos(infos, system, &path, None)?;
        }
        Ok(())
    }
}

/// Whether `path` is left out: the source directory and ignored targets
/// are never added, and neither is anything below them
fn skipped(context: &RuntimeContext, state: &SourceState<'_>, path: &Path) -> bool {
    if path.starts_with(context.source_dir().as_path()) {
        debug!(path = %path.display(), "Skipping source directory");
        return true;
    }
    let target = AbsPath::from_path(path).and_then(|path| path.trim_dir_prefix(context.dest_dir()));
    match target {
        Ok(target) if state.ignored(&target) => {
            warn!(path = %target, "Target is ignored, not adding");
            true
        }
        _ => false,
    }
}
