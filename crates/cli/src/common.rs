//! Common utilities and types shared across CLI commands

use crate::error::{CommandError, Result};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tilde_config::{Config, EncryptionKind};
use tilde_core::path::{AbsPath, RelPath};
use tilde_core::{Encryption, Umask};
use tilde_crypto::AgeEncryption;
use tilde_engine::persistent::{DebugPersistentState, ReadOnlyPersistentState};
use tilde_engine::system::DebugSystem;
use tilde_engine::{
    MockPersistentState, PersistentState, RealSystem, RedbPersistentState, SourceState, System,
    Version,
};
use tilde_template::DefaultData;
use tracing::{debug, warn};

/// Running tool version, compared against `.chezmoiversion`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolved paths for dotfile operations
#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    /// Source directory
    pub source_dir: AbsPath,
    /// Destination directory, usually `$HOME`
    pub dest_dir: AbsPath,
    /// Persistent state database
    pub state_file: PathBuf,
}

impl ResolvedPaths {
    /// Make every path absolute
    ///
    /// Directories that exist are canonicalized so target arguments given
    /// through symlinked parents still land under them.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory is needed but unavailable
    pub fn resolve(source_dir: &Path, dest_dir: &Path, state_file: &Path) -> Result<Self> {
        Ok(Self {
            source_dir: canonical_dir(source_dir)?,
            dest_dir: canonical_dir(dest_dir)?,
            state_file: absolute(&expand_tilde(state_file))?.into_path_buf(),
        })
    }
}

/// Flags that apply to every command
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalOptions {
    /// Continue with the next target after an error
    pub keep_going: bool,
    /// Overwrite targets changed since they were last written
    pub force: bool,
    /// Record changes instead of making them
    pub dry_run: bool,
    /// Log every system call
    pub verbose: bool,
}

/// How a command uses the persistent state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAccess {
    /// Writes go to the database file
    ReadWrite,
    /// Writes go to an in-memory copy that is thrown away
    Snapshot,
}

/// Runtime context for CLI commands
pub struct RuntimeContext {
    /// Shared configuration
    pub config: Arc<Config>,
    /// Resolved paths
    pub paths: ResolvedPaths,
    /// Umask every permission is compared and written under
    pub umask: Umask,
    /// Global flags
    pub options: GlobalOptions,
    encryption: Option<Box<dyn Encryption>>,
}

impl RuntimeContext {
    /// Create a new runtime context, loading encryption keys if configured
    ///
    /// # Errors
    ///
    /// Returns an error if the configured identities cannot be loaded
    pub fn new(
        config: Config,
        paths: ResolvedPaths,
        umask: Umask,
        options: GlobalOptions,
    ) -> Result<Self> {
        let encryption: Option<Box<dyn Encryption>> = match config.general.encryption {
            EncryptionKind::Age => Some(Box::new(AgeEncryption::load(
                &config.age_identity_paths(),
                &config.age_recipients(),
            )?)),
            EncryptionKind::None => None,
        };
        Ok(Self {
            config: Arc::new(config),
            paths,
            umask,
            options,
            encryption,
        })
    }

    /// Get the source directory
    #[inline]
    pub fn source_dir(&self) -> &AbsPath {
        &self.paths.source_dir
    }

    /// Get the destination directory
    #[inline]
    pub fn dest_dir(&self) -> &AbsPath {
        &self.paths.dest_dir
    }

    /// The real filesystem, logging every call when verbose
    pub fn system(&self) -> Box<dyn System> {
        let real = RealSystem::new(self.umask);
        if self.options.verbose {
            Box::new(DebugSystem::new(real))
        } else {
            Box::new(real)
        }
    }

    /// Read the source directory through `system`
    ///
    /// # Errors
    ///
    /// Returns an error if the source state is invalid or requires a newer
    /// version of tilde
    pub fn read_source_state<'s>(&'s self, system: &'s dyn System) -> Result<SourceState<'s>> {
        let default_data = DefaultData::detect(
            self.source_dir().as_path(),
            self.dest_dir().as_path(),
            VERSION,
        )
        .into_data();
        let mut state = SourceState::new(system, self.source_dir().clone(), self.dest_dir().clone())
            .with_umask(self.umask)
            .with_default_data(default_data)
            .with_priority_data(self.config.data_map());
        if let Some(encryption) = &self.encryption {
            state = state.with_encryption(encryption.as_ref());
        }
        state.read()?;

        let running: Version = VERSION.parse()?;
        running.check(state.min_version())?;
        Ok(state)
    }

    /// Open the persistent state
    ///
    /// A snapshot is a copy of the database taken with a short-lived shared
    /// read-only handle, so snapshots never block each other. `--dry-run`
    /// turns every access into a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or read
    pub fn persistent_state(&self, access: StateAccess) -> Result<Box<dyn PersistentState>> {
        let path = &self.paths.state_file;
        let access = if self.options.dry_run {
            StateAccess::Snapshot
        } else {
            access
        };

        match access {
            StateAccess::ReadWrite => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let state = RedbPersistentState::new(path)?;
                Ok(self.wrap_state(state))
            }
            StateAccess::Snapshot => {
                let snapshot = MockPersistentState::new();
                if path.exists() {
                    let durable =
                        ReadOnlyPersistentState::new(RedbPersistentState::open_read_only(path)?);
                    durable.copy_to(&snapshot)?;
                    durable.close()?;
                } else {
                    debug!(path = %path.display(), "No persistent state yet");
                }
                Ok(self.wrap_state(snapshot))
            }
        }
    }

    fn wrap_state<P: PersistentState + 'static>(&self, state: P) -> Box<dyn PersistentState> {
        if self.options.verbose {
            Box::new(DebugPersistentState::new(state))
        } else {
            Box::new(state)
        }
    }

    /// The target name of a path argument
    ///
    /// `~` is expanded and relative paths are taken from the current
    /// directory. A final symlink is not followed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not inside the destination directory
    pub fn target_rel_path(&self, arg: &Path) -> Result<RelPath> {
        let path = resolve_arg(arg)?;
        path.trim_dir_prefix(self.dest_dir())
            .map_err(|_| CommandError::invalid_path(arg, "not in the destination directory"))
    }

    /// Absolute destination path of a path argument
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not inside the destination directory
    pub fn dest_path(&self, arg: &Path) -> Result<AbsPath> {
        let target = self.target_rel_path(arg)?;
        Ok(self.dest_dir().join(&target))
    }

    /// Targets selected by the path arguments, in apply order
    ///
    /// No arguments selects every target. A directory selects everything
    /// below it too.
    ///
    /// # Errors
    ///
    /// Returns an error if an argument is not a managed target
    pub fn selected_targets(&self, state: &SourceState<'_>, args: &[PathBuf]) -> Result<Vec<RelPath>> {
        let all = state.all_target_names();
        if args.is_empty() {
            return Ok(all);
        }
        let mut roots = Vec::with_capacity(args.len());
        for arg in args {
            let target = self.target_rel_path(arg)?;
            if state.entry(&target).is_none() {
                return Err(tilde_engine::Error::NotManaged { path: target }.into());
            }
            roots.push(target);
        }
        Ok(all
            .into_iter()
            .filter(|name| roots.iter().any(|root| name.as_path().starts_with(root.as_path())))
            .collect())
    }

    /// Run `f` for every target, honouring `--keep-going`
    ///
    /// Skipped targets are not failures.
    ///
    /// # Errors
    ///
    /// Returns the first failure, or a summary of all failures with
    /// `--keep-going`
    pub fn for_each_target(
        &self,
        targets: &[RelPath],
        mut f: impl FnMut(&RelPath) -> tilde_engine::Result<()>,
    ) -> Result<()> {
        let mut failed = 0;
        for target in targets {
            match f(target) {
                Ok(()) => {}
                Err(e) if e.is_skip() => debug!(path = %target, "Skipped"),
                Err(e) if self.options.keep_going => {
                    warn!(path = %target, "Continuing after error");
                    eprintln!("tilde: {e}");
                    failed += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        if failed > 0 {
            return Err(CommandError::ApplyFailed {
                failed,
                total: targets.len(),
            });
        }
        Ok(())
    }
}

/// Replace a leading `~` with the home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match ::dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

fn absolute(path: &Path) -> Result<AbsPath> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };
    Ok(AbsPath::new(path)?)
}

fn canonical_dir(path: &Path) -> Result<AbsPath> {
    let path = expand_tilde(path);
    match fs::canonicalize(&path) {
        Ok(canonical) => Ok(AbsPath::new(canonical)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => absolute(&path),
        Err(e) => Err(e.into()),
    }
}

fn resolve_arg(arg: &Path) -> Result<AbsPath> {
    let path = absolute(&expand_tilde(arg))?;
    let parent = path.dir();
    let Some(name) = path.file_name() else {
        return Ok(path);
    };
    match fs::canonicalize(parent.as_path()) {
        Ok(canonical) => Ok(AbsPath::new(canonical)?.join_name(name)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(path),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use tempfile::TempDir;
    use tilde_engine::{ApplyOptions, ENTRY_STATE_BUCKET, Error};

    struct Fixture {
        temp: TempDir,
        context: RuntimeContext,
    }

    fn fixture(options: GlobalOptions) -> Fixture {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        let dest = temp.path().join("home");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(dest.join(".config")).unwrap();
        let paths = ResolvedPaths::resolve(&source, &dest, &temp.path().join("state/tilde.redb"))
            .unwrap();
        let context =
            RuntimeContext::new(Config::default(), paths, Umask::new(0o022), options).unwrap();
        Fixture { temp, context }
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde(Path::new("/etc")), PathBuf::from("/etc"));
        if let Some(home) = ::dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/.bashrc")), home.join(".bashrc"));
            assert_eq!(expand_tilde(Path::new("~")), home);
        }
    }

    #[test]
    fn test_target_rel_path() {
        let fx = fixture(GlobalOptions::default());
        let arg = fx.temp.path().join("home/.config/nvim/init.lua");
        assert_eq!(
            fx.context.target_rel_path(&arg).unwrap(),
            RelPath::from_slash(".config/nvim/init.lua").unwrap()
        );
        assert!(fx.context.target_rel_path(Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn test_selected_targets_include_children() {
        let fx = fixture(GlobalOptions::default());
        let source = fx.context.source_dir().as_path().to_path_buf();
        fs::create_dir_all(source.join("dot_config/nvim")).unwrap();
        fs::write(source.join("dot_config/nvim/init.lua"), "set nu\n").unwrap();
        fs::write(source.join("dot_bashrc"), "# bash\n").unwrap();

        let system = fx.context.system();
        let state = fx.context.read_source_state(&system).unwrap();
        let selected = fx
            .context
            .selected_targets(&state, &[fx.temp.path().join("home/.config")])
            .unwrap();
        let names: Vec<String> = selected.iter().map(ToString::to_string).collect();
        assert_eq!(names, [".config", ".config/nvim", ".config/nvim/init.lua"]);

        let missing = fx
            .context
            .selected_targets(&state, &[fx.temp.path().join("home/.zshrc")])
            .unwrap_err();
        assert_eq!(missing.to_string(), ".zshrc: not in source state");
    }

    #[test]
    fn test_keep_going_counts_failures() {
        let fx = fixture(GlobalOptions {
            keep_going: true,
            ..GlobalOptions::default()
        });
        let targets = [
            RelPath::from_slash("a").unwrap(),
            RelPath::from_slash("b").unwrap(),
            RelPath::from_slash("c").unwrap(),
        ];
        let mut seen = Vec::new();
        let result = fx.context.for_each_target(&targets, |target| {
            seen.push(target.to_string());
            match target.base() {
                "a" => Err(Error::State("broken".to_string())),
                "b" => Err(Error::SkipEntry),
                _ => Ok(()),
            }
        });
        assert_eq!(seen, ["a", "b", "c"]);
        assert!(matches!(
            result,
            Err(CommandError::ApplyFailed {
                failed: 1,
                total: 3
            })
        ));
    }

    #[test]
    fn test_stops_at_first_failure_without_keep_going() {
        let fx = fixture(GlobalOptions::default());
        let targets = [
            RelPath::from_slash("a").unwrap(),
            RelPath::from_slash("b").unwrap(),
        ];
        let mut seen = 0;
        let result = fx.context.for_each_target(&targets, |_| {
            seen += 1;
            Err(Error::State("broken".to_string()))
        });
        assert_eq!(seen, 1);
        assert!(matches!(result, Err(CommandError::Engine(_))));
    }

    #[test]
    fn test_snapshot_does_not_write_database() {
        let fx = fixture(GlobalOptions::default());
        let source = fx.context.source_dir().as_path().to_path_buf();
        fs::write(source.join("dot_profile"), "export A=1\n").unwrap();

        let durable = fx.context.persistent_state(StateAccess::ReadWrite).unwrap();
        durable.set(ENTRY_STATE_BUCKET, b"seed", b"{}").unwrap();
        durable.close().unwrap();
        drop(durable);

        let snapshot = fx.context.persistent_state(StateAccess::Snapshot).unwrap();
        assert!(snapshot.get(ENTRY_STATE_BUCKET, b"seed").unwrap().is_some());

        let system = fx.context.system();
        let state = fx.context.read_source_state(&system).unwrap();
        state
            .apply_all(
                &system,
                &*snapshot,
                fx.context.dest_dir(),
                &ApplyOptions::default(),
            )
            .unwrap();
        drop(snapshot);

        let reopened = fx.context.persistent_state(StateAccess::Snapshot).unwrap();
        let key = fx.context.dest_dir().join_name(".profile").to_string();
        assert!(reopened.get(ENTRY_STATE_BUCKET, key.as_bytes()).unwrap().is_none());
    }
}
