//! End-to-end reconciliation against a real temporary filesystem

#![allow(clippy::unwrap_used, clippy::panic)]

use std::cell::Cell;
use tempfile::TempDir;
use tilde_core::Umask;
use tilde_core::path::{AbsPath, RelPath};
use tilde_engine::persistent::ScriptState;
use tilde_engine::system::{FileInfo, mkdir_all};
use tilde_engine::{
    ApplyOptions, ENTRY_STATE_BUCKET, EntryState, Error, MockPersistentState, PersistentState,
    RealSystem, RedbPersistentState, Result, SCRIPT_STATE_BUCKET, SourceState, System,
};

/// Real filesystem that counts every mutating call
struct CountingSystem {
    inner: RealSystem,
    mutations: Cell<usize>,
}

impl CountingSystem {
    fn new(umask: Umask) -> Self {
        Self {
            inner: RealSystem::new(umask),
            mutations: Cell::new(0),
        }
    }

    fn mutated(&self) {
        self.mutations.set(self.mutations.get() + 1);
    }

    fn take(&self) -> usize {
        self.mutations.replace(0)
    }
}

impl System for CountingSystem {
    fn chmod(&self, path: &AbsPath, perm: u32) -> Result<()> {
        self.mutated();
        self.inner.chmod(path, perm)
    }

    fn glob(&self, pattern: &str) -> Result<Vec<AbsPath>> {
        self.inner.glob(pattern)
    }

    fn lstat(&self, path: &AbsPath) -> Result<FileInfo> {
        self.inner.lstat(path)
    }

    fn mkdir(&self, path: &AbsPath, perm: u32) -> Result<()> {
        self.mutated();
        self.inner.mkdir(path, perm)
    }

    fn read_dir(&self, path: &AbsPath) -> Result<Vec<FileInfo>> {
        self.inner.read_dir(path)
    }

    fn read_file(&self, path: &AbsPath) -> Result<Vec<u8>> {
        self.inner.read_file(path)
    }

    fn readlink(&self, path: &AbsPath) -> Result<String> {
        self.inner.readlink(path)
    }

    fn remove_all(&self, path: &AbsPath) -> Result<()> {
        self.mutated();
        self.inner.remove_all(path)
    }

    fn rename(&self, from: &AbsPath, to: &AbsPath) -> Result<()> {
        self.mutated();
        self.inner.rename(from, to)
    }

    fn run_cmd(&self, program: &str, args: &[String], dir: Option<&AbsPath>) -> Result<()> {
        self.mutated();
        self.inner.run_cmd(program, args, dir)
    }

    fn run_script(&self, name: &RelPath, dir: &AbsPath, contents: &[u8]) -> Result<()> {
        self.mutated();
        self.inner.run_script(name, dir, contents)
    }

    fn stat(&self, path: &AbsPath) -> Result<FileInfo> {
        self.inner.stat(path)
    }

    fn write_file(&self, path: &AbsPath, contents: &[u8], perm: u32) -> Result<()> {
        self.mutated();
        self.inner.write_file(path, contents, perm)
    }

    fn write_symlink(&self, target: &str, link: &AbsPath) -> Result<()> {
        self.mutated();
        self.inner.write_symlink(target, link)
    }

    fn idempotent_cmd_output(&self, program: &str, args: &[String]) -> Result<Vec<u8>> {
        self.inner.idempotent_cmd_output(program, args)
    }
}

struct Home {
    _temp: TempDir,
    root: AbsPath,
    source: AbsPath,
    dest: AbsPath,
    system: CountingSystem,
    umask: Umask,
}

impl Home {
    fn new(umask: Umask) -> Self {
        let temp = TempDir::new().unwrap();
        let root = AbsPath::new(temp.path().to_path_buf()).unwrap();
        let system = CountingSystem::new(umask);
        let source = root.join_name("source");
        let dest = root.join_name("home");
        system.inner.mkdir(&source, 0o755).unwrap();
        system.inner.mkdir(&dest, 0o755).unwrap();
        Self {
            _temp: temp,
            root,
            source,
            dest,
            system,
            umask,
        }
    }

    fn write(&self, root: &AbsPath, rel: &str, contents: &str) {
        let path = root.join(&RelPath::from_slash(rel).unwrap());
        mkdir_all(&self.system.inner, &path.dir(), 0o755).unwrap();
        self.system
            .inner
            .write_file(&path, contents.as_bytes(), 0o644)
            .unwrap();
    }

    fn dest_path(&self, rel: &str) -> AbsPath {
        self.dest.join(&RelPath::from_slash(rel).unwrap())
    }

    fn read_state(&self) -> Result<SourceState<'_>> {
        let mut state = SourceState::new(&self.system.inner, self.source.clone(), self.dest.clone())
            .with_umask(self.umask);
        state.read()?;
        Ok(state)
    }

    /// Read, apply everything and return the number of mutations
    fn apply(&self, persistent: &dyn PersistentState) -> usize {
        let state = self.read_state().unwrap();
        self.system.take();
        state
            .apply_all(
                &self.system,
                persistent,
                &self.dest,
                &ApplyOptions {
                    umask: self.umask,
                    ..ApplyOptions::default()
                },
            )
            .unwrap();
        self.system.take()
    }
}

#[test]
fn test_bashrc_end_to_end() {
    let home = Home::new(Umask::new(0o022));
    home.write(&home.source, "dot_bashrc", "export EDITOR=vi\n");
    let persistent = MockPersistentState::new();

    assert_eq!(home.apply(&persistent), 1);

    let bashrc = home.dest_path(".bashrc");
    assert_eq!(home.system.read_file(&bashrc).unwrap(), b"export EDITOR=vi\n");
    #[cfg(unix)]
    assert_eq!(home.system.lstat(&bashrc).unwrap().perm, 0o644);

    let stored = persistent
        .get(ENTRY_STATE_BUCKET, bashrc.to_string().as_bytes())
        .unwrap()
        .unwrap();
    let entry_state = EntryState::from_bytes(&stored).unwrap();
    assert_eq!(
        entry_state.contents_sha256,
        tilde_engine::hash::sha256_hex(b"export EDITOR=vi\n")
    );
}

#[cfg(unix)]
#[test]
fn test_second_apply_is_a_no_op() {
    let home = Home::new(Umask::new(0o022));
    home.write(&home.source, "dot_bashrc", "a\n");
    home.write(&home.source, "private_dot_ssh/config", "Host *\n");
    home.write(&home.source, "dot_local/bin/executable_hello", "#!/bin/sh\n");
    home.write(&home.source, "symlink_dot_vimrc", ".config/nvim/init.vim\n");
    home.write(&home.source, "exact_dot_themes/dark", "dark\n");
    home.write(&home.dest, ".themes/light", "light\n");
    let persistent = MockPersistentState::new();

    assert!(home.apply(&persistent) > 0);
    assert_eq!(home.apply(&persistent), 0);
}

#[cfg(unix)]
#[test]
fn test_permissions_follow_umask() {
    let home = Home::new(Umask::new(0o077));
    home.write(&home.source, "executable_run", "#!/bin/sh\n");
    home.write(&home.source, "private_dot_netrc", "machine x\n");
    home.write(&home.source, "dot_cache/.keep", "");
    home.write(&home.source, "dot_cache/file", "x\n");
    home.apply(&MockPersistentState::new());

    let perm = |rel: &str| home.system.lstat(&home.dest_path(rel)).unwrap().perm;
    assert_eq!(perm("run"), 0o700);
    assert_eq!(perm(".netrc"), 0o600);
    assert_eq!(perm(".cache"), 0o700);
    assert_eq!(perm(".cache/file"), 0o600);
}

#[cfg(unix)]
#[test]
fn test_permission_drift_is_repaired_with_chmod() {
    let home = Home::new(Umask::new(0o022));
    home.write(&home.source, "dot_profile", "x\n");
    let persistent = MockPersistentState::new();
    home.apply(&persistent);

    let profile = home.dest_path(".profile");
    home.system.inner.chmod(&profile, 0o600).unwrap();
    assert_eq!(home.apply(&persistent), 1);
    assert_eq!(home.system.lstat(&profile).unwrap().perm, 0o644);
}

#[test]
fn test_exact_dir_prunes_unmanaged_entries() {
    let home = Home::new(Umask::new(0o022));
    home.write(&home.source, "exact_dot_vim/vimrc", "set nu\n");
    home.write(&home.source, ".chezmoiignore", ".vim/keep\n");
    home.write(&home.dest, ".vim/stale", "x");
    home.write(&home.dest, ".vim/old/file", "x");
    home.write(&home.dest, ".vim/keep", "x");
    home.apply(&MockPersistentState::new());

    let exists = |rel: &str| home.system.lstat(&home.dest_path(rel)).is_ok();
    assert!(exists(".vim/vimrc"));
    assert!(exists(".vim/keep"));
    assert!(!exists(".vim/stale"));
    assert!(!exists(".vim/old"));
}

#[test]
fn test_duplicate_targets_report_both_sources() {
    let home = Home::new(Umask::new(0o022));
    home.write(&home.source, "dot_gitconfig", "a");
    home.write(&home.source, "dot_gitconfig.tmpl", "b");
    home.write(&home.dest, ".cache/x", "x");
    home.write(&home.source, "dot_cache/x", "x");
    home.write(&home.source, ".chezmoiremove", ".cache/x\n");

    let Err(Error::DuplicateTargets(messages)) = home.read_state() else {
        panic!("expected duplicate targets");
    };
    assert_eq!(
        messages,
        [
            ".cache/x: duplicate target (remove .cache/x, dot_cache/x)",
            ".gitconfig: duplicate target (dot_gitconfig, dot_gitconfig.tmpl)",
        ]
    );
}

#[test]
fn test_ignore_last_match_wins() {
    let home = Home::new(Umask::new(0o022));
    home.write(
        &home.source,
        ".chezmoiignore",
        ".config/*\n!.config/nvim\n.config/nvim/lazy-lock.json\n",
    );
    home.write(&home.source, "dot_config/nvim/init.lua", "x");
    home.write(&home.source, "dot_config/nvim/lazy-lock.json", "x");
    home.write(&home.source, "dot_config/fish/config.fish", "x");

    let state = home.read_state().unwrap();
    let names: Vec<String> = state.target_names().iter().map(RelPath::to_slash).collect();
    assert_eq!(names, [".config", ".config/nvim", ".config/nvim/init.lua"]);
}

#[cfg(unix)]
#[test]
fn test_once_script_runs_again_only_when_contents_change() {
    let home = Home::new(Umask::new(0o022));
    home.write(&home.source, "run_once_setup.sh", "#!/bin/sh\necho one >> ran.log\n");
    let persistent = MockPersistentState::new();
    let log = home.dest_path("ran.log");

    home.apply(&persistent);
    home.apply(&persistent);
    assert_eq!(home.system.read_file(&log).unwrap(), b"one\n");

    home.write(&home.source, "run_once_setup.sh", "#!/bin/sh\necho two >> ran.log\n");
    home.apply(&persistent);
    home.apply(&persistent);
    assert_eq!(home.system.read_file(&log).unwrap(), b"one\ntwo\n");

    let mut scripts = Vec::new();
    persistent
        .for_each(SCRIPT_STATE_BUCKET, &mut |_, value| {
            scripts.push(serde_json::from_slice::<ScriptState>(value)?);
            Ok(())
        })
        .unwrap();
    assert_eq!(scripts.len(), 2);
    assert!(scripts.iter().all(|s| s.name == "setup.sh"));
}

#[cfg(unix)]
#[test]
fn test_plain_script_runs_every_time() {
    let home = Home::new(Umask::new(0o022));
    home.write(&home.source, "run_tick.sh", "#!/bin/sh\necho tick >> ticks\n");
    let persistent = MockPersistentState::new();
    assert_eq!(home.apply(&persistent), 1);
    assert_eq!(home.apply(&persistent), 1);
    assert_eq!(
        home.system.read_file(&home.dest_path("ticks")).unwrap(),
        b"tick\ntick\n"
    );
}

#[test]
fn test_entry_state_survives_reopen() {
    let home = Home::new(Umask::new(0o022));
    home.write(&home.source, "dot_zshrc", "x\n");
    let db = home.root.join_name("state.redb");
    {
        let persistent = RedbPersistentState::new(db.as_path()).unwrap();
        home.apply(&persistent);
        persistent.close().unwrap();
    }
    let persistent = RedbPersistentState::open(db.as_path()).unwrap();
    let key = home.dest_path(".zshrc").to_string();
    assert!(
        persistent
            .get(ENTRY_STATE_BUCKET, key.as_bytes())
            .unwrap()
            .is_some()
    );
}
