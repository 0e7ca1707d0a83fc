//! System abstraction for filesystem operations
//!
//! Every read and every mutation the engine performs goes through the
//! [`System`] trait. Implementations compose by wrapping:
//! - `RealSystem`: actual filesystem operations
//! - `ReadOnlySystem`: fails every mutation with "permission denied"
//! - `DryRunSystem`: records mutations without executing them
//! - `DebugSystem`: logs every call and its duration

use crate::error::{Error, Result};
use std::cell::RefCell;
use std::fmt;
use std::fs::{self, Metadata};
use std::io::{self, Write};
use std::path::Path;
use std::process::Command;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tilde_core::Umask;
use tilde_core::path::{AbsPath, RelPath};
use tracing::debug;

/// Type of a filesystem entry, as reported by `lstat`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Regular file
    File,
    /// Directory
    Dir,
    /// Symbolic link
    Symlink,
    /// Named pipe
    NamedPipe,
    /// Unix domain socket
    Socket,
    /// Block device
    BlockDevice,
    /// Character device
    CharDevice,
    /// Anything else
    Unknown,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileType::File => "file",
            FileType::Dir => "directory",
            FileType::Symlink => "symlink",
            FileType::NamedPipe => "named pipe",
            FileType::Socket => "socket",
            FileType::BlockDevice => "block device",
            FileType::CharDevice => "character device",
            FileType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl From<fs::FileType> for FileType {
    fn from(file_type: fs::FileType) -> Self {
        if file_type.is_symlink() {
            return FileType::Symlink;
        }
        if file_type.is_dir() {
            return FileType::Dir;
        }
        if file_type.is_file() {
            return FileType::File;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if file_type.is_fifo() {
                return FileType::NamedPipe;
            }
            if file_type.is_socket() {
                return FileType::Socket;
            }
            if file_type.is_block_device() {
                return FileType::BlockDevice;
            }
            if file_type.is_char_device() {
                return FileType::CharDevice;
            }
        }
        FileType::Unknown
    }
}

/// What `lstat`, `stat` and `read_dir` report about an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Base name
    pub name: String,
    /// Entry type
    pub file_type: FileType,
    /// Permission bits
    pub perm: u32,
    /// Size in bytes
    pub size: u64,
}

impl FileInfo {
    fn from_metadata(name: String, metadata: &Metadata) -> Self {
        Self {
            name,
            file_type: metadata.file_type().into(),
            perm: perm_of(metadata),
            size: metadata.len(),
        }
    }

    /// Whether this is a directory
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Dir
    }

    /// Whether this is a regular file
    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }

    /// Whether this is a symbolic link
    pub fn is_symlink(&self) -> bool {
        self.file_type == FileType::Symlink
    }
}

#[cfg(unix)]
fn perm_of(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn perm_of(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o666
    }
}

#[cfg(unix)]
fn set_perm(path: &Path, perm: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(perm))
}

#[cfg(not(unix))]
fn set_perm(path: &Path, perm: u32) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(perm & 0o222 == 0);
    fs::set_permissions(path, permissions)
}

fn base_name(path: &AbsPath) -> String {
    path.file_name().unwrap_or_default().to_string()
}

/// Abstraction over filesystem operations
///
/// Mutating methods are `chmod`, `mkdir`, `remove_all`, `rename`,
/// `run_cmd`, `run_script`, `write_file` and `write_symlink`.
pub trait System {
    /// Set the permission bits of `path`
    fn chmod(&self, path: &AbsPath, perm: u32) -> Result<()>;

    /// Expand a glob pattern, `/` only matched literally
    fn glob(&self, pattern: &str) -> Result<Vec<AbsPath>>;

    /// Stat `path` without following a final symlink
    fn lstat(&self, path: &AbsPath) -> Result<FileInfo>;

    /// Create one directory; the umask applies to `perm`
    fn mkdir(&self, path: &AbsPath, perm: u32) -> Result<()>;

    /// Entries of a directory, sorted by name
    fn read_dir(&self, path: &AbsPath) -> Result<Vec<FileInfo>>;

    /// Read a whole file
    fn read_file(&self, path: &AbsPath) -> Result<Vec<u8>>;

    /// Read the target of a symlink
    fn readlink(&self, path: &AbsPath) -> Result<String>;

    /// Remove `path` and anything below it
    fn remove_all(&self, path: &AbsPath) -> Result<()>;

    /// Rename `from` to `to`
    fn rename(&self, from: &AbsPath, to: &AbsPath) -> Result<()>;

    /// Run a program with inherited standard streams
    fn run_cmd(&self, program: &str, args: &[String], dir: Option<&AbsPath>) -> Result<()>;

    /// Run `contents` as a private temporary executable with `dir` as working directory
    fn run_script(&self, name: &RelPath, dir: &AbsPath, contents: &[u8]) -> Result<()>;

    /// Stat `path`, following symlinks
    fn stat(&self, path: &AbsPath) -> Result<FileInfo>;

    /// Replace the contents of `path`; the umask applies to `perm`
    fn write_file(&self, path: &AbsPath, contents: &[u8], perm: u32) -> Result<()>;

    /// Create a symlink at `link` pointing to `target`
    fn write_symlink(&self, target: &str, link: &AbsPath) -> Result<()>;

    /// Standard output of a command that does not modify anything
    fn idempotent_cmd_output(&self, program: &str, args: &[String]) -> Result<Vec<u8>>;
}

macro_rules! forward_system {
    () => {
        fn chmod(&self, path: &AbsPath, perm: u32) -> Result<()> {
            (**self).chmod(path, perm)
        }
        fn glob(&self, pattern: &str) -> Result<Vec<AbsPath>> {
            (**self).glob(pattern)
        }
        fn lstat(&self, path: &AbsPath) -> Result<FileInfo> {
            (**self).lstat(path)
        }
        fn mkdir(&self, path: &AbsPath, perm: u32) -> Result<()> {
            (**self).mkdir(path, perm)
        }
        fn read_dir(&self, path: &AbsPath) -> Result<Vec<FileInfo>> {
            (**self).read_dir(path)
        }
        fn read_file(&self, path: &AbsPath) -> Result<Vec<u8>> {
            (**self).read_file(path)
        }
        fn readlink(&self, path: &AbsPath) -> Result<String> {
            (**self).readlink(path)
        }
        fn remove_all(&self, path: &AbsPath) -> Result<()> {
            (**self).remove_all(path)
        }
        fn rename(&self, from: &AbsPath, to: &AbsPath) -> Result<()> {
            (**self).rename(from, to)
        }
        fn run_cmd(&self, program: &str, args: &[String], dir: Option<&AbsPath>) -> Result<()> {
            (**self).run_cmd(program, args, dir)
        }
        fn run_script(&self, name: &RelPath, dir: &AbsPath, contents: &[u8]) -> Result<()> {
            (**self).run_script(name, dir, contents)
        }
        fn stat(&self, path: &AbsPath) -> Result<FileInfo> {
            (**self).stat(path)
        }
        fn write_file(&self, path: &AbsPath, contents: &[u8], perm: u32) -> Result<()> {
            (**self).write_file(path, contents, perm)
        }
        fn write_symlink(&self, target: &str, link: &AbsPath) -> Result<()> {
            (**self).write_symlink(target, link)
        }
        fn idempotent_cmd_output(&self, program: &str, args: &[String]) -> Result<Vec<u8>> {
            (**self).idempotent_cmd_output(program, args)
        }
    };
}

impl<S: System + ?Sized> System for &S {
    forward_system!();
}

impl<S: System + ?Sized> System for Box<S> {
    forward_system!();
}

/// Create `path` and any missing parents
///
/// An existing directory is not an error; an existing non-directory is.
pub fn mkdir_all(system: &dyn System, path: &AbsPath, perm: u32) -> Result<()> {
    match system.mkdir(path, perm) {
        Ok(()) => Ok(()),
        Err(e) if e.io_kind() == Some(io::ErrorKind::AlreadyExists) => {
            if system.stat(path)?.is_dir() {
                Ok(())
            } else {
                Err(Error::NotADirectory { path: path.clone() })
            }
        }
        Err(e) if e.is_not_found() => {
            let parent = path.dir();
            if parent == *path {
                return Err(e);
            }
            mkdir_all(system, &parent, perm)?;
            system.mkdir(path, perm)
        }
        Err(e) => Err(e),
    }
}

/// Real filesystem implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct RealSystem {
    umask: Umask,
}

impl RealSystem {
    /// Create a real system applying `umask` to written files
    pub fn new(umask: Umask) -> Self {
        Self { umask }
    }

    fn command(program: &str, args: &[String], dir: Option<&AbsPath>) -> Command {
        let mut command = Command::new(program);
        command.args(args);
        if let Some(dir) = dir {
            command.current_dir(dir.as_path());
        }
        command
    }
}

impl System for RealSystem {
    fn chmod(&self, path: &AbsPath, perm: u32) -> Result<()> {
        set_perm(path.as_path(), perm).map_err(|e| Error::Chmod {
            path: path.clone(),
            source: e,
        })
    }

    fn glob(&self, pattern: &str) -> Result<Vec<AbsPath>> {
        let options = glob::MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        let paths = glob::glob_with(pattern, options).map_err(|e| Error::InvalidPattern {
            location: pattern.to_string(),
            message: e.to_string(),
        })?;
        let mut matches = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| Error::Io(e.into_error()))?;
            matches.push(AbsPath::new(path)?);
        }
        matches.sort();
        Ok(matches)
    }

    fn lstat(&self, path: &AbsPath) -> Result<FileInfo> {
        let metadata = fs::symlink_metadata(path.as_path()).map_err(|e| Error::Metadata {
            path: path.clone(),
            source: e,
        })?;
        Ok(FileInfo::from_metadata(base_name(path), &metadata))
    }

    fn mkdir(&self, path: &AbsPath, perm: u32) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(self.umask.mask(perm));
        }
        #[cfg(not(unix))]
        let _ = perm;
        builder
            .create(path.as_path())
            .map_err(|e| Error::DirectoryCreate {
                path: path.clone(),
                source: e,
            })
    }

    fn read_dir(&self, path: &AbsPath) -> Result<Vec<FileInfo>> {
        let read_dir_error = |e| Error::DirectoryRead {
            path: path.clone(),
            source: e,
        };
        let mut infos = Vec::new();
        for entry in fs::read_dir(path.as_path()).map_err(read_dir_error)? {
            let entry = entry.map_err(read_dir_error)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let metadata = entry.metadata().map_err(|e| Error::Metadata {
                path: path.join_name(&name),
                source: e,
            })?;
            infos.push(FileInfo::from_metadata(name, &metadata));
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    fn read_file(&self, path: &AbsPath) -> Result<Vec<u8>> {
        fs::read(path.as_path()).map_err(|e| Error::FileRead {
            path: path.clone(),
            source: e,
        })
    }

    fn readlink(&self, path: &AbsPath) -> Result<String> {
        let target = fs::read_link(path.as_path()).map_err(|e| Error::Symlink {
            path: path.clone(),
            source: e,
        })?;
        Ok(target.to_string_lossy().into_owned())
    }

    fn remove_all(&self, path: &AbsPath) -> Result<()> {
        let remove_error = |e| Error::Remove {
            path: path.clone(),
            source: e,
        };
        let metadata = match fs::symlink_metadata(path.as_path()) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(remove_error(e)),
        };
        if metadata.is_dir() {
            fs::remove_dir_all(path.as_path()).map_err(remove_error)
        } else {
            fs::remove_file(path.as_path()).map_err(remove_error)
        }
    }

    fn rename(&self, from: &AbsPath, to: &AbsPath) -> Result<()> {
        fs::rename(from.as_path(), to.as_path()).map_err(|e| Error::Rename {
            from: from.clone(),
            to: to.clone(),
            source: e,
        })
    }

    fn run_cmd(&self, program: &str, args: &[String], dir: Option<&AbsPath>) -> Result<()> {
        let status = Self::command(program, args, dir)
            .status()
            .map_err(|e| Error::Command {
                program: program.to_string(),
                source: e,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                program: program.to_string(),
                status: status.to_string(),
            })
        }
    }

    fn run_script(&self, name: &RelPath, dir: &AbsPath, contents: &[u8]) -> Result<()> {
        let script_error = |e| Error::Script {
            name: name.clone(),
            source: e,
        };

        let suffix = format!(".{}", name.base());
        let mut file = tempfile::Builder::new()
            .prefix("tilde-")
            .suffix(&suffix)
            .tempfile()
            .map_err(script_error)?;
        file.write_all(contents).map_err(script_error)?;
        file.flush().map_err(script_error)?;
        // Close the handle before executing, otherwise exec fails with ETXTBSY.
        let script = file.into_temp_path();
        set_perm(&script, 0o700).map_err(script_error)?;

        let status = Command::new(&*script)
            .current_dir(dir.as_path())
            .status()
            .map_err(script_error)?;
        script.close().map_err(script_error)?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::ScriptFailed {
                name: name.clone(),
                status: status.to_string(),
            })
        }
    }

    fn stat(&self, path: &AbsPath) -> Result<FileInfo> {
        let metadata = fs::metadata(path.as_path()).map_err(|e| Error::Metadata {
            path: path.clone(),
            source: e,
        })?;
        Ok(FileInfo::from_metadata(base_name(path), &metadata))
    }

    fn write_file(&self, path: &AbsPath, contents: &[u8], perm: u32) -> Result<()> {
        let write_error = |e| Error::FileWrite {
            path: path.clone(),
            source: e,
        };

        // Write to a sibling temporary file and rename it into place, so
        // readers never observe a partially written file.
        let dir = path.dir();
        let mut file = tempfile::NamedTempFile::new_in(dir.as_path()).map_err(write_error)?;
        file.write_all(contents).map_err(write_error)?;
        file.flush().map_err(write_error)?;
        set_perm(file.path(), self.umask.mask(perm)).map_err(write_error)?;
        file.persist(path.as_path())
            .map_err(|e| write_error(e.error))?;
        Ok(())
    }

    fn write_symlink(&self, target: &str, link: &AbsPath) -> Result<()> {
        let symlink_error = |e| Error::Symlink {
            path: link.clone(),
            source: e,
        };
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, link.as_path()).map_err(symlink_error)
        }
        #[cfg(windows)]
        {
            std::os::windows::fs::symlink_file(target, link.as_path()).map_err(symlink_error)
        }
    }

    fn idempotent_cmd_output(&self, program: &str, args: &[String]) -> Result<Vec<u8>> {
        let output = Self::command(program, args, None)
            .output()
            .map_err(|e| Error::Command {
                program: program.to_string(),
                source: e,
            })?;
        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(Error::CommandFailed {
                program: program.to_string(),
                status: output.status.to_string(),
            })
        }
    }
}

/// A system that reads through to another and refuses every mutation
#[derive(Debug, Clone, Copy)]
pub struct ReadOnlySystem<S> {
    inner: S,
}

impl<S: System> ReadOnlySystem<S> {
    /// Wrap `inner`
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

fn permission_denied() -> io::Error {
    io::Error::from(io::ErrorKind::PermissionDenied)
}

impl<S: System> System for ReadOnlySystem<S> {
    fn chmod(&self, path: &AbsPath, _perm: u32) -> Result<()> {
        Err(Error::Chmod {
            path: path.clone(),
            source: permission_denied(),
        })
    }

    fn glob(&self, pattern: &str) -> Result<Vec<AbsPath>> {
        self.inner.glob(pattern)
    }

    fn lstat(&self, path: &AbsPath) -> Result<FileInfo> {
        self.inner.lstat(path)
    }

    fn mkdir(&self, path: &AbsPath, _perm: u32) -> Result<()> {
        Err(Error::DirectoryCreate {
            path: path.clone(),
            source: permission_denied(),
        })
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
        Err(Error::Remove {
            path: path.clone(),
            source: permission_denied(),
        })
    }

    fn rename(&self, from: &AbsPath, to: &AbsPath) -> Result<()> {
        Err(Error::Rename {
            from: from.clone(),
            to: to.clone(),
            source: permission_denied(),
        })
    }

    fn run_cmd(&self, program: &str, _args: &[String], _dir: Option<&AbsPath>) -> Result<()> {
        Err(Error::Command {
            program: program.to_string(),
            source: permission_denied(),
        })
    }

    fn run_script(&self, name: &RelPath, _dir: &AbsPath, _contents: &[u8]) -> Result<()> {
        Err(Error::Script {
            name: name.clone(),
            source: permission_denied(),
        })
    }

    fn stat(&self, path: &AbsPath) -> Result<FileInfo> {
        self.inner.stat(path)
    }

    fn write_file(&self, path: &AbsPath, _contents: &[u8], _perm: u32) -> Result<()> {
        Err(Error::FileWrite {
            path: path.clone(),
            source: permission_denied(),
        })
    }

    fn write_symlink(&self, _target: &str, link: &AbsPath) -> Result<()> {
        Err(Error::Symlink {
            path: link.clone(),
            source: permission_denied(),
        })
    }

    fn idempotent_cmd_output(&self, program: &str, args: &[String]) -> Result<Vec<u8>> {
        self.inner.idempotent_cmd_output(program, args)
    }
}

/// A mutation that a dry run would have performed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Change permissions
    Chmod { path: AbsPath, perm: u32 },
    /// Create a directory
    Mkdir { path: AbsPath, perm: u32 },
    /// Remove a path recursively
    RemoveAll { path: AbsPath },
    /// Rename a path
    Rename { from: AbsPath, to: AbsPath },
    /// Run a command
    RunCmd { program: String, args: Vec<String> },
    /// Run a script
    RunScript { name: RelPath, dir: AbsPath },
    /// Write a file
    WriteFile {
        path: AbsPath,
        size: usize,
        perm: u32,
    },
    /// Create a symlink
    WriteSymlink { link: AbsPath, target: String },
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Chmod { path, perm } => write!(f, "chmod {perm:o} {path}"),
            Operation::Mkdir { path, perm } => write!(f, "mkdir {perm:o} {path}"),
            Operation::RemoveAll { path } => write!(f, "remove {path}"),
            Operation::Rename { from, to } => write!(f, "rename {from} {to}"),
            Operation::RunCmd { program, args } => write!(f, "run {program} {}", args.join(" ")),
            Operation::RunScript { name, dir } => write!(f, "run script {name} in {dir}"),
            Operation::WriteFile { path, size, perm } => {
                write!(f, "write {perm:o} {path} ({size} bytes)")
            }
            Operation::WriteSymlink { link, target } => write!(f, "symlink {link} -> {target}"),
        }
    }
}

/// Dry-run system that records mutations without executing them
///
/// Reads pass through to the wrapped system, so they see the filesystem
/// as it was before the dry run.
#[derive(Debug)]
pub struct DryRunSystem<S> {
    inner: S,
    operations: RefCell<Vec<Operation>>,
}

impl<S: System> DryRunSystem<S> {
    /// Wrap `inner`
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            operations: RefCell::new(Vec::new()),
        }
    }

    /// Mutations that would have been performed, in order
    pub fn operations(&self) -> Vec<Operation> {
        self.operations.borrow().clone()
    }

    /// Whether any mutation was requested
    pub fn is_modified(&self) -> bool {
        !self.operations.borrow().is_empty()
    }

    fn record(&self, operation: Operation) -> Result<()> {
        self.operations.borrow_mut().push(operation);
        Ok(())
    }
}

impl<S: System> System for DryRunSystem<S> {
    fn chmod(&self, path: &AbsPath, perm: u32) -> Result<()> {
        self.record(Operation::Chmod {
            path: path.clone(),
            perm,
        })
    }

    fn glob(&self, pattern: &str) -> Result<Vec<AbsPath>> {
        self.inner.glob(pattern)
    }

    fn lstat(&self, path: &AbsPath) -> Result<FileInfo> {
        self.inner.lstat(path)
    }

    fn mkdir(&self, path: &AbsPath, perm: u32) -> Result<()> {
        self.record(Operation::Mkdir {
            path: path.clone(),
            perm,
        })
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
        self.record(Operation::RemoveAll { path: path.clone() })
    }

    fn rename(&self, from: &AbsPath, to: &AbsPath) -> Result<()> {
        self.record(Operation::Rename {
            from: from.clone(),
            to: to.clone(),
        })
    }

    fn run_cmd(&self, program: &str, args: &[String], _dir: Option<&AbsPath>) -> Result<()> {
        self.record(Operation::RunCmd {
            program: program.to_string(),
            args: args.to_vec(),
        })
    }

    fn run_script(&self, name: &RelPath, dir: &AbsPath, _contents: &[u8]) -> Result<()> {
        self.record(Operation::RunScript {
            name: name.clone(),
            dir: dir.clone(),
        })
    }

    fn stat(&self, path: &AbsPath) -> Result<FileInfo> {
        self.inner.stat(path)
    }

    fn write_file(&self, path: &AbsPath, contents: &[u8], perm: u32) -> Result<()> {
        self.record(Operation::WriteFile {
            path: path.clone(),
            size: contents.len(),
            perm,
        })
    }

    fn write_symlink(&self, target: &str, link: &AbsPath) -> Result<()> {
        self.record(Operation::WriteSymlink {
            link: link.clone(),
            target: target.to_string(),
        })
    }

    fn idempotent_cmd_output(&self, program: &str, args: &[String]) -> Result<Vec<u8>> {
        self.inner.idempotent_cmd_output(program, args)
    }
}

/// Commands running longer than this get a debug log line while they run
const SLOW_COMMAND_THRESHOLD: Duration = Duration::from_secs(1);

/// Run `f`, logging once if it is still running after the threshold
///
/// `f` is always run to completion.
fn log_if_slow<T>(what: &str, f: impl FnOnce() -> T) -> T {
    let (done, finished) = mpsc::channel::<()>();
    thread::scope(|scope| {
        scope.spawn(move || {
            if finished.recv_timeout(SLOW_COMMAND_THRESHOLD) == Err(RecvTimeoutError::Timeout) {
                debug!(command = what, "Still running after {:?}", SLOW_COMMAND_THRESHOLD);
            }
        });
        let result = f();
        drop(done);
        result
    })
}

/// A system that logs every call with its result and duration
#[derive(Debug)]
pub struct DebugSystem<S> {
    inner: S,
}

impl<S: System> DebugSystem<S> {
    /// Wrap `inner`
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

fn log_call<T>(call: &str, target: &dyn fmt::Display, start: Instant, result: &Result<T>) {
    let elapsed = start.elapsed();
    match result {
        Ok(_) => debug!(call, path = %target, ?elapsed, "System call"),
        Err(e) => debug!(call, path = %target, ?elapsed, error = %e, "System call failed"),
    }
}

impl<S: System> System for DebugSystem<S> {
    fn chmod(&self, path: &AbsPath, perm: u32) -> Result<()> {
        let start = Instant::now();
        let result = self.inner.chmod(path, perm);
        log_call("chmod", path, start, &result);
        result
    }

    fn glob(&self, pattern: &str) -> Result<Vec<AbsPath>> {
        let start = Instant::now();
        let result = self.inner.glob(pattern);
        log_call("glob", &pattern, start, &result);
        result
    }

    fn lstat(&self, path: &AbsPath) -> Result<FileInfo> {
        let start = Instant::now();
        let result = self.inner.lstat(path);
        log_call("lstat", path, start, &result);
        result
    }

    fn mkdir(&self, path: &AbsPath, perm: u32) -> Result<()> {
        let start = Instant::now();
        let result = self.inner.mkdir(path, perm);
        log_call("mkdir", path, start, &result);
        result
    }

    fn read_dir(&self, path: &AbsPath) -> Result<Vec<FileInfo>> {
        let start = Instant::now();
        let result = self.inner.read_dir(path);
        log_call("read_dir", path, start, &result);
        result
    }

    fn read_file(&self, path: &AbsPath) -> Result<Vec<u8>> {
        let start = Instant::now();
        let result = self.inner.read_file(path);
        log_call("read_file", path, start, &result);
        result
    }

    fn readlink(&self, path: &AbsPath) -> Result<String> {
        let start = Instant::now();
        let result = self.inner.readlink(path);
        log_call("readlink", path, start, &result);
        result
    }

    fn remove_all(&self, path: &AbsPath) -> Result<()> {
        let start = Instant::now();
        let result = self.inner.remove_all(path);
        log_call("remove_all", path, start, &result);
        result
    }

    fn rename(&self, from: &AbsPath, to: &AbsPath) -> Result<()> {
        let start = Instant::now();
        let result = self.inner.rename(from, to);
        log_call("rename", &format_args!("{from} -> {to}"), start, &result);
        result
    }

    fn run_cmd(&self, program: &str, args: &[String], dir: Option<&AbsPath>) -> Result<()> {
        let start = Instant::now();
        let result = log_if_slow(program, || self.inner.run_cmd(program, args, dir));
        log_call("run_cmd", &program, start, &result);
        result
    }

    fn run_script(&self, name: &RelPath, dir: &AbsPath, contents: &[u8]) -> Result<()> {
        let start = Instant::now();
        let script = name.to_string();
        let result = log_if_slow(&script, || self.inner.run_script(name, dir, contents));
        log_call("run_script", name, start, &result);
        result
    }

    fn stat(&self, path: &AbsPath) -> Result<FileInfo> {
        let start = Instant::now();
        let result = self.inner.stat(path);
        log_call("stat", path, start, &result);
        result
    }

    fn write_file(&self, path: &AbsPath, contents: &[u8], perm: u32) -> Result<()> {
        let start = Instant::now();
        let result = self.inner.write_file(path, contents, perm);
        log_call("write_file", path, start, &result);
        result
    }

    fn write_symlink(&self, target: &str, link: &AbsPath) -> Result<()> {
        let start = Instant::now();
        let result = self.inner.write_symlink(target, link);
        log_call("write_symlink", link, start, &result);
        result
    }

    fn idempotent_cmd_output(&self, program: &str, args: &[String]) -> Result<Vec<u8>> {
        let start = Instant::now();
        let result = log_if_slow(program, || self.inner.idempotent_cmd_output(program, args));
        log_call("idempotent_cmd_output", &program, start, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, AbsPath) {
        let temp = TempDir::new().unwrap();
        let root = AbsPath::new(temp.path().to_path_buf()).unwrap();
        (temp, root)
    }

    #[test]
    #[cfg(unix)]
    fn test_write_file_applies_umask() {
        let (_temp, root) = setup();
        let system = RealSystem::new(Umask::new(0o022));
        let path = root.join_name("file");
        system.write_file(&path, b"contents", 0o666).unwrap();

        let info = system.lstat(&path).unwrap();
        assert!(info.is_file());
        assert_eq!(info.perm, 0o644);
        assert_eq!(system.read_file(&path).unwrap(), b"contents");

        system.write_file(&path, b"new", 0o600).unwrap();
        assert_eq!(system.lstat(&path).unwrap().perm, 0o600);
        assert_eq!(system.read_file(&path).unwrap(), b"new");
    }

    #[test]
    fn test_lstat_missing_is_not_found() {
        let (_temp, root) = setup();
        let err = RealSystem::default()
            .lstat(&root.join_name("missing"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_read_dir_is_sorted() {
        let (_temp, root) = setup();
        let system = RealSystem::default();
        for name in ["c", "a", "b"] {
            system.write_file(&root.join_name(name), b"", 0o644).unwrap();
        }
        let names: Vec<_> = system
            .read_dir(&root)
            .unwrap()
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks() {
        let (_temp, root) = setup();
        let system = RealSystem::default();
        let link = root.join_name("link");
        system.write_symlink("target", &link).unwrap();
        assert!(system.lstat(&link).unwrap().is_symlink());
        assert_eq!(system.readlink(&link).unwrap(), "target");
        system.remove_all(&link).unwrap();
        assert!(system.lstat(&link).unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove_all_missing_is_ok() {
        let (_temp, root) = setup();
        RealSystem::default()
            .remove_all(&root.join_name("missing"))
            .unwrap();
    }

    #[test]
    fn test_mkdir_all() {
        let (_temp, root) = setup();
        let system = RealSystem::default();
        let deep = root.join_name("a").join_name("b").join_name("c");
        mkdir_all(&system, &deep, 0o777).unwrap();
        assert!(system.lstat(&deep).unwrap().is_dir());
        mkdir_all(&system, &deep, 0o777).unwrap();

        let file = root.join_name("file");
        system.write_file(&file, b"", 0o644).unwrap();
        assert!(matches!(
            mkdir_all(&system, &file, 0o777),
            Err(Error::NotADirectory { .. })
        ));
    }

    #[test]
    fn test_glob_does_not_cross_separators() {
        let (_temp, root) = setup();
        let system = RealSystem::default();
        mkdir_all(&system, &root.join_name("dir"), 0o777).unwrap();
        system.write_file(&root.join_name("foo"), b"", 0o644).unwrap();
        system
            .write_file(&root.join_name("dir").join_name("foo"), b"", 0o644)
            .unwrap();

        let pattern = format!("{root}/*foo");
        assert_eq!(system.glob(&pattern).unwrap(), vec![root.join_name("foo")]);

        let pattern = format!("{root}/**/foo");
        assert_eq!(system.glob(&pattern).unwrap().len(), 2);
    }

    #[test]
    #[cfg(unix)]
    fn test_run_script_in_dir() {
        let (_temp, root) = setup();
        let system = RealSystem::default();
        let name = RelPath::from_slash("run_touch.sh").unwrap();
        system
            .run_script(&name, &root, b"#!/bin/sh\ntouch ran\n")
            .unwrap();
        assert!(system.lstat(&root.join_name("ran")).unwrap().is_file());

        let err = system
            .run_script(&name, &root, b"#!/bin/sh\nexit 3\n")
            .unwrap_err();
        assert!(matches!(err, Error::ScriptFailed { .. }));
    }

    #[test]
    fn test_read_only_refuses_mutations() {
        let (_temp, root) = setup();
        let system = ReadOnlySystem::new(RealSystem::default());
        let path = root.join_name("file");
        let err = system.write_file(&path, b"x", 0o644).unwrap_err();
        assert_eq!(err.io_kind(), Some(io::ErrorKind::PermissionDenied));
        assert!(system.lstat(&path).unwrap_err().is_not_found());
        assert_eq!(
            system.mkdir(&path, 0o777).unwrap_err().io_kind(),
            Some(io::ErrorKind::PermissionDenied)
        );
    }

    #[test]
    fn test_dry_run_records_and_does_nothing() {
        let (_temp, root) = setup();
        let system = DryRunSystem::new(RealSystem::default());
        let path = root.join_name("file");
        system.write_file(&path, b"abc", 0o644).unwrap();
        system.mkdir(&root.join_name("dir"), 0o777).unwrap();

        assert!(system.is_modified());
        assert_eq!(
            system.operations(),
            vec![
                Operation::WriteFile {
                    path: path.clone(),
                    size: 3,
                    perm: 0o644
                },
                Operation::Mkdir {
                    path: root.join_name("dir"),
                    perm: 0o777
                },
            ]
        );
        assert!(system.lstat(&path).unwrap_err().is_not_found());
    }

    #[test]
    fn test_debug_system_passes_through() {
        let (_temp, root) = setup();
        let system = DebugSystem::new(RealSystem::default());
        let path = root.join_name("file");
        system.write_file(&path, b"abc", 0o644).unwrap();
        assert_eq!(system.read_file(&path).unwrap(), b"abc");
    }

    #[test]
    fn test_log_if_slow_returns_result() {
        assert_eq!(log_if_slow("fast", || 7), 7);
    }
}
