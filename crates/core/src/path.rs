//! Type-safe path types
//!
//! This module provides three distinct path types using the newtype pattern:
//!
//! - [`AbsPath`]: Absolute, lexically normalized filesystem paths
//! - [`RelPath`]: Slash-separated relative paths in the target namespace
//! - [`SourceRelPath`]: Relative paths in the source directory whose components
//!   still carry attribute prefixes (`dot_`, `private_`, ...)
//!
//! The three types never convert into each other implicitly. A
//! [`SourceRelPath`] only becomes a [`RelPath`] through
//! [`SourceRelPath::target_rel_path`], which strips every component's prefixes.
//!
//! # Examples
//!
//! ```
//! use tilde_core::path::{AbsPath, RelPath};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let home = AbsPath::new("/home/user".into())?;
//! let config = RelPath::new(".config/nvim/init.lua".into())?;
//!
//! let nvim_config = home.join(&config);
//! assert_eq!(nvim_config.to_string(), "/home/user/.config/nvim/init.lua");
//! # Ok(())
//! # }
//! ```

use crate::attr::{DirAttr, FileAttr};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Lexically normalize a path: drop `.` components and resolve `..` against
/// preceding normal components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn component_str(path: &Path, component: Component<'_>) -> Result<String> {
    component
        .as_os_str()
        .to_str()
        .map(str::to_string)
        .ok_or_else(|| Error::NonUtf8Path(path.to_path_buf()))
}

/// An absolute path on the filesystem
///
/// This type guarantees that the path is absolute and contains no `.` or `..`
/// components. Use this for file operations and as base directories.
///
/// # Examples
///
/// ```
/// use tilde_core::path::AbsPath;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let abs = AbsPath::new("/home/user/./.config/../.bashrc".into())?;
/// assert_eq!(abs.as_path(), std::path::Path::new("/home/user/.bashrc"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AbsPath(PathBuf);

impl AbsPath {
    /// Create a new `AbsPath` from a `PathBuf`
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute.
    pub fn new(path: PathBuf) -> Result<Self> {
        if path.is_absolute() {
            Ok(AbsPath(normalize(&path)))
        } else {
            Err(Error::PathNotAbsolute { path })
        }
    }

    /// Create a new `AbsPath` from a reference to a `Path`
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute.
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::new(path.to_path_buf())
    }

    /// Get the underlying `Path`
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Convert to a `PathBuf`
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Join with a relative path to create a new absolute path
    ///
    /// # Examples
    ///
    /// ```
    /// use tilde_core::path::{AbsPath, RelPath};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let home = AbsPath::new("/home/user".into())?;
    /// let config = RelPath::new(".config".into())?;
    /// assert_eq!(home.join(&config).to_string(), "/home/user/.config");
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn join(&self, rel: &RelPath) -> Self {
        if rel.is_empty() {
            return self.clone();
        }
        AbsPath(self.0.join(rel.as_path()))
    }

    /// Join a single file name
    #[must_use]
    pub fn join_name(&self, name: &str) -> Self {
        AbsPath(self.0.join(name))
    }

    /// The directory containing this path. The root is its own directory.
    #[must_use]
    pub fn dir(&self) -> Self {
        self.0
            .parent()
            .map_or_else(|| self.clone(), |p| AbsPath(p.to_path_buf()))
    }

    /// Get the parent directory
    ///
    /// Returns `None` if this is the root directory.
    pub fn parent(&self) -> Option<Self> {
        self.0.parent().map(|p| AbsPath(p.to_path_buf()))
    }

    /// Remove the directory prefix `base`, yielding the path relative to it
    ///
    /// # Errors
    ///
    /// Returns an error if `self` is not under `base`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tilde_core::path::AbsPath;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let home = AbsPath::new("/home/user".into())?;
    /// let file = AbsPath::new("/home/user/.bashrc".into())?;
    /// assert_eq!(file.trim_dir_prefix(&home)?.to_string(), ".bashrc");
    ///
    /// let other = AbsPath::new("/etc/passwd".into())?;
    /// assert!(other.trim_dir_prefix(&home).is_err());
    /// # Ok(())
    /// # }
    /// ```
    pub fn trim_dir_prefix(&self, base: &AbsPath) -> Result<RelPath> {
        self.0
            .strip_prefix(&base.0)
            .map(|p| RelPath(p.to_path_buf()))
            .map_err(|_| Error::InvalidPathPrefix {
                path: Arc::new(self.0.clone()),
                base: Arc::new(base.0.clone()),
            })
    }

    /// Get the file name
    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name().and_then(|s| s.to_str())
    }
}

impl AsRef<Path> for AbsPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// A slash-separated relative path in the target namespace
///
/// The empty path denotes the root of whichever directory it is relative to.
///
/// # Examples
///
/// ```
/// use tilde_core::path::RelPath;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let rel = RelPath::new(".config/nvim/init.lua".into())?;
/// assert_eq!(rel.base(), "init.lua");
/// assert_eq!(rel.dir().to_string(), ".config/nvim");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelPath(PathBuf);

impl RelPath {
    /// Create a new `RelPath` from a `PathBuf`
    ///
    /// # Errors
    ///
    /// Returns an error if the path is absolute.
    pub fn new(path: PathBuf) -> Result<Self> {
        if path.is_relative() {
            Ok(RelPath(normalize(&path)))
        } else {
            Err(Error::PathNotRelative { path })
        }
    }

    /// Build a `RelPath` from a slash-separated string
    ///
    /// # Errors
    ///
    /// Returns an error if the string denotes an absolute path.
    pub fn from_slash(s: &str) -> Result<Self> {
        Self::new(PathBuf::from(s))
    }

    /// Get the underlying `Path`
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Convert to a `PathBuf`
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Whether this is the empty path
    pub fn is_empty(&self) -> bool {
        self.0.as_os_str().is_empty()
    }

    /// Join with another relative path
    ///
    /// # Examples
    ///
    /// ```
    /// use tilde_core::path::RelPath;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = RelPath::new(".config".into())?;
    /// let nvim = RelPath::new("nvim".into())?;
    /// assert_eq!(config.join(&nvim).to_string(), ".config/nvim");
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn join(&self, other: &RelPath) -> Self {
        RelPath(self.0.join(&other.0))
    }

    /// Join a single name
    #[must_use]
    pub fn join_name(&self, name: &str) -> Self {
        RelPath(self.0.join(name))
    }

    /// The directory part. Empty for single-component paths.
    #[must_use]
    pub fn dir(&self) -> Self {
        self.0
            .parent()
            .map_or_else(Self::default, |p| RelPath(p.to_path_buf()))
    }

    /// Get the parent directory
    ///
    /// Returns `None` if this is a single component path.
    pub fn parent(&self) -> Option<Self> {
        let dir = self.dir();
        (!dir.is_empty()).then_some(dir)
    }

    /// The last component, or the empty string for the empty path
    pub fn base(&self) -> &str {
        self.file_name().unwrap_or_default()
    }

    /// Get the file name
    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name().and_then(|s| s.to_str())
    }

    /// Remove the directory prefix `base`
    ///
    /// # Errors
    ///
    /// Returns an error if `self` is not under `base`.
    pub fn trim_dir_prefix(&self, base: &RelPath) -> Result<RelPath> {
        self.0
            .strip_prefix(&base.0)
            .map(|p| RelPath(p.to_path_buf()))
            .map_err(|_| Error::InvalidPathPrefix {
                path: Arc::new(self.0.clone()),
                base: Arc::new(base.0.clone()),
            })
    }

    /// Whether `self` equals `dir` or lies below it
    pub fn has_dir_prefix(&self, dir: &RelPath) -> bool {
        dir.is_empty() || self.0.starts_with(&dir.0)
    }

    /// Slash-separated string form, used as a stable key
    pub fn to_slash(&self) -> String {
        self.0
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// A relative path in the source directory with encoded attributes
///
/// Each component still carries its attribute prefixes, e.g.
/// `private_dot_ssh/encrypted_private_id_ed25519`. The `is_dir` flag records
/// whether the last component names a directory, since directory and file
/// names are decoded with different grammars.
///
/// # Examples
///
/// ```
/// use tilde_core::path::SourceRelPath;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = SourceRelPath::new("exact_dot_config/private_dot_netrc.tmpl".into(), false)?;
/// assert_eq!(source.target_rel_path()?.to_string(), ".config/.netrc");
///
/// let dir = SourceRelPath::new("exact_dot_config".into(), true)?;
/// assert_eq!(dir.target_rel_path()?.to_string(), ".config");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceRelPath {
    path: PathBuf,
    is_dir: bool,
}

impl SourceRelPath {
    /// Create a new `SourceRelPath`
    ///
    /// # Errors
    ///
    /// Returns an error if the path is absolute.
    pub fn new(path: PathBuf, is_dir: bool) -> Result<Self> {
        if path.is_relative() {
            Ok(SourceRelPath {
                path: normalize(&path),
                is_dir,
            })
        } else {
            Err(Error::PathNotRelative { path })
        }
    }

    /// The source path of the source directory itself
    pub fn root() -> Self {
        SourceRelPath {
            path: PathBuf::new(),
            is_dir: true,
        }
    }

    /// Get the underlying `Path`
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Whether the last component names a directory
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// The containing source directory
    #[must_use]
    pub fn dir(&self) -> Self {
        SourceRelPath {
            path: self.path.parent().map(Path::to_path_buf).unwrap_or_default(),
            is_dir: true,
        }
    }

    /// Append one encoded name
    #[must_use]
    pub fn join_name(&self, name: &str, is_dir: bool) -> Self {
        SourceRelPath {
            path: self.path.join(name),
            is_dir,
        }
    }

    /// Get the file name
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|s| s.to_str())
    }

    /// Decode every component into its target name
    ///
    /// Intermediate components are always directories; the last component is
    /// decoded as a directory or a file according to `is_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if a component is not valid UTF-8.
    pub fn target_rel_path(&self) -> Result<RelPath> {
        let components: Vec<Component<'_>> = self.path.components().collect();
        let mut target = PathBuf::new();
        for (i, component) in components.iter().enumerate() {
            let name = component_str(&self.path, *component)?;
            let is_last = i + 1 == components.len();
            if is_last && !self.is_dir {
                target.push(FileAttr::parse(&name).target_name);
            } else {
                target.push(DirAttr::parse(&name).target_name);
            }
        }
        Ok(RelPath(target))
    }
}

// Implement Display for all path types
impl fmt::Display for AbsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_slash())
    }
}

impl fmt::Display for SourceRelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_abs_path_rejects_relative() {
        assert!(AbsPath::new("relative/path".into()).is_err());
    }

    #[test]
    fn test_abs_path_dir_of_root_is_root() {
        let root = AbsPath::new("/".into()).unwrap();
        assert_eq!(root.dir(), root);
    }

    #[test]
    fn test_rel_path_rejects_absolute() {
        assert!(RelPath::new("/etc".into()).is_err());
    }

    #[test]
    fn test_rel_path_dir_and_parent() {
        let top = RelPath::from_slash("foo").unwrap();
        assert!(top.dir().is_empty());
        assert!(top.parent().is_none());

        let nested = RelPath::from_slash("foo/bar/baz").unwrap();
        assert_eq!(nested.dir().to_string(), "foo/bar");
        assert_eq!(nested.base(), "baz");
    }

    #[test]
    fn test_rel_path_ordering_puts_parents_first() {
        let mut paths = vec![
            RelPath::from_slash("a/b").unwrap(),
            RelPath::from_slash("a.b").unwrap(),
            RelPath::from_slash("a").unwrap(),
        ];
        paths.sort();
        assert_eq!(paths[0].to_string(), "a");
        assert_eq!(paths[1].to_string(), "a/b");
    }

    #[test]
    fn test_rel_path_trim_dir_prefix() {
        let path = RelPath::from_slash(".config/nvim/init.lua").unwrap();
        let dir = RelPath::from_slash(".config").unwrap();
        assert_eq!(
            path.trim_dir_prefix(&dir).unwrap().to_string(),
            "nvim/init.lua"
        );
        assert!(path.has_dir_prefix(&dir));
        assert!(!dir.has_dir_prefix(&path));
    }

    #[test]
    fn test_source_rel_path_distinguishes_dir_and_file_grammar() {
        // `empty_` is a file prefix only; a directory keeps it in its name.
        let as_file = SourceRelPath::new("empty_foo".into(), false).unwrap();
        let as_dir = SourceRelPath::new("empty_foo".into(), true).unwrap();
        assert_eq!(as_file.target_rel_path().unwrap().to_string(), "foo");
        assert_eq!(as_dir.target_rel_path().unwrap().to_string(), "empty_foo");
    }

    #[test]
    fn test_source_rel_path_decodes_every_component() {
        let source =
            SourceRelPath::new("private_dot_ssh/exact_keys/run_once_setup.sh".into(), false)
                .unwrap();
        assert_eq!(
            source.target_rel_path().unwrap().to_string(),
            ".ssh/keys/setup.sh"
        );
        assert_eq!(source.dir().to_string(), "private_dot_ssh/exact_keys");
        assert!(source.dir().is_dir());
    }
}
