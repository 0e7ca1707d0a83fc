//! Source name attribute codec
//!
//! Entry names in the source directory encode their attributes as prefixes
//! and an optional `.tmpl` suffix:
//!
//! | Kind      | Prefix order                                              |
//! |-----------|-----------------------------------------------------------|
//! | directory | `exact_` `private_` `dot_`                                |
//! | file      | `encrypted_` `private_` `empty_` `executable_` `dot_`     |
//! | present   | `exists_` `encrypted_` `private_` `executable_` `dot_`    |
//! | script    | `run_` `once_` `first_`/`last_` `dot_`                    |
//! | symlink   | `symlink_` `dot_`                                         |
//!
//! Prefixes are recognized greedily in exactly this order. A leading `.` in
//! the target name is always written as `dot_`. [`DirAttr::source_name`] and
//! [`FileAttr::source_name`] are the inverses of the parsers.

use std::fmt;

const DOT_PREFIX: &str = "dot_";
const EMPTY_PREFIX: &str = "empty_";
const ENCRYPTED_PREFIX: &str = "encrypted_";
const EXACT_PREFIX: &str = "exact_";
const EXECUTABLE_PREFIX: &str = "executable_";
const EXISTS_PREFIX: &str = "exists_";
const FIRST_PREFIX: &str = "first_";
const LAST_PREFIX: &str = "last_";
const ONCE_PREFIX: &str = "once_";
const PRIVATE_PREFIX: &str = "private_";
const RUN_PREFIX: &str = "run_";
const SYMLINK_PREFIX: &str = "symlink_";

/// Suffix marking a template source file
pub const TEMPLATE_SUFFIX: &str = ".tmpl";

/// Strip `prefix` from `name` in place, returning whether it was present
fn take_prefix(name: &mut &str, prefix: &str) -> bool {
    match name.strip_prefix(prefix) {
        Some(rest) => {
            *name = rest;
            true
        }
        None => false,
    }
}

fn decode_dot(name: &str) -> String {
    match name.strip_prefix(DOT_PREFIX) {
        Some(rest) => format!(".{rest}"),
        None => name.to_string(),
    }
}

fn encode_dot(name: &str) -> String {
    match name.strip_prefix('.') {
        Some(rest) => format!("{DOT_PREFIX}{rest}"),
        None => name.to_string(),
    }
}

/// Attributes of a source directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirAttr {
    /// Name of the directory in the target
    pub target_name: String,
    /// Remove target children with no source entry
    pub exact: bool,
    /// Strip group and world permissions
    pub private: bool,
}

impl DirAttr {
    /// Parse a directory name from the source directory
    pub fn parse(source_name: &str) -> Self {
        let mut name = source_name;
        let exact = take_prefix(&mut name, EXACT_PREFIX);
        let private = take_prefix(&mut name, PRIVATE_PREFIX);
        DirAttr {
            target_name: decode_dot(name),
            exact,
            private,
        }
    }

    /// Encode these attributes as a source directory name
    pub fn source_name(&self) -> String {
        let mut name = String::new();
        if self.exact {
            name.push_str(EXACT_PREFIX);
        }
        if self.private {
            name.push_str(PRIVATE_PREFIX);
        }
        name.push_str(&encode_dot(&self.target_name));
        name
    }

    /// Permission bits before the umask is applied
    pub fn perm(&self) -> u32 {
        if self.private { 0o700 } else { 0o777 }
    }
}

/// The kind of target a source file produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceFileType {
    /// Regular file whose contents are managed
    #[default]
    File,
    /// File that must exist, contents only written when absent
    Present,
    /// Script executed on apply
    Script,
    /// Symbolic link whose target is the file contents
    Symlink,
}

impl fmt::Display for SourceFileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceFileType::File => "file",
            SourceFileType::Present => "present",
            SourceFileType::Script => "script",
            SourceFileType::Symlink => "symlink",
        };
        f.write_str(name)
    }
}

/// Attributes of a source file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAttr {
    /// Name of the file in the target
    pub target_name: String,
    /// What the file produces
    pub file_type: SourceFileType,
    /// Keep the file even when its contents are empty
    pub empty: bool,
    /// Contents are encrypted in the source directory
    pub encrypted: bool,
    /// Set the executable bits
    pub executable: bool,
    /// Scripts only: run at most once for the same contents
    pub once: bool,
    /// Scripts only: `-1` for `first_`, `1` for `last_`, otherwise `0`
    pub order: i32,
    /// Strip group and world permissions
    pub private: bool,
    /// Contents are a template
    pub template: bool,
}

impl FileAttr {
    /// Parse a file name from the source directory
    ///
    /// # Examples
    ///
    /// ```
    /// use tilde_core::attr::{FileAttr, SourceFileType};
    ///
    /// let attr = FileAttr::parse("run_once_first_dot_install.sh.tmpl");
    /// assert_eq!(attr.file_type, SourceFileType::Script);
    /// assert_eq!(attr.target_name, ".install.sh");
    /// assert!(attr.once && attr.template);
    /// assert_eq!(attr.order, -1);
    /// ```
    pub fn parse(source_name: &str) -> Self {
        let mut name = source_name;
        let mut attr = FileAttr::default();

        if take_prefix(&mut name, RUN_PREFIX) {
            attr.file_type = SourceFileType::Script;
            attr.once = take_prefix(&mut name, ONCE_PREFIX);
            if take_prefix(&mut name, FIRST_PREFIX) {
                attr.order = -1;
            } else if take_prefix(&mut name, LAST_PREFIX) {
                attr.order = 1;
            }
        } else if take_prefix(&mut name, EXISTS_PREFIX) {
            attr.file_type = SourceFileType::Present;
            attr.encrypted = take_prefix(&mut name, ENCRYPTED_PREFIX);
            attr.private = take_prefix(&mut name, PRIVATE_PREFIX);
            attr.executable = take_prefix(&mut name, EXECUTABLE_PREFIX);
        } else if take_prefix(&mut name, SYMLINK_PREFIX) {
            attr.file_type = SourceFileType::Symlink;
        } else {
            attr.encrypted = take_prefix(&mut name, ENCRYPTED_PREFIX);
            attr.private = take_prefix(&mut name, PRIVATE_PREFIX);
            attr.empty = take_prefix(&mut name, EMPTY_PREFIX);
            attr.executable = take_prefix(&mut name, EXECUTABLE_PREFIX);
        }

        if let Some(stripped) = name.strip_suffix(TEMPLATE_SUFFIX) {
            attr.template = true;
            name = stripped;
        }
        attr.target_name = decode_dot(name);
        attr
    }

    /// Encode these attributes as a source file name
    ///
    /// Attributes that the file type cannot carry are not encoded.
    pub fn source_name(&self) -> String {
        let mut name = String::new();
        match self.file_type {
            SourceFileType::File => {
                if self.encrypted {
                    name.push_str(ENCRYPTED_PREFIX);
                }
                if self.private {
                    name.push_str(PRIVATE_PREFIX);
                }
                if self.empty {
                    name.push_str(EMPTY_PREFIX);
                }
                if self.executable {
                    name.push_str(EXECUTABLE_PREFIX);
                }
            }
            SourceFileType::Present => {
                name.push_str(EXISTS_PREFIX);
                if self.encrypted {
                    name.push_str(ENCRYPTED_PREFIX);
                }
                if self.private {
                    name.push_str(PRIVATE_PREFIX);
                }
                if self.executable {
                    name.push_str(EXECUTABLE_PREFIX);
                }
            }
            SourceFileType::Script => {
                name.push_str(RUN_PREFIX);
                if self.once {
                    name.push_str(ONCE_PREFIX);
                }
                match self.order.cmp(&0) {
                    std::cmp::Ordering::Less => name.push_str(FIRST_PREFIX),
                    std::cmp::Ordering::Greater => name.push_str(LAST_PREFIX),
                    std::cmp::Ordering::Equal => {}
                }
            }
            SourceFileType::Symlink => name.push_str(SYMLINK_PREFIX),
        }
        name.push_str(&encode_dot(&self.target_name));
        if self.template {
            name.push_str(TEMPLATE_SUFFIX);
        }
        name
    }

    /// Permission bits before the umask is applied
    pub fn perm(&self) -> u32 {
        let mut perm = 0o666;
        if self.executable {
            perm |= 0o111;
        }
        if self.private {
            perm &= 0o700;
        }
        perm
    }
}

/// Whether any execute bit is set
pub fn is_executable(perm: u32) -> bool {
    perm & 0o111 != 0
}

/// Whether group and world bits are all clear
pub fn is_private(perm: u32) -> bool {
    perm & 0o077 == 0
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_parse_dir_attr() {
        let attr = DirAttr::parse("exact_private_dot_ssh");
        assert_eq!(
            attr,
            DirAttr {
                target_name: ".ssh".to_string(),
                exact: true,
                private: true,
            }
        );

        // Prefixes out of order are part of the name.
        let attr = DirAttr::parse("private_exact_foo");
        assert!(attr.private);
        assert!(!attr.exact);
        assert_eq!(attr.target_name, "exact_foo");
    }

    #[test]
    fn test_parse_file_attr_types() {
        assert_eq!(
            FileAttr::parse("symlink_dot_vimrc").file_type,
            SourceFileType::Symlink
        );
        assert_eq!(
            FileAttr::parse("exists_private_token").file_type,
            SourceFileType::Present
        );

        let attr = FileAttr::parse("encrypted_private_executable_dot_bin.tmpl");
        assert_eq!(attr.file_type, SourceFileType::File);
        assert!(attr.encrypted && attr.private && attr.executable && attr.template);
        assert!(!attr.empty);
        assert_eq!(attr.target_name, ".bin");
    }

    #[test]
    fn test_parse_script_order() {
        assert_eq!(FileAttr::parse("run_last_cleanup").order, 1);
        assert_eq!(FileAttr::parse("run_install").order, 0);
        // `once_` must precede `first_`.
        let attr = FileAttr::parse("run_first_once_x");
        assert!(!attr.once);
        assert_eq!(attr.order, -1);
        assert_eq!(attr.target_name, "once_x");
    }

    #[test]
    fn test_only_leading_dot_is_encoded() {
        let attr = FileAttr {
            target_name: ".config.d".to_string(),
            ..FileAttr::default()
        };
        assert_eq!(attr.source_name(), "dot_config.d");
        assert_eq!(FileAttr::parse("foo_dot_bar").target_name, "foo_dot_bar");
    }

    #[test]
    fn test_dir_attr_round_trip() {
        for exact in [false, true] {
            for private in [false, true] {
                for target_name in ["foo", ".foo"] {
                    let attr = DirAttr {
                        target_name: target_name.to_string(),
                        exact,
                        private,
                    };
                    assert_eq!(DirAttr::parse(&attr.source_name()), attr);
                }
            }
        }
    }

    #[test]
    fn test_file_attr_round_trip() {
        let mut attrs = Vec::new();
        for target_name in ["foo", ".foo"] {
            for template in [false, true] {
                let base = FileAttr {
                    target_name: target_name.to_string(),
                    template,
                    ..FileAttr::default()
                };
                for bits in 0..16u8 {
                    attrs.push(FileAttr {
                        encrypted: bits & 1 != 0,
                        private: bits & 2 != 0,
                        empty: bits & 4 != 0,
                        executable: bits & 8 != 0,
                        ..base.clone()
                    });
                    if bits < 8 {
                        attrs.push(FileAttr {
                            file_type: SourceFileType::Present,
                            encrypted: bits & 1 != 0,
                            private: bits & 2 != 0,
                            executable: bits & 4 != 0,
                            ..base.clone()
                        });
                    }
                }
                for once in [false, true] {
                    for order in [-1, 0, 1] {
                        attrs.push(FileAttr {
                            file_type: SourceFileType::Script,
                            once,
                            order,
                            ..base.clone()
                        });
                    }
                }
                attrs.push(FileAttr {
                    file_type: SourceFileType::Symlink,
                    ..base.clone()
                });
            }
        }

        for attr in attrs {
            let source_name = attr.source_name();
            assert_eq!(FileAttr::parse(&source_name), attr, "{source_name}");
        }
    }

    #[test]
    fn test_perm() {
        let attr = FileAttr {
            executable: true,
            private: true,
            ..FileAttr::default()
        };
        assert_eq!(attr.perm(), 0o700);
        assert_eq!(FileAttr::default().perm(), 0o666);
        assert_eq!(DirAttr::default().perm(), 0o777);
        assert!(is_executable(0o755));
        assert!(is_private(0o700));
        assert!(!is_private(0o640));
    }
}
