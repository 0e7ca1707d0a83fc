//! Attribute changes for `chattr`
//!
//! A modifier string is a comma separated list such as `+x,-private,noempty`.
//! `+name` or a bare `name` sets an attribute; `-name` or `noname` clears it.

use crate::error::{Error, Result};
use std::str::FromStr;
use tilde_core::attr::{DirAttr, FileAttr, SourceFileType};

/// Change to a single boolean attribute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoolModifier {
    /// Set the attribute
    Set,
    /// Leave the attribute unchanged
    #[default]
    Keep,
    /// Clear the attribute
    Clear,
}

impl BoolModifier {
    /// Apply to `value`
    pub fn modify(self, value: bool) -> bool {
        match self {
            BoolModifier::Set => true,
            BoolModifier::Keep => value,
            BoolModifier::Clear => false,
        }
    }
}

/// Change to a script's order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderModifier {
    /// Run before other entries
    SetFirst,
    /// Stop running first
    ClearFirst,
    /// Leave the order unchanged
    #[default]
    Keep,
    /// Stop running last
    ClearLast,
    /// Run after other entries
    SetLast,
}

impl OrderModifier {
    /// Apply to `order`
    pub fn modify(self, order: i32) -> i32 {
        match self {
            OrderModifier::SetFirst => -1,
            OrderModifier::ClearFirst if order < 0 => 0,
            OrderModifier::ClearLast if order > 0 => 0,
            OrderModifier::SetLast => 1,
            _ => order,
        }
    }
}

/// A parsed set of attribute changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttrModifier {
    pub empty: BoolModifier,
    pub encrypted: BoolModifier,
    pub exact: BoolModifier,
    pub executable: BoolModifier,
    pub once: BoolModifier,
    pub order: OrderModifier,
    pub private: BoolModifier,
    pub template: BoolModifier,
}

impl FromStr for AttrModifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut modifier = AttrModifier::default();
        for element in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (change, attribute) = if let Some(rest) = element.strip_prefix('-') {
                (BoolModifier::Clear, rest)
            } else if let Some(rest) = element.strip_prefix('+') {
                (BoolModifier::Set, rest)
            } else if let Some(rest) = element.strip_prefix("no") {
                (BoolModifier::Clear, rest)
            } else {
                (BoolModifier::Set, element)
            };
            match attribute {
                "empty" | "e" => modifier.empty = change,
                "encrypted" => modifier.encrypted = change,
                "exact" => modifier.exact = change,
                "executable" | "x" => modifier.executable = change,
                "first" | "f" => {
                    modifier.order = match change {
                        BoolModifier::Clear => OrderModifier::ClearFirst,
                        _ => OrderModifier::SetFirst,
                    };
                }
                "last" | "l" => {
                    modifier.order = match change {
                        BoolModifier::Clear => OrderModifier::ClearLast,
                        _ => OrderModifier::SetLast,
                    };
                }
                "once" | "o" => modifier.once = change,
                "private" | "p" => modifier.private = change,
                "template" | "t" => modifier.template = change,
                _ => return Err(Error::InvalidAttribute(attribute.to_string())),
            }
        }
        Ok(modifier)
    }
}

impl AttrModifier {
    /// New attributes for a directory
    pub fn modify_dir_attr(&self, attr: &DirAttr) -> DirAttr {
        DirAttr {
            target_name: attr.target_name.clone(),
            exact: self.exact.modify(attr.exact),
            private: self.private.modify(attr.private),
        }
    }

    /// New attributes for a file
    ///
    /// Only the attributes the file's type can carry survive.
    pub fn modify_file_attr(&self, attr: &FileAttr) -> FileAttr {
        let base = FileAttr {
            target_name: attr.target_name.clone(),
            file_type: attr.file_type,
            ..FileAttr::default()
        };
        match attr.file_type {
            SourceFileType::File => FileAttr {
                empty: self.empty.modify(attr.empty),
                encrypted: self.encrypted.modify(attr.encrypted),
                executable: self.executable.modify(attr.executable),
                private: self.private.modify(attr.private),
                template: self.template.modify(attr.template),
                ..base
            },
            SourceFileType::Present => FileAttr {
                encrypted: self.encrypted.modify(attr.encrypted),
                executable: self.executable.modify(attr.executable),
                private: self.private.modify(attr.private),
                template: self.template.modify(attr.template),
                ..base
            },
            SourceFileType::Script => FileAttr {
                once: self.once.modify(attr.once),
                order: self.order.modify(attr.order),
                template: self.template.modify(attr.template),
                ..base
            },
            SourceFileType::Symlink => FileAttr {
                template: self.template.modify(attr.template),
                ..base
            },
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    fn rename(modifier: &str, source_name: &str) -> String {
        let modifier: AttrModifier = modifier.parse().unwrap();
        modifier
            .modify_file_attr(&FileAttr::parse(source_name))
            .source_name()
    }

    #[test]
    fn test_parse_forms() {
        let modifier: AttrModifier = "+x, -private,noempty,t".parse().unwrap();
        assert_eq!(modifier.executable, BoolModifier::Set);
        assert_eq!(modifier.private, BoolModifier::Clear);
        assert_eq!(modifier.empty, BoolModifier::Clear);
        assert_eq!(modifier.template, BoolModifier::Set);
        assert_eq!(modifier.once, BoolModifier::Keep);
    }

    #[test]
    fn test_unknown_attribute() {
        let err = "+bogus".parse::<AttrModifier>().unwrap_err();
        assert_eq!(err.to_string(), "bogus: unknown attribute");
    }

    #[test]
    fn test_file_renames() {
        assert_eq!(rename("+x", "dot_bashrc"), "executable_dot_bashrc");
        assert_eq!(rename("private,t", "dot_netrc"), "private_dot_netrc.tmpl");
        assert_eq!(rename("-t", "dot_gitconfig.tmpl"), "dot_gitconfig");
        assert_eq!(rename("+empty", "dot_hushlogin"), "empty_dot_hushlogin");
    }

    #[test]
    fn test_script_attributes() {
        assert_eq!(rename("once,first", "run_setup.sh"), "run_once_first_setup.sh");
        assert_eq!(rename("nofirst", "run_first_setup.sh"), "run_setup.sh");
        assert_eq!(rename("nolast", "run_first_setup.sh"), "run_first_setup.sh");
        assert_eq!(rename("+x", "run_setup.sh"), "run_setup.sh");
    }

    #[test]
    fn test_symlink_keeps_only_template() {
        assert_eq!(rename("+x,+t", "symlink_dot_vimrc"), "symlink_dot_vimrc.tmpl");
    }

    #[test]
    fn test_dir_attributes() {
        let modifier: AttrModifier = "exact,-p".parse().unwrap();
        let attr = modifier.modify_dir_attr(&DirAttr::parse("private_dot_ssh"));
        assert_eq!(attr.source_name(), "exact_dot_ssh");
    }
}
