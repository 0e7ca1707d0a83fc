//! Entry type filters
//!
//! `--include` takes a comma separated list of entry types. A list whose
//! first element starts with `no` is an exclusion list and starts from
//! every type: `noscripts,nosymlinks` is everything but scripts and
//! symlinks.

use crate::error::{Error, Result};
use crate::system::FileType;
use crate::target::TargetStateEntry;
use bitflags::bitflags;
use std::fmt;
use std::str::FromStr;

bitflags! {
    /// Set of entry types an operation applies to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IncludeSet: u8 {
        const DIRS = 1 << 0;
        const FILES = 1 << 1;
        const REMOVE = 1 << 2;
        const SCRIPTS = 1 << 3;
        const SYMLINKS = 1 << 4;
        const ALL = Self::DIRS.bits()
            | Self::FILES.bits()
            | Self::REMOVE.bits()
            | Self::SCRIPTS.bits()
            | Self::SYMLINKS.bits();
    }
}

const NAMES: [(&str, IncludeSet); 6] = [
    ("all", IncludeSet::ALL),
    ("dirs", IncludeSet::DIRS),
    ("files", IncludeSet::FILES),
    ("remove", IncludeSet::REMOVE),
    ("scripts", IncludeSet::SCRIPTS),
    ("symlinks", IncludeSet::SYMLINKS),
];

impl Default for IncludeSet {
    fn default() -> Self {
        IncludeSet::ALL
    }
}

impl IncludeSet {
    /// Whether a target state entry is selected
    pub fn includes_target(self, entry: &TargetStateEntry) -> bool {
        let kind = match entry {
            TargetStateEntry::Absent => IncludeSet::REMOVE,
            TargetStateEntry::Dir { .. } | TargetStateEntry::RenameDir { .. } => IncludeSet::DIRS,
            TargetStateEntry::File { .. } | TargetStateEntry::Present { .. } => IncludeSet::FILES,
            TargetStateEntry::Script { .. } => IncludeSet::SCRIPTS,
            TargetStateEntry::Symlink { .. } => IncludeSet::SYMLINKS,
        };
        self.contains(kind)
    }

    /// Whether an existing filesystem entry is selected
    ///
    /// Types that cannot be managed are never selected.
    pub fn includes_file_type(self, file_type: FileType) -> bool {
        match file_type {
            FileType::Dir => self.contains(IncludeSet::DIRS),
            FileType::File => self.contains(IncludeSet::FILES),
            FileType::Symlink => self.contains(IncludeSet::SYMLINKS),
            _ => false,
        }
    }
}

impl FromStr for IncludeSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let elements: Vec<&str> = s
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .collect();
        let exclude = elements.first().is_some_and(|e| e.starts_with("no"));
        let mut set = if exclude {
            IncludeSet::ALL
        } else {
            IncludeSet::empty()
        };
        for element in elements {
            let (name, negated) = match element.strip_prefix("no") {
                Some(rest) => (rest, true),
                None => (element, false),
            };
            let flag = NAMES
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, flag)| *flag)
                .ok_or_else(|| Error::InvalidAttribute(element.to_string()))?;
            if negated {
                set.remove(flag);
            } else {
                set.insert(flag);
            }
        }
        Ok(set)
    }
}

impl fmt::Display for IncludeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == IncludeSet::ALL {
            return f.write_str("all");
        }
        let names: Vec<&str> = NAMES
            .iter()
            .skip(1)
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect();
        f.write_str(&names.join(","))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("all".parse::<IncludeSet>().unwrap(), IncludeSet::ALL);
        assert_eq!(
            "dirs,files".parse::<IncludeSet>().unwrap(),
            IncludeSet::DIRS | IncludeSet::FILES
        );
        assert_eq!(
            "noscripts,nosymlinks".parse::<IncludeSet>().unwrap(),
            IncludeSet::DIRS | IncludeSet::FILES | IncludeSet::REMOVE
        );
        assert_eq!("".parse::<IncludeSet>().unwrap(), IncludeSet::empty());
        assert!("bogus".parse::<IncludeSet>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(IncludeSet::ALL.to_string(), "all");
        assert_eq!((IncludeSet::FILES | IncludeSet::SCRIPTS).to_string(), "files,scripts");
    }

    #[test]
    fn test_target_mapping() {
        let files = IncludeSet::FILES;
        assert!(files.includes_target(&TargetStateEntry::Present {
            contents: Default::default(),
            perm: 0o666,
        }));
        assert!(!files.includes_target(&TargetStateEntry::Absent));
        assert!(IncludeSet::DIRS.includes_target(&TargetStateEntry::RenameDir {
            old: "a".into(),
            new: "b".into(),
        }));
    }

    #[test]
    fn test_file_type_mapping() {
        assert!(IncludeSet::ALL.includes_file_type(FileType::Symlink));
        assert!(!IncludeSet::ALL.includes_file_type(FileType::NamedPipe));
        assert!(!IncludeSet::DIRS.includes_file_type(FileType::File));
    }
}
