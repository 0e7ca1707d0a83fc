//! Ordered glob pattern sets
//!
//! `.chezmoiignore` and `.chezmoiremove` files are parsed into a
//! [`PatternSet`]: an ordered list of glob patterns, each either including
//! or, when written with a leading `!`, excluding the paths it matches.
//! The last matching pattern decides, so a later line can undo an
//! earlier one.
//!
//! ```text
//! # ignore every cache directory except the one for git
//! .cache/*
//! !.cache/git
//! ```

use crate::error::{Error, Result};
use crate::system::System;
use glob::{MatchOptions, Pattern};
use tilde_core::path::{AbsPath, RelPath};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Ordered list of glob patterns with include flags
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<(Pattern, bool)>,
}

impl PatternSet {
    /// Create an empty pattern set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pattern
    ///
    /// # Errors
    ///
    /// Returns error if `pattern` is not a valid glob
    pub fn add(&mut self, pattern: &str, include: bool) -> Result<()> {
        let compiled = Pattern::new(pattern).map_err(|e| Error::InvalidPattern {
            location: pattern.to_string(),
            message: e.to_string(),
        })?;
        self.patterns.push((compiled, include));
        Ok(())
    }

    /// Append every pattern in a rendered ignore or remove file
    ///
    /// Text after `#` is a comment and blank lines are skipped. Patterns are
    /// relative to `dir`, the target directory the file was found in.
    /// `location` names the file in error messages.
    ///
    /// # Errors
    ///
    /// Returns error if a line is not a valid glob, annotated with its line number
    pub fn add_lines(&mut self, dir: &RelPath, text: &str, location: &str) -> Result<()> {
        for (index, line) in text.lines().enumerate() {
            let line = line.split_once('#').map_or(line, |(before, _)| before).trim();
            if line.is_empty() {
                continue;
            }
            let (pattern, include) = match line.strip_prefix('!') {
                Some(rest) => (rest.trim(), false),
                None => (line, true),
            };
            let pattern = if dir.is_empty() {
                pattern.to_string()
            } else {
                format!("{}/{pattern}", dir.to_slash())
            };
            self.add(&pattern, include).map_err(|e| match e {
                Error::InvalidPattern { message, .. } => Error::InvalidPattern {
                    location: format!("{location}:{}", index + 1),
                    message,
                },
                other => other,
            })?;
        }
        Ok(())
    }

    /// Whether the last pattern matching `path` includes it
    ///
    /// Paths that no pattern matches are not included.
    ///
    /// # Examples
    ///
    /// ```
    /// use tilde_engine::patterns::PatternSet;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut set = PatternSet::new();
    /// set.add("foo*", true)?;
    /// set.add("foobar", false)?;
    /// assert!(set.is_match("foo"));
    /// assert!(!set.is_match("foobar"));
    /// assert!(!set.is_match("bar"));
    /// # Ok(())
    /// # }
    /// ```
    pub fn is_match(&self, path: &str) -> bool {
        self.patterns
            .iter()
            .rev()
            .find(|(pattern, _)| pattern.matches_with(path, MATCH_OPTIONS))
            .is_some_and(|(_, include)| *include)
    }

    /// Whether the last pattern matching `path` includes it
    pub fn includes(&self, path: &RelPath) -> bool {
        self.is_match(&path.to_slash())
    }

    /// Expand the including patterns below `root`
    ///
    /// Only paths the whole set includes are returned, relative to `root`,
    /// sorted and without duplicates.
    ///
    /// # Errors
    ///
    /// Returns error if globbing fails
    pub fn glob(&self, system: &dyn System, root: &AbsPath) -> Result<Vec<RelPath>> {
        let mut matches = Vec::new();
        for (pattern, include) in &self.patterns {
            if !include {
                continue;
            }
            let full = format!("{}/{}", root, pattern.as_str());
            for path in system.glob(&full)? {
                let rel = path.trim_dir_prefix(root)?;
                if !rel.is_empty() && self.includes(&rel) {
                    matches.push(rel);
                }
            }
        }
        matches.sort();
        matches.dedup();
        Ok(matches)
    }

    /// Number of patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether there are no patterns
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::system::{RealSystem, mkdir_all};
    use tempfile::TempDir;

    fn parse(lines: &str) -> PatternSet {
        let mut set = PatternSet::new();
        set.add_lines(&RelPath::default(), lines, ".chezmoiignore")
            .unwrap();
        set
    }

    #[test]
    fn test_last_match_wins() {
        let set = parse("foo*\n!foobar\n");
        assert!(!set.is_match("foobar"));
        assert!(set.is_match("foo"));

        let set = parse("b*\n");
        assert!(set.is_match("bar"));
        assert!(set.is_match("baz"));
    }

    #[test]
    fn test_later_pattern_reincludes() {
        let set = parse("!*.log\n*.log\n");
        assert!(set.is_match("debug.log"));
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let set = parse("# comment\n\n  .cache  # trailing comment\n");
        assert_eq!(set.len(), 1);
        assert!(set.is_match(".cache"));
    }

    #[test]
    fn test_patterns_are_relative_to_dir() {
        let mut set = PatternSet::new();
        set.add_lines(&RelPath::from_slash(".config").unwrap(), "*.bak\n", "x")
            .unwrap();
        assert!(set.is_match(".config/a.bak"));
        assert!(!set.is_match("a.bak"));
        assert!(!set.is_match(".config/sub/a.bak"));
    }

    #[test]
    fn test_invalid_pattern_names_line() {
        let mut set = PatternSet::new();
        let err = set
            .add_lines(&RelPath::default(), "ok\n[\n", ".chezmoiignore")
            .unwrap_err();
        assert!(err.to_string().starts_with(".chezmoiignore:2:"), "{err}");
    }

    #[test]
    fn test_glob_respects_exclusions() {
        let temp = TempDir::new().unwrap();
        let root = AbsPath::new(temp.path().to_path_buf()).unwrap();
        let system = RealSystem::default();
        mkdir_all(&system, &root.join_name(".cache"), 0o777).unwrap();
        for name in ["a", "b", "keep"] {
            system
                .write_file(&root.join_name(".cache").join_name(name), b"", 0o644)
                .unwrap();
        }

        let mut set = PatternSet::new();
        set.add_lines(&RelPath::default(), ".cache/*\n!.cache/keep\n", "x")
            .unwrap();
        let matches: Vec<String> = set
            .glob(&system, &root)
            .unwrap()
            .iter()
            .map(RelPath::to_slash)
            .collect();
        assert_eq!(matches, [".cache/a", ".cache/b"]);
    }
}
