//! Versions for `.chezmoiversion`
//!
//! A source directory may require a minimum version of the tool. Versions
//! are `major.minor.patch`; missing components are zero and a pre-release
//! or build suffix is ignored.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A `major.minor.patch` version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    /// Create a version
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Error unless `self` satisfies the minimum `required`
    ///
    /// # Errors
    ///
    /// Returns [`Error::MinVersion`] if `self` is older than `required`
    pub fn check(self, required: Option<Version>) -> Result<()> {
        match required {
            Some(required) if self < required => Err(Error::MinVersion {
                required: required.to_string(),
                running: self.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |message: &str| Error::Version {
            value: s.to_string(),
            message: message.to_string(),
        };
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let core = trimmed
            .split(['-', '+'])
            .next()
            .filter(|core| !core.is_empty())
            .ok_or_else(|| invalid("empty version"))?;

        let mut parts = [0u64; 3];
        for (index, part) in core.split('.').enumerate() {
            let slot = parts
                .get_mut(index)
                .ok_or_else(|| invalid("too many components"))?;
            *slot = part.parse().map_err(|_| invalid("components must be numbers"))?;
        }
        Ok(Version::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("2.1.3".parse::<Version>().unwrap(), Version::new(2, 1, 3));
        assert_eq!("v2.1\n".parse::<Version>().unwrap(), Version::new(2, 1, 0));
        assert_eq!("2.0.0-rc1".parse::<Version>().unwrap(), Version::new(2, 0, 0));
        assert!("".parse::<Version>().is_err());
        assert!("1.2.3.4".parse::<Version>().is_err());
        assert!("one".parse::<Version>().is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(Version::new(1, 10, 0) > Version::new(1, 9, 9));
        assert!(Version::new(2, 0, 0) > Version::new(1, 99, 99));
    }

    #[test]
    fn test_check() {
        let running = Version::new(1, 2, 0);
        running.check(None).unwrap();
        running.check(Some(Version::new(1, 2, 0))).unwrap();
        let err = running.check(Some(Version::new(1, 3, 0))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "source state requires version 1.3.0 or later, running 1.2.0"
        );
    }
}
