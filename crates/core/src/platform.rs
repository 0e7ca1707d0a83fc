//! Platform detection and the process umask
//!
//! Provides OS and architecture information using standard Unix conventions:
//! - macOS → `"darwin"` (kernel name)
//! - Linux → `"linux"`
//!
//! Platform info is cached on first access. The umask is probed once at
//! startup and then passed around explicitly as a [`Umask`] value.

use crate::error::{Error, Result};
use std::fmt;
use std::sync::LazyLock;

/// Current platform information (cached)
///
/// # Example
/// ```
/// use tilde_core::platform::CURRENT_PLATFORM;
///
/// assert!(!CURRENT_PLATFORM.os.is_empty());
/// ```
pub static CURRENT_PLATFORM: LazyLock<Platform> = LazyLock::new(Platform::detect);

/// Platform information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// OS: "darwin" (macOS), "linux", "windows", "unknown"
    pub os: &'static str,
    /// CPU architecture: "x86_64", "aarch64", etc.
    pub arch: &'static str,
}

impl Platform {
    /// Detect the running platform
    pub fn detect() -> Self {
        Self {
            os: Self::detect_os(),
            arch: std::env::consts::ARCH,
        }
    }

    const fn detect_os() -> &'static str {
        #[cfg(target_os = "macos")]
        {
            "darwin"
        }

        #[cfg(target_os = "linux")]
        {
            "linux"
        }

        #[cfg(target_os = "windows")]
        {
            "windows"
        }

        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            "unknown"
        }
    }
}

/// File mode creation mask
///
/// Permission comparisons always mask both sides with the umask, so that
/// bits the umask would clear never count as a difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Umask(u32);

impl Umask {
    /// Construct from raw permission bits
    pub const fn new(bits: u32) -> Self {
        Umask(bits & 0o777)
    }

    /// Read the process umask
    ///
    /// The only portable way to read the umask is to set it, so this swaps in
    /// a temporary value and immediately restores the original.
    #[cfg(unix)]
    pub fn probe() -> Self {
        use rustix::fs::Mode;
        use rustix::process::umask;

        let old = umask(Mode::from_raw_mode(0o077));
        umask(old);
        Umask::new(u32::from(old.as_raw_mode()))
    }

    /// Read the process umask
    #[cfg(not(unix))]
    pub fn probe() -> Self {
        Umask::default()
    }

    /// Parse an octal umask such as `022` or `0o077`
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is not an octal number of at most `0o777`.
    pub fn parse(value: &str) -> Result<Self> {
        let digits = value.trim();
        let digits = digits.strip_prefix("0o").unwrap_or(digits);
        let bits = u32::from_str_radix(digits, 8).map_err(|e| Error::InvalidUmask {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
        if bits > 0o777 {
            return Err(Error::InvalidUmask {
                value: value.to_string(),
                reason: "out of range".to_string(),
            });
        }
        Ok(Umask(bits))
    }

    /// Raw mask bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Apply the mask to `perm`
    pub const fn mask(self, perm: u32) -> u32 {
        perm & !self.0 & 0o777
    }

    /// Whether two permissions are equal after masking
    pub const fn perm_eq(self, a: u32, b: u32) -> bool {
        self.mask(a) == self.mask(b)
    }
}

impl Default for Umask {
    fn default() -> Self {
        Umask(0o022)
    }
}

impl fmt::Display for Umask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03o}", self.0)
    }
}
