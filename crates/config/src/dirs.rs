//! XDG directory defaults
//!
//! - `$XDG_CONFIG_HOME/tilde/tilde.toml`: configuration file
//! - `$XDG_DATA_HOME/tilde`: source directory
//! - `$XDG_STATE_HOME/tilde/tildestate.redb`: persistent state

use std::path::PathBuf;
use xdg::BaseDirectories;

const PREFIX: &str = "tilde";

/// `$XDG_CONFIG_HOME/tilde`
#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    BaseDirectories::with_prefix(PREFIX).get_config_home()
}

/// `$XDG_STATE_HOME/tilde`
#[must_use]
pub fn state_dir() -> Option<PathBuf> {
    BaseDirectories::with_prefix(PREFIX).get_state_home()
}

/// `$XDG_DATA_HOME/tilde`
#[must_use]
pub fn default_source_dir() -> Option<PathBuf> {
    BaseDirectories::with_prefix(PREFIX).get_data_home()
}

/// The configuration file path
#[must_use]
pub fn default_config_file() -> Option<PathBuf> {
    config_dir().map(|d| d.join("tilde.toml"))
}

/// The persistent state database path
#[must_use]
pub fn default_state_file() -> Option<PathBuf> {
    state_dir().map(|d| d.join("tildestate.redb"))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_config_file_name() {
        let path = default_config_file().unwrap();
        assert!(path.ends_with("tilde/tilde.toml"), "{path:?}");
        assert!(path.is_absolute());
    }

    #[test]
    fn test_state_file_lives_in_state_dir() {
        let file = default_state_file().unwrap();
        assert_eq!(file.parent(), state_dir().as_deref());
        assert!(file.ends_with("tilde/tildestate.redb"), "{file:?}");
    }

    #[test]
    fn test_source_dir_is_namespaced() {
        assert!(default_source_dir().unwrap().ends_with("tilde"));
    }
}
