//! Template data
//!
//! Templates see one JSON object built from three layers, later layers
//! winning: the built-in defaults under the `tilde` key, user data from the
//! config file and `.chezmoidata.*` files, and priority data supplied by the
//! caller.

use crate::functions;
use serde::Serialize;
use serde_json::{Map, Value};
use std::env;
use std::path::Path;
use tilde_core::platform::CURRENT_PLATFORM;

/// Built-in facts about the running system and the tool itself
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultData {
    /// CPU architecture, e.g. `x86_64`
    pub arch: String,
    /// Operating system, e.g. `linux` or `darwin`
    pub os: String,
    /// Short host name
    pub hostname: String,
    /// Login name of the current user
    pub username: String,
    /// Home directory of the current user
    pub home_dir: String,
    /// Source directory
    pub source_dir: String,
    /// Destination directory
    pub dest_dir: String,
    /// Running tool version
    pub version: String,
}

impl DefaultData {
    /// Detect the defaults for the given source and destination directories
    pub fn detect(source_dir: &Path, dest_dir: &Path, version: &str) -> Self {
        Self {
            arch: CURRENT_PLATFORM.arch.to_string(),
            os: CURRENT_PLATFORM.os.to_string(),
            hostname: functions::hostname().to_string(),
            username: env::var("USER")
                .or_else(|_| env::var("USERNAME"))
                .unwrap_or_default(),
            home_dir: dirs::home_dir()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source_dir: source_dir.to_string_lossy().into_owned(),
            dest_dir: dest_dir.to_string_lossy().into_owned(),
            version: version.to_string(),
        }
    }

    /// The defaults as a template data object, nested under `tilde`
    pub fn into_data(self) -> Map<String, Value> {
        let mut data = Map::new();
        // Serializing a struct of strings into a JSON value cannot fail.
        if let Ok(value) = serde_json::to_value(self) {
            data.insert("tilde".to_string(), value);
        }
        data
    }
}

/// Merge `src` into `dest`, descending into objects present on both sides
///
/// Non-object values in `src` replace whatever `dest` held.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use tilde_template::data::recursive_merge;
///
/// let mut dest = json!({"a": {"b": 1, "c": 2}}).as_object().cloned().unwrap();
/// let src = json!({"a": {"c": 3}}).as_object().cloned().unwrap();
/// recursive_merge(&mut dest, &src);
/// assert_eq!(serde_json::Value::Object(dest), json!({"a": {"b": 1, "c": 3}}));
/// ```
pub fn recursive_merge(dest: &mut Map<String, Value>, src: &Map<String, Value>) {
    for (key, src_value) in src {
        match (dest.get_mut(key), src_value) {
            (Some(Value::Object(dest_map)), Value::Object(src_map)) => {
                recursive_merge(dest_map, src_map);
            }
            _ => {
                dest.insert(key.clone(), src_value.clone());
            }
        }
    }
}
