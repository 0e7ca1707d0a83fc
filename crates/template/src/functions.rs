//! Template functions and filters
//!
//! Functions registered on every [`TemplateEngine`](crate::TemplateEngine).

use minijinja::Value;
use minijinja::value::Rest;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use tilde_core::CommandRunner;
use tilde_core::platform::CURRENT_PLATFORM;

static HOSTNAME_CACHE: OnceLock<String> = OnceLock::new();

/// Compiled regexes shared by `regexMatch` and `regexReplaceAll`
static REGEX_CACHE: OnceLock<RwLock<HashMap<String, regex::Regex>>> = OnceLock::new();
const MAX_REGEX_CACHE_SIZE: usize = 32;
const MAX_REGEX_PATTERN_LEN: usize = 200;

fn invalid_operation(message: impl Into<String>) -> minijinja::Error {
    minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, message.into())
}

/// Get an environment variable
///
/// Usage: `{{ env("PATH") }}`
pub fn env(name: &str) -> std::borrow::Cow<'static, str> {
    env::var(name)
        .map(std::borrow::Cow::Owned)
        .unwrap_or(std::borrow::Cow::Borrowed(""))
}

/// Get the operating system name
///
/// Usage: `{{ os() }}`
#[must_use]
pub fn os() -> &'static str {
    CURRENT_PLATFORM.os
}

/// Get the system architecture
///
/// Usage: `{{ arch() }}`
#[must_use]
pub fn arch() -> &'static str {
    CURRENT_PLATFORM.arch
}

/// Get the system hostname, up to the first dot
///
/// Usage: `{{ hostname() }}`
pub fn hostname() -> &'static str {
    HOSTNAME_CACHE.get_or_init(|| {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .map(|h| h.split('.').next().unwrap_or_default().to_string())
            .unwrap_or_default()
    })
}

/// Join path components
///
/// Usage: `{{ joinPath("/home", "user", ".config") }}`
#[must_use]
pub fn join_path(args: &[Value]) -> String {
    let mut path = PathBuf::new();
    for arg in args {
        if let Some(s) = arg.as_str() {
            path.push(s);
        }
    }
    path.to_string_lossy().into_owned()
}

/// Look up an executable in PATH, returning the empty string if absent
///
/// Usage: `{{ lookPath("git") }}`
///
/// # Errors
///
/// Returns error if the name contains a path separator
pub fn look_path(name: &str) -> Result<String, minijinja::Error> {
    if name.contains('/') || name.contains('\\') {
        return Err(invalid_operation(format!(
            "lookPath: {name}: must be a bare executable name"
        )));
    }

    Ok(which::which(name)
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default())
}

/// Always wrap a string in double quotes with proper escaping
///
/// Usage: `{{ some_var | quote }}`
///
/// Examples:
/// - `hello` → `"hello"`
/// - `say "hi"` → `"say \"hi\""`
#[must_use]
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Convert a value to JSON
///
/// Usage: `{{ some_data | toJson }}`
///
/// # Errors
///
/// Returns error if value cannot be converted to JSON
pub fn to_json(value: &Value) -> Result<String, minijinja::Error> {
    serde_json::to_string(value).map_err(|e| invalid_operation(e.to_string()))
}

/// Parse a JSON string
///
/// Usage: `{{ json_string | fromJson }}`
///
/// # Errors
///
/// Returns error if value is not valid JSON
pub fn from_json(value: &str) -> Result<Value, minijinja::Error> {
    let json_value: serde_json::Value =
        serde_json::from_str(value).map_err(|e| invalid_operation(e.to_string()))?;

    Ok(Value::from_serialize(&json_value))
}

/// Trim whitespace from both ends of a string
///
/// ```jinja2
/// {{ output("git", "config", "user.email") | trim }}
/// ```
#[must_use]
pub fn trim(value: &str) -> String {
    value.trim().to_string()
}

/// Test if a string matches a regular expression anywhere
///
/// ```jinja2
/// {{ regexMatch("hello123", "\\d+") }}  {# Output: true #}
/// ```
///
/// # Errors
///
/// Returns error if pattern is invalid or too long
pub fn regex_match(text: &str, pattern: &str) -> Result<bool, minijinja::Error> {
    let re = get_compiled_regex(pattern)?;
    Ok(re.is_match(text))
}

fn get_compiled_regex(pattern: &str) -> Result<regex::Regex, minijinja::Error> {
    if pattern.len() > MAX_REGEX_PATTERN_LEN {
        return Err(invalid_operation(format!(
            "Regex pattern too long ({} chars, max {MAX_REGEX_PATTERN_LEN})",
            pattern.len()
        )));
    }

    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    {
        let read_guard = cache.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(re) = read_guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let mut write_guard = cache.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(re) = write_guard.get(pattern) {
        return Ok(re.clone());
    }

    let re = regex::RegexBuilder::new(pattern)
        .size_limit(10 * (1 << 20))
        .dfa_size_limit(2 * (1 << 20))
        .build()
        .map_err(|e| invalid_operation(format!("Invalid regex pattern: {e}")))?;

    if write_guard.len() >= MAX_REGEX_CACHE_SIZE {
        write_guard.clear();
    }
    write_guard.insert(pattern.to_string(), re.clone());
    Ok(re)
}

/// Replace all matches of a regular expression
///
/// ```jinja2
/// {{ regexReplaceAll("hello 123 world 456", "\\d+", "X") }}  {# Output: "hello X world X" #}
/// ```
///
/// # Errors
///
/// Returns error if pattern is invalid or too long
pub fn regex_replace_all(
    text: &str,
    pattern: &str,
    replacement: &str,
) -> Result<String, minijinja::Error> {
    let re = get_compiled_regex(pattern)?;
    Ok(re.replace_all(text, replacement).to_string())
}

/// Split a string by a delimiter
///
/// ```jinja2
/// {% for item in split(path, "/") %}{{ item }}{% endfor %}
/// ```
pub fn split(text: &str, delimiter: &str) -> Vec<String> {
    text.split(delimiter)
        .map(std::string::ToString::to_string)
        .collect()
}

/// Join a list of strings with a delimiter
///
/// ```jinja2
/// {{ join(["a", "b", "c"], ", ") }}  {# Output: "a, b, c" #}
/// ```
#[must_use]
pub fn join(items: &[Value], delimiter: &str) -> String {
    items
        .iter()
        .filter_map(|v| v.as_str())
        .collect::<Vec<_>>()
        .join(delimiter)
}

/// Convert a value to TOML format
///
/// # Errors
///
/// Returns error if value cannot be represented as TOML
pub fn to_toml(value: &Value) -> Result<String, minijinja::Error> {
    let json_value = serde_json::to_value(value)
        .map_err(|e| invalid_operation(format!("Failed to convert value: {e}")))?;

    toml::to_string(&json_value)
        .map_err(|e| invalid_operation(format!("Failed to serialize to TOML: {e}")))
}

/// Parse a TOML string
///
/// ```jinja2
/// {% set config = fromToml(file_content) %}
/// {{ config.database.host }}
/// ```
///
/// # Errors
///
/// Returns error if value is not valid TOML
pub fn from_toml(value: &str) -> Result<Value, minijinja::Error> {
    let toml_value: toml::Value =
        toml::from_str(value).map_err(|e| invalid_operation(format!("Failed to parse TOML: {e}")))?;

    let json_value = serde_json::to_value(&toml_value)
        .map_err(|e| invalid_operation(format!("Failed to convert TOML to JSON: {e}")))?;

    Ok(Value::from_serialize(&json_value))
}

/// Runs commands for the `output` function, remembering each result
///
/// The same program and arguments always render the same text within one
/// engine, so a command with side effects runs at most once per render pass.
pub struct OutputCache {
    runner: Arc<dyn CommandRunner>,
    cache: Mutex<HashMap<Vec<String>, String>>,
}

impl OutputCache {
    /// Wrap a command runner
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Usage: `{{ output("git", "config", "user.email") }}`
    ///
    /// # Errors
    ///
    /// Returns error if the command fails or prints non-UTF-8 output
    pub fn output(&self, program: &str, args: Rest<String>) -> Result<String, minijinja::Error> {
        let mut key = Vec::with_capacity(args.len() + 1);
        key.push(program.to_string());
        key.extend(args.iter().cloned());

        if let Some(cached) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(cached.clone());
        }

        let stdout = self
            .runner
            .output(program, &args)
            .map_err(|e| invalid_operation(format!("output: {program}: {e}")))?;
        let text = String::from_utf8(stdout)
            .map_err(|e| invalid_operation(format!("output: {program}: {e}")))?;

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, text.clone());
        Ok(text)
    }
}

/// Runs commands as child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn output(&self, program: &str, args: &[String]) -> tilde_core::Result<Vec<u8>> {
        let output = Command::new(program).args(args).output()?;
        if !output.status.success() {
            return Err(tilde_core::Error::Message(format!(
                "{program}: {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }
}
