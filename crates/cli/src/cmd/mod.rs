//! CLI command implementations

pub mod add;
pub mod apply;
pub mod cat;
pub mod chattr;
pub mod data;
pub mod state;
pub mod status;

use anyhow::Context;
use clap::ValueEnum;
use serde::Serialize;
use tilde_engine::DryRunSystem;
use tilde_engine::System;

/// Serialization format for structured output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Pretty-printed JSON
    #[default]
    Json,
    /// YAML
    Yaml,
    /// TOML, for values whose top level is a table
    Toml,
}

impl Format {
    /// Serialize `value`, always ending with a newline
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented in this format
    pub fn render<T: Serialize>(self, value: &T) -> anyhow::Result<String> {
        let mut out = match self {
            Format::Json => serde_json::to_string_pretty(value).context("Failed to encode JSON")?,
            Format::Yaml => serde_yaml::to_string(value).context("Failed to encode YAML")?,
            Format::Toml => toml::to_string_pretty(value).context("Failed to encode TOML")?,
        };
        if !out.ends_with('\n') {
            out.push('\n');
        }
        Ok(out)
    }
}

/// Print the mutations a dry run recorded
fn print_operations<S: System>(dry_run: &DryRunSystem<S>) {
    for operation in dry_run.operations() {
        println!("{operation}");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_formats() {
        let value = json!({"tilde": {"os": "linux"}, "email": "me@example.com"});
        let json = Format::Json.render(&value).unwrap();
        assert!(json.ends_with("}\n"));
        assert_eq!(serde_json::from_str::<serde_json::Value>(&json).unwrap(), value);

        let yaml = Format::Yaml.render(&value).unwrap();
        assert!(yaml.contains("email: me@example.com"));

        let toml = Format::Toml.render(&value).unwrap();
        assert!(toml.contains("[tilde]"));
        assert!(toml.contains("os = \"linux\""));
    }

    #[test]
    fn test_toml_needs_a_table() {
        assert!(Format::Toml.render(&json!([1, 2])).is_err());
    }
}
