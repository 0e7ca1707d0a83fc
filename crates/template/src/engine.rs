//! Template engine implementation
//!
//! The engine wraps minijinja and provides template rendering with custom functions.

use crate::functions::{self, OutputCache, ProcessRunner};
use crate::{Error, Result};
use minijinja::value::Rest;
use minijinja::{Environment, UndefinedBehavior};
use std::sync::Arc;
use tilde_core::CommandRunner;

/// Template engine for rendering templates
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create a template engine whose `output` function spawns processes
    #[must_use]
    pub fn new() -> Self {
        Self::with_command_runner(Arc::new(ProcessRunner))
    }

    /// Create a template engine whose `output` function goes through `runner`
    #[must_use]
    pub fn with_command_runner(runner: Arc<dyn CommandRunner>) -> Self {
        let mut env = Environment::new();

        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);

        env.add_function("env", functions::env);
        env.add_function("os", functions::os);
        env.add_function("arch", functions::arch);
        env.add_function("hostname", functions::hostname);
        env.add_function("joinPath", functions::join_path);
        env.add_function("lookPath", functions::look_path);
        env.add_function("regexMatch", functions::regex_match);
        env.add_function("regexReplaceAll", functions::regex_replace_all);
        env.add_function("split", functions::split);
        env.add_function("join", functions::join);

        let outputs = Arc::new(OutputCache::new(runner));
        env.add_function("output", move |program: &str, args: Rest<String>| {
            outputs.output(program, args)
        });

        env.add_filter("quote", functions::quote);
        env.add_filter("toJson", functions::to_json);
        env.add_filter("fromJson", functions::from_json);
        env.add_filter("toToml", functions::to_toml);
        env.add_filter("fromToml", functions::from_toml);
        env.add_filter("trim", functions::trim);

        Self { env }
    }

    /// Register a named partial template
    ///
    /// Every later render can pull it in with `{% include "name" %}`.
    ///
    /// # Errors
    ///
    /// Returns error if the template does not parse
    pub fn add_template(&mut self, name: impl Into<String>, source: impl Into<String>) -> Result<()> {
        self.env
            .add_template_owned(name.into(), source.into())
            .map_err(Error::from)
    }

    /// Render a template string, naming it in error messages
    ///
    /// # Examples
    ///
    /// ```
    /// use tilde_template::TemplateEngine;
    ///
    /// let engine = TemplateEngine::new();
    /// let data = serde_json::json!({"name": "tilde"});
    ///
    /// let result = engine.render_named_str("greeting.txt", "Hello {{ name }}!", &data).unwrap();
    /// assert_eq!(result, "Hello tilde!");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns error if template rendering fails
    pub fn render_named_str(
        &self,
        name: &str,
        template: &str,
        data: &serde_json::Value,
    ) -> Result<String> {
        self.env
            .render_named_str(name, template, data)
            .map_err(Error::from)
    }

    /// Render template bytes
    ///
    /// # Errors
    ///
    /// Returns error if template is not valid UTF-8 or rendering fails
    pub fn render(&self, name: &str, template: &[u8], data: &serde_json::Value) -> Result<Vec<u8>> {
        let template_str = std::str::from_utf8(template)
            .map_err(|e| Error::Syntax(format!("{name}: template is not valid UTF-8: {e}")))?;

        let rendered = self.render_named_str(name, template_str, data)?;
        Ok(rendered.into_bytes())
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use serde_json::json;

    struct FixedRunner;

    impl CommandRunner for FixedRunner {
        fn output(&self, program: &str, args: &[String]) -> tilde_core::Result<Vec<u8>> {
            Ok(format!("{program}:{}\n", args.join(",")).into_bytes())
        }
    }

    #[test]
    fn test_undefined_data_is_an_error() {
        let engine = TemplateEngine::new();
        let err = engine
            .render_named_str("dot_gitconfig.tmpl", "{{ email }}", &json!({}))
            .unwrap_err();
        match err {
            Error::Render { location, .. } => {
                assert!(location.starts_with("dot_gitconfig.tmpl line 1"), "{location}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_syntax_error() {
        let engine = TemplateEngine::new();
        let err = engine
            .render_named_str("bad", "{% if %}", &json!({}))
            .unwrap_err();
        assert!(matches!(err, Error::Syntax(_)));
    }

    #[test]
    fn test_keeps_trailing_newline() {
        let engine = TemplateEngine::new();
        let out = engine
            .render_named_str("t", "{{ a }}\n", &json!({"a": 1}))
            .unwrap();
        assert_eq!(out, "1\n");
    }

    #[test]
    fn test_named_partials_are_includable() {
        let mut engine = TemplateEngine::new();
        engine.add_template("header", "# {{ name }}").unwrap();
        let out = engine
            .render_named_str("file", "{% include \"header\" %} body", &json!({"name": "x"}))
            .unwrap();
        assert_eq!(out, "# x body");
    }

    #[test]
    fn test_output_uses_runner() {
        let engine = TemplateEngine::with_command_runner(Arc::new(FixedRunner));
        let out = engine
            .render_named_str("t", "{{ output(\"git\", \"config\", \"user.name\") | trim }}", &json!({}))
            .unwrap();
        assert_eq!(out, "git:config,user.name");
    }

    #[test]
    fn test_render_rejects_invalid_utf8() {
        let engine = TemplateEngine::new();
        assert!(engine.render("bin", &[0xff, 0xfe], &json!({})).is_err());
    }

    #[test]
    fn test_deterministic_output() {
        let engine = TemplateEngine::new();
        let data = json!({"items": ["a", "b"]});
        let template = "{% for i in items %}{{ i | quote }} {% endfor %}";
        let first = engine.render_named_str("t", template, &data).unwrap();
        let second = engine.render_named_str("t", template, &data).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "\"a\" \"b\" ");
    }
}
