//! # Tilde Template
//!
//! Template evaluation for tilde using minijinja.
//!
//! Templates are rendered in strict mode: referencing undefined data is an
//! error rather than an empty string. Named partial templates registered on
//! the engine are available to every template through `{% include %}`.

pub mod data;
pub mod engine;
pub mod functions;

pub use data::{DefaultData, recursive_merge};
pub use engine::TemplateEngine;
pub use functions::ProcessRunner;

use thiserror::Error;

/// Result type for template operations
pub type Result<T> = std::result::Result<T, Error>;

/// Template engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Template rendering error
    #[error("template error at {location}: {message}")]
    Render { location: String, message: String },

    /// Template syntax error
    #[error("template syntax error: {0}")]
    Syntax(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl From<minijinja::Error> for Error {
    fn from(err: minijinja::Error) -> Self {
        let location = match (err.name(), err.line(), err.range()) {
            (Some(name), Some(line), Some(range)) => {
                format!("{name} line {line}, column {}", range.start)
            }
            (Some(name), Some(line), None) => format!("{name} line {line}"),
            (None, Some(line), Some(range)) => format!("line {line}, column {}", range.start),
            (None, Some(line), None) => format!("line {line}"),
            (Some(name), None, _) => name.to_string(),
            _ => "unknown location".to_string(),
        };

        let message = match err.detail() {
            Some(detail) => format!("{}: {detail}", err.kind()),
            None => err.kind().to_string(),
        };

        if err.kind() == minijinja::ErrorKind::SyntaxError {
            return Error::Syntax(format!("{location}: {message}"));
        }
        Error::Render { location, message }
    }
}
