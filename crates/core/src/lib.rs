//! Core types and utilities for tilde
//!
//! This is the foundation crate that all other tilde crates depend on.
//! It provides:
//! - Path types (`AbsPath`, `RelPath`, `SourceRelPath`)
//! - The source name attribute codec
//! - Base error types
//! - Platform detection and the umask
//! - Capability traits (`Encryption`, `CommandRunner`)
//!
//! This crate has no dependencies on other tilde crates.

pub mod attr;
pub mod error;
pub mod path;
pub mod platform;
pub mod traits;

pub use error::{Error, Result};
pub use platform::Umask;
pub use traits::{CommandRunner, Encryption};
