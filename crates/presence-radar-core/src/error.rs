//! Error types for the presence-radar system.
//!
//! Malformed wire data, stale radars and oversized fusion clusters are not
//! errors here: they are counted and reported as health data. The types in
//! this module cover the few places where a caller handed us something we
//! cannot work with at all, mostly configuration.
//!
//! # Error Hierarchy
//!
//! - [`CoreError`]: top-level error for the core crate
//! - [`ConfigError`]: loading or validating a [`PresenceConfig`]
//!
//! [`PresenceConfig`]: crate::config::PresenceConfig

use std::path::PathBuf;
use thiserror::Error;

/// A specialized `Result` type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Top-level error type for the presence-radar core.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Errors produced when loading or validating a [`PresenceConfig`].
///
/// [`PresenceConfig`]: crate::config::PresenceConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// A configuration file could not be read from disk.
    #[error("Cannot read config file `{path}`: {source}")]
    FileRead {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file contains malformed JSON.
    #[error("Cannot parse config `{path}`: {source}")]
    ParseError {
        /// Path (or `<inline>`) that was being parsed.
        path: PathBuf,
        /// Underlying JSON parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value<S: Into<String>>(field: &'static str, reason: S) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}
