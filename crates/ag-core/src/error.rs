//! Error types for the ag-core crate.
//!
//! This module provides the [`ConfigError`] type for failures while loading
//! and validating the configuration file. A configuration error is the only
//! condition that stops aiguard from starting.

use camino::Utf8PathBuf;

/// Errors that can occur during configuration loading and validation.
///
/// # Examples
///
/// ```
/// use ag_core::ConfigError;
///
/// let error = ConfigError::invalid_rule("default", "cat", "keys must not be empty");
/// assert!(error.to_string().contains("cat"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    Io {
        /// The file that couldn't be read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON or doesn't match the schema.
    #[error("failed to parse configuration {path}: {source}")]
    Parse {
        /// The file that couldn't be parsed.
        path: Utf8PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// A class rule inside a processor is malformed.
    #[error("invalid class rule '{rule}' in processor '{processor}': {reason}")]
    InvalidRule {
        /// The processor containing the rule.
        processor: String,
        /// The rule name.
        rule: String,
        /// Explanation of why the rule is invalid.
        reason: String,
    },
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidOption`] error.
    #[inline]
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new [`ConfigError::InvalidRule`] error.
    #[inline]
    pub fn invalid_rule(
        processor: impl Into<String>,
        rule: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidRule {
            processor: processor.into(),
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}
