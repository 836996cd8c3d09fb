//! Error types for the ag-watcher crate.
//!
//! This module provides the [`WatchError`] type for errors that can occur
//! while starting a directory watcher or while waiting for a file to settle.

use std::time::Duration;

use camino::Utf8PathBuf;

/// Errors that can occur during watching and stability detection.
///
/// # Error Recovery Strategy
///
/// - **Startup errors** ([`WatchError::PathNotFound`], [`WatchError::NotADirectory`],
///   [`WatchError::InvalidPattern`], [`WatchError::Notify`]): the directory is
///   not watched, the rest of the process continues
/// - **Per-file errors** ([`WatchError::Unstable`], [`WatchError::Stat`],
///   [`WatchError::NonUtf8Path`]): the file is skipped, watching continues
/// - **Channel closed** ([`WatchError::ChannelClosed`]) and
///   [`WatchError::Cancelled`]: the watcher stops
///
/// # Examples
///
/// ```
/// use ag_watcher::WatchError;
///
/// let err = WatchError::path_not_found("/srv/missing");
/// assert!(err.is_fatal());
/// assert_eq!(err.path().map(|p| p.as_str()), Some("/srv/missing"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Failed to initialize or operate the notify watcher.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The configured path does not exist.
    #[error("path does not exist: {0}")]
    PathNotFound(Utf8PathBuf),

    /// The configured path exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(Utf8PathBuf),

    /// The directory's name pattern is not a valid regular expression.
    #[error("invalid name pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern as written in the configuration.
        pattern: String,
        /// The regex compile error.
        #[source]
        source: regex::Error,
    },

    /// A file kept changing size for longer than the allowed wait.
    #[error("file {path} did not stabilize within {waited:?}")]
    Unstable {
        /// The file that never settled.
        path: Utf8PathBuf,
        /// How long the watcher waited.
        waited: Duration,
    },

    /// A file's size could not be read (usually because it was removed).
    #[error("failed to stat {path}: {source}")]
    Stat {
        /// The file that couldn't be read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The downstream sink no longer accepts files.
    #[error("file sink closed")]
    ChannelClosed,

    /// Shutdown was requested while waiting.
    #[error("watch cancelled")]
    Cancelled,

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Creates a new [`WatchError::PathNotFound`] error.
    #[inline]
    pub fn path_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Creates a new [`WatchError::Stat`] error.
    #[inline]
    pub fn stat(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Stat {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if this error only affects a single file.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Unstable { .. } | Self::Stat { .. } | Self::NonUtf8Path(_)
        )
    }

    /// Returns `true` if this error stops the watcher.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::PathNotFound(path)
            | Self::NotADirectory(path)
            | Self::Unstable { path, .. }
            | Self::Stat { path, .. } => Some(path),
            Self::Notify(_)
            | Self::InvalidPattern { .. }
            | Self::ChannelClosed
            | Self::Cancelled
            | Self::NonUtf8Path(_)
            | Self::Io(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_watch_error_not_a_directory() {
        let err = WatchError::NotADirectory(Utf8PathBuf::from("/srv/cam1.jpg"));
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "not a directory: /srv/cam1.jpg");
    }

    #[test]
    fn test_watch_error_unstable_is_recoverable() {
        let err = WatchError::Unstable {
            path: Utf8PathBuf::from("/srv/cam1/big.jpg"),
            waited: Duration::from_secs(5),
        };
        assert!(err.is_recoverable());
        assert_eq!(err.path().map(|p| p.as_str()), Some("/srv/cam1/big.jpg"));
    }

    #[test]
    fn test_watch_error_stat() {
        let err = WatchError::stat(
            "/srv/cam1/gone.jpg",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("gone.jpg"));
    }

    #[test]
    fn test_watch_error_cancelled_and_closed_are_fatal() {
        assert!(WatchError::Cancelled.is_fatal());
        assert!(WatchError::ChannelClosed.is_fatal());
        assert!(WatchError::ChannelClosed.path().is_none());
    }

    #[test]
    fn test_watch_error_invalid_pattern() {
        let source = regex::Regex::new("(").expect_err("unbalanced paren");
        let err = WatchError::InvalidPattern {
            pattern: "(".to_owned(),
            source,
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("invalid name pattern"));
    }
}
