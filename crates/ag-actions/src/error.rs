//! Error types for the ag-actions crate.

use camino::Utf8PathBuf;

/// Errors that can occur while building or invoking an action.
///
/// A failed notification never affects routing: the caller logs the error
/// and moves on to the next file.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The image to attach could not be read.
    #[error("failed to read attachment {path}: {source}")]
    Attachment {
        /// The image that couldn't be read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The request could not be sent or its response not read.
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("notification rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned by the service.
        body: String,
    },
}

impl ActionError {
    /// Creates a new [`ActionError::Attachment`] error.
    #[inline]
    pub fn attachment(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Attachment {
            path: path.into(),
            source,
        }
    }
}
