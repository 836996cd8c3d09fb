//! Error types for the ag-pipeline crate.
//!
//! Every error except [`PipelineError`] is scoped to a single file: the
//! worker logs it and continues with the next item.

use camino::Utf8PathBuf;

use ag_watcher::ReadyFile;

/// Errors from the detector capability.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// The detector process could not be started.
    #[error("failed to start detector '{program}': {source}")]
    Spawn {
        /// Program from the configuration.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing the request or reading the reply failed.
    #[error("detector I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The detector closed its output before replying.
    #[error("detector exited before replying")]
    Exited,

    /// The reply was not valid protocol JSON.
    #[error("invalid detector reply '{line}': {source}")]
    Protocol {
        /// The offending line, trimmed.
        line: String,
        /// The parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The detector reported a failure for this input.
    #[error("detector rejected input: {0}")]
    Rejected(String),

    /// The reply named an annotated image that doesn't exist.
    #[error("annotated output missing: {0}")]
    MissingOutput(Utf8PathBuf),
}

/// Errors while carrying out a rule's outcome.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// A file could not be moved into its target directory.
    #[error("failed to move {from} to {to}: {source}")]
    Move {
        /// Source path.
        from: Utf8PathBuf,
        /// Destination directory.
        to: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The annotated copy could not be deleted.
    #[error("failed to remove {path}: {source}")]
    Remove {
        /// The file that couldn't be removed.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors from embedding detections into image metadata.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The file is neither JPEG nor PNG.
    #[error("unsupported image format: {0}")]
    Unsupported(Utf8PathBuf),

    /// Reading or writing the image failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// The image path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The container couldn't be parsed or the payload doesn't fit.
    #[error("failed to update metadata in {path}: {reason}")]
    Codec {
        /// The image path.
        path: Utf8PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The detections couldn't be serialized.
    #[error("failed to serialize detections: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl MetadataError {
    /// Creates a new [`MetadataError::Io`] error.
    #[inline]
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`MetadataError::Codec`] error.
    #[inline]
    pub fn codec(path: impl Into<Utf8PathBuf>, reason: impl Into<String>) -> Self {
        Self::Codec {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A file could not be put on the ingestion queue.
///
/// The file is handed back to the caller.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue is at capacity.
    #[error("ingestion queue is full")]
    Full(ReadyFile),

    /// The worker has stopped accepting files.
    #[error("ingestion queue is closed")]
    Closed(ReadyFile),
}

impl QueueError {
    /// Returns the file that was not enqueued.
    #[must_use]
    pub fn into_file(self) -> ReadyFile {
        match self {
            Self::Full(file) | Self::Closed(file) => file,
        }
    }
}

/// Errors that stop the daemon from starting or finishing cleanly.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// An action backend could not be built.
    #[error(transparent)]
    Action(#[from] ag_actions::ActionError),

    /// The detection worker task panicked or was aborted.
    #[error("detection worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use ag_watcher::FileOrigin;

    #[test]
    fn test_queue_error_returns_file() {
        let file = ReadyFile::new("cam1", Utf8PathBuf::from("/srv/cam1/a.jpg"), 1, FileOrigin::Created);
        let err = QueueError::Full(file);
        assert_eq!(err.to_string(), "ingestion queue is full");
        assert_eq!(err.into_file().path.as_str(), "/srv/cam1/a.jpg");
    }

    #[test]
    fn test_metadata_error_helpers() {
        let err = MetadataError::codec("/srv/a.jpg", "comment too long");
        assert_eq!(
            err.to_string(),
            "failed to update metadata in /srv/a.jpg: comment too long"
        );
    }
}
