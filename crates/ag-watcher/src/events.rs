//! Ready-file events and the sink they are delivered to.
//!
//! # Event Flow
//!
//! ```text
//! notify Create event / startup scan
//!        │
//!        ▼
//!   FileFilter (name pattern)
//!        │
//!        ▼
//!   stability wait (size polling)
//!        │
//!        ▼
//!   ReadyFile ──► FileSink::deliver (may block: backpressure)
//! ```


use camino::{Utf8Path, Utf8PathBuf};
use tokio::sync::mpsc;

use crate::error::WatchError;

/// Why a file entered the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileOrigin {
    /// A creation event was observed while watching.
    Created,
    /// The file was already present when the watcher started.
    Existing,
}

/// A file whose size has stopped changing.
///
/// # Examples
///
/// ```
/// use ag_watcher::{FileOrigin, ReadyFile};
/// use camino::Utf8PathBuf;
///
/// let file = ReadyFile::new("cam1", Utf8PathBuf::from("/srv/cam1/img1.jpg"), 1024, FileOrigin::Created);
/// assert_eq!(file.file_name(), Some("img1.jpg"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyFile {
    /// Name of the configured directory the file was found in.
    pub directory: String,

    /// Absolute path of the file.
    pub path: Utf8PathBuf,

    /// Size in bytes at the time it was considered stable.
    pub size: u64,

    /// How the file was discovered.
    pub origin: FileOrigin,
}

impl ReadyFile {
    /// Creates a ready file.
    #[must_use]
    pub fn new(
        directory: impl Into<String>,
        path: Utf8PathBuf,
        size: u64,
        origin: FileOrigin,
    ) -> Self {
        Self {
            directory: directory.into(),
            path,
            size,
            origin,
        }
    }

    /// Returns the file name without the directory path.
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()
    }

    /// Returns the file path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// Destination for ready files.
///
/// `deliver` is called from the watcher's blocking thread and may block until
/// the consumer has room. Returning [`WatchError::ChannelClosed`] stops the
/// watcher.
pub trait FileSink: Send + 'static {
    /// Hands one ready file downstream.
    fn deliver(&self, file: ReadyFile) -> Result<(), WatchError>;
}

impl FileSink for std::sync::mpsc::Sender<ReadyFile> {
    fn deliver(&self, file: ReadyFile) -> Result<(), WatchError> {
        self.send(file).map_err(|_| WatchError::ChannelClosed)
    }
}

impl FileSink for mpsc::Sender<ReadyFile> {
    fn deliver(&self, file: ReadyFile) -> Result<(), WatchError> {
        self.blocking_send(file).map_err(|_| WatchError::ChannelClosed)
    }
}
