//! Directory watching with stability detection.
//!
//! This crate turns filesystem creation events into [`ReadyFile`]s: files
//! that matched their directory's name pattern and whose size stopped
//! changing. Each configured directory gets its own [`DirectoryWatcher`]
//! running on a blocking thread.
//!
//! # Overview
//!
//! - Watch a directory non-recursively for created files
//! - Optionally feed files already present at startup through the same path
//! - Skip names that don't match the directory's regular expression
//! - Poll the size until two consecutive reads agree
//! - Hand the file to a [`FileSink`], blocking while the sink is full
//!
//! # Crate Dependencies
//!
//! ```text
//! ag-cli ──► ag-pipeline ──► ag-watcher ──► ag-core
//!                        └─► ag-actions ──►
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use ag_watcher::{DirectoryWatcher, PatternFilter, ReadyFile, WatchOptions};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), ag_watcher::WatchError> {
//! let shutdown = CancellationToken::new();
//! let (tx, mut rx) = mpsc::channel::<ReadyFile>(16);
//!
//! let watcher = DirectoryWatcher::start(
//!     WatchOptions::new("cam1", "/srv/cam1"),
//!     PatternFilter::new(r".*\.jpg$")?,
//!     tx,
//!     &shutdown,
//! )?;
//!
//! while let Some(file) = rx.recv().await {
//!     println!("ready: {} ({} bytes)", file.path, file.size);
//! }
//!
//! watcher.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Startup problems come back from [`DirectoryWatcher::start`]. Per-file
//! problems (a file removed mid-wait, a file that never settles) are logged
//! on the watcher thread and the file is skipped; see
//! [`WatchError::is_recoverable`].

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod filter;
pub mod stability;
pub mod watcher;

// Re-export error types
pub use error::WatchError;

// Re-export event types
pub use events::{FileOrigin, FileSink, ReadyFile};

// Re-export filter types
pub use filter::{AcceptAllFilter, FileFilter, PatternFilter, filter_for};

// Re-export stability types
pub use stability::{StabilityPolicy, wait_until_stable};

// Re-export watcher types
pub use watcher::{DirectoryWatcher, WatchOptions};
