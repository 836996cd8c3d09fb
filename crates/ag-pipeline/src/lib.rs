//! Ingestion queue, detection worker, and class-rule routing for aiguard.
//!
//! # Data flow
//!
//! ```text
//! DirectoryWatcher ─┐
//! DirectoryWatcher ─┼─► queue (bounded) ─► DetectionWorker ─► Detector
//! DirectoryWatcher ─┘                            │
//!                                                ▼
//!                                   Processor: rules ─► move files
//!                                              metadata, throttle ─► Action
//! ```
//!
//! - [`queue`]: the bounded hand-off between watcher threads and the worker,
//!   with an out-of-band termination sentinel.
//! - [`worker`]: the single consumer that owns the detector and throttle state.
//! - [`detector`]: the [`Detector`] capability and its child-process implementation.
//! - [`rules`], [`throttle`], [`metadata`], [`processor`]: what happens to a
//!   file once its detections are known.
//! - [`daemon`] and [`shutdown`]: wiring, supervision, and signal handling.
//!
//! # Error handling
//!
//! Per-file failures are logged and the file is skipped; nothing short of a
//! panic in the worker ends the pipeline.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod daemon;
pub mod detector;
pub mod error;
pub mod metadata;
pub mod processor;
pub mod queue;
pub mod rules;
pub mod shutdown;
pub mod throttle;
pub mod worker;

pub use daemon::Daemon;
pub use detector::{Detector, ProcessDetector};
pub use error::{DetectError, MetadataError, PipelineError, ProcessError, QueueError};
pub use metadata::{ImageCommentWriter, MetadataWriter, detections_payload, read_comment};
pub use processor::{NotificationOutcome, Outcome, Processor};
pub use queue::{QueueItem, QueueReceiver, QueueSender};
pub use rules::{RuleMatch, first_match};
pub use shutdown::install_signal_handlers;
pub use throttle::{ThrottleState, ThrottleVerdict};
pub use worker::{DetectionWorker, WorkerReport};
