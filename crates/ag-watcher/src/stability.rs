//! Size-polling stability detection.
//!
//! A writer is assumed to be finished once two consecutive size reads, one
//! poll interval apart, return the same value. This is a heuristic: a writer
//! that pauses for longer than the interval is mistaken for finished.

use std::time::{Duration, Instant};

use camino::Utf8Path;
use tokio_util::sync::CancellationToken;

use ag_core::StabilityConfig;

use crate::error::WatchError;

/// Polling parameters for [`wait_until_stable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityPolicy {
    /// Delay between two size reads.
    pub poll_interval: Duration,

    /// Upper bound on the total wait. `None` waits forever.
    pub max_wait: Option<Duration>,
}

impl StabilityPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(poll_interval: Duration, max_wait: Option<Duration>) -> Self {
        Self {
            poll_interval,
            max_wait,
        }
    }
}

impl From<&StabilityConfig> for StabilityPolicy {
    fn from(config: &StabilityConfig) -> Self {
        Self::new(config.poll_interval(), config.max_wait())
    }
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self::from(&StabilityConfig::default())
    }
}

/// Blocks until `path` stops growing and returns its final size.
///
/// Must run on a thread that may block; the watcher calls it from its
/// `spawn_blocking` task. Cancellation is checked before every sleep.
///
/// # Errors
///
/// - [`WatchError::Stat`] if the size can't be read (the file was removed)
/// - [`WatchError::Unstable`] if `max_wait` elapsed first
/// - [`WatchError::Cancelled`] if `cancel` fired
pub fn wait_until_stable(
    path: &Utf8Path,
    policy: StabilityPolicy,
    cancel: &CancellationToken,
) -> Result<u64, WatchError> {
    let started = Instant::now();
    let mut previous: Option<u64> = None;

    loop {
        let size = std::fs::metadata(path)
            .map_err(|source| WatchError::stat(path, source))?
            .len();

        if previous == Some(size) {
            tracing::trace!(path = %path, size, waited = ?started.elapsed(), "File is stable");
            return Ok(size);
        }
        previous = Some(size);

        let waited = started.elapsed();
        if policy.max_wait.is_some_and(|max| waited >= max) {
            return Err(WatchError::Unstable {
                path: path.to_owned(),
                waited,
            });
        }

        if cancel.is_cancelled() {
            return Err(WatchError::Cancelled);
        }
        std::thread::sleep(policy.poll_interval);
    }
}
