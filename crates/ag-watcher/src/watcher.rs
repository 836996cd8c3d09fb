//! Directory watcher that emits stable files.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                 Blocking Thread (spawn_blocking)                  │
//! │  ┌───────────────────┐   std mpsc   ┌──────────────────────────┐  │
//! │  │ RecommendedWatcher│ ──────────►  │ filter → stability wait  │  │
//! │  │ (Create events)   │   (paths)    │  → FileSink::deliver     │  │
//! │  └───────────────────┘              └────────────┬─────────────┘  │
//! └──────────────────────────────────────────────────│────────────────┘
//!                                                    │ blocks when full
//!                                                    ▼
//!                                         ingestion queue (bounded)
//! ```
//!
//! One watcher runs per configured directory. The stability wait blocks only
//! that directory's thread; files created meanwhile wait their turn in the
//! event channel.

use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use notify::event::CreateKind;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::WatchError;
use crate::events::{FileOrigin, FileSink, ReadyFile};
use crate::filter::FileFilter;
use crate::stability::{StabilityPolicy, wait_until_stable};

/// How often the event loop checks for cancellation while idle.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settings for one [`DirectoryWatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    /// Configured directory name, copied into every [`ReadyFile`].
    pub name: String,

    /// Directory to watch (non-recursively).
    pub path: Utf8PathBuf,

    /// Feed files already present at startup through the pipeline.
    pub process_existing: bool,

    /// Stability wait parameters.
    pub stability: StabilityPolicy,
}

impl WatchOptions {
    /// Creates options with the default stability policy.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            process_existing: true,
            stability: StabilityPolicy::default(),
        }
    }

    /// Sets whether existing files are processed at startup.
    #[must_use]
    pub const fn process_existing(mut self, enabled: bool) -> Self {
        self.process_existing = enabled;
        self
    }

    /// Sets the stability policy.
    #[must_use]
    pub const fn with_stability(mut self, stability: StabilityPolicy) -> Self {
        self.stability = stability;
        self
    }
}

/// Watches one directory and delivers files once they are fully written.
///
/// # Lifecycle
///
/// 1. **Start**: [`DirectoryWatcher::start`] validates the directory,
///    registers the notify watch, and spawns the blocking event loop.
/// 2. **Run**: the loop optionally scans existing files, then handles
///    creation events until cancelled or until the sink closes.
/// 3. **Shutdown**: [`DirectoryWatcher::shutdown`] cancels the loop and
///    awaits it. Dropping the watcher cancels without waiting.
pub struct DirectoryWatcher {
    /// Configured directory name.
    name: String,

    /// Canonical path being watched.
    watch_path: Utf8PathBuf,

    /// Cancels this watcher only; a child of the process-wide token.
    cancel: CancellationToken,

    /// Handle to the blocking event loop.
    task_handle: Option<JoinHandle<Result<(), WatchError>>>,
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("name", &self.name)
            .field("watch_path", &self.watch_path)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl DirectoryWatcher {
    /// Starts watching a directory.
    ///
    /// Must be called from within a tokio runtime. `shutdown` is the
    /// process-wide token; the watcher derives a child token from it.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::PathNotFound`] or [`WatchError::NotADirectory`]
    /// for a bad path, and [`WatchError::Notify`] if the OS watch can't be
    /// registered.
    pub fn start<F: FileFilter, S: FileSink>(
        options: WatchOptions,
        filter: F,
        sink: S,
        shutdown: &CancellationToken,
    ) -> Result<Self, WatchError> {
        if !options.path.exists() {
            return Err(WatchError::path_not_found(options.path));
        }
        if !options.path.is_dir() {
            return Err(WatchError::NotADirectory(options.path));
        }
        let watch_path = options.path.canonicalize_utf8()?;

        let (event_tx, event_rx) = std_mpsc::channel::<PathBuf>();
        let mut watcher = notify::recommended_watcher(
            move |result: notify::Result<Event>| match result {
                Ok(event) if is_file_creation(event.kind) => {
                    for path in event.paths {
                        if event_tx.send(path).is_err() {
                            break;
                        }
                    }
                }
                Ok(_) => {}
                Err(error) => tracing::warn!(error = %error, "Watcher error"),
            },
        )?;
        watcher.watch(watch_path.as_std_path(), RecursiveMode::NonRecursive)?;

        let cancel = shutdown.child_token();
        let event_loop = EventLoop {
            directory: options.name.clone(),
            path: watch_path.clone(),
            filter,
            sink,
            stability: options.stability,
            cancel: cancel.clone(),
        };
        let process_existing = options.process_existing;

        tracing::info!(directory = %options.name, path = %watch_path, "Start monitoring");

        let task_handle = tokio::task::spawn_blocking(move || {
            // The notify watcher lives as long as the loop.
            let _watcher = watcher;
            event_loop.run(&event_rx, process_existing)
        });

        Ok(Self {
            name: options.name,
            watch_path,
            cancel,
            task_handle: Some(task_handle),
        })
    }

    /// Returns the configured directory name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the canonical path being watched.
    #[must_use]
    pub fn watch_path(&self) -> &Utf8Path {
        &self.watch_path
    }

    /// Returns `true` while the event loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the watcher and waits for its thread to finish.
    ///
    /// A stability wait in progress is abandoned at its next poll.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the loop early, if any, or
    /// [`WatchError::ChannelClosed`] if the thread panicked.
    pub async fn shutdown(mut self) -> Result<(), WatchError> {
        self.cancel.cancel();

        if let Some(handle) = self.task_handle.take() {
            match handle.await {
                Ok(result) => result?,
                Err(_join_error) => return Err(WatchError::ChannelClosed),
            }
        }

        tracing::info!(directory = %self.name, path = %self.watch_path, "Stop monitoring");
        Ok(())
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        // The blocking loop notices within one poll interval.
        self.cancel.cancel();
    }
}

fn is_file_creation(kind: EventKind) -> bool {
    matches!(kind, EventKind::Create(create) if create != CreateKind::Folder)
}

/// State owned by the blocking thread.
struct EventLoop<F, S> {
    directory: String,
    path: Utf8PathBuf,
    filter: F,
    sink: S,
    stability: StabilityPolicy,
    cancel: CancellationToken,
}

impl<F: FileFilter, S: FileSink> EventLoop<F, S> {
    fn run(
        &self,
        events: &std_mpsc::Receiver<PathBuf>,
        process_existing: bool,
    ) -> Result<(), WatchError> {
        let result = self.run_inner(events, process_existing);
        match result {
            Err(WatchError::Cancelled) => Ok(()),
            other => other,
        }
    }

    fn run_inner(
        &self,
        events: &std_mpsc::Receiver<PathBuf>,
        process_existing: bool,
    ) -> Result<(), WatchError> {
        if process_existing {
            self.scan_existing()?;
        }

        while !self.cancel.is_cancelled() {
            match events.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(path) => self.handle(path, FileOrigin::Created)?,
                Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                    tracing::debug!(directory = %self.directory, "Notify channel closed");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Feeds files already in the directory through the pipeline, in the
    /// order the filesystem lists them.
    fn scan_existing(&self) -> Result<(), WatchError> {
        let entries = match std::fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(
                    directory = %self.directory,
                    error = %error,
                    "Failed to list existing files"
                );
                return Ok(());
            }
        };

        let mut count = 0usize;
        for entry in entries {
            if self.cancel.is_cancelled() {
                return Err(WatchError::Cancelled);
            }
            match entry {
                Ok(entry) => {
                    self.handle(entry.path(), FileOrigin::Existing)?;
                    count += 1;
                }
                Err(error) => tracing::warn!(error = %error, "Skipping unreadable entry"),
            }
        }

        tracing::debug!(directory = %self.directory, entries = count, "Startup scan finished");
        Ok(())
    }

    /// Filters, stabilizes, and delivers one candidate.
    ///
    /// Per-file problems are logged here; only errors that end the loop are
    /// returned.
    fn handle(&self, path: PathBuf, origin: FileOrigin) -> Result<(), WatchError> {
        match self.try_handle(path, origin) {
            Err(error) if error.is_recoverable() => {
                tracing::warn!(directory = %self.directory, error = %error, "Abandoning file");
                Ok(())
            }
            other => other,
        }
    }

    fn try_handle(&self, path: PathBuf, origin: FileOrigin) -> Result<(), WatchError> {
        let path = Utf8PathBuf::try_from(path)
            .map_err(|e| WatchError::NonUtf8Path(e.into_path_buf()))?;

        if !self.filter.should_process(&path) {
            tracing::trace!(path = %path, "Filtered out");
            return Ok(());
        }
        if !path.is_file() {
            tracing::trace!(path = %path, "Not a regular file");
            return Ok(());
        }

        tracing::debug!(directory = %self.directory, path = %path, ?origin, "Waiting for file to settle");

        let size = wait_until_stable(&path, self.stability, &self.cancel)?;
        tracing::info!(directory = %self.directory, path = %path, size, "Processing new file");
        self.sink
            .deliver(ReadyFile::new(self.directory.clone(), path, size, origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{AcceptAllFilter, PatternFilter};
    use std::fs;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp path")
    }

    fn fast_options(dir: &TempDir) -> WatchOptions {
        WatchOptions::new("test", utf8_dir(dir))
            .with_stability(StabilityPolicy::new(Duration::from_millis(20), None))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watcher_path_not_found() {
        let (tx, _rx) = mpsc::channel(4);
        let options = WatchOptions::new("missing", "/nonexistent/path/that/does/not/exist");

        let result = DirectoryWatcher::start(options, AcceptAllFilter, tx, &CancellationToken::new());
        assert!(matches!(result, Err(WatchError::PathNotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watcher_rejects_file_path() {
        let dir = TempDir::new().expect("tempdir");
        let file = utf8_dir(&dir).join("plain.jpg");
        fs::write(&file, b"x").expect("write file");

        let (tx, _rx) = mpsc::channel(4);
        let result = DirectoryWatcher::start(
            WatchOptions::new("file", file),
            AcceptAllFilter,
            tx,
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(WatchError::NotADirectory(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_startup_scan_delivers_matching_files() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("a.jpg"), b"jpeg").expect("write a.jpg");
        fs::write(dir.path().join("notes.txt"), b"text").expect("write notes.txt");
        fs::create_dir(dir.path().join("sub.jpg")).expect("create dir");

        let (tx, mut rx) = mpsc::channel(4);
        let filter = PatternFilter::new(r"\.jpg$").expect("valid pattern");
        let watcher =
            DirectoryWatcher::start(fast_options(&dir), filter, tx, &CancellationToken::new())
                .expect("watcher starts");

        let file = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("delivered in time")
            .expect("channel open");
        assert_eq!(file.file_name(), Some("a.jpg"));
        assert_eq!(file.origin, FileOrigin::Existing);
        assert_eq!(file.directory, "test");
        assert_eq!(file.size, 4);

        // Neither the text file nor the directory qualifies.
        let extra = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(extra.is_err());

        watcher.shutdown().await.expect("clean shutdown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_startup_scan_can_be_disabled() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("old.jpg"), b"jpeg").expect("write old.jpg");

        let (tx, mut rx) = mpsc::channel(4);
        let watcher = DirectoryWatcher::start(
            fast_options(&dir).process_existing(false),
            AcceptAllFilter,
            tx,
            &CancellationToken::new(),
        )
        .expect("watcher starts");

        let got = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(got.is_err());

        watcher.shutdown().await.expect("clean shutdown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watcher_delivers_created_file() {
        let dir = TempDir::new().expect("tempdir");
        let (tx, mut rx) = mpsc::channel(4);
        let watcher = DirectoryWatcher::start(
            fast_options(&dir).process_existing(false),
            AcceptAllFilter,
            tx,
            &CancellationToken::new(),
        )
        .expect("watcher starts");

        fs::write(dir.path().join("img1.jpg"), b"fresh image").expect("write image");

        let file = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("delivered in time")
            .expect("channel open");
        assert_eq!(file.file_name(), Some("img1.jpg"));
        assert_eq!(file.origin, FileOrigin::Created);
        assert_eq!(file.size, 11);

        watcher.shutdown().await.expect("clean shutdown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parent_token_stops_watcher() {
        let dir = TempDir::new().expect("tempdir");
        let (tx, _rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let watcher = DirectoryWatcher::start(fast_options(&dir), AcceptAllFilter, tx, &shutdown)
            .expect("watcher starts");
        assert!(watcher.is_running());
        assert_eq!(watcher.name(), "test");
        assert!(!watcher.watch_path().as_str().is_empty());

        shutdown.cancel();
        assert!(!watcher.is_running());
        tokio::time::timeout(Duration::from_secs(2), watcher.shutdown())
            .await
            .expect("stops promptly")
            .expect("clean shutdown");
    }

    #[test]
    fn test_only_file_creations_are_candidates() {
        assert!(is_file_creation(EventKind::Create(CreateKind::File)));
        assert!(is_file_creation(EventKind::Create(CreateKind::Any)));
        assert!(!is_file_creation(EventKind::Create(CreateKind::Folder)));
        assert!(!is_file_creation(EventKind::Remove(
            notify::event::RemoveKind::File
        )));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_is_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (tx, rx) = std::sync::mpsc::channel::<ReadyFile>();
        let event_loop = EventLoop {
            directory: "test".to_owned(),
            path: Utf8PathBuf::from("/srv/cam1"),
            filter: AcceptAllFilter,
            sink: tx,
            stability: StabilityPolicy::default(),
            cancel: CancellationToken::new(),
        };
        let path = PathBuf::from(OsStr::from_bytes(b"/srv/cam1/\xff.jpg"));

        assert!(matches!(
            event_loop.try_handle(path.clone(), FileOrigin::Created),
            Err(WatchError::NonUtf8Path(_))
        ));
        event_loop
            .handle(path, FileOrigin::Created)
            .expect("skipped without stopping the loop");
        assert!(rx.try_recv().is_err());
    }
}
