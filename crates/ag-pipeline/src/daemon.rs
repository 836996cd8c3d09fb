//! Wiring and supervision.
//!
//! [`Daemon::start`] turns a validated [`Config`] into running parts: one
//! [`Processor`] per routed directory, the bounded queue, the detection
//! worker task, and one [`DirectoryWatcher`] per usable directory.
//! [`Daemon::run`] then supervises them until the shutdown token fires and
//! tears them down in order: watchers, sentinel, worker.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use ag_actions::ActionRegistry;
use ag_core::{Config, FxHashMap};
use ag_watcher::{DirectoryWatcher, StabilityPolicy, WatchOptions, filter_for};

use crate::detector::Detector;
use crate::error::PipelineError;
use crate::metadata::MetadataWriter;
use crate::processor::Processor;
use crate::queue::{self, QueueSender};
use crate::worker::{DetectionWorker, WorkerReport};

/// The running daemon.
pub struct Daemon {
    watchers: Vec<DirectoryWatcher>,
    queue: QueueSender,
    worker: JoinHandle<WorkerReport>,
    shutdown: CancellationToken,
    heartbeat: Duration,
}

impl Daemon {
    /// Builds and starts every part of the pipeline.
    ///
    /// Must be called from within a tokio runtime. Directories with a bad
    /// path or pattern are logged and skipped; directories whose processor
    /// is missing are still watched and detected, but their files stay in
    /// place.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Action`] if a processor-local action can't
    /// be built.
    pub fn start<D>(
        config: &Config,
        detector: D,
        metadata: Arc<dyn MetadataWriter>,
        registry: &ActionRegistry,
        shutdown: CancellationToken,
    ) -> Result<Self, PipelineError>
    where
        D: Detector + 'static,
    {
        let processors = build_processors(config, &metadata, registry)?;

        let (queue, receiver) = queue::bounded(config.queue.capacity);
        let worker = DetectionWorker::new(detector, receiver, processors, config.throttle_capacity);
        let worker = tokio::spawn(worker.run());

        let stability = StabilityPolicy::from(&config.stability);
        let mut watchers = Vec::with_capacity(config.directories.len());
        for (name, directory) in &config.directories {
            let filter = match filter_for(directory.regexp.as_deref()) {
                Ok(filter) => filter,
                Err(error) => {
                    tracing::error!(directory = %name, error = %error, "Invalid pattern, directory disabled");
                    continue;
                }
            };

            let options = WatchOptions::new(name.as_str(), directory.path.clone())
                .process_existing(directory.process_first)
                .with_stability(stability);
            match DirectoryWatcher::start(options, filter, queue.clone(), &shutdown) {
                Ok(watcher) => watchers.push(watcher),
                Err(error) => {
                    tracing::error!(
                        directory = %name,
                        path = %directory.path,
                        error = %error,
                        "Cannot watch directory, skipping"
                    );
                }
            }
        }

        if watchers.is_empty() {
            tracing::warn!("No directory is being watched");
        }

        Ok(Self {
            watchers,
            queue,
            worker,
            shutdown,
            heartbeat: config.heartbeat_interval(),
        })
    }

    /// Number of watchers that started.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Supervises until the shutdown token is cancelled, then stops
    /// everything and returns the worker's report.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Worker`] if the worker task panicked.
    pub async fn run(self) -> Result<WorkerReport, PipelineError> {
        let Self {
            watchers,
            queue,
            mut worker,
            shutdown,
            heartbeat,
        } = self;

        tracing::info!(watchers = watchers.len(), "aiguard started");

        let mut ticker = tokio::time::interval(heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => break,

                result = &mut worker => {
                    tracing::error!("Detection worker exited unexpectedly, shutting down");
                    shutdown.cancel();
                    stop_watchers(watchers).await;
                    return result.map_err(PipelineError::from);
                }

                _ = ticker.tick() => {
                    let live = watchers.iter().filter(|w| w.is_running()).count();
                    tracing::info!(
                        queue_depth = queue.depth(),
                        watchers = live,
                        "Heartbeat"
                    );
                }
            }
        }

        tracing::info!("Shutting down");
        stop_watchers(watchers).await;

        queue.send_shutdown();
        drop(queue);

        let report = worker.await?;
        tracing::info!("aiguard stopped");
        Ok(report)
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("watchers", &self.watchers.len())
            .field("queue_depth", &self.queue.depth())
            .field("heartbeat", &self.heartbeat)
            .finish_non_exhaustive()
    }
}

fn build_processors(
    config: &Config,
    metadata: &Arc<dyn MetadataWriter>,
    registry: &ActionRegistry,
) -> Result<FxHashMap<String, Processor>, PipelineError> {
    let mut processors = FxHashMap::default();

    for (name, directory) in &config.directories {
        let Some(processor_name) = directory.processor.as_deref() else {
            tracing::warn!(directory = %name, "No processor configured, files will stay in place");
            continue;
        };
        let Some(processor) = config.processors.get(processor_name) else {
            tracing::warn!(
                directory = %name,
                processor = %processor_name,
                "Unknown processor, files will stay in place"
            );
            continue;
        };

        let actions = registry.with_overrides(&processor.actions)?;
        processors.insert(
            name.clone(),
            Processor::new(
                processor_name,
                processor.classes.clone(),
                actions,
                Arc::clone(metadata),
            ),
        );
    }

    Ok(processors)
}

async fn stop_watchers(watchers: Vec<DirectoryWatcher>) {
    for watcher in watchers {
        let name = watcher.name().to_owned();
        if let Err(error) = watcher.shutdown().await {
            tracing::warn!(directory = %name, error = %error, "Watcher stopped with an error");
        }
    }
}
