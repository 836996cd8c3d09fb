//! The single detection worker.
//!
//! The worker is the only consumer of the ingestion queue, the only caller
//! of the [`Detector`], and the only owner of the [`ThrottleState`]. Each
//! file is handled to completion before the next one is dequeued.

use ag_core::FxHashMap;
use ag_watcher::ReadyFile;

use crate::detector::Detector;
use crate::processor::{Outcome, Processor};
use crate::queue::{QueueItem, QueueReceiver};
use crate::throttle::ThrottleState;

/// Counters reported when the worker exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Files handed to a processor, matched or not.
    pub processed: usize,
    /// Processed files no rule matched.
    pub unmatched: usize,
    /// Files abandoned because detection failed.
    pub detection_failures: usize,
    /// Detected files whose directory has no processor.
    pub unrouted: usize,
    /// Files whose routing failed while moving.
    pub routing_failures: usize,
    /// Files still queued when the sentinel arrived.
    pub discarded: usize,
}

/// Detection worker state.
pub struct DetectionWorker<D> {
    detector: D,
    processors: FxHashMap<String, Processor>,
    throttle: ThrottleState,
    queue: QueueReceiver,
}

impl<D: Detector> DetectionWorker<D> {
    /// Creates a worker.
    ///
    /// `processors` is keyed by configured directory name.
    #[must_use]
    pub fn new(
        detector: D,
        queue: QueueReceiver,
        processors: FxHashMap<String, Processor>,
        throttle_capacity: usize,
    ) -> Self {
        Self {
            detector,
            processors,
            throttle: ThrottleState::new(throttle_capacity),
            queue,
        }
    }

    /// Runs until the sentinel arrives or every producer is gone.
    pub async fn run(mut self) -> WorkerReport {
        let mut report = WorkerReport::default();
        tracing::info!(processors = self.processors.len(), "Detection worker started");

        while let Some(item) = self.queue.next().await {
            match item {
                QueueItem::File(file) => self.handle(file, &mut report).await,
                QueueItem::Shutdown => {
                    report.discarded = self.queue.discard_pending();
                    tracing::info!(discarded = report.discarded, "Termination sentinel received");
                    break;
                }
            }
        }

        tracing::info!(
            processed = report.processed,
            detection_failures = report.detection_failures,
            discarded = report.discarded,
            "Detection worker stopped"
        );
        report
    }

    async fn handle(&mut self, file: ReadyFile, report: &mut WorkerReport) {
        let output = match self.detector.detect(&file.path).await {
            Ok(output) => output,
            Err(error) => {
                tracing::error!(path = %file.path, error = %error, "Detection failed, abandoning file");
                report.detection_failures += 1;
                return;
            }
        };

        let Some(processor) = self.processors.get(&file.directory) else {
            tracing::warn!(
                directory = %file.directory,
                path = %file.path,
                "No processor for directory, leaving file in place"
            );
            report.unrouted += 1;
            return;
        };

        match processor
            .process(&file.path, &output.annotated, &output.detections, &mut self.throttle)
            .await
        {
            Ok(outcome) => {
                report.processed += 1;
                if outcome == Outcome::Unmatched {
                    report.unmatched += 1;
                }
                tracing::debug!(path = %file.path, ?outcome, "File processed");
            }
            Err(error) => {
                tracing::error!(path = %file.path, error = %error, "Routing failed");
                report.routing_failures += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ag_actions::ActionRegistry;
    use ag_core::{BoundingBox, ClassRule, Detection, DetectionOutput, RuleMode};
    use ag_watcher::FileOrigin;
    use async_trait::async_trait;
    use camino::{Utf8Path, Utf8PathBuf};
    use tempfile::TempDir;

    use crate::error::{DetectError, MetadataError};
    use crate::metadata::MetadataWriter;
    use crate::queue::{self, QueueSender};

    /// Writes `<stem>_out.jpg` next to the input and reports a cat for any
    /// file whose name contains "cat". Files named `broken*` fail.
    struct FakeDetector;

    #[async_trait]
    impl Detector for FakeDetector {
        async fn detect(&mut self, input: &Utf8Path) -> Result<DetectionOutput, DetectError> {
            let stem = input.file_stem().unwrap_or_default();
            if stem.starts_with("broken") {
                return Err(DetectError::Rejected("unreadable image".to_owned()));
            }

            let annotated = input.with_file_name(format!("{stem}_out.jpg"));
            std::fs::copy(input, &annotated)?;
            let detections = if stem.contains("cat") {
                vec![Detection::new("cat", 0.9, BoundingBox::new(10.0, 10.0, 50.0, 50.0))]
            } else {
                Vec::new()
            };
            Ok(DetectionOutput {
                annotated,
                detections,
            })
        }
    }

    struct NoMetadata;

    impl MetadataWriter for NoMetadata {
        fn write_comment(&self, _path: &Utf8Path, _payload: &str) -> Result<(), MetadataError> {
            Ok(())
        }
    }

    fn rule(name: &str, mode: RuleMode, keys: &[&str]) -> ClassRule {
        ClassRule {
            name: name.to_owned(),
            mode,
            keys: keys.iter().map(|k| (*k).to_owned()).collect(),
            action: None,
            throttle: None,
        }
    }

    struct Setup {
        _dir: TempDir,
        root: Utf8PathBuf,
        tx: QueueSender,
        worker: DetectionWorker<FakeDetector>,
    }

    fn setup(rules: Vec<ClassRule>) -> Setup {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8");
        let (tx, rx) = queue::bounded(8);

        let mut processors = FxHashMap::default();
        processors.insert(
            "cam1".to_owned(),
            Processor::new("default", rules, ActionRegistry::new(), Arc::new(NoMetadata)),
        );
        let worker = DetectionWorker::new(FakeDetector, rx, processors, 16);
        Setup {
            _dir: dir,
            root,
            tx,
            worker,
        }
    }

    fn ready(root: &Utf8Path, directory: &str, name: &str) -> ReadyFile {
        let path = root.join(name);
        std::fs::write(&path, b"jpeg").expect("write image");
        ReadyFile::new(directory, path, 4, FileOrigin::Created)
    }

    #[tokio::test]
    async fn test_worker_routes_until_senders_close() {
        let s = setup(vec![
            rule("empty", RuleMode::Empty, &[]),
            rule("cat", RuleMode::Any, &["cat"]),
        ]);
        s.tx.enqueue(ready(&s.root, "cam1", "cat1.jpg")).await.expect("room");
        s.tx.enqueue(ready(&s.root, "cam1", "yard.jpg")).await.expect("room");
        drop(s.tx);

        let report = s.worker.run().await;
        assert_eq!(report.processed, 2);
        assert_eq!(report.unmatched, 0);

        assert!(s.root.join("cat/cat1_out.jpg").exists());
        assert!(s.root.join("cat/src/cat1.jpg").exists());
        assert!(s.root.join("empty/yard.jpg").exists());
        assert!(!s.root.join("yard_out.jpg").exists());
    }

    #[tokio::test]
    async fn test_detection_failure_abandons_file() {
        let s = setup(vec![rule("other", RuleMode::Move, &[])]);
        s.tx.enqueue(ready(&s.root, "cam1", "broken.jpg")).await.expect("room");
        s.tx.enqueue(ready(&s.root, "cam1", "ok.jpg")).await.expect("room");
        drop(s.tx);

        let report = s.worker.run().await;
        assert_eq!(report.detection_failures, 1);
        assert_eq!(report.processed, 1);
        assert!(s.root.join("broken.jpg").exists());
        assert!(s.root.join("other/src/ok.jpg").exists());
    }

    #[tokio::test]
    async fn test_directory_without_processor_is_left_alone() {
        let s = setup(vec![rule("other", RuleMode::Move, &[])]);
        s.tx.enqueue(ready(&s.root, "cam9", "img.jpg")).await.expect("room");
        drop(s.tx);

        let report = s.worker.run().await;
        assert_eq!(report.unrouted, 1);
        assert_eq!(report.processed, 0);
        assert!(s.root.join("img.jpg").exists());
    }

    #[tokio::test]
    async fn test_unmatched_is_counted() {
        let s = setup(vec![rule("cat", RuleMode::Any, &["cat"])]);
        s.tx.enqueue(ready(&s.root, "cam1", "yard.jpg")).await.expect("room");
        // `yard.jpg` has no detections and there is no `none` rule.
        drop(s.tx);

        let report = s.worker.run().await;
        assert_eq!(report.processed, 1);
        assert_eq!(report.unmatched, 1);
        assert!(s.root.join("yard.jpg").exists());
    }

    #[tokio::test]
    async fn test_sentinel_discards_pending_files() {
        let s = setup(vec![rule("other", RuleMode::Move, &[])]);
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            s.tx.enqueue(ready(&s.root, "cam1", name)).await.expect("room");
        }
        s.tx.send_shutdown();

        let report = s.worker.run().await;
        assert_eq!(report.discarded, 3);
        assert_eq!(report.processed, 0);
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            assert!(s.root.join(name).exists());
        }
    }
}
