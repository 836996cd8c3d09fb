//! Carrying out the outcome of the matching class rule.
//!
//! # Outcomes
//!
//! ```text
//! <dir>/img1.jpg  ─┐                            none:  <dir>/<rule>/img1.jpg, annotated deleted
//! <dir>/img1_out.jpg ─► first_match ─► rule ─►  other: <dir>/<rule>/img1_out.jpg
//!                                                      <dir>/<rule>/src/img1.jpg
//!                                                      + metadata, throttle, action
//! ```
//!
//! Target directories are relative to the annotated image's directory.

use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use ag_actions::{ActionRegistry, NotifyOutcome, SuppressReason};
use ag_core::{ClassRule, Detection, RuleMode};

use crate::error::{MetadataError, ProcessError};
use crate::metadata::{MetadataWriter, detections_payload};
use crate::rules::{RuleMatch, first_match};
use crate::throttle::{self, ThrottleState, ThrottleVerdict};

/// Name of the subdirectory originals go to under a rule's directory.
const SOURCE_DIR: &str = "src";

/// What happened to a file.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A `none` rule matched: the original was moved, the annotated copy
    /// deleted.
    Emptied {
        /// Name of the rule.
        rule: String,
        /// Where the original ended up.
        original: Utf8PathBuf,
    },
    /// An `any`, `all` or `move` rule matched.
    Routed {
        /// Name of the rule.
        rule: String,
        /// Where the annotated copy ended up.
        annotated: Utf8PathBuf,
        /// Where the original ended up.
        original: Utf8PathBuf,
        /// Whether the action fired.
        notification: NotificationOutcome,
    },
    /// No rule matched; both files were left in place.
    Unmatched,
}

/// What happened to a routed file's notification.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationOutcome {
    /// The rule names no action.
    NoAction,
    /// The rule's throttle suppressed the action.
    Throttled(ThrottleVerdict),
    /// The named action is not in the registry.
    UnknownAction(String),
    /// The action reported delivery.
    Delivered,
    /// The action declined to send.
    Suppressed(SuppressReason),
    /// The action failed; the error was logged.
    Failed(String),
}

/// Routes detected files according to one directory's class rules.
pub struct Processor {
    name: String,
    rules: Vec<ClassRule>,
    actions: ActionRegistry,
    metadata: Arc<dyn MetadataWriter>,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("name", &self.name)
            .field("rules", &self.rules.len())
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

impl Processor {
    /// Creates a processor.
    ///
    /// `actions` is the registry rules resolve their `action` names in,
    /// already layered with processor-local actions.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        rules: Vec<ClassRule>,
        actions: ActionRegistry,
        metadata: Arc<dyn MetadataWriter>,
    ) -> Self {
        Self {
            name: name.into(),
            rules,
            actions,
            metadata,
        }
    }

    /// Returns the processor name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Routes one detected file.
    ///
    /// Metadata and notification failures are logged and reflected in the
    /// outcome; only failures to move files are returned as errors.
    pub async fn process(
        &self,
        original: &Utf8Path,
        annotated: &Utf8Path,
        detections: &[Detection],
        throttle: &mut ThrottleState,
    ) -> Result<Outcome, ProcessError> {
        let Some(matched) = first_match(&self.rules, detections) else {
            tracing::info!(
                processor = %self.name,
                path = %original,
                detections = detections.len(),
                "No class rule matched, leaving file in place"
            );
            return Ok(Outcome::Unmatched);
        };

        let subdir = annotated
            .parent()
            .or_else(|| original.parent())
            .unwrap_or_else(|| Utf8Path::new(""))
            .join(&matched.rule.name);

        if matched.rule.mode == RuleMode::Empty {
            tracing::info!(path = %original, target = %subdir, "[none] Nothing found, moving");
            let moved = move_to_dir(original, &subdir).await?;
            tokio::fs::remove_file(annotated)
                .await
                .map_err(|source| ProcessError::Remove {
                    path: annotated.to_owned(),
                    source,
                })?;
            return Ok(Outcome::Emptied {
                rule: matched.rule.name.clone(),
                original: moved,
            });
        }

        tracing::info!(
            mode = %matched.rule.mode,
            rule = %matched.rule.name,
            path = %original,
            target = %subdir,
            "Class rule matched, moving"
        );

        self.persist(&[original, annotated], detections).await;

        let moved_annotated = move_to_dir(annotated, &subdir).await?;
        let moved_original = move_to_dir(original, &subdir.join(SOURCE_DIR)).await?;

        let notification = self
            .dispatch(&matched, subdir.as_str(), &moved_annotated, throttle)
            .await;

        Ok(Outcome::Routed {
            rule: matched.rule.name.clone(),
            annotated: moved_annotated,
            original: moved_original,
            notification,
        })
    }

    /// Stores the detections in every file. Each failure is logged and the
    /// remaining files are still attempted.
    async fn persist(&self, files: &[&Utf8Path], detections: &[Detection]) {
        let payload = match detections_payload(detections) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(error = %error, "Failed to serialize detections");
                return;
            }
        };
        for file in files {
            if let Err(error) = self.write_comment(file, &payload).await {
                tracing::error!(path = %file, error = %error, "Failed to store detections in metadata");
            }
        }
    }

    async fn write_comment(&self, file: &Utf8Path, payload: &str) -> Result<(), MetadataError> {
        let writer = Arc::clone(&self.metadata);
        let path = file.to_owned();
        let payload = payload.to_owned();
        tokio::task::spawn_blocking(move || writer.write_comment(&path, &payload))
            .await
            .map_err(|e| MetadataError::io(file, io::Error::other(e)))?
    }

    async fn dispatch(
        &self,
        matched: &RuleMatch<'_>,
        routing_key: &str,
        image: &Utf8Path,
        state: &mut ThrottleState,
    ) -> NotificationOutcome {
        let Some(action_name) = matched.rule.action.as_deref() else {
            return NotificationOutcome::NoAction;
        };

        if let Some(config) = matched.rule.active_throttle() {
            let verdict = throttle::evaluate(config, routing_key, matched.trigger, state);
            if !verdict.is_allowed() {
                tracing::info!(rule = %matched.rule.name, ?verdict, "Notification throttled");
                return NotificationOutcome::Throttled(verdict);
            }
        }

        let Some(action) = self.actions.get(action_name) else {
            tracing::warn!(processor = %self.name, action = %action_name, "Action is not configured");
            return NotificationOutcome::UnknownAction(action_name.to_owned());
        };

        match action.notify(matched.message.as_deref(), image).await {
            Ok(NotifyOutcome::Delivered) => NotificationOutcome::Delivered,
            Ok(NotifyOutcome::Suppressed(reason)) => NotificationOutcome::Suppressed(reason),
            Err(error) => {
                tracing::error!(action = %action_name, image = %image, error = %error, "Unexpected error in action");
                NotificationOutcome::Failed(error.to_string())
            }
        }
    }
}

/// Moves `file` into `dir`, creating `dir` if needed, and returns the new
/// path.
///
/// Falls back to copy and remove when `dir` is on another filesystem.
pub async fn move_to_dir(file: &Utf8Path, dir: &Utf8Path) -> Result<Utf8PathBuf, ProcessError> {
    let move_error = |source: io::Error| ProcessError::Move {
        from: file.to_owned(),
        to: dir.to_owned(),
        source,
    };

    let file_name = file
        .file_name()
        .ok_or_else(|| move_error(io::Error::new(io::ErrorKind::InvalidInput, "no file name")))?;
    tokio::fs::create_dir_all(dir).await.map_err(move_error)?;

    let target = dir.join(file_name);
    match tokio::fs::rename(file, &target).await {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::CrossesDevices => {
            tokio::fs::copy(file, &target).await.map_err(move_error)?;
            tokio::fs::remove_file(file).await.map_err(move_error)?;
        }
        Err(error) => return Err(move_error(error)),
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ag_actions::{Action, ActionError};
    use ag_core::{BoundingBox, ThrottleConfig};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Records every notification.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(Option<String>, Utf8PathBuf)>>,
    }

    #[async_trait]
    impl Action for Recorder {
        fn kind(&self) -> &'static str {
            "recorder"
        }

        async fn notify(
            &self,
            message: Option<&str>,
            image: &Utf8Path,
        ) -> Result<NotifyOutcome, ActionError> {
            self.calls
                .lock()
                .push((message.map(ToOwned::to_owned), image.to_owned()));
            Ok(NotifyOutcome::Delivered)
        }
    }

    /// Records metadata writes instead of touching the files.
    #[derive(Default)]
    struct MemoryMetadata {
        writes: Mutex<Vec<(Utf8PathBuf, String)>>,
    }

    impl MetadataWriter for MemoryMetadata {
        fn write_comment(&self, path: &Utf8Path, payload: &str) -> Result<(), MetadataError> {
            self.writes.lock().push((path.to_owned(), payload.to_owned()));
            Ok(())
        }
    }

    struct FailingMetadata;

    impl MetadataWriter for FailingMetadata {
        fn write_comment(&self, path: &Utf8Path, _payload: &str) -> Result<(), MetadataError> {
            Err(MetadataError::Unsupported(path.to_owned()))
        }
    }

    /// Fails for files ending in `suffix`, recording every attempt.
    struct PickyMetadata {
        suffix: &'static str,
        attempts: Mutex<Vec<Utf8PathBuf>>,
    }

    impl MetadataWriter for PickyMetadata {
        fn write_comment(&self, path: &Utf8Path, _payload: &str) -> Result<(), MetadataError> {
            self.attempts.lock().push(path.to_owned());
            if path.as_str().ends_with(self.suffix) {
                return Err(MetadataError::Unsupported(path.to_owned()));
            }
            Ok(())
        }
    }

    struct Fixture {
        _dir: TempDir,
        root: Utf8PathBuf,
        recorder: Arc<Recorder>,
        metadata: Arc<MemoryMetadata>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().expect("tempdir");
            let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8");
            Self {
                _dir: dir,
                root,
                recorder: Arc::new(Recorder::default()),
                metadata: Arc::new(MemoryMetadata::default()),
            }
        }

        fn processor(&self, rules: Vec<ClassRule>) -> Processor {
            let mut registry = ActionRegistry::new();
            registry.insert("pushover", Arc::clone(&self.recorder) as Arc<dyn Action>);
            Processor::new(
                "default",
                rules,
                registry,
                Arc::clone(&self.metadata) as Arc<dyn MetadataWriter>,
            )
        }

        /// Creates `<name>.jpg` and `<name>_out.jpg`.
        fn pair(&self, name: &str) -> (Utf8PathBuf, Utf8PathBuf) {
            let original = self.root.join(format!("{name}.jpg"));
            let annotated = self.root.join(format!("{name}_out.jpg"));
            std::fs::write(&original, b"original").expect("write original");
            std::fs::write(&annotated, b"annotated").expect("write annotated");
            (original, annotated)
        }

        fn calls(&self) -> usize {
            self.recorder.calls.lock().len()
        }
    }

    fn rule(name: &str, mode: RuleMode, keys: &[&str], action: Option<&str>) -> ClassRule {
        ClassRule {
            name: name.to_owned(),
            mode,
            keys: keys.iter().map(|k| (*k).to_owned()).collect(),
            action: action.map(ToOwned::to_owned),
            throttle: None,
        }
    }

    fn cat(bbox: BoundingBox) -> Detection {
        Detection::new("cat", 0.9, bbox)
    }

    #[tokio::test]
    async fn test_any_rule_routes_persists_and_notifies() {
        let fx = Fixture::new();
        let processor = fx.processor(vec![rule("cat", RuleMode::Any, &["cat"], Some("pushover"))]);
        let (original, annotated) = fx.pair("img1");
        let detections = vec![cat(BoundingBox::new(10.0, 10.0, 50.0, 50.0))];

        let outcome = processor
            .process(&original, &annotated, &detections, &mut ThrottleState::new(8))
            .await
            .expect("routed");

        let cat_dir = fx.root.join("cat");
        assert_eq!(
            outcome,
            Outcome::Routed {
                rule: "cat".to_owned(),
                annotated: cat_dir.join("img1_out.jpg"),
                original: cat_dir.join("src").join("img1.jpg"),
                notification: NotificationOutcome::Delivered,
            }
        );
        assert!(cat_dir.join("img1_out.jpg").exists());
        assert!(cat_dir.join("src/img1.jpg").exists());
        assert!(!original.exists());
        assert!(!annotated.exists());

        let writes = fx.metadata.writes.lock();
        let written: Vec<_> = writes.iter().map(|(path, _)| path.clone()).collect();
        assert_eq!(written, vec![original.clone(), annotated.clone()]);
        let stored: Vec<Detection> = serde_json::from_str(&writes[0].1).expect("json payload");
        assert_eq!(stored, detections);

        let calls = fx.recorder.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.as_deref(), Some("[any] Feature cat found in"));
        assert_eq!(calls[0].1, cat_dir.join("img1_out.jpg"));
    }

    #[tokio::test]
    async fn test_none_rule_moves_original_and_deletes_annotated() {
        let fx = Fixture::new();
        let processor = fx.processor(vec![
            rule("empty", RuleMode::Empty, &[], None),
            rule("cat", RuleMode::Any, &["cat"], Some("pushover")),
        ]);
        let (original, annotated) = fx.pair("img2");

        let outcome = processor
            .process(&original, &annotated, &[], &mut ThrottleState::new(8))
            .await
            .expect("emptied");

        let target = fx.root.join("empty").join("img2.jpg");
        assert_eq!(
            outcome,
            Outcome::Emptied {
                rule: "empty".to_owned(),
                original: target.clone(),
            }
        );
        assert!(target.exists());
        assert!(!annotated.exists());
        assert!(fx.metadata.writes.lock().is_empty());
        assert_eq!(fx.calls(), 0);
    }

    #[tokio::test]
    async fn test_area_threshold_suppresses_action_but_still_routes() {
        let fx = Fixture::new();
        let mut cat_rule = rule("cat", RuleMode::Any, &["cat"], Some("pushover"));
        cat_rule.throttle = Some(ThrottleConfig {
            active: true,
            threshold_size: Some(2000.0),
            delta: None,
        });
        let processor = fx.processor(vec![cat_rule]);
        let (original, annotated) = fx.pair("img3");

        // 60 x 50 = 3000 > 2000
        let detections = vec![cat(BoundingBox::new(0.0, 0.0, 60.0, 50.0))];
        let outcome = processor
            .process(&original, &annotated, &detections, &mut ThrottleState::new(8))
            .await
            .expect("routed");

        assert!(matches!(
            outcome,
            Outcome::Routed {
                notification: NotificationOutcome::Throttled(ThrottleVerdict::TooLarge { .. }),
                ..
            }
        ));
        assert!(fx.root.join("cat/img3_out.jpg").exists());
        assert_eq!(fx.metadata.writes.lock().len(), 2);
        assert_eq!(fx.calls(), 0);
    }

    #[tokio::test]
    async fn test_delta_throttle_fires_first_and_suppresses_second() {
        let fx = Fixture::new();
        let mut cat_rule = rule("cat", RuleMode::Any, &["cat"], Some("pushover"));
        cat_rule.throttle = Some(ThrottleConfig {
            active: true,
            threshold_size: None,
            delta: Some(10.0),
        });
        let processor = fx.processor(vec![cat_rule]);
        let mut state = ThrottleState::new(8);

        let (original, annotated) = fx.pair("a");
        let first = vec![cat(BoundingBox::new(10.0, 10.0, 50.0, 50.0))];
        processor
            .process(&original, &annotated, &first, &mut state)
            .await
            .expect("first routed");
        assert_eq!(fx.calls(), 1);

        // Corner sums move by 5 in x.
        let (original, annotated) = fx.pair("b");
        let second = vec![cat(BoundingBox::new(12.0, 10.0, 53.0, 50.0))];
        let outcome = processor
            .process(&original, &annotated, &second, &mut state)
            .await
            .expect("second routed");

        assert_eq!(fx.calls(), 1);
        assert!(matches!(
            outcome,
            Outcome::Routed {
                notification: NotificationOutcome::Throttled(ThrottleVerdict::TooClose { .. }),
                ..
            }
        ));
        assert!(fx.root.join("cat/b_out.jpg").exists());
        assert!(fx.root.join("cat/src/b.jpg").exists());
    }

    #[tokio::test]
    async fn test_inactive_throttle_is_ignored() {
        let fx = Fixture::new();
        let mut cat_rule = rule("cat", RuleMode::Any, &["cat"], Some("pushover"));
        cat_rule.throttle = Some(ThrottleConfig {
            active: false,
            threshold_size: Some(1.0),
            delta: None,
        });
        let processor = fx.processor(vec![cat_rule]);
        let (original, annotated) = fx.pair("img");

        processor
            .process(
                &original,
                &annotated,
                &[cat(BoundingBox::new(0.0, 0.0, 100.0, 100.0))],
                &mut ThrottleState::new(8),
            )
            .await
            .expect("routed");
        assert_eq!(fx.calls(), 1);
    }

    #[tokio::test]
    async fn test_move_rule_uses_default_message() {
        let fx = Fixture::new();
        let processor = fx.processor(vec![rule("other", RuleMode::Move, &[], Some("pushover"))]);
        let (original, annotated) = fx.pair("img");

        processor
            .process(&original, &annotated, &[], &mut ThrottleState::new(8))
            .await
            .expect("routed");

        let calls = fx.recorder.calls.lock();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.is_none());
    }

    #[tokio::test]
    async fn test_unknown_action_still_routes() {
        let fx = Fixture::new();
        let processor = fx.processor(vec![rule("cat", RuleMode::Any, &["cat"], Some("sms"))]);
        let (original, annotated) = fx.pair("img");

        let outcome = processor
            .process(
                &original,
                &annotated,
                &[cat(BoundingBox::new(0.0, 0.0, 1.0, 1.0))],
                &mut ThrottleState::new(8),
            )
            .await
            .expect("routed");

        assert!(matches!(
            outcome,
            Outcome::Routed {
                notification: NotificationOutcome::UnknownAction(ref name),
                ..
            } if name == "sms"
        ));
        assert!(fx.root.join("cat/img_out.jpg").exists());
    }

    #[tokio::test]
    async fn test_unmatched_leaves_files_in_place() {
        let fx = Fixture::new();
        let processor = fx.processor(vec![rule("cat", RuleMode::Any, &["cat"], None)]);
        let (original, annotated) = fx.pair("img");

        let outcome = processor
            .process(
                &original,
                &annotated,
                &[Detection::new("dog", 0.9, BoundingBox::new(0.0, 0.0, 1.0, 1.0))],
                &mut ThrottleState::new(8),
            )
            .await
            .expect("unmatched");

        assert_eq!(outcome, Outcome::Unmatched);
        assert!(original.exists());
        assert!(annotated.exists());
    }

    #[tokio::test]
    async fn test_metadata_failure_does_not_stop_routing() {
        let fx = Fixture::new();
        let mut registry = ActionRegistry::new();
        registry.insert("pushover", Arc::clone(&fx.recorder) as Arc<dyn Action>);
        let processor = Processor::new(
            "default",
            vec![rule("other", RuleMode::Move, &[], Some("pushover"))],
            registry,
            Arc::new(FailingMetadata),
        );
        let (original, annotated) = fx.pair("img");

        processor
            .process(&original, &annotated, &[], &mut ThrottleState::new(8))
            .await
            .expect("routed");

        assert!(fx.root.join("other/img_out.jpg").exists());
        assert!(fx.root.join("other/src/img.jpg").exists());
        assert_eq!(fx.calls(), 1);
    }

    #[tokio::test]
    async fn test_metadata_failure_on_original_still_writes_annotated() {
        let fx = Fixture::new();
        let metadata = Arc::new(PickyMetadata {
            suffix: ".bmp",
            attempts: Mutex::new(Vec::new()),
        });
        let processor = Processor::new(
            "default",
            vec![rule("other", RuleMode::Move, &[], None)],
            ActionRegistry::new(),
            Arc::clone(&metadata) as Arc<dyn MetadataWriter>,
        );
        let original = fx.root.join("img.bmp");
        let annotated = fx.root.join("img_out.jpg");
        std::fs::write(&original, b"original").expect("write original");
        std::fs::write(&annotated, b"annotated").expect("write annotated");

        processor
            .process(&original, &annotated, &[], &mut ThrottleState::new(8))
            .await
            .expect("routed");

        assert_eq!(*metadata.attempts.lock(), vec![original, annotated]);
        assert!(fx.root.join("other/img_out.jpg").exists());
        assert!(fx.root.join("other/src/img.bmp").exists());
    }

    #[tokio::test]
    async fn test_move_to_dir_creates_directory() {
        let fx = Fixture::new();
        let file = fx.root.join("x.jpg");
        std::fs::write(&file, b"x").expect("write");

        let moved = move_to_dir(&file, &fx.root.join("a/b"))
            .await
            .expect("moved");
        assert_eq!(moved, fx.root.join("a/b/x.jpg"));
        assert!(moved.exists());

        let err = move_to_dir(&file, &fx.root.join("a"))
            .await
            .expect_err("source gone");
        assert!(matches!(err, ProcessError::Move { .. }));
    }
}
