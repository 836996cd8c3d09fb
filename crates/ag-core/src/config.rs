//! Configuration structures for aiguard.
//!
//! The whole process is driven by one JSON file, loaded once at startup and
//! read-only afterwards:
//!
//! - [`Config`] - Root configuration, see [`Config::from_file`]
//! - [`DirectoryConfig`] - One watched directory
//! - [`ProcessorConfig`] / [`ClassRule`] / [`ThrottleConfig`] - Routing rules
//! - [`ActionConfig`] - Notification backends, a closed set of kinds
//! - [`DetectorConfig`] - How to reach the external detector
//! - [`QueueConfig`], [`StabilityConfig`], [`LoggingConfig`] - Ambient settings
//!
//! Sections that have sensible values implement [`Default`] and may be
//! omitted from the file.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::hash::{FxHashMap, FxHashSet};

const DEFAULT_TIMEOUT_SECS: f64 = 5.0;
/// Shortest heartbeat interval accepted for `timeout`.
const MIN_HEARTBEAT: Duration = Duration::from_millis(1);
const DEFAULT_QUEUE_CAPACITY: usize = 16;
const DEFAULT_THROTTLE_CAPACITY: usize = 256;
const DEFAULT_PUSHOVER_URL: &str = "https://api.pushover.net/1/messages.json";

const fn default_true() -> bool {
    true
}

const fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_throttle_capacity() -> usize {
    DEFAULT_THROTTLE_CAPACITY
}

/// Root configuration.
///
/// # Examples
///
/// ```
/// use ag_core::Config;
///
/// let config = Config::from_json_str(r#"{
///     "detector": {"program": "/opt/detector/serve"},
///     "directories": {"cam1": {"path": "/srv/cam1", "processor": "default"}},
///     "processors": {"default": {"classes": [{"name": "all", "mode": "move"}]}}
/// }"#).unwrap();
///
/// assert_eq!(config.queue.capacity, 16);
/// assert!(config.directories["cam1"].process_first);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Supervisor heartbeat interval in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: f64,

    /// Ingestion queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// File stability wait settings.
    #[serde(default)]
    pub stability: StabilityConfig,

    /// Maximum number of routing keys remembered by each processor's throttle.
    #[serde(default = "default_throttle_capacity")]
    pub throttle_capacity: usize,

    /// External detector.
    pub detector: DetectorConfig,

    /// Watched directories keyed by name.
    #[serde(default)]
    pub directories: BTreeMap<String, DirectoryConfig>,

    /// Rule sets keyed by name, referenced from [`DirectoryConfig::processor`].
    #[serde(default)]
    pub processors: FxHashMap<String, ProcessorConfig>,

    /// Process-wide notification backends keyed by name.
    #[serde(default)]
    pub actions: FxHashMap<String, ActionConfig>,

    /// Logging settings, consumed by the binary.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Reads, parses, and validates a configuration file.
    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_owned(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: Utf8PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants that the type system doesn't capture.
    ///
    /// Directory paths and processor references are deliberately not checked
    /// here; a bad directory only disables that directory at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let heartbeat = Duration::try_from_secs_f64(self.timeout).unwrap_or(Duration::ZERO);
        if !self.timeout.is_finite() || heartbeat < MIN_HEARTBEAT {
            return Err(ConfigError::invalid_option(
                "timeout",
                "must be at least 0.001 seconds",
            ));
        }
        if self.queue.capacity == 0 {
            return Err(ConfigError::invalid_option("queue.capacity", "must be positive"));
        }
        if self.stability.poll_interval_ms == 0 {
            return Err(ConfigError::invalid_option(
                "stability.poll_interval_ms",
                "must be positive",
            ));
        }
        if self.throttle_capacity == 0 {
            return Err(ConfigError::invalid_option("throttle_capacity", "must be positive"));
        }
        if self.detector.program.trim().is_empty() {
            return Err(ConfigError::invalid_option("detector.program", "must not be empty"));
        }

        validate_action_names("actions", &self.actions)?;
        for (name, processor) in &self.processors {
            processor.validate(name)?;
        }

        Ok(())
    }

    /// Returns the supervisor heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout)
            .unwrap_or_else(|_| Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS))
            .max(MIN_HEARTBEAT)
    }
}

fn validate_action_names(
    section: &str,
    actions: &FxHashMap<String, ActionConfig>,
) -> Result<(), ConfigError> {
    if actions.keys().any(|name| name.trim().is_empty()) {
        return Err(ConfigError::invalid_option(
            section,
            "action names must not be empty",
        ));
    }
    Ok(())
}

/// Ingestion queue settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of ready files buffered before watchers block.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Settings for the size-polling stability wait.
///
/// # Examples
///
/// ```
/// use ag_core::StabilityConfig;
/// use std::time::Duration;
///
/// let config = StabilityConfig::default();
/// assert_eq!(config.poll_interval(), Duration::from_secs(1));
/// assert_eq!(config.max_wait(), Some(Duration::from_secs(300)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Delay between two size reads, in milliseconds.
    pub poll_interval_ms: u64,

    /// Give up on a file that is still growing after this many seconds.
    /// `0` waits forever.
    pub max_wait_secs: u64,
}

impl StabilityConfig {
    /// Returns the poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the maximum wait, or `None` when unbounded.
    #[must_use]
    pub const fn max_wait(&self) -> Option<Duration> {
        if self.max_wait_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.max_wait_secs))
        }
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_wait_secs: 300,
        }
    }
}

/// How to reach the external detector process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Executable that serves detection requests on stdin/stdout.
    pub program: String,

    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
}

/// One watched directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Directory to watch (non-recursively).
    pub path: Utf8PathBuf,

    /// Optional regular expression a new file's path must match.
    #[serde(default)]
    pub regexp: Option<String>,

    /// Name of the processor that routes this directory's files.
    #[serde(default)]
    pub processor: Option<String>,

    /// Feed files already present at startup through the pipeline.
    #[serde(rename = "processFirst", default = "default_true")]
    pub process_first: bool,
}

/// An ordered rule set plus processor-scoped actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Rules in evaluation order. The first match wins.
    #[serde(default)]
    pub classes: Vec<ClassRule>,

    /// Actions visible only to this processor. They shadow process-wide
    /// actions with the same name.
    #[serde(default)]
    pub actions: FxHashMap<String, ActionConfig>,
}

impl ProcessorConfig {
    /// Validates every rule and action name of this processor.
    pub fn validate(&self, processor: &str) -> Result<(), ConfigError> {
        for rule in &self.classes {
            rule.validate(processor)?;
        }
        validate_action_names(&format!("processors.{processor}.actions"), &self.actions)
    }
}

/// How a rule tests the detection list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMode {
    /// Matches when nothing was detected.
    #[serde(rename = "none")]
    Empty,
    /// Matches when at least one detection name is a key.
    Any,
    /// Matches when the detected names include every key.
    All,
    /// Always matches.
    Move,
}

impl RuleMode {
    /// Returns the mode name as written in the configuration.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Empty => "none",
            Self::Any => "any",
            Self::All => "all",
            Self::Move => "move",
        }
    }

    /// Returns `true` for modes that need a non-empty key set.
    #[must_use]
    pub const fn requires_keys(self) -> bool {
        matches!(self, Self::Any | Self::All)
    }
}

impl fmt::Display for RuleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One entry in a processor's ordered decision list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRule {
    /// Rule name, also the name of the subdirectory files are moved into.
    pub name: String,

    /// Matching mode.
    pub mode: RuleMode,

    /// Class labels tested by `any` and `all`.
    #[serde(default)]
    pub keys: FxHashSet<String>,

    /// Action to invoke after routing.
    #[serde(default)]
    pub action: Option<String>,

    /// Notification throttle for the action.
    #[serde(default)]
    pub throttle: Option<ThrottleConfig>,
}

impl ClassRule {
    /// Validates the rule name and key set.
    pub fn validate(&self, processor: &str) -> Result<(), ConfigError> {
        let name = self.name.as_str();
        if name.is_empty() || name == "." || name == ".." {
            return Err(ConfigError::invalid_rule(
                processor,
                name,
                "name must be a directory name",
            ));
        }
        if name.contains(['/', '\\']) {
            return Err(ConfigError::invalid_rule(
                processor,
                name,
                "name must not contain path separators",
            ));
        }
        if self.mode.requires_keys() && self.keys.is_empty() {
            return Err(ConfigError::invalid_rule(
                processor,
                name,
                format!("mode '{}' requires at least one key", self.mode),
            ));
        }
        Ok(())
    }

    /// Returns the throttle only when present and active.
    #[must_use]
    pub fn active_throttle(&self) -> Option<&ThrottleConfig> {
        self.throttle.as_ref().filter(|throttle| throttle.active)
    }
}

/// Suppression settings for a rule's action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Whether the throttle is evaluated at all.
    #[serde(default)]
    pub active: bool,

    /// Suppress when the triggering box area is larger than this.
    #[serde(default)]
    pub threshold_size: Option<f64>,

    /// Suppress when the box moved less than this since the last observation.
    #[serde(default)]
    pub delta: Option<f64>,
}

/// A notification backend.
///
/// The `type` field selects the kind; the remaining fields belong to it.
///
/// ```
/// use ag_core::ActionConfig;
///
/// let action: ActionConfig = serde_json::from_str(r#"{"type": "log"}"#).unwrap();
/// assert!(action.is_active());
/// assert_eq!(action.kind(), "log");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionConfig {
    /// Push notification with image attachment via pushover.net.
    Pushover(PushoverConfig),
    /// Writes the notification to the log.
    Log(LogActionConfig),
}

impl ActionConfig {
    /// Returns the `type` tag of this action.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Pushover(_) => "pushover",
            Self::Log(_) => "log",
        }
    }

    /// Returns the `active` flag of the backend.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        match self {
            Self::Pushover(config) => config.active,
            Self::Log(config) => config.active,
        }
    }
}

/// Settings for the pushover backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PushoverConfig {
    /// Whether notifications are sent at all.
    #[serde(default = "default_true")]
    pub active: bool,

    /// Pushover user key.
    pub user_key: String,

    /// Pushover application token.
    pub api_token: String,

    /// While this file exists, notifications are suppressed. Relative paths
    /// resolve against the working directory.
    #[serde(default = "PushoverConfig::default_lock_file")]
    pub lock_file: Utf8PathBuf,

    /// Minimum seconds between two delivered notifications.
    #[serde(default = "PushoverConfig::default_cooldown")]
    pub timeout: u64,

    /// Optional message title.
    #[serde(default)]
    pub title: Option<String>,

    /// Messages endpoint.
    #[serde(default = "PushoverConfig::default_api_url")]
    pub api_url: String,
}

impl PushoverConfig {
    fn default_lock_file() -> Utf8PathBuf {
        Utf8PathBuf::from("pushover.disable")
    }

    const fn default_cooldown() -> u64 {
        60
    }

    fn default_api_url() -> String {
        DEFAULT_PUSHOVER_URL.to_owned()
    }
}

impl fmt::Debug for PushoverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushoverConfig")
            .field("active", &self.active)
            .field("user_key", &"<redacted>")
            .field("api_token", &"<redacted>")
            .field("lock_file", &self.lock_file)
            .field("timeout", &self.timeout)
            .field("title", &self.title)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Settings for the log backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogActionConfig {
    /// Whether notifications are logged.
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Default for LogActionConfig {
    fn default() -> Self {
        Self { active: true }
    }
}

/// Logging settings for the binary's tracing subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set.
    pub level: String,

    /// Emit ANSI colors.
    pub ansi: bool,

    /// Include event targets (module paths).
    pub target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            ansi: true,
            target: false,
        }
    }
}
