//! Core types, errors, and configuration for aiguard.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - [`Config`] and its sections, loaded once at startup from JSON
//! - [`ConfigError`] for load and validation failures
//! - Detection types ([`Detection`], [`BoundingBox`], [`DetectionOutput`])
//! - Type aliases for `FxHashMap`/`FxHashSet`

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hash;
pub mod types;

pub use config::{
    ActionConfig, ClassRule, Config, DetectorConfig, DirectoryConfig, LogActionConfig,
    LoggingConfig, ProcessorConfig, PushoverConfig, QueueConfig, RuleMode, StabilityConfig,
    ThrottleConfig,
};
pub use error::ConfigError;
pub use hash::{FxHashMap, FxHashSet};
pub use types::{BoundingBox, Detection, DetectionOutput};
