//! Notification throttling.
//!
//! Two gates decide whether a matched rule's action may fire:
//!
//! 1. **Area gate**: a triggering box larger than `threshold_size` is
//!    suppressed. State is left alone.
//! 2. **Delta gate**: the box is compared with the last one seen for the
//!    same routing key. The first observation always passes; afterwards the
//!    stored box is replaced on every evaluation and a movement below
//!    `delta` is suppressed.
//!
//! Rules without a single triggering detection (`all`, `move`) skip both
//! gates.

use std::collections::VecDeque;

use ag_core::{Detection, FxHashMap, ThrottleConfig};

/// Result of a throttle evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThrottleVerdict {
    /// The action may fire.
    Allow,
    /// The triggering box is larger than `threshold_size`.
    TooLarge {
        /// Area of the triggering box.
        area: f64,
        /// Configured threshold.
        threshold: f64,
    },
    /// The box barely moved since the last evaluation for this key.
    TooClose {
        /// Measured corner delta.
        delta: f64,
        /// Configured minimum.
        threshold: f64,
    },
}

impl ThrottleVerdict {
    /// Returns `true` if the action may fire.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Last detection seen per routing key.
///
/// Holds at most `capacity` keys. Inserting a new key at capacity evicts
/// the oldest-inserted one; updating an existing key keeps its position.
#[derive(Debug, Clone)]
pub struct ThrottleState {
    capacity: usize,
    entries: FxHashMap<String, Detection>,
    order: VecDeque<String>,
}

impl ThrottleState {
    /// Creates an empty state. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: FxHashMap::default(),
            order: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    /// Returns the stored detection for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Detection> {
        self.entries.get(key)
    }

    /// Stores `detection` for `key` and returns the previous one.
    pub fn record(&mut self, key: &str, detection: Detection) -> Option<Detection> {
        if let Some(slot) = self.entries.get_mut(key) {
            return Some(std::mem::replace(slot, detection));
        }

        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                tracing::debug!(key = %oldest, "Evicting throttle state");
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.to_owned());
        self.entries.insert(key.to_owned(), detection);
        None
    }

    /// Number of keys tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no key is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Runs both gates for one matched rule.
///
/// The caller decides whether the throttle applies at all (present and
/// active, and an action configured).
pub fn evaluate(
    config: &ThrottleConfig,
    key: &str,
    trigger: Option<&Detection>,
    state: &mut ThrottleState,
) -> ThrottleVerdict {
    let Some(detection) = trigger else {
        return ThrottleVerdict::Allow;
    };

    if let Some(threshold) = config.threshold_size {
        let area = detection.bbox.area();
        if area > threshold {
            return ThrottleVerdict::TooLarge { area, threshold };
        }
    }

    let Some(threshold) = config.delta else {
        return ThrottleVerdict::Allow;
    };

    match state.record(key, detection.clone()) {
        None => ThrottleVerdict::Allow,
        Some(previous) => {
            let delta = detection.bbox.corner_delta(&previous.bbox);
            if delta < threshold {
                ThrottleVerdict::TooClose { delta, threshold }
            } else {
                ThrottleVerdict::Allow
            }
        }
    }
}
