//! The action capability.

use std::time::Duration;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};

use crate::error::ActionError;

/// A notification backend.
///
/// Actions are shared between processors behind an `Arc`, so `notify` takes
/// `&self`; backends that keep state use interior mutability.
#[async_trait]
pub trait Action: Send + Sync {
    /// Short backend name, as used in the configuration's `type` field.
    fn kind(&self) -> &'static str;

    /// Sends a notification about `image`.
    ///
    /// `message` is the rule's message; `None` means the backend's default.
    async fn notify(&self, message: Option<&str>, image: &Utf8Path)
    -> Result<NotifyOutcome, ActionError>;
}

/// What happened to a notification that didn't fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The notification went out.
    Delivered,
    /// The backend chose not to send it.
    Suppressed(SuppressReason),
}

/// Why a backend suppressed a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuppressReason {
    /// The backend is configured with `active: false`.
    Inactive,
    /// The disable marker file exists.
    Disabled {
        /// Path of the marker file.
        marker: Utf8PathBuf,
    },
    /// The previous delivery was too recent.
    Cooldown {
        /// Time left until the next delivery is allowed.
        remaining: Duration,
    },
}

impl std::fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inactive => f.write_str("inactive"),
            Self::Disabled { marker } => write!(f, "disabled by {marker}"),
            Self::Cooldown { remaining } => write!(f, "cooldown, {}s left", remaining.as_secs()),
        }
    }
}
