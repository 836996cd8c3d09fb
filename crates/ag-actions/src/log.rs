//! Log backend.

use async_trait::async_trait;
use camino::Utf8Path;

use ag_core::LogActionConfig;

use crate::action::{Action, NotifyOutcome, SuppressReason};
use crate::error::ActionError;

/// Writes notifications to the log instead of sending them anywhere.
#[derive(Debug, Clone)]
pub struct LogAction {
    name: String,
    active: bool,
}

impl LogAction {
    /// Creates a log action registered under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, config: &LogActionConfig) -> Self {
        Self {
            name: name.into(),
            active: config.active,
        }
    }
}

#[async_trait]
impl Action for LogAction {
    fn kind(&self) -> &'static str {
        "log"
    }

    async fn notify(
        &self,
        message: Option<&str>,
        image: &Utf8Path,
    ) -> Result<NotifyOutcome, ActionError> {
        if !self.active {
            return Ok(NotifyOutcome::Suppressed(SuppressReason::Inactive));
        }

        match message {
            Some(message) => tracing::info!(action = %self.name, image = %image, "{message} {image}"),
            None => tracing::info!(action = %self.name, image = %image, "Feature detected in {image}!"),
        }
        Ok(NotifyOutcome::Delivered)
    }
}
