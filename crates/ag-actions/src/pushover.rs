//! Pushover backend.
//!
//! Sends the routed image as an attachment through the pushover.net
//! messages API. Three gates run before every send, in order:
//!
//! 1. `active: false` suppresses everything
//! 2. the disable marker file (`lock-file`) suppresses while it exists
//! 3. the cooldown (`timeout` seconds) suppresses until that long has passed
//!    since the last successful delivery
//!
//! These gates are independent of rule throttling; a notification has to
//! pass both.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use reqwest::multipart::{Form, Part};

use ag_core::PushoverConfig;

use crate::action::{Action, NotifyOutcome, SuppressReason};
use crate::error::ActionError;

/// Upper bound on one request, including the attachment upload.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Pushover notification backend.
pub struct PushoverAction {
    config: PushoverConfig,
    lock_file: Utf8PathBuf,
    client: reqwest::Client,
    last_delivered: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for PushoverAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushoverAction")
            .field("config", &self.config)
            .field("lock_file", &self.lock_file)
            .field("last_delivered", &*self.last_delivered.lock())
            .finish_non_exhaustive()
    }
}

impl PushoverAction {
    /// Creates the backend. A relative `lock-file` is resolved against the
    /// current working directory once, here.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Client`] if the HTTP client can't be built.
    pub fn new(config: PushoverConfig) -> Result<Self, ActionError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ActionError::Client)?;

        let lock_file = resolve_lock_file(&config.lock_file);

        Ok(Self {
            config,
            lock_file,
            client,
            last_delivered: Mutex::new(None),
        })
    }

    /// Returns the resolved disable marker path.
    #[must_use]
    pub fn lock_file(&self) -> &Utf8Path {
        &self.lock_file
    }

    /// Minimum time between two deliveries.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.config.timeout)
    }

    /// Checks the gates at `now` without sending anything.
    ///
    /// Returns the reason to suppress, or `None` if a send may go out.
    pub fn gate(&self, now: Instant) -> Option<SuppressReason> {
        if !self.config.active {
            return Some(SuppressReason::Inactive);
        }
        if self.lock_file.exists() {
            return Some(SuppressReason::Disabled {
                marker: self.lock_file.clone(),
            });
        }

        let last = (*self.last_delivered.lock())?;
        let elapsed = now.saturating_duration_since(last);
        let cooldown = self.cooldown();
        (elapsed < cooldown).then(|| SuppressReason::Cooldown {
            remaining: cooldown - elapsed,
        })
    }

    async fn send(&self, message: &str, image: &Utf8Path) -> Result<(), ActionError> {
        let attachment = tokio::fs::read(image)
            .await
            .map_err(|source| ActionError::attachment(image, source))?;
        let file_name = image.file_name().unwrap_or("image").to_owned();
        let part = Part::bytes(attachment)
            .file_name(file_name)
            .mime_str(mime_type(image))?;

        let mut form = Form::new()
            .text("token", self.config.api_token.clone())
            .text("user", self.config.user_key.clone())
            .text("message", message.to_owned())
            .part("attachment", part);
        if let Some(title) = &self.config.title {
            form = form.text("title", title.clone());
        }

        let response = self
            .client
            .post(&self.config.api_url)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ActionError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Action for PushoverAction {
    fn kind(&self) -> &'static str {
        "pushover"
    }

    async fn notify(
        &self,
        message: Option<&str>,
        image: &Utf8Path,
    ) -> Result<NotifyOutcome, ActionError> {
        if let Some(reason) = self.gate(Instant::now()) {
            tracing::info!(image = %image, reason = %reason, "Not sending pushover notification");
            return Ok(NotifyOutcome::Suppressed(reason));
        }

        let message = message.map_or_else(|| default_message(image), ToOwned::to_owned);
        tracing::info!(image = %image, message = %message, "Sending pushover notification");

        self.send(&message, image).await?;
        *self.last_delivered.lock() = Some(Instant::now());
        Ok(NotifyOutcome::Delivered)
    }
}

/// Message used when the rule supplies none.
#[must_use]
pub fn default_message(image: &Utf8Path) -> String {
    format!("Feature detected in {image}!")
}

fn resolve_lock_file(path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        return path.to_owned();
    }
    std::env::current_dir()
        .ok()
        .and_then(|cwd| Utf8PathBuf::from_path_buf(cwd).ok())
        .map_or_else(|| path.to_owned(), |cwd| cwd.join(path))
}

fn mime_type(image: &Utf8Path) -> &'static str {
    match image.extension().map(str::to_ascii_lowercase).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
