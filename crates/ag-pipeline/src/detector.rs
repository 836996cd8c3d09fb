//! The detector capability and its long-lived process implementation.
//!
//! # Protocol
//!
//! [`ProcessDetector`] talks to a child process over stdin/stdout, one JSON
//! object per line in each direction:
//!
//! ```text
//! → {"input":"/srv/cam1/img1.jpg"}
//! ← {"annotated":"/srv/cam1/img1_out.jpg","detections":[{"name":"cat","confidence":0.91,"box":[10,10,50,50]}]}
//! ← {"error":"unreadable image"}
//! ```
//!
//! The child is started on the first request and kept for the lifetime of
//! the detector. If the session breaks (I/O error, EOF, garbage reply) the
//! child is killed and a fresh one is started on the next request.

use std::process::Stdio;

use async_trait::async_trait;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use ag_core::{DetectionOutput, DetectorConfig};

use crate::error::DetectError;

/// Produces an annotated copy and a detection list for an image.
///
/// Calls are strictly sequential: the worker owns the detector and awaits
/// each call before dequeuing the next file.
#[async_trait]
pub trait Detector: Send {
    /// Runs detection on `input`.
    async fn detect(&mut self, input: &Utf8Path) -> Result<DetectionOutput, DetectError>;
}

#[derive(Serialize)]
struct Request<'a> {
    input: &'a Utf8Path,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Reply {
    Failure { error: String },
    Success(DetectionOutput),
}

/// Detector backed by a persistent child process.
#[derive(Debug)]
pub struct ProcessDetector {
    config: DetectorConfig,
    session: Option<Session>,
    spawned: usize,
}

impl ProcessDetector {
    /// Creates the detector. The process is not started until the first
    /// call to [`Detector::detect`].
    #[must_use]
    pub const fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            session: None,
            spawned: 0,
        }
    }

    /// Returns `true` while a child process is attached.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Number of child processes started so far.
    #[must_use]
    pub const fn spawn_count(&self) -> usize {
        self.spawned
    }
}

#[async_trait]
impl Detector for ProcessDetector {
    async fn detect(&mut self, input: &Utf8Path) -> Result<DetectionOutput, DetectError> {
        let mut session = match self.session.take() {
            Some(session) => session,
            None => {
                let session = Session::spawn(&self.config)?;
                self.spawned += 1;
                tracing::info!(program = %self.config.program, pid = ?session.child.id(), "Detector started");
                session
            }
        };

        let reply = match session.exchange(input).await {
            Ok(reply) => {
                self.session = Some(session);
                reply
            }
            Err(error) => {
                // `kill_on_drop` reaps the broken child.
                tracing::warn!(error = %error, "Detector session lost");
                return Err(error);
            }
        };

        let output = match reply {
            Reply::Success(output) => output,
            Reply::Failure { error } => return Err(DetectError::Rejected(error)),
        };

        if !tokio::fs::try_exists(&output.annotated)
            .await
            .unwrap_or(false)
        {
            return Err(DetectError::MissingOutput(output.annotated));
        }

        tracing::debug!(
            input = %input,
            annotated = %output.annotated,
            detections = output.detections.len(),
            "Detection finished"
        );
        Ok(output)
    }
}

/// One running child process.
#[derive(Debug)]
struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Session {
    fn spawn(config: &DetectorConfig) -> Result<Self, DetectError> {
        let spawn_error = |source: std::io::Error| DetectError::Spawn {
            program: config.program.clone(),
            source,
        };

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stdin not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stdout not captured")))?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    async fn exchange(&mut self, input: &Utf8Path) -> Result<Reply, DetectError> {
        let mut request = serde_json::to_vec(&Request { input }).map_err(std::io::Error::other)?;
        request.push(b'\n');
        self.stdin.write_all(&request).await?;
        self.stdin.flush().await?;

        let mut line = String::new();
        if self.stdout.read_line(&mut line).await? == 0 {
            return Err(DetectError::Exited);
        }

        let line = line.trim();
        serde_json::from_str(line).map_err(|source| DetectError::Protocol {
            line: line.to_owned(),
            source,
        })
    }
}
