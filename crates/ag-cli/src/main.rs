//! The aiguard daemon.
//!
//! Watches the configured directories, runs every new image through the
//! external detector, and routes it according to its processor's class
//! rules.
//!
//! # Usage
//!
//! ```bash
//! # Reads ./config.json
//! aiguard
//!
//! # Another configuration file
//! AIGUARD_CONFIG=/etc/aiguard/config.json aiguard
//! ```
//!
//! There are no runtime flags; everything else lives in the file.
//!
//! Ctrl-C or SIGTERM stops the daemon cleanly.

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use ag_actions::ActionRegistry;
use ag_core::{Config, LoggingConfig};
use ag_pipeline::{Daemon, ImageCommentWriter, ProcessDetector, install_signal_handlers};
use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::eyre::WrapErr;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Directory-watching object detection and routing daemon.
///
/// Reads `config.json` from the working directory, or the file named by
/// `AIGUARD_CONFIG`.
#[derive(Parser)]
#[command(name = "aiguard", version, about, long_about = None)]
struct Cli {}

/// Environment variable naming the configuration file.
const CONFIG_ENV: &str = "AIGUARD_CONFIG";

/// Configuration file used when [`CONFIG_ENV`] is unset.
const DEFAULT_CONFIG: &str = "config.json";

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Resolves the configuration path from the value of [`CONFIG_ENV`].
fn config_path(value: Option<OsString>) -> color_eyre::Result<Utf8PathBuf> {
    match value {
        None => Ok(Utf8PathBuf::from(DEFAULT_CONFIG)),
        Some(value) if value.is_empty() => Ok(Utf8PathBuf::from(DEFAULT_CONFIG)),
        Some(value) => Utf8PathBuf::from_path_buf(PathBuf::from(value)).map_err(|path| {
            color_eyre::eyre::eyre!("{CONFIG_ENV} is not valid UTF-8: {}", path.display())
        }),
    }
}

/// Filter directives used when `RUST_LOG` is not set.
fn default_directives(level: &str) -> String {
    format!("{level},notify=warn,reqwest=warn,hyper=warn")
}

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise the
/// configured level is used, with noisy dependencies held at `warn`.
/// Colors are off when `logging.ansi` is false or `NO_COLOR` is set.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&logging.level)));

    let use_ansi = logging.ansi && std::env::var_os("NO_COLOR").is_none();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(logging.target).with_ansi(use_ansi))
        .with(filter)
        .init();
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Handle --help/--version; there are no runtime flags
    Cli::parse();

    // 3. Load configuration; this is the only fatal failure
    let config_file = config_path(std::env::var_os(CONFIG_ENV))?;
    let config = Config::from_file(&config_file)
        .wrap_err_with(|| format!("Failed to load configuration from {config_file}"))?;

    // 4. Initialize tracing from the logging section
    init_tracing(&config.logging);
    info!(
        config = %config_file,
        directories = config.directories.len(),
        processors = config.processors.len(),
        "Configuration loaded"
    );

    // 5. Build the long-lived capabilities
    let registry =
        ActionRegistry::from_configs(&config.actions).wrap_err("Failed to build actions")?;
    let detector = ProcessDetector::new(config.detector.clone());

    // 6. Start and supervise
    let shutdown = CancellationToken::new();
    let signals =
        install_signal_handlers(shutdown.clone()).wrap_err("Failed to install signal handlers")?;

    let daemon = Daemon::start(
        &config,
        detector,
        Arc::new(ImageCommentWriter),
        &registry,
        shutdown.clone(),
    )
    .wrap_err("Failed to start")?;
    let report = daemon.run().await?;

    shutdown.cancel();
    signals.await?;

    info!(
        processed = report.processed,
        unmatched = report.unmatched,
        detection_failures = report.detection_failures,
        unrouted = report.unrouted,
        routing_failures = report.routing_failures,
        discarded = report.discarded,
        "Shutdown complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_takes_no_runtime_flags() {
        assert!(Cli::try_parse_from(["aiguard"]).is_ok());
        assert!(Cli::try_parse_from(["aiguard", "--config", "/etc/aiguard.json"]).is_err());
        assert!(Cli::try_parse_from(["aiguard", "config.json"]).is_err());
    }

    #[test]
    fn test_config_path_defaults_and_env_override() {
        assert_eq!(config_path(None).expect("default"), Utf8PathBuf::from("config.json"));
        assert_eq!(
            config_path(Some(OsString::new())).expect("empty falls back"),
            Utf8PathBuf::from("config.json")
        );
        assert_eq!(
            config_path(Some(OsString::from("/etc/aiguard.json"))).expect("override"),
            Utf8PathBuf::from("/etc/aiguard.json")
        );
    }

    #[test]
    fn test_default_directives_quiet_dependencies() {
        let directives = default_directives("debug");
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("notify=warn"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }
}
