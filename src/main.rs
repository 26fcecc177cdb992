//! # OSD Telemetry
//!
//! Feed an FPV on-screen display with live vehicle telemetry.
//!
//! This application listens to a MAVLink flight controller over UDP, merges
//! its telemetry with the cellular signal-quality score and pushes the result
//! to browsers as server-sent events.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use osd_telemetry::config::{Config, LoggingConfig};
use osd_telemetry::link::session::{supervise, SessionConfig};
use osd_telemetry::signal_quality::{HttpSignalSource, SignalPoller};
use osd_telemetry::stream::server::serve;
use osd_telemetry::stream::StreamContext;
use osd_telemetry::telemetry::{Aggregator, NotifyPolicy, TelemetryState};

/// Log file name prefix inside `[logging] dir`
const LOG_FILE_PREFIX: &str = "osd-telemetry.log";

#[derive(Parser, Debug)]
#[command(name = "osd-telemetry", version)]
#[command(about = "Push MAVLink telemetry to an on-screen display", long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Vehicle-link endpoint, e.g. udpin:0.0.0.0:14555 (overrides the config file)
    endpoint: Option<String>,
}

impl Args {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(endpoint) = &self.endpoint {
            config.link.endpoint = endpoint.clone();
            config.validate().context("Invalid endpoint argument")?;
        }

        Ok(config)
    }
}

/// Initialize logging to stdout and, if configured, a daily log file
///
/// The returned guard flushes the file writer on drop and must live until
/// exit.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

/// Main entry point for OSD Telemetry
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration, apply the endpoint argument
///    - Set up logging
///    - Start the aggregator and the signal-quality poller
///
/// 2. **Running**
///    - The link supervisor handshakes with the vehicle, configures stream
///      rates and feeds the aggregator, reconnecting when the link drops
///    - The HTTP server pushes one event per notifying update to each
///      `/stream` consumer
///
/// 3. **Graceful Shutdown**
///    - Ctrl+C, a fatal link error or a server failure cancels every task
///    - Open event streams end, the server stops, counters are logged
///
/// # Errors
///
/// Returns error if:
/// - The configuration is invalid
/// - The event-stream address cannot be bound
/// - The link endpoint cannot be bound
///
/// # Examples
///
/// ```bash
/// osd-telemetry --config osd.toml udpin:0.0.0.0:14555
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;
    let _log_guard = init_logging(&config.logging);

    info!("OSD Telemetry v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(endpoint = %config.link.endpoint, bind = %config.stream.bind, "Configuration loaded");

    let session = SessionConfig::from_config(&config)?;
    let cancel = CancellationToken::new();

    let policy = NotifyPolicy {
        notify_on_hud: config.stream.notify_on_hud,
    };
    let (aggregator, handle) = Aggregator::new(TelemetryState::new(), policy);
    let aggregator_task = aggregator.start(cancel.clone());

    let source = HttpSignalSource::from_config(&config.signal)?;
    let (poller, signal) = SignalPoller::new(source, Duration::from_millis(config.signal.poll_interval_ms));
    let poller_task = poller.start(cancel.clone());

    let link_task = {
        let handle = handle.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let result = supervise(session, handle, cancel.clone()).await;
            if let Err(e) = &result {
                error!(error = %e, "Vehicle link failed");
                cancel.cancel();
            }
            result
        })
    };

    let context = StreamContext {
        aggregator: handle,
        signal,
        cancel: cancel.clone(),
    };

    let server = async {
        let result = serve(&config.stream.bind, context).await;
        cancel.cancel();
        result
    };

    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down..."),
            _ = cancel.cancelled() => {}
        }
        cancel.cancel();
    };

    let (server_result, ()) = tokio::join!(server, shutdown);

    let link_result = link_task.await.context("Link task panicked")?;
    poller_task.await.context("Signal poller panicked")?;
    let stats = aggregator_task.await.context("Aggregator panicked")?;

    info!(
        applied = stats.applied,
        skipped = stats.skipped,
        notifications = stats.notifications,
        "Shutdown complete"
    );

    server_result.with_context(|| format!("Event stream server on {} failed", config.stream.bind))?;
    link_result.context("Vehicle link failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default() {
        let args = Args::try_parse_from(["osd-telemetry"]).unwrap();
        assert!(args.config.is_none());
        assert!(args.endpoint.is_none());

        let config = args.load_config().unwrap();
        assert_eq!(config.link.endpoint, "udpin:0.0.0.0:14555");
    }

    #[test]
    fn test_endpoint_argument_overrides_config() {
        let args = Args::try_parse_from(["osd-telemetry", "udpout:10.0.0.2:14550"]).unwrap();
        let config = args.load_config().unwrap();
        assert_eq!(config.link.endpoint, "udpout:10.0.0.2:14550");
    }

    #[test]
    fn test_invalid_endpoint_argument() {
        let args = Args::try_parse_from(["osd-telemetry", "serial:/dev/ttyACM0"]).unwrap();
        assert!(args.load_config().is_err());
    }

    #[test]
    fn test_config_flag() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[stream]\nbind = \"127.0.0.1:8080\"").unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let args = Args::try_parse_from(["osd-telemetry", "--config", &path]).unwrap();
        let config = args.load_config().unwrap();
        assert_eq!(config.stream.bind, "127.0.0.1:8080");
    }
}
