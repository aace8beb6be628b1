//! Slack output host - delivers NDJSON units read from stdin.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use connector_slack::{ConnectionPool, OutboundMessage, SlackOutput, SlackOutputConfig};

/// Slack output adapter
#[derive(Parser)]
#[command(name = "slack-output")]
#[command(about = "Deliver connector replies read from stdin to Slack")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,
}

fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout is left alone; logs go to stderr.
    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    setup_logging(&args.log_level, args.json_logs);

    let config = if let Some(config_path) = args.config {
        match SlackOutputConfig::load(&config_path) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to load config from {}: {}", config_path, e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        match SlackOutputConfig::from_env() {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to load config from environment: {}", e);
                return ExitCode::FAILURE;
            }
        }
    };

    let pool = ConnectionPool::new();
    let output = match SlackOutput::new(config, &pool) {
        Ok(output) => output,
        Err(e) => {
            error!("Failed to start Slack output: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let ttl = output.config().stream_ttl;
    let sweeper = output.spawn_stream_sweeper(ttl.max(Duration::from_secs(1)));

    info!("Slack output ready, reading units from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut processed = 0usize;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                sweeper.abort();
                return ExitCode::FAILURE;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<OutboundMessage>(&line) {
            Ok(message) => {
                output.process(message).await;
                processed += 1;
            }
            Err(e) => warn!("Skipping malformed unit: {}", e),
        }
    }

    sweeper.abort();
    info!("stdin closed after {} units", processed);
    ExitCode::SUCCESS
}
