//! Engine binary for the Agora social platform.
//!
//! Wires one shared store to a command dispatcher, runs the seeded
//! synthetic workload against both, and reports karma and throughput.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `agora-config.yaml` (or `AGORA_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Start the metrics collector and create the store
//! 4. Spawn the dispatcher worker
//! 5. Run the workload
//! 6. Wait for the dispatcher to drain
//! 7. Recompute karma and log the leaders
//! 8. Stop metrics and log the report

mod error;
mod workload;

use std::path::PathBuf;
use std::sync::Arc;

use agora_core::config::{AgoraConfig, LoggingConfig};
use agora_core::{Dispatcher, Metrics, Store};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::workload::Workload;

/// Default configuration path, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "agora-config.yaml";

/// Users listed in the final karma ranking.
const KARMA_LEADERS: usize = 5;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the workload cannot be set
/// up, or the dispatcher fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging depends on it, so it comes first.
    let (config, source) = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("agora-engine starting");
    match &source {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Config file not found, using defaults"),
    }
    info!(
        seed = config.workload.seed,
        users = config.workload.users,
        subreddits = config.workload.subreddits,
        posts = config.workload.posts,
        mailbox_capacity = config.dispatcher.mailbox_capacity,
        "Workload configured"
    );

    // 3. Metrics and store.
    let metrics = Arc::new(Metrics::start());
    let store = Arc::new(Store::with_metrics(Arc::clone(&metrics)));

    // 4. Dispatcher.
    let (handle, worker) =
        Dispatcher::spawn(Arc::clone(&store), &config.dispatcher, config.karma);

    // 5. Workload. The handle is consumed, so the worker stops once the
    //    producers are done.
    let summary = Workload::new(Arc::clone(&store), config.workload.clone())
        .run(handle)
        .await?;

    // 6. Drain the dispatcher.
    let stats = worker.await.map_err(EngineError::from)?;
    info!(
        applied = stats.applied,
        failed = stats.failed,
        dropped = stats.dropped,
        "Dispatcher drained"
    );

    // 7. Karma.
    let mut karma: Vec<(String, i64)> = store.update_all_users_karma().into_iter().collect();
    karma.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (rank, (username, points)) in karma.iter().take(KARMA_LEADERS).enumerate() {
        info!(rank = rank.saturating_add(1), username = %username, karma = points, "Karma leader");
    }

    // 8. Metrics.
    let report = metrics.stop();
    report.log();

    info!(
        posts = summary.posts,
        comments = summary.comments,
        messages = summary.messages,
        "agora-engine shutdown complete"
    );
    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load configuration from `AGORA_CONFIG` or `agora-config.yaml`.
///
/// A missing file yields defaults (with environment overrides applied).
/// Returns the path that was read, if any.
fn load_config() -> Result<(AgoraConfig, Option<PathBuf>), EngineError> {
    let path = std::env::var("AGORA_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        let config = AgoraConfig::from_file(&path)?;
        Ok((config, Some(path)))
    } else {
        Ok((AgoraConfig::parse("")?, None))
    }
}
