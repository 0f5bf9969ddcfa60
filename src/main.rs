// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:     Configuration structs loaded from JSON
// - schema:     Users, credentials and per-user results
// - error:      Registry, fetch and pass-level errors
// - util:       Time ranges and URL helpers
// - registry:   User registry backends
// - fitness:    Remote fitness/profile data access
// - aggregator: Fan-out / fan-in engine and ranking
// - metrics:    Process-wide counters
//
mod aggregator;
mod config;
mod error;
mod fitness;
mod metrics;
mod registry;
mod schema;
mod util;

#[cfg(test)]
mod test_support;

// ------------------------------------------------------------
// External dependencies
// ------------------------------------------------------------

use rustls::crypto::{CryptoProvider, ring};

use aggregator::{Aggregator, rank};
use config::Config;
use fitness::{GoogleFitFetcher, MetricFetcher};
use metrics::METRICS;
use registry::UserSource;

use anyhow::Context;
use log::{error, info};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// Responsibilities:
// - Initialize cryptography backend (rustls)
// - Load configuration and initialize logging
// - Build the registry and the fitness fetcher
// - Run one aggregation pass, or one per refresh interval
// - Print the ranked list as indented JSON
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --------------------------------------------------------
    // rustls >= 0.23 requires an explicit CryptoProvider
    // installation, exactly once and before any client is built.
    // --------------------------------------------------------
    CryptoProvider::install_default(ring::default_provider())
        .expect("failed to install rustls CryptoProvider");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let config = load_config(&config_path)?;
    init_logging(config.debug_logging());

    let settings = config.settings()?;
    let source = registry::from_config(&config.registry)
        .context("failed to initialize user registry")?;

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let fetcher: Arc<dyn MetricFetcher> = Arc::new(GoogleFitFetcher::new(http, &config.fitness));

    info!(
        "registry={} fetcher={} zone={} max_concurrency={} timeout={:?}",
        source.name(),
        fetcher.name(),
        settings.zone,
        settings.max_concurrency,
        settings.fetch_timeout
    );

    let aggregator = Aggregator::new(fetcher, settings);

    // --------------------------------------------------------
    // One-shot mode: a failed pass is a failed process
    // --------------------------------------------------------
    let Some(secs) = config.aggregation.refresh_interval_secs else {
        return run_pass(&aggregator, source.as_ref()).await;
    };

    // --------------------------------------------------------
    // Periodic mode: keep going, report metrics after each pass
    // --------------------------------------------------------
    let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
    loop {
        ticker.tick().await;
        if let Err(e) = run_pass(&aggregator, source.as_ref()).await {
            error!("aggregation pass failed: {:#}", e);
        }
        info!("[METRICS] {}", METRICS.summary());
    }
}

/// Runs one pass and prints either the ranked list or an error object.
async fn run_pass(aggregator: &Aggregator, source: &dyn UserSource) -> anyhow::Result<()> {
    match aggregator.aggregate(source).await {
        Ok(results) => {
            println!("{}", serde_json::to_string_pretty(&rank(results))?);
            Ok(())
        }
        Err(e) => {
            let body = json!({ "error": format!("Error at the backend {}", e) });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Err(e.into())
        }
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

// ------------------------------------------------------------
// Configuration loader
// ------------------------------------------------------------
//
// Reads a JSON configuration file from disk and deserializes
// it into the strongly typed `Config` structure.
//
fn load_config(path: &str) -> anyhow::Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path))?;
    let cfg = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse config file {}", path))?;
    Ok(cfg)
}
