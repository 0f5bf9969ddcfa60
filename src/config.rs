use std::time::Duration;

use anyhow::{Context, bail};
use chrono::FixedOffset;
use serde::Deserialize;

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// This is the top-level configuration structure loaded from
// `config.json`.
//
// It defines:
// - Where registered users are read from
// - How the fitness/profile APIs are reached
// - Aggregation behavior (zone, concurrency, deadlines)
// - Optional debug configuration
//
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// User registry backend
    pub registry: RegistryConfig,

    /// Remote API endpoints
    #[serde(default)]
    pub fitness: FitnessConfig,

    /// Aggregation tuning
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Optional debug configuration
    pub debug: Option<DebugConfig>,
}

// ------------------------------------------------------------
// Registry configuration
// ------------------------------------------------------------
//
// NOTE:
// - The registry is read-only from this service's point of view.
// - Both backends hold one JSON-encoded user per entry.
//
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RegistryConfig {
    /// JSON Lines file, one user per line
    File { path: String },

    /// Redis hash keyed by email
    Redis { url: String, key: String },
}

// ------------------------------------------------------------
// Fitness API configuration
// ------------------------------------------------------------
//
// Every field is optional; the defaults point at the public
// Google endpoints. Overriding the URLs is mainly useful for
// proxies and local stubs.
//
// Expired access tokens are only refreshed when both client
// credentials are set.
//
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FitnessConfig {
    pub fitness_url: Option<String>,
    pub people_url: Option<String>,
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub data_source_id: Option<String>,
    pub data_type_name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AggregationConfig {
    /// Offset of the configured time zone from UTC, in minutes
    pub utc_offset_minutes: i32,

    /// Maximum number of users fetched at the same time
    pub max_concurrency: usize,

    /// Deadline for each remote call, in milliseconds
    pub fetch_timeout_ms: u64,

    /// Also fetch display name and photo
    pub include_profile: bool,

    /// Repeat the pass at this interval instead of exiting
    pub refresh_interval_secs: Option<u64>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            // Asia/Kolkata, no DST
            utc_offset_minutes: 330,
            max_concurrency: 16,
            fetch_timeout_ms: 10_000,
            include_profile: true,
            refresh_interval_secs: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    /// Raises the default log level to debug
    pub log: Option<bool>,
}

// ------------------------------------------------------------
// Runtime settings
// ------------------------------------------------------------
//
// Validated form of `AggregationConfig`, handed to the
// aggregator and its workers at construction time.
//
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatorSettings {
    pub zone: FixedOffset,
    pub max_concurrency: usize,
    pub fetch_timeout: Duration,
    pub include_profile: bool,
}

impl Config {
    pub fn settings(&self) -> anyhow::Result<AggregatorSettings> {
        self.aggregation.settings()
    }

    pub fn debug_logging(&self) -> bool {
        self.debug
            .as_ref()
            .is_some_and(|d| d.log.unwrap_or(false))
    }
}

impl AggregationConfig {
    pub fn settings(&self) -> anyhow::Result<AggregatorSettings> {
        let zone = self
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .with_context(|| format!("utc_offset_minutes out of range: {}", self.utc_offset_minutes))?;

        if self.max_concurrency == 0 {
            bail!("max_concurrency must be at least 1");
        }
        if self.fetch_timeout_ms == 0 {
            bail!("fetch_timeout_ms must be greater than 0");
        }

        Ok(AggregatorSettings {
            zone,
            max_concurrency: self.max_concurrency,
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            include_profile: self.include_profile,
        })
    }
}
