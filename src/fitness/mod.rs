//! Remote fitness data access
//!
//! This module provides:
//! - The `MetricFetcher` trait used by workers
//! - The Google Fitness / People implementation
//! - The response model and step extraction rules
//!
//! Provider-specific logic must stay in this module; the
//! aggregator talks to providers exclusively through the trait.

pub mod fetcher;
pub mod google;
pub mod response;

pub use fetcher::MetricFetcher;
pub use google::GoogleFitFetcher;
