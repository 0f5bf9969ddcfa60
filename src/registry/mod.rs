//! User registry backends and factory
//!
//! This module provides:
//! - The `UserSource` trait the aggregator consumes
//! - A JSON Lines file backend and a Redis hash backend
//! - A factory resolving the configured backend
//!
//! The aggregation core only ever enumerates users; nothing here
//! writes to a registry.

pub mod source;
mod file;
mod redis_hash;

use std::sync::Arc;

pub use file::FileUserSource;
pub use redis_hash::RedisUserSource;
pub use source::UserSource;

use crate::config::RegistryConfig;
use crate::error::SourceError;

/// Builds the registry backend named in configuration.
///
/// THREADING:
/// - Sources are wrapped in `Arc`
/// - The same source is reused by every aggregation pass
///
pub fn from_config(cfg: &RegistryConfig) -> Result<Arc<dyn UserSource>, SourceError> {
    match cfg {
        RegistryConfig::File { path } => Ok(Arc::new(FileUserSource::new(path))),
        RegistryConfig::Redis { url, key } => Ok(Arc::new(RedisUserSource::new(url, key.clone())?)),
    }
}
