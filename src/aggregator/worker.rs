use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::{DateTime, Utc};
use log::warn;
use tokio::time::timeout;

use crate::config::AggregatorSettings;
use crate::error::FetchError;
use crate::fitness::MetricFetcher;
use crate::metrics::METRICS;
use crate::schema::{MetricResult, User};
use crate::util::{TimeRange, day_range, week_range};

/// Fetches the metrics of exactly one user.
///
/// A worker is built once per aggregation pass and shared by every
/// task of that pass, so all users are queried for the same week
/// and day.
///
/// GUARANTEES:
/// - `fetch` always returns a `MetricResult`; failures are data
/// - Every remote call is bounded by the configured deadline
/// - Steps are fetched independently: a failed weekly call does
///   not prevent the daily call
///
pub struct Worker {
    fetcher: Arc<dyn MetricFetcher>,
    settings: AggregatorSettings,
    week: TimeRange,
    day: TimeRange,
}

impl Worker {
    pub fn new(fetcher: Arc<dyn MetricFetcher>, settings: AggregatorSettings, now: DateTime<Utc>) -> Self {
        Self {
            week: week_range(now, settings.zone),
            day: day_range(now, settings.zone),
            fetcher,
            settings,
        }
    }

    pub fn week(&self) -> TimeRange {
        self.week
    }

    pub fn day(&self) -> TimeRange {
        self.day
    }

    pub async fn fetch(&self, user: &User) -> MetricResult {
        let mut result = MetricResult::new(&user.email);

        match self.bounded(self.fetcher.weekly_steps(user, self.week)).await {
            Ok(steps) => result.steps_week = Some(steps),
            Err(e) => self.record_failure(&mut result, "weekly steps", e),
        }

        match self.bounded(self.fetcher.daily_steps(user, self.day)).await {
            Ok(steps) => result.steps_day = Some(steps),
            Err(e) => self.record_failure(&mut result, "daily steps", e),
        }

        if self.settings.include_profile {
            match self.bounded(self.fetcher.profile(user)).await {
                Ok(profile) => {
                    result.name = profile.name;
                    result.photo_url = profile.photo_url;
                }
                Err(e) => self.record_failure(&mut result, "profile", e),
            }
        }

        result
    }

    // A timed-out call is a normal failure, not a hang.
    async fn bounded<T>(&self, call: impl Future<Output = Result<T, FetchError>>) -> Result<T, FetchError> {
        let limit = self.settings.fetch_timeout;
        timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(FetchError::Timeout(limit)))
    }

    fn record_failure(&self, result: &mut MetricResult, step: &str, err: FetchError) {
        if matches!(err, FetchError::Timeout(_)) {
            METRICS.fetch_timeouts.fetch_add(1, Ordering::Relaxed);
        } else if err.is_malformed() {
            METRICS.malformed_responses.fetch_add(1, Ordering::Relaxed);
        }
        warn!(
            "[{}] {} failed for {}: {}",
            self.fetcher.name(),
            step,
            result.email,
            err
        );
        result.mark_failed(format!("{}: {}", step, err));
    }
}
