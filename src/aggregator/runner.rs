use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

use crate::config::AggregatorSettings;
use crate::error::AggregationError;
use crate::fitness::MetricFetcher;
use crate::metrics::METRICS;
use crate::registry::UserSource;
use crate::schema::MetricResult;

use super::worker::Worker;

/// Fans out one worker per registered user and fans their results
/// back in.
///
/// DESIGN:
/// - One task per user, spawned as the registry stream is drained
/// - At most `max_concurrency` users are fetched at the same time
/// - Results travel over one channel; the aggregator is its only reader
/// - The channel closes once the last task has reported, which is
///   how the aggregator knows it holds every result
///
/// GUARANTEES:
/// - `Ok` carries exactly one result per dispatched user
/// - A per-user failure never aborts the pass
/// - A registry failure aborts the pass and cancels every task
///
/// Nothing is shared between passes: each call owns its channel,
/// semaphore and task set.
///
pub struct Aggregator {
    fetcher: Arc<dyn MetricFetcher>,
    settings: AggregatorSettings,
}

impl Aggregator {
    pub fn new(fetcher: Arc<dyn MetricFetcher>, settings: AggregatorSettings) -> Self {
        Self { fetcher, settings }
    }

    pub async fn aggregate(&self, source: &dyn UserSource) -> Result<Vec<MetricResult>, AggregationError> {
        self.aggregate_at(source, Utc::now()).await
    }

    /// Runs one pass with "now" fixed to `now`.
    ///
    /// Results are returned in arrival order; ranking is left to the caller.
    pub async fn aggregate_at(
        &self,
        source: &dyn UserSource,
        now: DateTime<Utc>,
    ) -> Result<Vec<MetricResult>, AggregationError> {
        let started = Instant::now();
        let result = self.run_pass(source, now).await;

        match &result {
            Ok(results) => {
                let failed = results.iter().filter(|r| !r.is_ok()).count();
                METRICS.passes_completed.fetch_add(1, Ordering::Relaxed);
                METRICS.results_ok.fetch_add(results.len() - failed, Ordering::Relaxed);
                METRICS.results_failed.fetch_add(failed, Ordering::Relaxed);
                info!(
                    "[{}] pass complete: {} users, {} failed, {:?}",
                    source.name(),
                    results.len(),
                    failed,
                    started.elapsed()
                );
            }
            Err(e) => {
                METRICS.passes_failed.fetch_add(1, Ordering::Relaxed);
                error!("[{}] pass aborted: {}", source.name(), e);
            }
        }

        result
    }

    async fn run_pass(
        &self,
        source: &dyn UserSource,
        now: DateTime<Utc>,
    ) -> Result<Vec<MetricResult>, AggregationError> {
        let worker = Arc::new(Worker::new(self.fetcher.clone(), self.settings, now));
        let permits = Arc::new(Semaphore::new(self.settings.max_concurrency));
        let (tx, mut rx) = mpsc::channel::<MetricResult>(self.settings.max_concurrency);
        let mut tasks = JoinSet::new();
        let mut dispatched = Vec::new();

        // ----------------------------------------------------
        // FAN-OUT
        // ----------------------------------------------------
        // The stream is drained to the end before any result is
        // read. Tasks hold a permit only while fetching, so a task
        // blocked on a full channel never starves the others.
        //
        let mut users = source.stream().await?;
        while let Some(item) = users.next().await {
            let user = match item {
                Ok(user) => user,
                Err(e) => {
                    tasks.abort_all();
                    return Err(e.into());
                }
            };

            dispatched.push(user.email.clone());

            let worker = worker.clone();
            let permits = permits.clone();
            let tx = tx.clone();

            tasks.spawn(async move {
                let result = {
                    let _permit = permits.acquire().await.ok();
                    worker.fetch(&user).await
                };
                let _ = tx.send(result).await;
            });
        }
        drop(users);
        drop(tx);

        let expected = dispatched.len();
        METRICS.users_dispatched.fetch_add(expected, Ordering::Relaxed);
        debug!(
            "[{}] dispatched {} users (week from {}, day from {})",
            source.name(),
            expected,
            worker.week().start,
            worker.day().start
        );

        // ----------------------------------------------------
        // FAN-IN
        // ----------------------------------------------------
        let mut results = Vec::with_capacity(expected);
        while let Some(result) = rx.recv().await {
            results.push(result);
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("worker task ended abnormally: {}", e);
            }
        }

        // A task that died before reporting still owes its user a result.
        if results.len() < expected {
            for email in unreported(&dispatched, &results) {
                METRICS.workers_lost.fetch_add(1, Ordering::Relaxed);
                results.push(MetricResult::failed(email, "worker terminated without reporting"));
            }
        }

        Ok(results)
    }
}

/// Dispatched users with no matching result, counting duplicates.
fn unreported(dispatched: &[String], results: &[MetricResult]) -> Vec<String> {
    let mut reported: HashMap<&str, usize> = HashMap::new();
    for result in results {
        *reported.entry(result.email.as_str()).or_default() += 1;
    }

    let mut missing = Vec::new();
    for email in dispatched {
        match reported.get_mut(email.as_str()) {
            Some(count) if *count > 0 => *count -= 1,
            _ => missing.push(email.clone()),
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::rank;
    use crate::config::AggregationConfig;
    use crate::schema::ResultStatus;
    use crate::test_support::{Script, ScriptedFetcher, StaticUserSource, Step};
    use crate::util::{day_range, week_range};
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn settings() -> AggregatorSettings {
        AggregationConfig::default().settings().unwrap()
    }

    fn by_email(results: &[MetricResult]) -> BTreeMap<String, MetricResult> {
        results.iter().map(|r| (r.email.clone(), r.clone())).collect()
    }

    #[tokio::test]
    async fn one_result_per_user_with_failures_isolated() {
        let fetcher = ScriptedFetcher::new()
            .with("a@x.io", Script::steps(500, 50))
            .with("b@x.io", Script::failing())
            .with("c@x.io", Script::steps(900, 90))
            .with("d@x.io", Script { daily: Step::Malformed, ..Script::steps(700, 0) });
        let source = StaticUserSource::new(&["a@x.io", "b@x.io", "c@x.io", "d@x.io", "e@x.io"]);
        let aggregator = Aggregator::new(Arc::new(fetcher), settings());

        let results = aggregator.aggregate(&source).await.unwrap();

        assert_eq!(results.len(), 5);
        let results = by_email(&results);
        let failed: Vec<_> = results
            .values()
            .filter(|r| r.status == ResultStatus::Failed)
            .map(|r| r.email.as_str())
            .collect();
        assert_eq!(failed, ["b@x.io", "d@x.io", "e@x.io"]);
        assert_eq!(results["a@x.io"].steps_week, Some(500));
        assert_eq!(results["c@x.io"].steps_day, Some(90));
        assert!(results["e@x.io"].error.is_some());
    }

    #[tokio::test]
    async fn unavailable_registry_fails_the_pass() {
        let aggregator = Aggregator::new(Arc::new(ScriptedFetcher::new()), settings());

        let err = aggregator.aggregate(&StaticUserSource::unavailable()).await.unwrap_err();
        assert!(matches!(err, AggregationError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn mid_stream_failure_discards_dispatched_work() {
        // a@x.io never answers and its deadline is far away.
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .with("a@x.io", Script { weekly: Step::Hang, ..Script::steps(1, 1) })
                .with("c@x.io", Script::steps(3, 3)),
        );
        let source = StaticUserSource::new(&["a@x.io"])
            .then_fail("cursor lost")
            .then_users(&["c@x.io"]);
        let settings = AggregatorSettings {
            fetch_timeout: Duration::from_secs(60),
            ..settings()
        };
        let aggregator = Aggregator::new(fetcher.clone(), settings);

        let err = tokio::time::timeout(Duration::from_secs(2), aggregator.aggregate(&source))
            .await
            .expect("pass waited on an abandoned worker")
            .unwrap_err();

        assert!(matches!(err, AggregationError::SourceUnavailable(_)));
        assert!(err.to_string().contains("cursor lost"));
        // At most a@x.io's weekly call started; c@x.io is never dispatched.
        assert!(fetcher.calls.load(Ordering::SeqCst) <= 1);
        assert!(
            fetcher
                .ranges
                .lock()
                .unwrap()
                .iter()
                .all(|(kind, _)| *kind == "week")
        );
    }

    #[tokio::test]
    async fn empty_registry_yields_empty_result() {
        let aggregator = Aggregator::new(Arc::new(ScriptedFetcher::new()), settings());

        let results = aggregator.aggregate(&StaticUserSource::new(&[])).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn hung_fetch_does_not_block_the_pass() {
        let fetcher = ScriptedFetcher::new()
            .with("slow@x.io", Script { weekly: Step::Hang, ..Script::steps(0, 7) })
            .with("fast@x.io", Script::steps(10, 1));
        let settings = AggregatorSettings {
            fetch_timeout: Duration::from_millis(50),
            ..settings()
        };
        let aggregator = Aggregator::new(Arc::new(fetcher), settings);

        let results = tokio::time::timeout(
            Duration::from_secs(5),
            aggregator.aggregate(&StaticUserSource::new(&["slow@x.io", "fast@x.io"])),
        )
        .await
        .expect("aggregation must not hang")
        .unwrap();

        let results = by_email(&results);
        assert!(results["fast@x.io"].is_ok());
        assert!(!results["slow@x.io"].is_ok());
        assert!(results["slow@x.io"].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn panicking_worker_still_yields_a_result() {
        let fetcher = ScriptedFetcher::new()
            .with("boom@x.io", Script { panics: true, ..Script::steps(0, 0) })
            .with("ok@x.io", Script::steps(42, 4));
        let aggregator = Aggregator::new(Arc::new(fetcher), settings());

        let results = aggregator
            .aggregate(&StaticUserSource::new(&["boom@x.io", "ok@x.io"]))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        let results = by_email(&results);
        assert_eq!(
            results["boom@x.io"].error.as_deref(),
            Some("worker terminated without reporting")
        );
        assert_eq!(results["ok@x.io"].steps_week, Some(42));
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let emails: Vec<String> = (0..8).map(|i| format!("u{}@x.io", i)).collect();
        let refs: Vec<&str> = emails.iter().map(String::as_str).collect();
        let fetcher = refs.iter().fold(ScriptedFetcher::new(), |f, email| {
            f.with(email, Script { delay: Duration::from_millis(20), ..Script::steps(1, 1) })
        });
        let fetcher = Arc::new(fetcher);
        let settings = AggregatorSettings { max_concurrency: 2, ..settings() };
        let aggregator = Aggregator::new(fetcher.clone(), settings);

        let results = aggregator.aggregate(&StaticUserSource::new(&refs)).await.unwrap();

        assert_eq!(results.len(), 8);
        assert!(results.iter().all(MetricResult::is_ok));
        let peak = fetcher.max_in_flight.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak in-flight calls was {}", peak);
    }

    #[tokio::test]
    async fn every_worker_queries_the_same_ranges() {
        let zone_settings = settings();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 18, 29, 59).unwrap();
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .with("a@x.io", Script::steps(1, 1))
                .with("b@x.io", Script::steps(2, 2)),
        );
        let aggregator = Aggregator::new(fetcher.clone(), zone_settings);

        aggregator
            .aggregate_at(&StaticUserSource::new(&["a@x.io", "b@x.io"]), now)
            .await
            .unwrap();

        let week = week_range(now, zone_settings.zone);
        let day = day_range(now, zone_settings.zone);
        let ranges = fetcher.ranges.lock().unwrap();
        assert_eq!(ranges.len(), 4);
        for (kind, range) in ranges.iter() {
            let expected = if *kind == "week" { week } else { day };
            assert_eq!(*range, expected);
        }
    }

    #[tokio::test]
    async fn repeated_passes_agree() {
        let fetcher = ScriptedFetcher::new()
            .with("a@x.io", Script::steps(500, 5))
            .with("b@x.io", Script::steps(900, 9))
            .with("c@x.io", Script::failing());
        let source = StaticUserSource::new(&["a@x.io", "b@x.io", "c@x.io"]);
        let aggregator = Aggregator::new(Arc::new(fetcher), settings());

        let first = aggregator.aggregate(&source).await.unwrap();
        let second = aggregator.aggregate(&source).await.unwrap();

        assert_eq!(by_email(&first), by_email(&second));
    }

    #[tokio::test]
    async fn ranked_output_orders_by_weekly_steps() {
        let fetcher = ScriptedFetcher::new()
            .with("a@x.io", Script::steps(500, 0))
            .with("b@x.io", Script::steps(900, 0))
            .with("c@x.io", Script::failing())
            .with("d@x.io", Script::steps(12_000, 0));
        let aggregator = Aggregator::new(Arc::new(fetcher), settings());

        let results = aggregator
            .aggregate(&StaticUserSource::new(&["a@x.io", "b@x.io", "c@x.io", "d@x.io"]))
            .await
            .unwrap();
        let order: Vec<_> = rank(results).into_iter().map(|r| r.email).collect();

        assert_eq!(order, ["d@x.io", "b@x.io", "a@x.io", "c@x.io"]);
    }

    #[test]
    fn unreported_counts_duplicates() {
        let dispatched = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        let results = vec![MetricResult::new("a"), MetricResult::new("b")];

        assert_eq!(unreported(&dispatched, &results), ["a"]);
        assert!(unreported(&dispatched[..2], &results).is_empty());
    }
}
