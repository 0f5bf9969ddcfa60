use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

/// Global runtime metrics for the aggregator.
///
/// Purpose:
/// - Track aggregation passes
/// - Track users dispatched per pass
/// - Track per-user outcomes (ok / failed / timed out / lost)
///
/// Design:
/// - Lock-free (Atomics)
/// - Write-only from the aggregation path; nothing in a pass
///   reads these back
#[derive(Default)]
pub struct RuntimeMetrics {
    // Passes
    pub passes_completed: AtomicUsize,
    pub passes_failed: AtomicUsize,

    // Fan-out
    pub users_dispatched: AtomicUsize,

    // Outcomes
    pub results_ok: AtomicUsize,
    pub results_failed: AtomicUsize,
    pub fetch_timeouts: AtomicUsize,
    pub malformed_responses: AtomicUsize,
    pub workers_lost: AtomicUsize,
}

impl RuntimeMetrics {
    /// One-line summary used by the periodic reporter.
    pub fn summary(&self) -> String {
        format!(
            "passes_ok={} passes_failed={} dispatched={} ok={} failed={} timeouts={} malformed={} lost={}",
            self.passes_completed.load(Ordering::Relaxed),
            self.passes_failed.load(Ordering::Relaxed),
            self.users_dispatched.load(Ordering::Relaxed),
            self.results_ok.load(Ordering::Relaxed),
            self.results_failed.load(Ordering::Relaxed),
            self.fetch_timeouts.load(Ordering::Relaxed),
            self.malformed_responses.load(Ordering::Relaxed),
            self.workers_lost.load(Ordering::Relaxed),
        )
    }
}

/// Global metrics registry (singleton)
pub static METRICS: Lazy<Arc<RuntimeMetrics>> =
    Lazy::new(|| Arc::new(RuntimeMetrics::default()));
