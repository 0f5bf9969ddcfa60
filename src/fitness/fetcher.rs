use crate::error::FetchError;
use crate::schema::{Profile, User};
use crate::util::TimeRange;

/// MetricFetcher is the abstraction layer between:
/// - The generic aggregation runtime
/// - A remote fitness/profile data provider
///
/// Each implementation must:
/// - Scope every call to the given user's credential
/// - Treat the remote service as read-only
/// - Report failures as `FetchError`, never panic
///
/// There are no retries at this layer. Deadlines are applied by
/// the caller.
///
/// THREAD SAFETY:
/// - Must be Send + Sync
/// - One instance is shared by every worker of a pass
///
#[async_trait::async_trait]
pub trait MetricFetcher: Send + Sync {
    /// Provider identifier used in logs.
    fn name(&self) -> &'static str;

    /// Total steps of `user` within the week `range`.
    async fn weekly_steps(&self, user: &User, range: TimeRange) -> Result<u64, FetchError>;

    /// Total steps of `user` within the day `range`.
    async fn daily_steps(&self, user: &User, range: TimeRange) -> Result<u64, FetchError>;

    /// Display name and photo of `user`.
    ///
    /// The photo URL is returned without a size directive.
    async fn profile(&self, user: &User) -> Result<Profile, FetchError>;
}
