/// Aggregator module
///
/// This module groups all logic responsible for:
/// - Dispatching one worker per registered user
/// - Collecting exactly one result per user
/// - Ordering the collected results for presentation
///
/// The aggregator layer acts as the orchestration layer between:
/// - The user registry (input)
/// - A metric fetcher (remote data)
/// - The caller (ranked output)
///
/// Design notes:
/// - Provider-specific logic MUST NOT live here
/// - Ranking happens only after collection is complete
pub mod ranker;
pub mod runner;
pub mod worker;

pub use ranker::rank;
pub use runner::Aggregator;
