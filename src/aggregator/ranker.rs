use crate::schema::MetricResult;

/// Orders results for presentation.
///
/// Key: weekly steps, descending. Results without a weekly count
/// come last. The sort is stable, so ties keep their arrival order.
pub fn rank(mut results: Vec<MetricResult>) -> Vec<MetricResult> {
    results.sort_by(|a, b| b.steps_week.cmp(&a.steps_week));
    results
}
