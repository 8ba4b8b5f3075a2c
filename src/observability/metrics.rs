use metrics::{counter, histogram, describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the reconciliation engine.
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    pub fn record_link(&self, account_kind: &str, origin: &str) {
        counter!("reconciliation_links_total", "kind" => account_kind.to_string(), "origin" => origin.to_string()).increment(1);
    }

    pub fn record_link_rejected(&self, reason: &str) {
        counter!("reconciliation_links_rejected_total", "reason" => reason.to_string()).increment(1);
    }

    pub fn record_unlink(&self, account_kind: &str) {
        counter!("reconciliation_unlinks_total", "kind" => account_kind.to_string()).increment(1);
    }

    pub fn record_classification(&self, classification: &str) {
        counter!("reconciliation_classifications_total", "classification" => classification.to_string()).increment(1);
    }

    pub fn record_classification_cleared(&self) {
        counter!("reconciliation_classifications_cleared_total").increment(1);
    }

    pub fn record_auto_match(&self, matcher: &str, linked: u64, skipped: u64) {
        counter!("reconciliation_auto_match_runs_total", "matcher" => matcher.to_string()).increment(1);
        counter!("reconciliation_auto_match_linked_total", "matcher" => matcher.to_string()).increment(linked);
        counter!("reconciliation_auto_match_skipped_total", "matcher" => matcher.to_string()).increment(skipped);
    }

    pub fn record_ranking(&self, candidate_count: usize, duration_ms: f64) {
        histogram!("reconciliation_ranking_candidates").record(candidate_count as f64);
        histogram!("reconciliation_ranking_duration_ms").record(duration_ms);
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        counter!("reconciliation_cache_lookups_total", "hit" => hit.to_string()).increment(1);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }

    pub fn record_db_query(&self, query_type: &str, duration_ms: f64, success: bool) {
        counter!("db_queries_total", "type" => query_type.to_string(), "success" => success.to_string()).increment(1);
        histogram!("db_query_duration_ms", "type" => query_type.to_string()).record(duration_ms);
    }

    pub fn record_redis_operation(&self, operation: &str, duration_ms: f64, success: bool) {
        counter!("redis_operations_total", "operation" => operation.to_string(), "success" => success.to_string()).increment(1);
        histogram!("redis_operation_duration_ms", "operation" => operation.to_string()).record(duration_ms);
    }

    pub fn record_kafka_message(&self, topic: &str, success: bool) {
        counter!("kafka_messages_total", "topic" => topic.to_string(), "success" => success.to_string()).increment(1);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the Prometheus recorder once and returns its handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    let handle = METRICS_HANDLE.get_or_init(|| handle).clone();

    METRICS.get_or_init(Metrics::new);

    Ok(handle)
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!("reconciliation_links_total", Unit::Count, "Transactions linked to a payable or receivable");
    describe_counter!("reconciliation_links_rejected_total", Unit::Count, "Link attempts rejected by a guard");
    describe_counter!("reconciliation_unlinks_total", Unit::Count, "Links removed manually");
    describe_counter!("reconciliation_classifications_total", Unit::Count, "Transactions classified as exceptions");
    describe_counter!("reconciliation_classifications_cleared_total", Unit::Count, "Exception classifications removed");

    describe_counter!("reconciliation_auto_match_runs_total", Unit::Count, "Auto-match passes executed");
    describe_counter!("reconciliation_auto_match_linked_total", Unit::Count, "Links created by auto-match");
    describe_counter!("reconciliation_auto_match_skipped_total", Unit::Count, "Ambiguous pairs skipped by auto-match");

    describe_histogram!("reconciliation_ranking_candidates", Unit::Count, "Candidates ranked per request");
    describe_histogram!("reconciliation_ranking_duration_ms", Unit::Milliseconds, "Candidate ranking latency in milliseconds");

    describe_counter!("reconciliation_cache_lookups_total", Unit::Count, "List cache lookups");

    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!("http_request_duration_ms", Unit::Milliseconds, "HTTP request latency in milliseconds");

    describe_counter!("db_queries_total", Unit::Count, "Total database queries");
    describe_histogram!("db_query_duration_ms", Unit::Milliseconds, "Database query latency in milliseconds");

    describe_counter!("redis_operations_total", Unit::Count, "Total Redis operations");
    describe_histogram!("redis_operation_duration_ms", Unit::Milliseconds, "Redis operation latency in milliseconds");

    describe_counter!("kafka_messages_total", Unit::Count, "Total Kafka messages");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_timer() {
        let timer = LatencyTimer::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = timer.elapsed_ms();
        assert!(elapsed >= 10.0);
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert!(metrics.initialized);
    }

    #[test]
    fn test_recording_without_recorder_is_harmless() {
        let metrics = get_metrics();
        metrics.record_link("payable", "manual");
        metrics.record_auto_match("exact", 2, 1);
        metrics.record_ranking(10, 0.4);
    }
}
