use reconciliation_engine::config::ApplicationSettings;
use reconciliation_engine::observability::{
    mask_amount, mask_sensitive, mask_uuid, AggregatedHealth, DependencyHealth, HealthChecker,
    HealthStatus, LatencyTimer, LogConfig, LogFormat, Metrics,
};
use rust_decimal::Decimal;
use uuid::Uuid;

#[test]
fn test_log_config_default() {
    let config = LogConfig::default();
    assert_eq!(config.level, "info");
    assert_eq!(config.format, LogFormat::Pretty);
    assert!(config.include_target);
    assert!(!config.include_file);
}

#[test]
fn test_log_config_from_settings() {
    let settings = ApplicationSettings {
        host: "0.0.0.0".to_string(),
        port: 8080,
        log_level: "debug".to_string(),
        log_format: "JSON".to_string(),
    };
    let config = LogConfig::from_settings(&settings);
    assert_eq!(config.level, "debug");
    assert_eq!(config.format, LogFormat::Json);
}

#[test]
fn test_log_format_from_str() {
    assert_eq!(LogFormat::from("json"), LogFormat::Json);
    assert_eq!(LogFormat::from("COMPACT"), LogFormat::Compact);
    assert_eq!(LogFormat::from("unknown"), LogFormat::Pretty);
}

#[test]
fn test_mask_sensitive() {
    assert_eq!(mask_sensitive("abc", 2), "***");
    assert_eq!(mask_sensitive("1234", 2), "****");
    assert_eq!(mask_sensitive("1234567890", 2), "12******90");
}

#[test]
fn test_mask_uuid() {
    let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
    let masked = mask_uuid(&uuid);
    assert!(masked.starts_with("550e"));
    assert!(masked.ends_with("0000"));
    assert_eq!(masked.len(), 36);
}

#[test]
fn test_mask_amount_hides_sign_and_digits() {
    assert_eq!(mask_amount(&Decimal::new(-890, 2)), "***");
    assert_eq!(mask_amount(&Decimal::from(-1500)), "***K+");
    assert_eq!(mask_amount(&Decimal::from(5_000_000)), "***M+");
}

#[test]
fn test_reconciliation_metrics_without_recorder() {
    let metrics = Metrics::new();
    metrics.record_link("payable", "manual");
    metrics.record_link_rejected("already_linked");
    metrics.record_unlink("receivable");
    metrics.record_classification("tarifa_bancaria");
    metrics.record_classification_cleared();
    metrics.record_auto_match("exact", 2, 3);
    metrics.record_ranking(12, 0.4);
    metrics.record_cache_lookup(true);
}

#[test]
fn test_infrastructure_metrics_without_recorder() {
    let metrics = Metrics::new();
    metrics.record_http_request("GET", "/reconciliation/summary", 200, 5.0);
    metrics.record_db_query("list_orphans", 3.0, true);
    metrics.record_redis_operation("get", 1.0, false);
    metrics.record_kafka_message("reconciliation.events", true);
}

#[test]
fn test_latency_timer() {
    let timer = LatencyTimer::new();
    std::thread::sleep(std::time::Duration::from_millis(10));
    assert!(timer.elapsed_ms() >= 10.0);
}

#[test]
fn test_aggregated_health_takes_worst_status() {
    let health = AggregatedHealth::new(
        "0.1.0".to_string(),
        60,
        vec![
            DependencyHealth::healthy("database", 5.0),
            DependencyHealth::degraded("redis", "Slow"),
        ],
    );
    assert_eq!(health.status, HealthStatus::Degraded);

    let health = AggregatedHealth::new(
        "0.1.0".to_string(),
        60,
        vec![
            DependencyHealth::degraded("redis", "Slow"),
            DependencyHealth::unhealthy("database", "Down"),
        ],
    );
    assert_eq!(health.status, HealthStatus::Unhealthy);
}

#[test]
fn test_dependency_health_serialization() {
    let json = serde_json::to_string(&DependencyHealth::healthy("database", 5.5)).unwrap();
    assert!(json.contains("\"name\":\"database\""));
    assert!(json.contains("\"status\":\"healthy\""));
    assert!(json.contains("\"latency_ms\":5.5"));
}

#[tokio::test]
async fn test_in_memory_backend_is_ready() {
    let checker = HealthChecker::new(None, None, None);
    let health = checker.check_all().await;

    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.dependencies.len(), 1);
    assert_eq!(health.dependencies[0].name, "database");
    assert!(checker.is_ready().await);
}

#[tokio::test]
async fn test_disconnected_kafka_degrades() {
    let checker = HealthChecker::new(None, None, Some(false));
    let health = checker.check_all().await;

    assert_eq!(health.status, HealthStatus::Degraded);
    assert!(checker.is_ready().await);
}
