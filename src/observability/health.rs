use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::Duration;

/// Health status of a service or dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, HealthStatus::Degraded)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy)
    }
}

/// Health status of a single dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub name: String,
    pub status: HealthStatus,
    pub latency_ms: Option<f64>,
    pub message: Option<String>,
}

impl DependencyHealth {
    pub fn healthy(name: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            latency_ms: Some(latency_ms),
            message: None,
        }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            latency_ms: None,
            message: Some(message.into()),
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            message: Some(message.into()),
        }
    }

    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Aggregated health check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedHealth {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: Vec<DependencyHealth>,
}

impl AggregatedHealth {
    pub fn new(version: String, uptime_seconds: u64, dependencies: Vec<DependencyHealth>) -> Self {
        let status = Self::aggregate_status(&dependencies);
        Self {
            status,
            version,
            uptime_seconds,
            dependencies,
        }
    }

    fn aggregate_status(dependencies: &[DependencyHealth]) -> HealthStatus {
        let has_unhealthy = dependencies.iter().any(|d| d.status.is_unhealthy());
        let has_degraded = dependencies.iter().any(|d| d.status.is_degraded());

        if has_unhealthy {
            HealthStatus::Unhealthy
        } else if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Health checker for the service's dependencies.
///
/// Every dependency is optional: the in-memory backend runs without a
/// database and the cache and event stream can be disabled.
pub struct HealthChecker {
    pool: Option<PgPool>,
    redis_client: Option<redis::Client>,
    /// `None` when the event stream is disabled.
    kafka_connected: Option<bool>,
    start_time: std::time::Instant,
}

impl HealthChecker {
    pub fn new(pool: Option<PgPool>, redis_client: Option<redis::Client>, kafka_connected: Option<bool>) -> Self {
        Self {
            pool,
            redis_client,
            kafka_connected,
            start_time: std::time::Instant::now(),
        }
    }

    /// Performs a full health check of all configured dependencies.
    pub async fn check_all(&self) -> AggregatedHealth {
        let mut dependencies = vec![self.check_database().await];

        if self.redis_client.is_some() {
            dependencies.push(self.check_redis().await);
        }
        if let Some(kafka) = self.check_kafka() {
            dependencies.push(kafka);
        }

        AggregatedHealth::new(
            env!("CARGO_PKG_VERSION").to_string(),
            self.start_time.elapsed().as_secs(),
            dependencies,
        )
    }

    /// Checks database connectivity.
    pub async fn check_database(&self) -> DependencyHealth {
        let Some(pool) = &self.pool else {
            return DependencyHealth::healthy("database", 0.0).with_message("in-memory store");
        };

        let start = std::time::Instant::now();
        match tokio::time::timeout(Duration::from_secs(5), sqlx::query("SELECT 1").fetch_one(pool)).await {
            Ok(Ok(_)) => {
                let latency = start.elapsed().as_secs_f64() * 1000.0;
                if latency > 100.0 {
                    DependencyHealth::degraded("database", "High latency detected").with_latency(latency)
                } else {
                    DependencyHealth::healthy("database", latency)
                }
            }
            Ok(Err(e)) => DependencyHealth::unhealthy("database", format!("Query failed: {}", e)),
            Err(_) => DependencyHealth::unhealthy("database", "Connection timeout"),
        }
    }

    /// Checks Redis connectivity. A broken cache only degrades the service.
    pub async fn check_redis(&self) -> DependencyHealth {
        let Some(client) = &self.redis_client else {
            return DependencyHealth::degraded("redis", "Cache disabled");
        };

        let start = std::time::Instant::now();
        match client.get_multiplexed_async_connection().await {
            Ok(mut conn) => {
                match tokio::time::timeout(
                    Duration::from_secs(5),
                    redis::cmd("PING").query_async::<_, ()>(&mut conn),
                )
                .await
                {
                    Ok(Ok(_)) => DependencyHealth::healthy("redis", start.elapsed().as_secs_f64() * 1000.0),
                    Ok(Err(e)) => DependencyHealth::degraded("redis", format!("PING failed: {}", e)),
                    Err(_) => DependencyHealth::degraded("redis", "PING timeout"),
                }
            }
            Err(e) => DependencyHealth::degraded("redis", format!("Connection failed: {}", e)),
        }
    }

    /// Reports whether the audit event stream is connected.
    pub fn check_kafka(&self) -> Option<DependencyHealth> {
        self.kafka_connected.map(|connected| {
            if connected {
                DependencyHealth::healthy("kafka", 0.0)
            } else {
                DependencyHealth::degraded("kafka", "Event stream not connected")
            }
        })
    }

    /// Readiness: the store must answer; cache and events may be degraded.
    pub async fn is_ready(&self) -> bool {
        !self.check_database().await.status.is_unhealthy()
    }

    /// Returns uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(!HealthStatus::Healthy.is_degraded());
        assert!(!HealthStatus::Healthy.is_unhealthy());

        assert!(!HealthStatus::Degraded.is_healthy());
        assert!(HealthStatus::Degraded.is_degraded());
        assert!(!HealthStatus::Degraded.is_unhealthy());

        assert!(!HealthStatus::Unhealthy.is_healthy());
        assert!(!HealthStatus::Unhealthy.is_degraded());
        assert!(HealthStatus::Unhealthy.is_unhealthy());
    }

    #[test]
    fn test_dependency_health_constructors() {
        let healthy = DependencyHealth::healthy("test", 5.0);
        assert_eq!(healthy.status, HealthStatus::Healthy);
        assert_eq!(healthy.latency_ms, Some(5.0));

        let degraded = DependencyHealth::degraded("test", "slow");
        assert_eq!(degraded.status, HealthStatus::Degraded);
        assert_eq!(degraded.message, Some("slow".to_string()));

        let unhealthy = DependencyHealth::unhealthy("test", "down");
        assert_eq!(unhealthy.status, HealthStatus::Unhealthy);
        assert_eq!(unhealthy.message, Some("down".to_string()));
    }

    #[test]
    fn test_aggregated_health_status() {
        let all_healthy = vec![
            DependencyHealth::healthy("db", 1.0),
            DependencyHealth::healthy("redis", 2.0),
        ];
        let health = AggregatedHealth::new("1.0.0".to_string(), 100, all_healthy);
        assert_eq!(health.status, HealthStatus::Healthy);

        let one_degraded = vec![
            DependencyHealth::healthy("db", 1.0),
            DependencyHealth::degraded("redis", "slow"),
        ];
        let health = AggregatedHealth::new("1.0.0".to_string(), 100, one_degraded);
        assert_eq!(health.status, HealthStatus::Degraded);

        let one_unhealthy = vec![
            DependencyHealth::healthy("db", 1.0),
            DependencyHealth::unhealthy("redis", "down"),
        ];
        let health = AggregatedHealth::new("1.0.0".to_string(), 100, one_unhealthy);
        assert_eq!(health.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_memory_backend_without_dependencies() {
        let checker = HealthChecker::new(None, None, None);

        let health = checker.check_all().await;
        assert_eq!(health.dependencies.len(), 1);
        assert_eq!(health.dependencies[0].name, "database");
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(checker.is_ready().await);

        let disconnected = HealthChecker::new(None, None, Some(false));
        let health = disconnected.check_all().await;
        assert_eq!(health.dependencies.len(), 2);
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(disconnected.is_ready().await);
    }
}
