use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

use super::list_cache::{CacheKeys, CacheStats, ListCache};
use crate::config::CacheSettings;
use crate::error::{AppError, Result};
use crate::observability::{get_metrics, LatencyTimer};

/// Redis-backed [`ListCache`].
///
/// Connection and read failures are logged and reported as misses so the
/// panels fall back to the database. Invalidation failures are returned.
pub struct RedisListCache {
    client: redis::Client,
    settings: CacheSettings,
    keys: CacheKeys,
    stats: CacheStats,
}

impl RedisListCache {
    pub fn new(client: redis::Client, settings: CacheSettings) -> Self {
        Self {
            keys: CacheKeys::new(settings.key_prefix.clone()),
            client,
            settings,
            stats: CacheStats::new(),
        }
    }

    async fn connection(&self, operation: &str) -> Option<redis::aio::MultiplexedConnection> {
        match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                self.stats.record_error();
                get_metrics().record_redis_operation(operation, 0.0, false);
                tracing::warn!("Redis connection error in cache {}: {}", operation, e);
                None
            }
        }
    }
}

#[async_trait]
impl ListCache for RedisListCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if !self.settings.enabled {
            return Ok(None);
        }

        let timer = LatencyTimer::new();
        let Some(mut conn) = self.connection("get").await else {
            return Ok(None);
        };

        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(value)) => {
                self.stats.record_hit();
                get_metrics().record_cache_lookup(true);
                get_metrics().record_redis_operation("get", timer.elapsed_ms(), true);
                tracing::debug!(key = %key, "Cache hit for reconciliation list");
                Ok(Some(value))
            }
            Ok(None) => {
                self.stats.record_miss();
                get_metrics().record_cache_lookup(false);
                get_metrics().record_redis_operation("get", timer.elapsed_ms(), true);
                Ok(None)
            }
            Err(e) => {
                self.stats.record_error();
                get_metrics().record_redis_operation("get", timer.elapsed_ms(), false);
                tracing::warn!("Redis get error: {}", e);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        if !self.settings.enabled {
            return Ok(());
        }

        let timer = LatencyTimer::new();
        let Some(mut conn) = self.connection("set").await else {
            return Ok(());
        };

        match conn.set_ex::<_, _, ()>(key, value, self.settings.ttl_secs).await {
            Ok(()) => {
                get_metrics().record_redis_operation("set", timer.elapsed_ms(), true);
                tracing::debug!(key = %key, ttl_secs = self.settings.ttl_secs, "Cached reconciliation list");
                Ok(())
            }
            Err(e) => {
                self.stats.record_error();
                get_metrics().record_redis_operation("set", timer.elapsed_ms(), false);
                tracing::warn!("Redis set error: {}", e);
                Err(AppError::Redis(e))
            }
        }
    }

    async fn invalidate_company(&self, company_id: Uuid) -> Result<()> {
        if !self.settings.enabled {
            return Ok(());
        }

        let pattern = self.keys.company_pattern(company_id);
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                self.stats.record_error();
                get_metrics().record_redis_operation("invalidate", 0.0, false);
                tracing::warn!("Redis connection error in cache invalidate: {}", e);
                return Err(AppError::Redis(e));
            }
        };

        let mut cursor: u64 = 0;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = match redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    self.stats.record_error();
                    tracing::warn!("Redis SCAN error: {}", e);
                    return Err(AppError::Redis(e));
                }
            };

            for key in keys {
                if let Err(e) = conn.del::<_, ()>(&key).await {
                    self.stats.record_error();
                    tracing::warn!("Redis del error for key {}: {}", key, e);
                } else {
                    self.stats.record_invalidation();
                }
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        tracing::debug!(company_id = %company_id, "Invalidated cached reconciliation lists");
        Ok(())
    }

    fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
