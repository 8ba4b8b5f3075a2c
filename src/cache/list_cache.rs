use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{AccountKind, CompanyScope};

/// Cache statistics for monitoring.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub invalidations: AtomicU64,
    pub errors: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn get_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn get_misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn get_invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    pub fn get_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// The cached panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachedList {
    OrphanTransactions,
    UnmatchedAccounts(AccountKind),
}

impl CachedList {
    fn name(&self) -> &'static str {
        match self {
            CachedList::OrphanTransactions => "orphans",
            CachedList::UnmatchedAccounts(AccountKind::Payable) => "unmatched-payables",
            CachedList::UnmatchedAccounts(AccountKind::Receivable) => "unmatched-receivables",
        }
    }
}

/// Builds cache keys of the form `{prefix}:{list}:{limit}:{company,company,...}`.
///
/// Company ids are the key suffix so every entry touching a company can be
/// found by pattern when that company's data changes.
#[derive(Debug, Clone)]
pub struct CacheKeys {
    prefix: String,
}

impl CacheKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn list_key(&self, list: CachedList, scope: &CompanyScope, limit: i64) -> String {
        format!("{}:{}:{}:{}", self.prefix, list.name(), limit, scope)
    }

    /// Glob pattern matching every key whose scope includes `company_id`.
    pub fn company_pattern(&self, company_id: Uuid) -> String {
        format!("{}:*{}*", self.prefix, company_id)
    }

    fn key_mentions(&self, key: &str, company_id: Uuid) -> bool {
        key.starts_with(&format!("{}:", self.prefix)) && key.contains(&company_id.to_string())
    }
}

/// Serialized cache of the orphan/unmatched panels.
#[async_trait]
pub trait ListCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Drops every entry whose scope includes the company.
    async fn invalidate_company(&self, company_id: Uuid) -> Result<()>;

    fn keys(&self) -> &CacheKeys;

    fn stats(&self) -> &CacheStats;
}

/// Process-local [`ListCache`] with per-entry expiry.
pub struct MemoryListCache {
    keys: CacheKeys,
    ttl: Duration,
    entries: RwLock<HashMap<String, (String, Instant)>>,
    stats: CacheStats,
}

impl MemoryListCache {
    pub fn new(prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            keys: CacheKeys::new(prefix),
            ttl,
            entries: RwLock::new(HashMap::new()),
            stats: CacheStats::new(),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl ListCache for MemoryListCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => {
                self.stats.record_hit();
                Ok(Some(value.clone()))
            }
            _ => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(key.to_string(), (value, now + self.ttl));
        Ok(())
    }

    async fn invalidate_company(&self, company_id: Uuid) -> Result<()> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !self.keys.key_mentions(key, company_id));
        for _ in entries.len()..before {
            self.stats.record_invalidation();
        }
        Ok(())
    }

    fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
