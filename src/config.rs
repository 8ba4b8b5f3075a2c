use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    pub redis: RedisSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub kafka: KafkaSettings,
    pub application: ApplicationSettings,
    #[serde(default)]
    pub reconciliation: ReconciliationSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

/// Which store backs the repositories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub key_prefix: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 60,
            key_prefix: "recon".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaSettings {
    pub enabled: bool,
    pub brokers: String,
    pub topic: String,
}

impl Default for KafkaSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            brokers: "localhost:9092".to_string(),
            topic: "reconciliation.events".to_string(),
        }
    }
}

impl KafkaSettings {
    pub fn broker_list(&self) -> Vec<String> {
        self.brokers
            .split(',')
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Tunables of the matching workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationSettings {
    /// Rows returned by candidate lists when the caller gives no limit.
    pub page_size: i64,
    pub max_page_size: i64,
    /// Differences strictly below this value earn the "close" badge.
    pub close_match_threshold: Decimal,
    /// Batch endpoint for the remote auto-match pass; the local exact matcher is used when unset.
    pub auto_match_url: Option<String>,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_page_size: 500,
            close_match_threshold: Decimal::ONE,
            auto_match_url: None,
        }
    }
}

impl ReconciliationSettings {
    /// Resolves a caller-supplied limit against the page size and cap.
    pub fn effective_limit(&self, requested: Option<i64>) -> i64 {
        match requested {
            Some(limit) if limit > 0 => limit.min(self.max_page_size),
            _ => self.page_size,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
