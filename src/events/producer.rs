use crate::config::KafkaSettings;
use crate::error::{AppError, Result};
use crate::observability::get_metrics;
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::client::ClientBuilder;
use rskafka::record::Record;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::types::{EventEnvelope, EventType, ReconciliationEvent};

/// Sink for reconciliation audit events.
///
/// Publishing happens after the store write has committed, so a failing
/// sink never undoes a link or classification.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event_type: EventType, event: ReconciliationEvent) -> Result<()>;
}

/// Configuration for the Kafka producer.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub compression: CompressionType,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub enum CompressionType {
    #[default]
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl From<CompressionType> for Compression {
    fn from(ct: CompressionType) -> Self {
        match ct {
            CompressionType::None => Compression::NoCompression,
            CompressionType::Gzip => Compression::Gzip,
            CompressionType::Snappy => Compression::Snappy,
            CompressionType::Lz4 => Compression::Lz4,
            CompressionType::Zstd => Compression::Zstd,
        }
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic: super::types::topics::RECONCILIATION.to_string(),
            compression: CompressionType::default(),
            retry_count: 3,
            retry_delay_ms: 100,
        }
    }
}

impl From<&KafkaSettings> for ProducerConfig {
    fn from(settings: &KafkaSettings) -> Self {
        Self {
            brokers: settings.broker_list(),
            topic: settings.topic.clone(),
            ..Self::default()
        }
    }
}

/// Kafka event producer for reconciliation events.
pub struct EventProducer {
    config: ProducerConfig,
    partition_client: RwLock<Option<Arc<PartitionClient>>>,
    client: Option<Arc<rskafka::client::Client>>,
}

impl EventProducer {
    pub fn new(config: ProducerConfig) -> Self {
        Self {
            config,
            partition_client: RwLock::new(None),
            client: None,
        }
    }

    /// Connects to the Kafka cluster.
    pub async fn connect(&mut self) -> Result<()> {
        info!("Connecting to Kafka brokers: {:?}", self.config.brokers);

        let client = ClientBuilder::new(self.config.brokers.clone()).build().await?;

        self.client = Some(Arc::new(client));
        info!("Successfully connected to Kafka");
        Ok(())
    }

    async fn get_partition_client(&self) -> Result<Arc<PartitionClient>> {
        if let Some(client) = self.partition_client.read().await.as_ref() {
            return Ok(client.clone());
        }

        let kafka_client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow!("Kafka client not connected")))?;

        let client = Arc::new(
            kafka_client
                .partition_client(self.config.topic.clone(), 0, UnknownTopicHandling::Retry)
                .await?,
        );

        *self.partition_client.write().await = Some(client.clone());
        Ok(client)
    }

    /// Serializes `payload` as JSON and sends it to the configured topic.
    pub async fn send<T: Serialize>(&self, key: Option<&str>, payload: &T) -> Result<i64> {
        let json = serde_json::to_vec(payload)
            .map_err(|e| AppError::Internal(anyhow!("Failed to serialize payload: {}", e)))?;

        self.send_raw(key, json).await
    }

    pub async fn send_raw(&self, key: Option<&str>, payload: Vec<u8>) -> Result<i64> {
        let partition_client = self.get_partition_client().await?;

        let record = Record {
            key: key.map(|k| k.as_bytes().to_vec()),
            value: Some(payload),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        let mut last_error = None;
        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                warn!("Retrying Kafka send, attempt {}/{}", attempt, self.config.retry_count);
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms * attempt as u64)).await;
            }

            match partition_client
                .produce(vec![record.clone()], self.config.compression.into())
                .await
            {
                Ok(offsets) => {
                    let offset = offsets.first().copied().unwrap_or(0);
                    debug!("Message sent to topic {} at offset {}", self.config.topic, offset);
                    return Ok(offset);
                }
                Err(e) => {
                    error!("Failed to send message to Kafka: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(AppError::Internal(anyhow!(
            "Failed to send message after {} retries: {:?}",
            self.config.retry_count,
            last_error
        )))
    }
}

#[async_trait]
impl EventPublisher for EventProducer {
    async fn publish(&self, event_type: EventType, event: ReconciliationEvent) -> Result<()> {
        let key = event.key();
        let envelope = EventEnvelope::new(event_type, event);
        let result = self.send(key.as_deref(), &envelope).await;
        get_metrics().record_kafka_message(&self.config.topic, result.is_ok());
        result.map(|_| ())
    }
}

/// Publisher used when the event stream is disabled.
#[derive(Debug, Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, event_type: EventType, _event: ReconciliationEvent) -> Result<()> {
        debug!(event_type = ?event_type, "Event stream disabled, dropping event");
        Ok(())
    }
}

/// Keeps published events in memory.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<EventEnvelope<ReconciliationEvent>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventEnvelope<ReconciliationEvent>> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn event_types(&self) -> Vec<EventType> {
        self.events().iter().map(|e| e.event_type).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event_type: EventType, event: ReconciliationEvent) -> Result<()> {
        let envelope = EventEnvelope::new(event_type, event);
        self.events
            .lock()
            .map_err(|_| AppError::Internal(anyhow!("event log poisoned")))?
            .push(envelope);
        Ok(())
    }
}
