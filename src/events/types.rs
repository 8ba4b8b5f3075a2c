use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AccountKind, ExceptionKind};

/// Topics for reconciliation events.
pub mod topics {
    pub const RECONCILIATION: &str = "reconciliation.events";
}

/// Type of reconciliation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    TransactionLinked,
    TransactionUnlinked,
    TransactionClassified,
    ClassificationCleared,
    AutoMatchCompleted,
}

/// Envelope wrapping all events with common metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub correlation_id: Option<String>,
    pub payload: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(event_type: EventType, payload: T) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            timestamp: Utc::now(),
            source: "reconciliation-engine".to_string(),
            correlation_id: None,
            payload,
        }
    }
}

/// Whether a link was made by a person or by an auto-match pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkOrigin {
    Manual,
    Auto,
}

impl LinkOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkOrigin::Manual => "manual",
            LinkOrigin::Auto => "auto",
        }
    }
}

/// Payload for link and unlink events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEvent {
    pub transaction_id: Uuid,
    pub company_id: Uuid,
    pub account_kind: AccountKind,
    pub account_id: Uuid,
    pub amount: Decimal,
    pub origin: LinkOrigin,
}

/// Payload for classification events. `kind` is `None` when cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationEvent {
    pub transaction_id: Uuid,
    pub company_id: Uuid,
    pub kind: Option<ExceptionKind>,
    pub ignore: bool,
    pub reason: Option<String>,
}

/// Payload for a finished auto-match pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoMatchEvent {
    pub company_ids: Vec<Uuid>,
    pub matcher: String,
    pub examined: u64,
    pub linked: u64,
    pub skipped_ambiguous: u64,
}

/// Every event the service publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReconciliationEvent {
    Link(LinkEvent),
    Classification(ClassificationEvent),
    AutoMatch(AutoMatchEvent),
}

impl ReconciliationEvent {
    /// Partition key: the company the event belongs to, when there is one.
    pub fn key(&self) -> Option<String> {
        match self {
            ReconciliationEvent::Link(e) => Some(e.company_id.to_string()),
            ReconciliationEvent::Classification(e) => Some(e.company_id.to_string()),
            ReconciliationEvent::AutoMatch(e) => e.company_ids.first().map(Uuid::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn link_event() -> LinkEvent {
        LinkEvent {
            transaction_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            account_kind: AccountKind::Payable,
            account_id: Uuid::new_v4(),
            amount: dec!(-1500.00),
            origin: LinkOrigin::Manual,
        }
    }

    #[test]
    fn test_event_envelope_creation() {
        let envelope = EventEnvelope::new(EventType::TransactionLinked, link_event());

        assert_eq!(envelope.event_type, EventType::TransactionLinked);
        assert_eq!(envelope.source, "reconciliation-engine");
        assert!(envelope.correlation_id.is_none());
    }

    #[test]
    fn test_event_serialization() {
        let event = ReconciliationEvent::Classification(ClassificationEvent {
            transaction_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            kind: Some(ExceptionKind::TarifaBancaria),
            ignore: true,
            reason: None,
        });

        let envelope = EventEnvelope::new(EventType::TransactionClassified, event);
        let json = serde_json::to_string(&envelope).expect("Failed to serialize");

        assert!(json.contains("TRANSACTION_CLASSIFIED"));
        assert!(json.contains("tarifa_bancaria"));
        assert!(json.contains("reconciliation-engine"));
    }

    #[test]
    fn test_event_key_is_company() {
        let link = link_event();
        let company = link.company_id;
        assert_eq!(ReconciliationEvent::Link(link).key(), Some(company.to_string()));

        let auto = ReconciliationEvent::AutoMatch(AutoMatchEvent {
            company_ids: vec![],
            matcher: "exact".to_string(),
            examined: 0,
            linked: 0,
            skipped_ambiguous: 0,
        });
        assert!(auto.key().is_none());
    }
}
