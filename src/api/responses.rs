use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AccountKind, AccountRef, AccountStatus, BankTransaction, ExceptionKind, OpenAccount};
use crate::observability::AggregatedHealth;
use crate::services::{MatchBadge, MatchCandidate};

/// Standard API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorResponse>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ErrorResponse) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Error response structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<ValidationErrorDetail>) -> Self {
        self.details = Some(details);
        self
    }
}

/// Validation error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

impl ValidationErrorDetail {
    /// Flattens `validator` field errors, sorted by field name.
    pub fn from_errors(errors: &validator::ValidationErrors) -> Vec<Self> {
        let mut details: Vec<Self> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| ValidationErrorDetail {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));
        details
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub services: ServiceHealth,
}

/// Service health status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub database: bool,
    pub redis: bool,
    pub kafka: bool,
}

impl From<&AggregatedHealth> for HealthResponse {
    fn from(health: &AggregatedHealth) -> Self {
        // Dependencies that are not configured count as healthy.
        let up = |name: &str| {
            health
                .dependencies
                .iter()
                .find(|d| d.name == name)
                .map_or(true, |d| d.status.is_healthy())
        };

        Self {
            status: format!("{:?}", health.status).to_lowercase(),
            version: health.version.clone(),
            timestamp: Utc::now(),
            services: ServiceHealth {
                database: up("database"),
                redis: up("redis"),
                kafka: up("kafka"),
            },
        }
    }
}

/// Bank transaction response DTO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub company_id: Uuid,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub description: String,
    pub reconciled: bool,
    pub classification: Option<ExceptionKind>,
    pub ignored: bool,
    pub reason: Option<String>,
    pub linked_account: Option<AccountRef>,
    pub created_at: DateTime<Utc>,
}

impl From<BankTransaction> for TransactionResponse {
    fn from(tx: BankTransaction) -> Self {
        Self {
            linked_account: tx.linked_account(),
            id: tx.id,
            company_id: tx.company_id,
            amount: tx.amount,
            date: tx.date,
            description: tx.description,
            reconciled: tx.reconciled,
            classification: tx.classification,
            ignored: tx.ignored,
            reason: tx.reason,
            created_at: tx.created_at,
        }
    }
}

/// Payable or receivable response DTO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub kind: AccountKind,
    pub id: Uuid,
    pub company_id: Uuid,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub counterparty: String,
    pub status: AccountStatus,
}

impl From<OpenAccount> for AccountResponse {
    fn from(account: OpenAccount) -> Self {
        Self {
            kind: account.kind,
            id: account.id,
            company_id: account.company_id,
            amount: account.amount,
            due_date: account.due_date,
            counterparty: account.counterparty,
            status: account.status,
        }
    }
}

/// A ranked candidate with its badge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResponse<T> {
    #[serde(flatten)]
    pub candidate: T,
    pub difference: Decimal,
    pub day_distance: i64,
    pub badge: MatchBadge,
}

impl<T, S> From<MatchCandidate<S>> for CandidateResponse<T>
where
    T: From<S>,
{
    fn from(c: MatchCandidate<S>) -> Self {
        Self {
            candidate: T::from(c.candidate),
            difference: c.difference,
            day_distance: c.day_distance,
            badge: c.badge,
        }
    }
}

/// List response for the reconciliation panels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub count: usize,
}

impl<T> ListResponse<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }

    pub fn from_rows<S>(rows: Vec<S>) -> Self
    where
        T: From<S>,
    {
        Self::new(rows.into_iter().map(T::from).collect())
    }
}
