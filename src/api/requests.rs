use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::Result;
use crate::models::{AccountKind, AccountRef, Classification, CompanyScope, ExceptionKind};

/// Query parameters for the orphan transaction panel.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ListOrphansQuery {
    /// Comma-separated company ids.
    #[validate(length(min = 1, message = "company_ids cannot be empty"))]
    pub company_ids: String,
    #[validate(range(min = 1, message = "limit must be positive"))]
    pub limit: Option<i64>,
}

/// Query parameters for the unmatched payables/receivables panel.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ListUnmatchedQuery {
    #[validate(length(min = 1, message = "company_ids cannot be empty"))]
    pub company_ids: String,
    pub kind: AccountKind,
    #[validate(range(min = 1, message = "limit must be positive"))]
    pub limit: Option<i64>,
}

/// Query parameters for ranking accounts against a transaction.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransactionCandidatesQuery {
    #[validate(length(min = 1, message = "company_ids cannot be empty"))]
    pub company_ids: String,
    pub kind: Option<AccountKind>,
}

/// Query carrying only the company scope.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ScopeQuery {
    #[validate(length(min = 1, message = "company_ids cannot be empty"))]
    pub company_ids: String,
}

/// Request to link a transaction to a payable or receivable.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LinkRequest {
    #[validate(length(min = 1, message = "company_ids cannot be empty"))]
    pub company_ids: Vec<Uuid>,
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub account_kind: AccountKind,
}

impl LinkRequest {
    pub fn account(&self) -> AccountRef {
        AccountRef {
            kind: self.account_kind,
            id: self.account_id,
        }
    }
}

/// Request to classify a transaction as a non-operational exception.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClassifyRequest {
    #[validate(length(min = 1, message = "company_ids cannot be empty"))]
    pub company_ids: Vec<Uuid>,
    pub kind: ExceptionKind,
    #[serde(default = "default_ignore")]
    pub ignore: bool,
    #[validate(length(max = 500, message = "reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

fn default_ignore() -> bool {
    true
}

impl ClassifyRequest {
    pub fn classification(&self) -> Classification {
        Classification::new(self.kind, self.ignore, self.reason.clone())
    }
}

/// Request to run an auto-match pass.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AutoMatchRequest {
    #[validate(length(min = 1, message = "company_ids cannot be empty"))]
    pub company_ids: Vec<Uuid>,
}

/// Builds the scope from a query-string id list.
pub fn scope_from_query(raw: &str) -> Result<CompanyScope> {
    CompanyScope::parse(raw)
}

/// Builds the scope from a JSON id list.
pub fn scope_from_ids(ids: &[Uuid]) -> Result<CompanyScope> {
    CompanyScope::new(ids.iter().copied())
}
