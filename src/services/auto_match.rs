use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::events::LinkOrigin;
use crate::models::{AccountKind, BankTransaction, CompanyScope, OpenAccount};

use super::reconciliation_service::ReconciliationService;

/// Outcome of one auto-match pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoMatchReport {
    /// Orphan transactions considered by the pass.
    #[serde(default)]
    pub examined: u64,
    #[serde(default)]
    pub linked: u64,
    /// Transactions left alone because they had zero or several exact
    /// candidates, or lost a race to another writer.
    #[serde(default)]
    pub skipped_ambiguous: u64,
}

/// Strategy that links orphan transactions without user input.
#[async_trait]
pub trait AutoMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, service: &ReconciliationService, scope: &CompanyScope) -> Result<AutoMatchReport>;
}

/// Local matcher that only links unambiguous exact pairs.
///
/// Links go through [`ReconciliationService::link`], so every guard and
/// cache invalidation of a manual link applies.
#[derive(Debug, Default)]
pub struct ExactAutoMatcher;

#[async_trait]
impl AutoMatcher for ExactAutoMatcher {
    fn name(&self) -> &'static str {
        "exact"
    }

    async fn run(&self, service: &ReconciliationService, scope: &CompanyScope) -> Result<AutoMatchReport> {
        // Uniqueness is judged over every unlinked row, not the first page.
        let transactions = all_orphans(service, scope).await?;
        let mut accounts = all_unmatched(service, scope, AccountKind::Payable).await?;
        accounts.extend(all_unmatched(service, scope, AccountKind::Receivable).await?);

        let proposals = service.engine().unambiguous_pairs(&transactions, &accounts);
        let mut report = AutoMatchReport {
            examined: transactions.len() as u64,
            ..AutoMatchReport::default()
        };

        for proposal in &proposals {
            match service
                .link(scope, proposal.transaction_id, proposal.account, LinkOrigin::Auto)
                .await
            {
                Ok(_) => report.linked += 1,
                Err(AppError::Conflict(reason)) => {
                    debug!(transaction_id = %proposal.transaction_id, %reason, "Auto-match pair taken concurrently");
                }
                Err(e) => return Err(e),
            }
        }

        report.skipped_ambiguous = report.examined - report.linked;
        Ok(report)
    }
}

async fn all_orphans(service: &ReconciliationService, scope: &CompanyScope) -> Result<Vec<BankTransaction>> {
    let page_size = service.settings().max_page_size.max(1);
    let mut rows = Vec::new();
    loop {
        let page = service
            .transactions()
            .list_orphans(scope, page_size, rows.len() as i64)
            .await?;
        let last = (page.len() as i64) < page_size;
        rows.extend(page);
        if last {
            return Ok(rows);
        }
    }
}

async fn all_unmatched(
    service: &ReconciliationService,
    scope: &CompanyScope,
    kind: AccountKind,
) -> Result<Vec<OpenAccount>> {
    let page_size = service.settings().max_page_size.max(1);
    let mut rows = Vec::new();
    loop {
        let page = service
            .accounts()
            .list_unmatched(scope, kind, page_size, rows.len() as i64)
            .await?;
        let last = (page.len() as i64) < page_size;
        rows.extend(page);
        if last {
            return Ok(rows);
        }
    }
}

#[derive(Debug, Serialize)]
struct RemoteAutoMatchRequest<'a> {
    company_ids: &'a [Uuid],
}

/// Delegates the pass to an external batch endpoint.
///
/// The endpoint receives `{"company_ids": [...]}` and answers with an
/// [`AutoMatchReport`]. Links it writes bypass this process, so the caller
/// invalidates the cached lists of every company in the scope afterwards.
pub struct RemoteAutoMatcher {
    client: reqwest::Client,
    url: String,
}

impl RemoteAutoMatcher {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AutoMatcher for RemoteAutoMatcher {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn run(&self, service: &ReconciliationService, scope: &CompanyScope) -> Result<AutoMatchReport> {
        info!(url = %self.url, companies = scope.len(), "Requesting remote auto-match");

        let response = self
            .client
            .post(&self.url)
            .json(&RemoteAutoMatchRequest {
                company_ids: scope.ids(),
            })
            .send()
            .await?
            .error_for_status()?;

        let report: AutoMatchReport = response.json().await?;

        for company_id in scope.ids() {
            if let Err(e) = service.cache().invalidate_company(*company_id).await {
                warn!("Failed to invalidate lists after remote auto-match: {}", e);
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_tolerates_missing_fields() {
        let report: AutoMatchReport = serde_json::from_str(r#"{"linked": 4}"#).unwrap();
        assert_eq!(report.linked, 4);
        assert_eq!(report.examined, 0);
        assert_eq!(report.skipped_ambiguous, 0);
    }

    #[test]
    fn test_remote_request_body() {
        let ids = vec![Uuid::nil()];
        let body = serde_json::to_value(RemoteAutoMatchRequest { company_ids: &ids }).unwrap();
        assert_eq!(body["company_ids"][0], "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn test_matcher_names() {
        assert_eq!(ExactAutoMatcher.name(), "exact");
        let remote = RemoteAutoMatcher::new("http://localhost:9/auto-match").unwrap();
        assert_eq!(remote.name(), "remote");
        assert_eq!(remote.url(), "http://localhost:9/auto-match");
    }
}
