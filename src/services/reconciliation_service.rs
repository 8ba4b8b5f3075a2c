use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::auto_match::{AutoMatchReport, AutoMatcher, ExactAutoMatcher, RemoteAutoMatcher};
use super::matching_engine::{MatchCandidate, MatchingEngine};
use crate::cache::{CachedList, ListCache};
use crate::config::ReconciliationSettings;
use crate::error::{AppError, Result};
use crate::events::{
    AutoMatchEvent, ClassificationEvent, EventPublisher, EventType, LinkEvent, LinkOrigin,
    ReconciliationEvent,
};
use crate::models::{
    AccountKind, AccountRef, BankTransaction, Classification, CompanyScope, OpenAccount,
    ReconciliationSummary,
};
use crate::observability::{get_metrics, mask_amount, mask_uuid, LatencyTimer};
use crate::repositories::{AccountRepository, BankTransactionRepository};

/// Reconciliation workflow over a company scope.
///
/// Reads go through the list cache; every write invalidates the cached
/// lists of the company it touched and publishes an audit event.
pub struct ReconciliationService {
    transactions: Arc<dyn BankTransactionRepository>,
    accounts: Arc<dyn AccountRepository>,
    cache: Arc<dyn ListCache>,
    events: Arc<dyn EventPublisher>,
    auto_matcher: Arc<dyn AutoMatcher>,
    engine: MatchingEngine,
    settings: ReconciliationSettings,
}

impl ReconciliationService {
    /// Builds the service, picking the remote auto-matcher when an endpoint
    /// is configured.
    pub fn new(
        transactions: Arc<dyn BankTransactionRepository>,
        accounts: Arc<dyn AccountRepository>,
        cache: Arc<dyn ListCache>,
        events: Arc<dyn EventPublisher>,
        settings: ReconciliationSettings,
    ) -> Result<Self> {
        let auto_matcher: Arc<dyn AutoMatcher> = match &settings.auto_match_url {
            Some(url) => Arc::new(RemoteAutoMatcher::new(url.clone())?),
            None => Arc::new(ExactAutoMatcher),
        };

        Ok(Self {
            transactions,
            accounts,
            cache,
            events,
            auto_matcher,
            engine: MatchingEngine::new(settings.close_match_threshold),
            settings,
        })
    }

    pub fn with_auto_matcher(mut self, auto_matcher: Arc<dyn AutoMatcher>) -> Self {
        self.auto_matcher = auto_matcher;
        self
    }

    pub fn transactions(&self) -> &Arc<dyn BankTransactionRepository> {
        &self.transactions
    }

    pub fn accounts(&self) -> &Arc<dyn AccountRepository> {
        &self.accounts
    }

    pub fn cache(&self) -> &Arc<dyn ListCache> {
        &self.cache
    }

    pub fn engine(&self) -> &MatchingEngine {
        &self.engine
    }

    pub fn settings(&self) -> &ReconciliationSettings {
        &self.settings
    }

    /// Orphan transactions of the scope, newest first.
    pub async fn list_orphan_transactions(
        &self,
        scope: &CompanyScope,
        limit: Option<i64>,
    ) -> Result<Vec<BankTransaction>> {
        let limit = self.settings.effective_limit(limit);
        let key = self
            .cache
            .keys()
            .list_key(CachedList::OrphanTransactions, scope, limit);

        self.cached(&key, || self.transactions.list_orphans(scope, limit, 0))
            .await
    }

    /// Payables or receivables no transaction links to, latest due date first.
    pub async fn list_unmatched_accounts(
        &self,
        scope: &CompanyScope,
        kind: AccountKind,
        limit: Option<i64>,
    ) -> Result<Vec<OpenAccount>> {
        let limit = self.settings.effective_limit(limit);
        let key = self
            .cache
            .keys()
            .list_key(CachedList::UnmatchedAccounts(kind), scope, limit);

        self.cached(&key, || self.accounts.list_unmatched(scope, kind, limit, 0))
            .await
    }

    /// Unmatched accounts of the transaction's company ranked against it.
    ///
    /// Without an explicit kind, debits look at payables and credits at
    /// receivables; a zero-amount transaction looks at both. A transaction
    /// that is already linked has no candidates and yields `Conflict`.
    pub async fn transaction_candidates(
        &self,
        scope: &CompanyScope,
        transaction_id: Uuid,
        kind: Option<AccountKind>,
    ) -> Result<Vec<MatchCandidate<OpenAccount>>> {
        let transaction = self.require_transaction(scope, transaction_id).await?;
        if transaction.is_linked() {
            return Err(AppError::Conflict(format!(
                "Transaction '{}' is already linked",
                transaction_id
            )));
        }
        let kinds = match kind.or_else(|| transaction.natural_kind()) {
            Some(kind) => vec![kind],
            None => vec![AccountKind::Payable, AccountKind::Receivable],
        };

        let mut accounts = Vec::new();
        for kind in kinds {
            accounts.extend(
                self.accounts
                    .list_unmatched(scope, kind, self.settings.max_page_size, 0)
                    .await?,
            );
        }
        accounts.retain(|a| a.company_id == transaction.company_id);

        let timer = LatencyTimer::new();
        let ranked = self.engine.rank_accounts(&transaction, accounts);
        get_metrics().record_ranking(ranked.len(), timer.elapsed_ms());
        Ok(ranked)
    }

    /// Orphan transactions of the account's company ranked against it.
    ///
    /// Fails with `Conflict` when a transaction already holds the account.
    pub async fn account_candidates(
        &self,
        scope: &CompanyScope,
        account: AccountRef,
    ) -> Result<Vec<MatchCandidate<BankTransaction>>> {
        if let Some(holder) = self.transactions.find_by_account(scope, account).await? {
            return Err(AppError::Conflict(format!(
                "{} '{}' is already linked to transaction '{}'",
                account.kind.as_str(),
                account.id,
                holder.id
            )));
        }
        let account = self.require_account(scope, account).await?;

        let mut transactions = self
            .transactions
            .list_orphans(scope, self.settings.max_page_size, 0)
            .await?;
        transactions.retain(|t| t.company_id == account.company_id);

        let timer = LatencyTimer::new();
        let ranked = self.engine.rank_transactions(&account, transactions);
        get_metrics().record_ranking(ranked.len(), timer.elapsed_ms());
        Ok(ranked)
    }

    /// Links a transaction to a payable or receivable.
    pub async fn link(
        &self,
        scope: &CompanyScope,
        transaction_id: Uuid,
        account: AccountRef,
        origin: LinkOrigin,
    ) -> Result<BankTransaction> {
        let transaction = self.require_transaction(scope, transaction_id).await?;
        let open_account = self.require_account(scope, account).await?;

        if let Err(e) = Self::check_linkable(&transaction, &open_account) {
            get_metrics().record_link_rejected(rejection_reason(&e));
            return Err(e);
        }

        if let Some(holder) = self.transactions.find_by_account(scope, account).await? {
            get_metrics().record_link_rejected("account_linked");
            return Err(AppError::Conflict(format!(
                "{} '{}' is already linked to transaction '{}'",
                account.kind.as_str(),
                account.id,
                holder.id
            )));
        }

        let linked = match self.transactions.link(scope, transaction_id, account).await {
            Ok(linked) => linked,
            Err(e) => {
                get_metrics().record_link_rejected(rejection_reason(&e));
                return Err(e);
            }
        };

        info!(
            transaction_id = %mask_uuid(&linked.id),
            account_kind = account.kind.as_str(),
            amount = %mask_amount(&linked.amount),
            origin = origin.as_str(),
            "Transaction linked"
        );
        get_metrics().record_link(account.kind.as_str(), origin.as_str());

        self.after_write(
            linked.company_id,
            EventType::TransactionLinked,
            ReconciliationEvent::Link(LinkEvent {
                transaction_id: linked.id,
                company_id: linked.company_id,
                account_kind: account.kind,
                account_id: account.id,
                amount: linked.amount,
                origin,
            }),
        )
        .await;

        Ok(linked)
    }

    /// Removes the link of a transaction, returning it to the orphan pool.
    pub async fn unlink(&self, scope: &CompanyScope, transaction_id: Uuid) -> Result<BankTransaction> {
        let transaction = self.require_transaction(scope, transaction_id).await?;
        let Some(account) = transaction.linked_account() else {
            return Err(AppError::Validation(format!(
                "Transaction '{}' is not linked",
                transaction_id
            )));
        };

        let unlinked = self.transactions.unlink(scope, transaction_id).await?;

        info!(transaction_id = %mask_uuid(&unlinked.id), account_kind = account.kind.as_str(), "Transaction unlinked");
        get_metrics().record_unlink(account.kind.as_str());

        self.after_write(
            unlinked.company_id,
            EventType::TransactionUnlinked,
            ReconciliationEvent::Link(LinkEvent {
                transaction_id: unlinked.id,
                company_id: unlinked.company_id,
                account_kind: account.kind,
                account_id: account.id,
                amount: unlinked.amount,
                origin: LinkOrigin::Manual,
            }),
        )
        .await;

        Ok(unlinked)
    }

    /// Tags a transaction as a non-operational exception.
    ///
    /// The transaction leaves the orphan pool whatever the ignore flag says.
    pub async fn classify(
        &self,
        scope: &CompanyScope,
        transaction_id: Uuid,
        classification: Classification,
    ) -> Result<BankTransaction> {
        classification.validate()?;

        let transaction = self.require_transaction(scope, transaction_id).await?;
        if transaction.is_linked() {
            return Err(AppError::Conflict(format!(
                "Transaction '{}' is linked; unlink it before classifying",
                transaction_id
            )));
        }

        let classified = self
            .transactions
            .classify(scope, transaction_id, &classification)
            .await?;

        info!(
            transaction_id = %mask_uuid(&classified.id),
            kind = classification.kind.as_str(),
            ignore = classification.ignore,
            "Transaction classified"
        );
        get_metrics().record_classification(classification.kind.as_str());

        self.after_write(
            classified.company_id,
            EventType::TransactionClassified,
            ReconciliationEvent::Classification(ClassificationEvent {
                transaction_id: classified.id,
                company_id: classified.company_id,
                kind: Some(classification.kind),
                ignore: classification.ignore,
                reason: classification.reason,
            }),
        )
        .await;

        Ok(classified)
    }

    /// Drops the classification so the transaction can be matched again.
    pub async fn clear_classification(
        &self,
        scope: &CompanyScope,
        transaction_id: Uuid,
    ) -> Result<BankTransaction> {
        let transaction = self.require_transaction(scope, transaction_id).await?;
        if !transaction.is_classified() {
            return Err(AppError::Validation(format!(
                "Transaction '{}' is not classified",
                transaction_id
            )));
        }

        let cleared = self
            .transactions
            .clear_classification(scope, transaction_id)
            .await?;

        info!(transaction_id = %mask_uuid(&cleared.id), "Classification cleared");
        get_metrics().record_classification_cleared();

        self.after_write(
            cleared.company_id,
            EventType::ClassificationCleared,
            ReconciliationEvent::Classification(ClassificationEvent {
                transaction_id: cleared.id,
                company_id: cleared.company_id,
                kind: None,
                ignore: false,
                reason: None,
            }),
        )
        .await;

        Ok(cleared)
    }

    /// Counts and reconciliation rate of the scope.
    pub async fn summary(&self, scope: &CompanyScope) -> Result<ReconciliationSummary> {
        let counts = self.transactions.counts(scope).await?;
        let payables = self
            .accounts
            .count_unmatched(scope, AccountKind::Payable)
            .await?;
        let receivables = self
            .accounts
            .count_unmatched(scope, AccountKind::Receivable)
            .await?;

        Ok(ReconciliationSummary::new(counts, payables, receivables))
    }

    /// Runs one auto-match pass over the scope.
    pub async fn auto_match(&self, scope: &CompanyScope) -> Result<AutoMatchReport> {
        let matcher = self.auto_matcher.name();
        let report = self.auto_matcher.run(self, scope).await?;

        info!(
            matcher,
            examined = report.examined,
            linked = report.linked,
            skipped = report.skipped_ambiguous,
            "Auto-match pass completed"
        );
        get_metrics().record_auto_match(matcher, report.linked, report.skipped_ambiguous);

        let event = ReconciliationEvent::AutoMatch(AutoMatchEvent {
            company_ids: scope.ids().to_vec(),
            matcher: matcher.to_string(),
            examined: report.examined,
            linked: report.linked,
            skipped_ambiguous: report.skipped_ambiguous,
        });
        if let Err(e) = self.events.publish(EventType::AutoMatchCompleted, event).await {
            warn!("Failed to publish auto-match event: {}", e);
        }

        Ok(report)
    }

    fn check_linkable(transaction: &BankTransaction, account: &OpenAccount) -> Result<()> {
        if transaction.company_id != account.company_id {
            return Err(AppError::Validation(
                "Transaction and account belong to different companies".to_string(),
            ));
        }
        if transaction.is_linked() {
            return Err(AppError::Conflict(format!(
                "Transaction '{}' is already linked",
                transaction.id
            )));
        }
        if transaction.is_classified() {
            return Err(AppError::Conflict(format!(
                "Transaction '{}' is classified as an exception",
                transaction.id
            )));
        }
        if transaction.reconciled {
            return Err(AppError::Conflict(format!(
                "Transaction '{}' was reconciled on import",
                transaction.id
            )));
        }
        Ok(())
    }

    async fn require_transaction(&self, scope: &CompanyScope, id: Uuid) -> Result<BankTransaction> {
        self.transactions
            .find_by_id(scope, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction '{}' not found", id)))
    }

    async fn require_account(&self, scope: &CompanyScope, account: AccountRef) -> Result<OpenAccount> {
        self.accounts.find(scope, account).await?.ok_or_else(|| {
            AppError::NotFound(format!("{} '{}' not found", account.kind.as_str(), account.id))
        })
    }

    /// Invalidates the company's cached lists and publishes the event.
    ///
    /// The write has already committed, so failures are only logged.
    async fn after_write(&self, company_id: Uuid, event_type: EventType, event: ReconciliationEvent) {
        if let Err(e) = self.cache.invalidate_company(company_id).await {
            warn!("Failed to invalidate cached lists: {}", e);
        }
        if let Err(e) = self.events.publish(event_type, event).await {
            warn!("Failed to publish {:?} event: {}", event_type, e);
        }
    }

    async fn cached<T, F, Fut>(&self, key: &str, fetch: F) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(rows) => return Ok(rows),
                Err(e) => warn!(key, "Discarding undecodable cache entry: {}", e),
            },
            Ok(None) => {}
            Err(e) => warn!(key, "Cache read failed: {}", e),
        }

        let rows = fetch().await?;
        match serde_json::to_string(&rows) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(key, raw).await {
                    warn!(key, "Cache write failed: {}", e);
                }
            }
            Err(e) => warn!(key, "Failed to encode list for cache: {}", e),
        }
        Ok(rows)
    }
}

fn rejection_reason(err: &AppError) -> &'static str {
    match err {
        AppError::Validation(_) => "company_mismatch",
        AppError::Conflict(_) => "conflict",
        AppError::NotFound(_) => "not_found",
        _ => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryListCache;
    use crate::events::{NoopPublisher, RecordingPublisher};
    use crate::models::{ExceptionKind, Payable, TransactionCounts};
    use crate::repositories::{MockAccountRepository, MockBankTransactionRepository};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn service(
        transactions: MockBankTransactionRepository,
        accounts: MockAccountRepository,
        events: Arc<dyn EventPublisher>,
    ) -> ReconciliationService {
        ReconciliationService::new(
            Arc::new(transactions),
            Arc::new(accounts),
            Arc::new(MemoryListCache::new("test", Duration::from_secs(60))),
            events,
            ReconciliationSettings::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_link_rejects_other_company_account() {
        let tx = BankTransaction::new(Uuid::new_v4(), dec!(-100), date(), "BOLETO");
        let account: OpenAccount = Payable::new(Uuid::new_v4(), dec!(100), date(), "Fornecedor").into();
        let scope = CompanyScope::new(vec![tx.company_id, account.company_id]).unwrap();
        let account_ref = account.reference();

        let mut transactions = MockBankTransactionRepository::new();
        let found = tx.clone();
        transactions
            .expect_find_by_id()
            .returning(move |_, _| Ok(Some(found.clone())));
        transactions.expect_link().never();

        let mut accounts = MockAccountRepository::new();
        accounts
            .expect_find()
            .returning(move |_, _| Ok(Some(account.clone())));

        let service = service(transactions, accounts, Arc::new(NoopPublisher));
        let result = service.link(&scope, tx.id, account_ref, LinkOrigin::Manual).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_link_rejects_account_held_by_other_transaction() {
        let company = Uuid::new_v4();
        let scope = CompanyScope::single(company);
        let tx = BankTransaction::new(company, dec!(-100), date(), "BOLETO");
        let account: OpenAccount = Payable::new(company, dec!(100), date(), "Fornecedor").into();
        let account_ref = account.reference();
        let mut holder = BankTransaction::new(company, dec!(-100), date(), "BOLETO 2");
        holder.link(account_ref);

        let mut transactions = MockBankTransactionRepository::new();
        let found = tx.clone();
        transactions
            .expect_find_by_id()
            .returning(move |_, _| Ok(Some(found.clone())));
        transactions
            .expect_find_by_account()
            .returning(move |_, _| Ok(Some(holder.clone())));
        transactions.expect_link().never();

        let mut accounts = MockAccountRepository::new();
        accounts
            .expect_find()
            .returning(move |_, _| Ok(Some(account.clone())));

        let service = service(transactions, accounts, Arc::new(NoopPublisher));
        let result = service.link(&scope, tx.id, account_ref, LinkOrigin::Manual).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_lost_race_surfaces_conflict_without_event() {
        let company = Uuid::new_v4();
        let scope = CompanyScope::single(company);
        let tx = BankTransaction::new(company, dec!(250), date(), "PIX RECEBIDO");
        let account = AccountRef::receivable(Uuid::new_v4());
        let open = OpenAccount {
            kind: AccountKind::Receivable,
            id: account.id,
            company_id: company,
            amount: dec!(250),
            due_date: date(),
            counterparty: "Cliente".to_string(),
            status: crate::models::AccountStatus::Pending,
        };

        let mut transactions = MockBankTransactionRepository::new();
        let found = tx.clone();
        transactions
            .expect_find_by_id()
            .returning(move |_, _| Ok(Some(found.clone())));
        transactions
            .expect_find_by_account()
            .returning(|_, _| Ok(None));
        transactions
            .expect_link()
            .times(1)
            .returning(|_, _, _| Err(AppError::Conflict("already linked".to_string())));

        let mut accounts = MockAccountRepository::new();
        accounts
            .expect_find()
            .returning(move |_, _| Ok(Some(open.clone())));

        let events = Arc::new(RecordingPublisher::new());
        let service = service(transactions, accounts, events.clone());
        let result = service.link(&scope, tx.id, account, LinkOrigin::Manual).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert!(events.events().is_empty());
    }

    #[tokio::test]
    async fn test_missing_transaction_is_not_found() {
        let mut transactions = MockBankTransactionRepository::new();
        transactions.expect_find_by_id().returning(|_, _| Ok(None));

        let service = service(transactions, MockAccountRepository::new(), Arc::new(NoopPublisher));
        let scope = CompanyScope::single(Uuid::new_v4());
        let result = service.transaction_candidates(&scope, Uuid::new_v4(), None).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_classify_validates_before_touching_store() {
        let mut transactions = MockBankTransactionRepository::new();
        transactions.expect_find_by_id().never();
        transactions.expect_classify().never();

        let service = service(transactions, MockAccountRepository::new(), Arc::new(NoopPublisher));
        let scope = CompanyScope::single(Uuid::new_v4());
        let result = service
            .classify(&scope, Uuid::new_v4(), Classification::new(ExceptionKind::Outro, true, Some("  ".to_string())))
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_summary_combines_counts() {
        let mut transactions = MockBankTransactionRepository::new();
        transactions.expect_counts().returning(|_| {
            Ok(TransactionCounts {
                total: 8,
                linked: 4,
                classified: 2,
                orphan: 2,
            })
        });

        let mut accounts = MockAccountRepository::new();
        accounts
            .expect_count_unmatched()
            .returning(|_, kind| Ok(if kind == AccountKind::Payable { 3 } else { 1 }));

        let service = service(transactions, accounts, Arc::new(NoopPublisher));
        let summary = service.summary(&CompanyScope::single(Uuid::new_v4())).await.unwrap();

        assert_eq!(summary.unmatched_payables, 3);
        assert_eq!(summary.unmatched_receivables, 1);
        assert_eq!(summary.reconciliation_rate, dec!(0.75));
    }

    #[tokio::test]
    async fn test_orphan_list_is_served_from_cache() {
        let company = Uuid::new_v4();
        let tx = BankTransaction::new(company, dec!(-42), date(), "TED");

        let mut transactions = MockBankTransactionRepository::new();
        transactions
            .expect_list_orphans()
            .times(1)
            .returning(move |_, _, _| Ok(vec![tx.clone()]));

        let service = service(transactions, MockAccountRepository::new(), Arc::new(NoopPublisher));
        let scope = CompanyScope::single(company);

        let first = service.list_orphan_transactions(&scope, None).await.unwrap();
        let second = service.list_orphan_transactions(&scope, None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(service.cache().stats().get_hits(), 1);
    }

    #[tokio::test]
    async fn test_repository_errors_propagate() {
        let mut transactions = MockBankTransactionRepository::new();
        transactions
            .expect_list_orphans()
            .returning(|_, _, _| Err(AppError::Database(sqlx::Error::PoolTimedOut)));

        let service = service(transactions, MockAccountRepository::new(), Arc::new(NoopPublisher));
        let result = service
            .list_orphan_transactions(&CompanyScope::single(Uuid::new_v4()), Some(10))
            .await;

        assert!(matches!(result, Err(AppError::Database(_))));
    }
}
