use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AccountRepository, BankTransactionRepository};
use crate::error::{AppError, Result};
use crate::models::{
    AccountKind, AccountRef, BankTransaction, Classification, CompanyScope, OpenAccount, Payable,
    Receivable, TransactionCounts,
};

#[derive(Debug, Default)]
struct MemoryState {
    transactions: HashMap<Uuid, BankTransaction>,
    payables: HashMap<Uuid, Payable>,
    receivables: HashMap<Uuid, Receivable>,
}

impl MemoryState {
    fn account_exists(&self, account: AccountRef) -> bool {
        match account.kind {
            AccountKind::Payable => self.payables.contains_key(&account.id),
            AccountKind::Receivable => self.receivables.contains_key(&account.id),
        }
    }

    fn holder_of(&self, account: AccountRef) -> Option<&BankTransaction> {
        self.transactions
            .values()
            .find(|t| t.linked_account() == Some(account))
    }

    fn scoped_transaction_mut(
        &mut self,
        scope: &CompanyScope,
        id: Uuid,
    ) -> Result<&mut BankTransaction> {
        self.transactions
            .get_mut(&id)
            .filter(|t| scope.contains(&t.company_id))
            .ok_or_else(|| AppError::NotFound(format!("Transaction '{}' not found", id)))
    }

    fn open_accounts(&self, kind: AccountKind) -> Vec<OpenAccount> {
        match kind {
            AccountKind::Payable => self.payables.values().cloned().map(OpenAccount::from).collect(),
            AccountKind::Receivable => self
                .receivables
                .values()
                .cloned()
                .map(OpenAccount::from)
                .collect(),
        }
    }
}

fn page<T>(rows: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    rows.into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

/// Process-local store implementing both repository traits.
///
/// Used by the `memory` storage backend and by tests. All writes happen under
/// one write lock, so the link guards are atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BankTransactionRepository for InMemoryStore {
    async fn insert(&self, transaction: &BankTransaction) -> Result<BankTransaction> {
        let mut state = self.state.write().await;

        if state.transactions.contains_key(&transaction.id) {
            return Err(AppError::Conflict(format!(
                "Transaction '{}' already exists",
                transaction.id
            )));
        }
        if let Some(account) = transaction.linked_account() {
            if !state.account_exists(account) {
                return Err(AppError::NotFound(format!("Account '{}' not found", account.id)));
            }
            if state.holder_of(account).is_some() {
                return Err(AppError::Conflict(format!(
                    "Account '{}' is already linked",
                    account.id
                )));
            }
        }

        state
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(transaction.clone())
    }

    async fn find_by_id(&self, scope: &CompanyScope, id: Uuid) -> Result<Option<BankTransaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .get(&id)
            .filter(|t| scope.contains(&t.company_id))
            .cloned())
    }

    async fn find_by_account(
        &self,
        scope: &CompanyScope,
        account: AccountRef,
    ) -> Result<Option<BankTransaction>> {
        let state = self.state.read().await;
        Ok(state
            .holder_of(account)
            .filter(|t| scope.contains(&t.company_id))
            .cloned())
    }

    async fn list_orphans(
        &self,
        scope: &CompanyScope,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BankTransaction>> {
        let state = self.state.read().await;
        let mut rows: Vec<BankTransaction> = state
            .transactions
            .values()
            .filter(|t| scope.contains(&t.company_id) && t.is_orphan())
            .cloned()
            .collect();

        rows.sort_by(|a, b| b.date.cmp(&a.date).then(a.id.cmp(&b.id)));
        Ok(page(rows, limit, offset))
    }

    async fn link(
        &self,
        scope: &CompanyScope,
        id: Uuid,
        account: AccountRef,
    ) -> Result<BankTransaction> {
        let mut state = self.state.write().await;

        if !state.account_exists(account) {
            return Err(AppError::NotFound(format!("Account '{}' not found", account.id)));
        }
        if state.holder_of(account).is_some() {
            return Err(AppError::Conflict(format!(
                "Account '{}' is already linked",
                account.id
            )));
        }

        let transaction = state.scoped_transaction_mut(scope, id)?;
        if transaction.reconciled || transaction.is_linked() || transaction.is_classified() {
            return Err(AppError::Conflict(
                "Transaction is already reconciled, linked or classified".to_string(),
            ));
        }

        transaction.link(account);
        Ok(transaction.clone())
    }

    async fn unlink(&self, scope: &CompanyScope, id: Uuid) -> Result<BankTransaction> {
        let mut state = self.state.write().await;
        let transaction = state.scoped_transaction_mut(scope, id)?;
        transaction.unlink();
        Ok(transaction.clone())
    }

    async fn classify(
        &self,
        scope: &CompanyScope,
        id: Uuid,
        classification: &Classification,
    ) -> Result<BankTransaction> {
        let mut state = self.state.write().await;
        let transaction = state.scoped_transaction_mut(scope, id)?;

        if transaction.is_linked() {
            return Err(AppError::Conflict(
                "Linked transactions cannot be classified".to_string(),
            ));
        }

        transaction.classify(classification);
        Ok(transaction.clone())
    }

    async fn clear_classification(&self, scope: &CompanyScope, id: Uuid) -> Result<BankTransaction> {
        let mut state = self.state.write().await;
        let transaction = state.scoped_transaction_mut(scope, id)?;
        transaction.clear_classification();
        Ok(transaction.clone())
    }

    async fn counts(&self, scope: &CompanyScope) -> Result<TransactionCounts> {
        let state = self.state.read().await;
        let mut counts = TransactionCounts::default();

        for t in state
            .transactions
            .values()
            .filter(|t| scope.contains(&t.company_id))
        {
            counts.total += 1;
            if t.reconciled || t.is_linked() {
                counts.linked += 1;
            } else if t.is_classified() {
                counts.classified += 1;
            }
            if t.is_orphan() {
                counts.orphan += 1;
            }
        }

        Ok(counts)
    }
}

#[async_trait]
impl AccountRepository for InMemoryStore {
    async fn insert_payable(&self, payable: &Payable) -> Result<Payable> {
        let mut state = self.state.write().await;
        if state.payables.contains_key(&payable.id) {
            return Err(AppError::Conflict(format!("Payable '{}' already exists", payable.id)));
        }
        state.payables.insert(payable.id, payable.clone());
        Ok(payable.clone())
    }

    async fn insert_receivable(&self, receivable: &Receivable) -> Result<Receivable> {
        let mut state = self.state.write().await;
        if state.receivables.contains_key(&receivable.id) {
            return Err(AppError::Conflict(format!(
                "Receivable '{}' already exists",
                receivable.id
            )));
        }
        state.receivables.insert(receivable.id, receivable.clone());
        Ok(receivable.clone())
    }

    async fn find(&self, scope: &CompanyScope, account: AccountRef) -> Result<Option<OpenAccount>> {
        let state = self.state.read().await;
        let found = match account.kind {
            AccountKind::Payable => state.payables.get(&account.id).cloned().map(OpenAccount::from),
            AccountKind::Receivable => state
                .receivables
                .get(&account.id)
                .cloned()
                .map(OpenAccount::from),
        };
        Ok(found.filter(|a| scope.contains(&a.company_id)))
    }

    async fn list_unmatched(
        &self,
        scope: &CompanyScope,
        kind: AccountKind,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<OpenAccount>> {
        let state = self.state.read().await;
        let mut rows: Vec<OpenAccount> = state
            .open_accounts(kind)
            .into_iter()
            .filter(|a| scope.contains(&a.company_id))
            .filter(|a| state.holder_of(a.reference()).is_none())
            .collect();

        rows.sort_by(|a, b| b.due_date.cmp(&a.due_date).then(a.id.cmp(&b.id)));
        Ok(page(rows, limit, offset))
    }

    async fn count_unmatched(&self, scope: &CompanyScope, kind: AccountKind) -> Result<i64> {
        let state = self.state.read().await;
        let count = state
            .open_accounts(kind)
            .iter()
            .filter(|a| scope.contains(&a.company_id))
            .filter(|a| state.holder_of(a.reference()).is_none())
            .count();
        Ok(count as i64)
    }
}
