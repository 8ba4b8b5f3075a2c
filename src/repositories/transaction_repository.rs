use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{map_write_error, timed};
use crate::error::{AppError, Result};
use crate::models::{
    AccountKind, AccountRef, BankTransaction, Classification, CompanyScope, TransactionCounts,
};

const TRANSACTION_COLUMNS: &str = "id, company_id, amount, date, description, reconciled, \
     tipo_movimento, ignorar_conciliacao, motivo, conta_pagar_id, conta_receber_id, created_at";

/// Storage for bank transactions and their link/classification state.
///
/// Every method takes the caller's [`CompanyScope`]; rows of other companies
/// behave as if they did not exist.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BankTransactionRepository: Send + Sync {
    /// Stores an imported transaction.
    async fn insert(&self, transaction: &BankTransaction) -> Result<BankTransaction>;

    async fn find_by_id(&self, scope: &CompanyScope, id: Uuid) -> Result<Option<BankTransaction>>;

    /// Finds the transaction currently linked to an account, if any.
    async fn find_by_account(
        &self,
        scope: &CompanyScope,
        account: AccountRef,
    ) -> Result<Option<BankTransaction>>;

    /// Orphan transactions, newest first. `offset` skips rows of earlier pages.
    async fn list_orphans(
        &self,
        scope: &CompanyScope,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BankTransaction>>;

    /// Links a transaction to an account.
    ///
    /// Fails with `Conflict` when the transaction is already linked or
    /// classified, or when another transaction already holds the account.
    async fn link(
        &self,
        scope: &CompanyScope,
        id: Uuid,
        account: AccountRef,
    ) -> Result<BankTransaction>;

    async fn unlink(&self, scope: &CompanyScope, id: Uuid) -> Result<BankTransaction>;

    /// Stores a classification. Fails with `Conflict` on linked transactions.
    async fn classify(
        &self,
        scope: &CompanyScope,
        id: Uuid,
        classification: &Classification,
    ) -> Result<BankTransaction>;

    async fn clear_classification(&self, scope: &CompanyScope, id: Uuid) -> Result<BankTransaction>;

    async fn counts(&self, scope: &CompanyScope) -> Result<TransactionCounts>;
}

/// PostgreSQL implementation of [`BankTransactionRepository`].
pub struct PgBankTransactionRepository {
    pool: PgPool,
}

impl PgBankTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Distinguishes a missing row from a row that failed a guard.
    async fn not_updated(&self, scope: &CompanyScope, id: Uuid, conflict: &str) -> AppError {
        match self.find_by_id(scope, id).await {
            Ok(Some(_)) => AppError::Conflict(conflict.to_string()),
            Ok(None) => AppError::NotFound(format!("Transaction '{}' not found", id)),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl BankTransactionRepository for PgBankTransactionRepository {
    async fn insert(&self, transaction: &BankTransaction) -> Result<BankTransaction> {
        let sql = format!(
            r#"
            INSERT INTO transacoes_bancarias ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {cols}
            "#,
            cols = TRANSACTION_COLUMNS
        );

        let row = timed(
            "insert",
            sqlx::query_as::<_, BankTransaction>(&sql)
                .bind(transaction.id)
                .bind(transaction.company_id)
                .bind(transaction.amount)
                .bind(transaction.date)
                .bind(&transaction.description)
                .bind(transaction.reconciled)
                .bind(transaction.classification)
                .bind(transaction.ignored)
                .bind(&transaction.reason)
                .bind(transaction.payable_id)
                .bind(transaction.receivable_id)
                .bind(transaction.created_at)
                .fetch_one(&self.pool),
        )
        .await
        .map_err(map_write_error)?;

        Ok(row)
    }

    async fn find_by_id(&self, scope: &CompanyScope, id: Uuid) -> Result<Option<BankTransaction>> {
        let sql = format!(
            r#"
            SELECT {cols}
            FROM transacoes_bancarias
            WHERE id = $1 AND company_id = ANY($2)
            "#,
            cols = TRANSACTION_COLUMNS
        );

        let row = timed(
            "find_by_id",
            sqlx::query_as::<_, BankTransaction>(&sql)
                .bind(id)
                .bind(scope.ids())
                .fetch_optional(&self.pool),
        )
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn find_by_account(
        &self,
        scope: &CompanyScope,
        account: AccountRef,
    ) -> Result<Option<BankTransaction>> {
        let column = match account.kind {
            AccountKind::Payable => "conta_pagar_id",
            AccountKind::Receivable => "conta_receber_id",
        };
        let sql = format!(
            r#"
            SELECT {cols}
            FROM transacoes_bancarias
            WHERE {column} = $1 AND company_id = ANY($2)
            "#,
            cols = TRANSACTION_COLUMNS,
            column = column
        );

        let row = timed(
            "find_by_account",
            sqlx::query_as::<_, BankTransaction>(&sql)
                .bind(account.id)
                .bind(scope.ids())
                .fetch_optional(&self.pool),
        )
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn list_orphans(
        &self,
        scope: &CompanyScope,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BankTransaction>> {
        let sql = format!(
            r#"
            SELECT {cols}
            FROM transacoes_bancarias
            WHERE company_id = ANY($1)
              AND reconciled = FALSE
              AND conta_pagar_id IS NULL
              AND conta_receber_id IS NULL
              AND tipo_movimento IS NULL
              AND ignorar_conciliacao = FALSE
            ORDER BY date DESC, id
            LIMIT $2 OFFSET $3
            "#,
            cols = TRANSACTION_COLUMNS
        );

        let rows = timed(
            "list_orphans",
            sqlx::query_as::<_, BankTransaction>(&sql)
                .bind(scope.ids())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool),
        )
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    async fn link(
        &self,
        scope: &CompanyScope,
        id: Uuid,
        account: AccountRef,
    ) -> Result<BankTransaction> {
        let (payable_id, receivable_id) = match account.kind {
            AccountKind::Payable => (Some(account.id), None),
            AccountKind::Receivable => (None, Some(account.id)),
        };

        // The guard and the partial unique indexes keep both sides single-linked.
        let sql = format!(
            r#"
            UPDATE transacoes_bancarias
            SET conta_pagar_id = $3, conta_receber_id = $4, reconciled = TRUE
            WHERE id = $1
              AND company_id = ANY($2)
              AND reconciled = FALSE
              AND conta_pagar_id IS NULL
              AND conta_receber_id IS NULL
              AND tipo_movimento IS NULL
              AND ignorar_conciliacao = FALSE
            RETURNING {cols}
            "#,
            cols = TRANSACTION_COLUMNS
        );

        let row = timed(
            "link",
            sqlx::query_as::<_, BankTransaction>(&sql)
                .bind(id)
                .bind(scope.ids())
                .bind(payable_id)
                .bind(receivable_id)
                .fetch_optional(&self.pool),
        )
        .await
        .map_err(map_write_error)?;

        match row {
            Some(row) => Ok(row),
            None => Err(self
                .not_updated(scope, id, "Transaction is already reconciled, linked or classified")
                .await),
        }
    }

    async fn unlink(&self, scope: &CompanyScope, id: Uuid) -> Result<BankTransaction> {
        let sql = format!(
            r#"
            UPDATE transacoes_bancarias
            SET conta_pagar_id = NULL, conta_receber_id = NULL, reconciled = FALSE
            WHERE id = $1 AND company_id = ANY($2)
            RETURNING {cols}
            "#,
            cols = TRANSACTION_COLUMNS
        );

        timed(
            "unlink",
            sqlx::query_as::<_, BankTransaction>(&sql)
                .bind(id)
                .bind(scope.ids())
                .fetch_optional(&self.pool),
        )
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("Transaction '{}' not found", id)))
    }

    async fn classify(
        &self,
        scope: &CompanyScope,
        id: Uuid,
        classification: &Classification,
    ) -> Result<BankTransaction> {
        let sql = format!(
            r#"
            UPDATE transacoes_bancarias
            SET tipo_movimento = $3, ignorar_conciliacao = $4, motivo = $5
            WHERE id = $1
              AND company_id = ANY($2)
              AND conta_pagar_id IS NULL
              AND conta_receber_id IS NULL
            RETURNING {cols}
            "#,
            cols = TRANSACTION_COLUMNS
        );

        let row = timed(
            "classify",
            sqlx::query_as::<_, BankTransaction>(&sql)
                .bind(id)
                .bind(scope.ids())
                .bind(classification.kind)
                .bind(classification.ignore)
                .bind(&classification.reason)
                .fetch_optional(&self.pool),
        )
        .await
        .map_err(AppError::Database)?;

        match row {
            Some(row) => Ok(row),
            None => Err(self
                .not_updated(scope, id, "Linked transactions cannot be classified")
                .await),
        }
    }

    async fn clear_classification(&self, scope: &CompanyScope, id: Uuid) -> Result<BankTransaction> {
        let sql = format!(
            r#"
            UPDATE transacoes_bancarias
            SET tipo_movimento = NULL, ignorar_conciliacao = FALSE, motivo = NULL
            WHERE id = $1 AND company_id = ANY($2)
            RETURNING {cols}
            "#,
            cols = TRANSACTION_COLUMNS
        );

        timed(
            "clear_classification",
            sqlx::query_as::<_, BankTransaction>(&sql)
                .bind(id)
                .bind(scope.ids())
                .fetch_optional(&self.pool),
        )
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("Transaction '{}' not found", id)))
    }

    async fn counts(&self, scope: &CompanyScope) -> Result<TransactionCounts> {
        // Rows reconciled on import count as linked even without a reference.
        let query = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (
                    WHERE reconciled
                       OR conta_pagar_id IS NOT NULL OR conta_receber_id IS NOT NULL
                ),
                COUNT(*) FILTER (
                    WHERE reconciled = FALSE
                      AND conta_pagar_id IS NULL AND conta_receber_id IS NULL
                      AND (tipo_movimento IS NOT NULL OR ignorar_conciliacao)
                ),
                COUNT(*) FILTER (
                    WHERE reconciled = FALSE
                      AND conta_pagar_id IS NULL AND conta_receber_id IS NULL
                      AND tipo_movimento IS NULL AND ignorar_conciliacao = FALSE
                )
            FROM transacoes_bancarias
            WHERE company_id = ANY($1)
            "#,
        )
        .bind(scope.ids())
        .fetch_one(&self.pool);

        let row: (i64, i64, i64, i64) = timed("counts", query)
            .await
            .map_err(AppError::Database)?;

        Ok(TransactionCounts {
            total: row.0,
            linked: row.1,
            classified: row.2,
            orphan: row.3,
        })
    }
}
