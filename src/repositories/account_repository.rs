use async_trait::async_trait;
use sqlx::PgPool;

use super::{map_write_error, timed};
use crate::error::{AppError, Result};
use crate::models::{AccountKind, AccountRef, CompanyScope, OpenAccount, Payable, Receivable};

/// Storage for payables and receivables.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn insert_payable(&self, payable: &Payable) -> Result<Payable>;

    async fn insert_receivable(&self, receivable: &Receivable) -> Result<Receivable>;

    async fn find(&self, scope: &CompanyScope, account: AccountRef) -> Result<Option<OpenAccount>>;

    /// Accounts no transaction links to, latest due date first.
    async fn list_unmatched(
        &self,
        scope: &CompanyScope,
        kind: AccountKind,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<OpenAccount>>;

    async fn count_unmatched(&self, scope: &CompanyScope, kind: AccountKind) -> Result<i64>;
}

/// Table and column names of one account kind.
struct AccountTable {
    table: &'static str,
    due_column: &'static str,
    counterparty_column: &'static str,
    link_column: &'static str,
}

fn table_for(kind: AccountKind) -> AccountTable {
    match kind {
        AccountKind::Payable => AccountTable {
            table: "contas_pagar",
            due_column: "vencimento",
            counterparty_column: "beneficiario",
            link_column: "conta_pagar_id",
        },
        AccountKind::Receivable => AccountTable {
            table: "contas_receber",
            due_column: "data_vencimento",
            counterparty_column: "cliente",
            link_column: "conta_receber_id",
        },
    }
}

fn open_account_select(kind: AccountKind) -> String {
    let t = table_for(kind);
    format!(
        "SELECT '{kind}' AS kind, a.id, a.company_id, a.valor AS amount, \
         a.{due} AS due_date, a.{counterparty} AS counterparty, a.status \
         FROM {table} a",
        kind = kind.as_str(),
        due = t.due_column,
        counterparty = t.counterparty_column,
        table = t.table
    )
}

/// PostgreSQL implementation of [`AccountRepository`].
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn insert_payable(&self, payable: &Payable) -> Result<Payable> {
        let query = sqlx::query_as::<_, Payable>(
            r#"
            INSERT INTO contas_pagar (id, company_id, valor, vencimento, beneficiario, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, company_id, valor, vencimento, beneficiario, status, created_at
            "#,
        )
        .bind(payable.id)
        .bind(payable.company_id)
        .bind(payable.amount)
        .bind(payable.due_date)
        .bind(&payable.beneficiary)
        .bind(payable.status)
        .bind(payable.created_at)
        .fetch_one(&self.pool);

        let row = timed("insert_payable", query).await.map_err(map_write_error)?;

        Ok(row)
    }

    async fn insert_receivable(&self, receivable: &Receivable) -> Result<Receivable> {
        let query = sqlx::query_as::<_, Receivable>(
            r#"
            INSERT INTO contas_receber (id, company_id, valor, data_vencimento, cliente, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, company_id, valor, data_vencimento, cliente, status, created_at
            "#,
        )
        .bind(receivable.id)
        .bind(receivable.company_id)
        .bind(receivable.amount)
        .bind(receivable.due_date)
        .bind(&receivable.customer)
        .bind(receivable.status)
        .bind(receivable.created_at)
        .fetch_one(&self.pool);

        let row = timed("insert_receivable", query).await.map_err(map_write_error)?;

        Ok(row)
    }

    async fn find(&self, scope: &CompanyScope, account: AccountRef) -> Result<Option<OpenAccount>> {
        let sql = format!(
            "{select} WHERE a.id = $1 AND a.company_id = ANY($2)",
            select = open_account_select(account.kind)
        );

        let row = timed(
            "find",
            sqlx::query_as::<_, OpenAccount>(&sql)
                .bind(account.id)
                .bind(scope.ids())
                .fetch_optional(&self.pool),
        )
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    async fn list_unmatched(
        &self,
        scope: &CompanyScope,
        kind: AccountKind,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<OpenAccount>> {
        let t = table_for(kind);
        let sql = format!(
            r#"
            {select}
            WHERE a.company_id = ANY($1)
              AND NOT EXISTS (
                  SELECT 1 FROM transacoes_bancarias t WHERE t.{link} = a.id
              )
            ORDER BY a.{due} DESC, a.id
            LIMIT $2 OFFSET $3
            "#,
            select = open_account_select(kind),
            link = t.link_column,
            due = t.due_column
        );

        let rows = timed(
            "list_unmatched",
            sqlx::query_as::<_, OpenAccount>(&sql)
                .bind(scope.ids())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool),
        )
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    async fn count_unmatched(&self, scope: &CompanyScope, kind: AccountKind) -> Result<i64> {
        let t = table_for(kind);
        let sql = format!(
            r#"
            SELECT COUNT(*)
            FROM {table} a
            WHERE a.company_id = ANY($1)
              AND NOT EXISTS (
                  SELECT 1 FROM transacoes_bancarias t WHERE t.{link} = a.id
              )
            "#,
            table = t.table,
            link = t.link_column
        );

        let row: (i64,) = timed(
            "count_unmatched",
            sqlx::query_as(&sql)
                .bind(scope.ids())
                .fetch_one(&self.pool),
        )
        .await
        .map_err(AppError::Database)?;

        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_account_select_uses_kind_columns() {
        let payable = open_account_select(AccountKind::Payable);
        assert!(payable.starts_with("SELECT 'payable' AS kind"));
        assert!(payable.contains("a.vencimento AS due_date"));
        assert!(payable.contains("FROM contas_pagar a"));

        let receivable = open_account_select(AccountKind::Receivable);
        assert!(receivable.contains("a.cliente AS counterparty"));
        assert!(receivable.contains("FROM contas_receber a"));
    }
}
