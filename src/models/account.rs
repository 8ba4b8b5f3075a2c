use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Which side of the books an open account sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    /// Money the company owes (conta a pagar).
    Payable,
    /// Money owed to the company (conta a receber).
    Receivable,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Payable => "payable",
            AccountKind::Receivable => "receivable",
        }
    }
}

impl std::str::FromStr for AccountKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "payable" | "pagar" => Ok(AccountKind::Payable),
            "receivable" | "receber" => Ok(AccountKind::Receivable),
            other => Err(AppError::Validation(format!(
                "Unknown account kind '{}'",
                other
            ))),
        }
    }
}

/// Lifecycle status shared by payables and receivables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum AccountStatus {
    #[sqlx(rename = "pendente")]
    #[serde(rename = "pendente")]
    Pending,
    #[sqlx(rename = "pago")]
    #[serde(rename = "pago")]
    Paid,
    #[sqlx(rename = "recebido")]
    #[serde(rename = "recebido")]
    Received,
    #[sqlx(rename = "vencido")]
    #[serde(rename = "vencido")]
    Overdue,
    #[sqlx(rename = "cancelado")]
    #[serde(rename = "cancelado")]
    Cancelled,
}

impl AccountStatus {
    /// Returns true once money has moved for the account.
    pub fn is_settled(&self) -> bool {
        matches!(self, AccountStatus::Paid | AccountStatus::Received)
    }
}

/// Reference to one payable or receivable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountRef {
    pub kind: AccountKind,
    pub id: Uuid,
}

impl AccountRef {
    pub fn payable(id: Uuid) -> Self {
        Self {
            kind: AccountKind::Payable,
            id,
        }
    }

    pub fn receivable(id: Uuid) -> Self {
        Self {
            kind: AccountKind::Receivable,
            id,
        }
    }
}

/// An obligation the company must pay.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payable {
    pub id: Uuid,
    pub company_id: Uuid,
    #[sqlx(rename = "valor")]
    pub amount: Decimal,
    #[sqlx(rename = "vencimento")]
    pub due_date: NaiveDate,
    #[sqlx(rename = "beneficiario")]
    pub beneficiary: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl Payable {
    pub fn new(company_id: Uuid, amount: Decimal, due_date: NaiveDate, beneficiary: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id,
            amount,
            due_date,
            beneficiary: beneficiary.into(),
            status: AccountStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// An amount a customer owes the company.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Receivable {
    pub id: Uuid,
    pub company_id: Uuid,
    #[sqlx(rename = "valor")]
    pub amount: Decimal,
    #[sqlx(rename = "data_vencimento")]
    pub due_date: NaiveDate,
    #[sqlx(rename = "cliente")]
    pub customer: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl Receivable {
    pub fn new(company_id: Uuid, amount: Decimal, due_date: NaiveDate, customer: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id,
            amount,
            due_date,
            customer: customer.into(),
            status: AccountStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// Payable or receivable flattened into the shape matching works on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OpenAccount {
    pub kind: AccountKind,
    pub id: Uuid,
    pub company_id: Uuid,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub counterparty: String,
    pub status: AccountStatus,
}

impl OpenAccount {
    pub fn reference(&self) -> AccountRef {
        AccountRef {
            kind: self.kind,
            id: self.id,
        }
    }
}

impl From<Payable> for OpenAccount {
    fn from(p: Payable) -> Self {
        Self {
            kind: AccountKind::Payable,
            id: p.id,
            company_id: p.company_id,
            amount: p.amount,
            due_date: p.due_date,
            counterparty: p.beneficiary,
            status: p.status,
        }
    }
}

impl From<Receivable> for OpenAccount {
    fn from(r: Receivable) -> Self {
        Self {
            kind: AccountKind::Receivable,
            id: r.id,
            company_id: r.company_id,
            amount: r.amount,
            due_date: r.due_date,
            counterparty: r.customer,
            status: r.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_account_kind_parse() {
        assert_eq!("payable".parse::<AccountKind>().unwrap(), AccountKind::Payable);
        assert_eq!("RECEBER".parse::<AccountKind>().unwrap(), AccountKind::Receivable);
        assert!("loan".parse::<AccountKind>().is_err());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&AccountStatus::Paid).unwrap(), "\"pago\"");
        let parsed: AccountStatus = serde_json::from_str("\"vencido\"").unwrap();
        assert_eq!(parsed, AccountStatus::Overdue);
        assert!(AccountStatus::Received.is_settled());
        assert!(!AccountStatus::Pending.is_settled());
    }

    #[test]
    fn test_payable_into_open_account() {
        let company = Uuid::new_v4();
        let payable = Payable::new(company, dec!(1500.00), day(10), "Fornecedor ABC");
        let id = payable.id;
        let open = OpenAccount::from(payable);

        assert_eq!(open.kind, AccountKind::Payable);
        assert_eq!(open.reference(), AccountRef::payable(id));
        assert_eq!(open.counterparty, "Fornecedor ABC");
        assert_eq!(open.status, AccountStatus::Pending);
    }

    #[test]
    fn test_receivable_into_open_account() {
        let receivable = Receivable::new(Uuid::new_v4(), dec!(320.10), day(5), "Cliente XPTO");
        let open = OpenAccount::from(receivable.clone());

        assert_eq!(open.kind, AccountKind::Receivable);
        assert_eq!(open.amount, dec!(320.10));
        assert_eq!(open.due_date, receivable.due_date);
    }
}
