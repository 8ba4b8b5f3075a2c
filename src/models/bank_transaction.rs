use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::account::{AccountKind, AccountRef};
use super::classification::{Classification, ExceptionKind};

/// A ledger line imported from a bank statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BankTransaction {
    pub id: Uuid,
    pub company_id: Uuid,
    /// Signed amount: positive is a credit, negative a debit.
    pub amount: Decimal,
    pub date: NaiveDate,
    pub description: String,
    pub reconciled: bool,
    #[sqlx(rename = "tipo_movimento")]
    pub classification: Option<ExceptionKind>,
    #[sqlx(rename = "ignorar_conciliacao")]
    pub ignored: bool,
    #[sqlx(rename = "motivo")]
    pub reason: Option<String>,
    #[sqlx(rename = "conta_pagar_id")]
    pub payable_id: Option<Uuid>,
    #[sqlx(rename = "conta_receber_id")]
    pub receivable_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl BankTransaction {
    pub fn new(company_id: Uuid, amount: Decimal, date: NaiveDate, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id,
            amount,
            date,
            description: description.into(),
            reconciled: false,
            classification: None,
            ignored: false,
            reason: None,
            payable_id: None,
            receivable_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_credit(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_debit(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// The account kind this movement would normally settle.
    pub fn natural_kind(&self) -> Option<AccountKind> {
        if self.is_debit() {
            Some(AccountKind::Payable)
        } else if self.is_credit() {
            Some(AccountKind::Receivable)
        } else {
            None
        }
    }

    pub fn linked_account(&self) -> Option<AccountRef> {
        match (self.payable_id, self.receivable_id) {
            (Some(id), _) => Some(AccountRef::payable(id)),
            (None, Some(id)) => Some(AccountRef::receivable(id)),
            (None, None) => None,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.payable_id.is_some() || self.receivable_id.is_some()
    }

    pub fn is_classified(&self) -> bool {
        self.classification.is_some() || self.ignored
    }

    /// Unreconciled, unlinked and not excluded from matching.
    pub fn is_orphan(&self) -> bool {
        !self.reconciled && !self.is_linked() && !self.is_classified()
    }

    pub fn link(&mut self, account: AccountRef) {
        match account.kind {
            AccountKind::Payable => {
                self.payable_id = Some(account.id);
                self.receivable_id = None;
            }
            AccountKind::Receivable => {
                self.receivable_id = Some(account.id);
                self.payable_id = None;
            }
        }
        self.reconciled = true;
    }

    pub fn unlink(&mut self) {
        self.payable_id = None;
        self.receivable_id = None;
        self.reconciled = false;
    }

    pub fn classify(&mut self, classification: &Classification) {
        self.classification = Some(classification.kind);
        self.ignored = classification.ignore;
        self.reason = classification.reason.clone();
    }

    pub fn clear_classification(&mut self) {
        self.classification = None;
        self.ignored = false;
        self.reason = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tx(amount: Decimal) -> BankTransaction {
        BankTransaction::new(
            Uuid::new_v4(),
            amount,
            NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            "PIX ENVIADO",
        )
    }

    #[test]
    fn test_direction() {
        assert!(tx(dec!(-10)).is_debit());
        assert_eq!(tx(dec!(-10)).natural_kind(), Some(AccountKind::Payable));
        assert!(tx(dec!(10)).is_credit());
        assert_eq!(tx(dec!(10)).natural_kind(), Some(AccountKind::Receivable));
        assert_eq!(tx(Decimal::ZERO).natural_kind(), None);
    }

    #[test]
    fn test_new_transaction_is_orphan() {
        let t = tx(dec!(-1500.00));
        assert!(t.is_orphan());
        assert!(t.linked_account().is_none());
    }

    #[test]
    fn test_link_and_unlink() {
        let mut t = tx(dec!(-1500.00));
        let payable = Uuid::new_v4();

        t.link(AccountRef::payable(payable));
        assert!(t.reconciled);
        assert_eq!(t.linked_account(), Some(AccountRef::payable(payable)));
        assert!(!t.is_orphan());

        let receivable = Uuid::new_v4();
        t.link(AccountRef::receivable(receivable));
        assert!(t.payable_id.is_none());
        assert_eq!(t.linked_account(), Some(AccountRef::receivable(receivable)));

        t.unlink();
        assert!(t.is_orphan());
    }

    #[test]
    fn test_classification_excludes_from_orphans() {
        let mut t = tx(dec!(-8.90));
        t.classify(&Classification::new(ExceptionKind::TarifaBancaria, false, None));
        assert!(t.is_classified());
        assert!(!t.is_orphan());

        t.clear_classification();
        assert!(t.is_orphan());
        assert!(t.reason.is_none());
    }
}
