use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{AccountRef, BankTransaction, OpenAccount};

/// UI hint attached to a ranked candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchBadge {
    /// Amounts are identical in absolute value.
    Exact,
    /// Difference is below the close-match threshold.
    Close,
    None,
}

/// A candidate together with how well it fits the reference row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCandidate<T> {
    pub candidate: T,
    /// `| |transaction.amount| - |account.amount| |`
    pub difference: Decimal,
    /// Absolute number of days between transaction date and due date.
    pub day_distance: i64,
    pub badge: MatchBadge,
}

/// A transaction/account pair the auto-matcher may link without asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedLink {
    pub transaction_id: Uuid,
    pub account: AccountRef,
}

/// Client-side ordering of reconciliation candidates.
///
/// Ranking is pure: it never touches the store and running it twice over the
/// same input yields the same order.
#[derive(Debug, Clone)]
pub struct MatchingEngine {
    close_threshold: Decimal,
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new(Decimal::ONE)
    }
}

impl MatchingEngine {
    pub fn new(close_threshold: Decimal) -> Self {
        Self {
            close_threshold: close_threshold.abs(),
        }
    }

    pub fn close_threshold(&self) -> Decimal {
        self.close_threshold
    }

    /// Distance between a signed bank amount and an account value.
    pub fn amount_difference(transaction_amount: Decimal, account_amount: Decimal) -> Decimal {
        (transaction_amount.abs() - account_amount.abs()).abs()
    }

    pub fn badge(&self, difference: Decimal) -> MatchBadge {
        if difference.is_zero() {
            MatchBadge::Exact
        } else if difference < self.close_threshold {
            MatchBadge::Close
        } else {
            MatchBadge::None
        }
    }

    fn score<T>(&self, candidate: T, tx_amount: Decimal, tx_date: NaiveDate, account_amount: Decimal, due_date: NaiveDate) -> MatchCandidate<T> {
        let difference = Self::amount_difference(tx_amount, account_amount);
        MatchCandidate {
            candidate,
            difference,
            day_distance: (tx_date - due_date).num_days().abs(),
            badge: self.badge(difference),
        }
    }

    /// Orders transactions by how closely they match an account's value.
    ///
    /// Ascending amount difference, then day distance, then id.
    pub fn rank_transactions(
        &self,
        account: &OpenAccount,
        transactions: Vec<BankTransaction>,
    ) -> Vec<MatchCandidate<BankTransaction>> {
        let mut ranked: Vec<MatchCandidate<BankTransaction>> = transactions
            .into_iter()
            .map(|t| {
                let (amount, date) = (t.amount, t.date);
                self.score(t, amount, date, account.amount, account.due_date)
            })
            .collect();

        ranked.sort_by(|a, b| compare(a, b).then_with(|| a.candidate.id.cmp(&b.candidate.id)));
        ranked
    }

    /// Orders accounts by how closely they match a transaction's amount.
    pub fn rank_accounts(
        &self,
        transaction: &BankTransaction,
        accounts: Vec<OpenAccount>,
    ) -> Vec<MatchCandidate<OpenAccount>> {
        let mut ranked: Vec<MatchCandidate<OpenAccount>> = accounts
            .into_iter()
            .map(|a| {
                let (amount, due) = (a.amount, a.due_date);
                self.score(a, transaction.amount, transaction.date, amount, due)
            })
            .collect();

        ranked.sort_by(|a, b| compare(a, b).then_with(|| a.candidate.id.cmp(&b.candidate.id)));
        ranked
    }

    /// Pairs that are exact, direction-consistent and unique on both sides.
    ///
    /// A debit can only settle a payable and a credit a receivable, both rows
    /// must belong to the same company, and a pair is proposed only when the
    /// transaction has exactly one exact candidate and that account has
    /// exactly one exact transaction.
    pub fn unambiguous_pairs(
        &self,
        transactions: &[BankTransaction],
        accounts: &[OpenAccount],
    ) -> Vec<ProposedLink> {
        let exact = |t: &BankTransaction, a: &OpenAccount| {
            t.company_id == a.company_id
                && t.natural_kind() == Some(a.kind)
                && Self::amount_difference(t.amount, a.amount).is_zero()
        };

        let mut account_hits: HashMap<AccountRef, usize> = HashMap::new();
        for a in accounts {
            let hits = transactions.iter().filter(|t| exact(t, a)).count();
            account_hits.insert(a.reference(), hits);
        }

        let mut proposals: Vec<ProposedLink> = transactions
            .iter()
            .filter_map(|t| {
                let mut matches = accounts.iter().filter(|a| exact(t, a));
                let only = matches.next()?;
                if matches.next().is_some() {
                    return None;
                }
                let account = only.reference();
                (account_hits.get(&account) == Some(&1)).then_some(ProposedLink {
                    transaction_id: t.id,
                    account,
                })
            })
            .collect();

        proposals.sort_by_key(|p| p.transaction_id);
        proposals
    }
}

fn compare<T>(a: &MatchCandidate<T>, b: &MatchCandidate<T>) -> Ordering {
    a.difference
        .cmp(&b.difference)
        .then(a.day_distance.cmp(&b.day_distance))
}
