use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Raw transaction counts for a scope, as read from the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCounts {
    pub total: i64,
    /// Linked rows, plus rows the import already marked reconciled.
    pub linked: i64,
    /// Unlinked transactions carrying a classification or the ignore flag.
    pub classified: i64,
    pub orphan: i64,
}

/// Dashboard figures for the reconciliation panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub total_transactions: i64,
    pub linked_transactions: i64,
    pub classified_transactions: i64,
    pub orphan_transactions: i64,
    pub unmatched_payables: i64,
    pub unmatched_receivables: i64,
    /// (linked + classified) / total, four decimal places.
    pub reconciliation_rate: Decimal,
}

impl ReconciliationSummary {
    pub fn new(counts: TransactionCounts, unmatched_payables: i64, unmatched_receivables: i64) -> Self {
        Self {
            total_transactions: counts.total,
            linked_transactions: counts.linked,
            classified_transactions: counts.classified,
            orphan_transactions: counts.orphan,
            unmatched_payables,
            unmatched_receivables,
            reconciliation_rate: reconciliation_rate(&counts),
        }
    }
}

pub fn reconciliation_rate(counts: &TransactionCounts) -> Decimal {
    if counts.total <= 0 {
        return Decimal::ZERO;
    }

    (Decimal::from(counts.linked + counts.classified) / Decimal::from(counts.total))
        .round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}
