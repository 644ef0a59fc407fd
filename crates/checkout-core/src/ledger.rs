//! # Transaction Ledger
//!
//! Append-only record of tender operations for one payment flow.
//!
//! ## Ledger Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Ledger Lifecycle                                   │
//! │                                                                         │
//! │  new(total_due) ──► append(tender) ──► append(tender) ──► totals()      │
//! │        │                 │                   │               │          │
//! │        │                 ▼                   ▼               ▼          │
//! │        │          amount_paid +=       amount_paid +=   recomputed from │
//! │        │          base portion         base portion     entry list      │
//! │        │                                                                │
//! │        └──────────────── reset(total_due) ◄─────── new order            │
//! │                                                                         │
//! │  Split mode (enable_split before the first leg):                        │
//! │    every append also records a CompletedSplit and recomputes            │
//! │    remaining_amount = max(0, total_due - amount_paid)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants (hold after every append)
//! - `sum(transactions[].base_amount_paid) == amount_paid`
//! - `amount_paid` never decreases until `reset`
//! - in split mode, `completed_splits.len() == transactions.len()`
//!
//! Entries are never edited. A correction is a new entry.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{is_payment_complete, remaining_after, Money, PAYMENT_EPSILON};
use crate::types::{
    CompletedSplit, PaymentMethod, SettlementMethod, SplitContext, SplitDetails, TenderRecord,
    Transaction, TransactionStatus,
};

// =============================================================================
// Totals
// =============================================================================

/// Aggregate totals derived from a list of transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTotals {
    /// Sum of base portions (what counts toward the order total).
    pub base_amount_paid: Money,
    pub total_tip_amount: Money,
    /// Sum of charged amounts, tips included.
    pub total_paid: Money,
}

impl LedgerTotals {
    /// Recomputes totals from the entry list.
    ///
    /// This is the authoritative source for completion; running counters are
    /// only a cache of it.
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        transactions.iter().fold(Self::default(), |mut acc, tx| {
            acc.base_amount_paid += tx.base_amount_paid;
            acc.total_tip_amount += tx.tip_amount;
            acc.total_paid += tx.amount;
            acc
        })
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// The tender ledger for a single order.
///
/// ## Example
/// ```rust
/// use checkout_core::ledger::TransactionLedger;
/// use checkout_core::types::{CashDetails, MethodDetails, TenderRecord};
/// use checkout_core::Money;
///
/// let mut ledger = TransactionLedger::new(Money::from_cents(2150));
/// ledger
///     .append(TenderRecord {
///         amount_charged: Money::from_cents(2150),
///         tip: Money::zero(),
///         details: MethodDetails::Cash(CashDetails {
///             cash_tendered: Money::from_cents(2500),
///             change: Money::from_cents(350),
///         }),
///     })
///     .unwrap();
///
/// assert!(ledger.is_fully_paid());
/// assert_eq!(ledger.remaining(), Money::zero());
/// ```
#[derive(Debug, Clone)]
pub struct TransactionLedger {
    total_due: Money,
    transactions: Vec<Transaction>,
    amount_paid: Money,
    total_tip_amount: Money,
    split_details: Option<SplitDetails>,
}

impl TransactionLedger {
    /// Creates an empty ledger for an order of `total_due`.
    pub fn new(total_due: Money) -> Self {
        Self {
            total_due,
            transactions: Vec::new(),
            amount_paid: Money::zero(),
            total_tip_amount: Money::zero(),
            split_details: None,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn total_due(&self) -> Money {
        self.total_due
    }

    pub fn amount_paid(&self) -> Money {
        self.amount_paid
    }

    pub fn total_tip_amount(&self) -> Money {
        self.total_tip_amount
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn split_details(&self) -> Option<&SplitDetails> {
        self.split_details.as_ref()
    }

    pub fn is_split(&self) -> bool {
        self.split_details.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// `max(0, total_due - amount_paid)`.
    pub fn remaining(&self) -> Money {
        remaining_after(self.total_due, self.amount_paid)
    }

    /// Whether the whole order is covered (within [`PAYMENT_EPSILON`]).
    pub fn is_fully_paid(&self) -> bool {
        is_payment_complete(self.amount_paid, self.total_due)
    }

    /// Totals recomputed from the entry list.
    pub fn totals(&self) -> LedgerTotals {
        LedgerTotals::from_transactions(&self.transactions)
    }

    /// Whether the running counter agrees with the entry list.
    pub fn is_consistent(&self) -> bool {
        let drift = self.totals().base_amount_paid - self.amount_paid;
        drift.cents().abs() < PAYMENT_EPSILON.cents()
    }

    /// How the order is being settled, once known.
    pub fn settlement_method(&self) -> Option<SettlementMethod> {
        if self.is_split() {
            return Some(SettlementMethod::Split);
        }
        self.transactions
            .first()
            .map(|tx| SettlementMethod::from(tx.method))
    }

    // -------------------------------------------------------------------------
    // Split Bookkeeping
    // -------------------------------------------------------------------------

    /// Turns on split bookkeeping. Idempotent.
    ///
    /// Must happen before the first tender so every leg is accounted for.
    pub fn enable_split(&mut self) -> CoreResult<()> {
        if self.split_details.is_some() {
            return Ok(());
        }
        if !self.transactions.is_empty() {
            return Err(CoreError::InvalidState {
                operation: "enable split".to_string(),
                reason: format!("{} tender(s) already recorded", self.transactions.len()),
            });
        }
        self.split_details = Some(SplitDetails {
            current_split_index: 0,
            remaining_amount: self.remaining(),
            completed_splits: Vec::new(),
        });
        Ok(())
    }

    /// Turns split bookkeeping off again. Refused once a leg exists.
    pub fn disable_split(&mut self) -> CoreResult<()> {
        if let Some(split) = &self.split_details {
            if !split.completed_splits.is_empty() {
                return Err(CoreError::InvalidState {
                    operation: "leave split mode".to_string(),
                    reason: format!("{} leg(s) already recorded", split.completed_splits.len()),
                });
            }
        }
        self.split_details = None;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Append
    // -------------------------------------------------------------------------

    /// Records one tender. The only way an entry is ever created.
    ///
    /// The base portion is `amount_charged - tip`, clamped at zero.
    pub fn append(&mut self, record: TenderRecord) -> CoreResult<&Transaction> {
        if !record.amount_charged.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: "amount charged".to_string(),
            }
            .into());
        }
        if record.tip.is_negative() {
            return Err(ValidationError::OutOfRange {
                field: "tip".to_string(),
                min: 0,
                max: record.amount_charged.cents(),
            }
            .into());
        }

        let method: PaymentMethod = record.details.method();
        let base_amount = (record.amount_charged - record.tip).clamp_non_negative();
        let timestamp = Utc::now();

        let split_context = self.split_details.as_ref().map(|split| SplitContext {
            leg_index: split.current_split_index,
            remaining_before: self.remaining(),
        });

        self.amount_paid += base_amount;
        self.total_tip_amount += record.tip;
        let remaining = self.remaining();

        if let Some(split) = self.split_details.as_mut() {
            split.completed_splits.push(CompletedSplit {
                method,
                amount: record.amount_charged,
                tip: record.tip,
                index: split.current_split_index,
                timestamp,
            });
            split.current_split_index += 1;
            split.remaining_amount = remaining;
        }

        self.transactions.push(Transaction {
            id: Uuid::new_v4().to_string(),
            method,
            amount: record.amount_charged,
            base_amount_paid: base_amount,
            tip_amount: record.tip,
            status: TransactionStatus::for_method(method),
            timestamp,
            method_details: record.details,
            split_context,
        });

        // Non-empty: pushed just above.
        Ok(&self.transactions[self.transactions.len() - 1])
    }

    /// Discards every entry and starts over for a new order.
    pub fn reset(&mut self, total_due: Money) {
        *self = Self::new(total_due);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CashDetails, CreditDetails, MethodDetails};

    fn cash(amount: i64, tendered: i64) -> TenderRecord {
        TenderRecord {
            amount_charged: Money::from_cents(amount),
            tip: Money::zero(),
            details: MethodDetails::Cash(CashDetails {
                cash_tendered: Money::from_cents(tendered),
                change: Money::from_cents(tendered - amount),
            }),
        }
    }

    fn credit(amount: i64, tip: i64) -> TenderRecord {
        TenderRecord {
            amount_charged: Money::from_cents(amount),
            tip: Money::from_cents(tip),
            details: MethodDetails::Credit(CreditDetails::default()),
        }
    }

    #[test]
    fn test_split_legs_track_remaining() {
        let mut ledger = TransactionLedger::new(Money::from_cents(2150));
        ledger.enable_split().unwrap();

        ledger.append(cash(1000, 1000)).unwrap();
        assert_eq!(ledger.remaining(), Money::from_cents(1150));
        assert!(!ledger.is_fully_paid());
        assert_eq!(
            ledger.split_details().unwrap().remaining_amount,
            Money::from_cents(1150)
        );

        let tx = ledger.append(cash(1150, 1150)).unwrap();
        assert_eq!(
            tx.split_context,
            Some(SplitContext {
                leg_index: 1,
                remaining_before: Money::from_cents(1150),
            })
        );

        let split = ledger.split_details().unwrap();
        assert_eq!(split.remaining_amount, Money::zero());
        assert_eq!(split.completed_splits.len(), 2);
        assert_eq!(split.current_split_index, 2);
        assert!(ledger.is_fully_paid());
        assert_eq!(ledger.settlement_method(), Some(SettlementMethod::Split));
    }

    #[test]
    fn test_tip_is_excluded_from_base() {
        let mut ledger = TransactionLedger::new(Money::from_cents(2000));
        let tx = ledger.append(credit(2300, 300)).unwrap();
        assert_eq!(tx.base_amount_paid, Money::from_cents(2000));
        assert_eq!(tx.status, TransactionStatus::Approved);

        let totals = ledger.totals();
        assert_eq!(totals.base_amount_paid, Money::from_cents(2000));
        assert_eq!(totals.total_tip_amount, Money::from_cents(300));
        assert_eq!(totals.total_paid, Money::from_cents(2300));
        assert!(ledger.is_fully_paid());
    }

    #[test]
    fn test_tip_larger_than_charge_clamps_base() {
        let mut ledger = TransactionLedger::new(Money::from_cents(2000));
        let tx = ledger.append(credit(500, 800)).unwrap();
        assert_eq!(tx.base_amount_paid, Money::zero());
        assert_eq!(ledger.amount_paid(), Money::zero());
    }

    #[test]
    fn test_rejects_non_positive_charge() {
        let mut ledger = TransactionLedger::new(Money::from_cents(2000));
        let err = ledger.append(cash(0, 0)).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_sum_invariant_over_many_small_legs() {
        let mut ledger = TransactionLedger::new(Money::from_cents(10_000));
        ledger.enable_split().unwrap();
        let mut previous = Money::zero();
        for _ in 0..100 {
            ledger.append(cash(1, 1)).unwrap();
            assert!(ledger.amount_paid() >= previous);
            previous = ledger.amount_paid();
            assert!(ledger.is_consistent());
        }
        assert_eq!(ledger.amount_paid(), Money::from_cents(100));
        assert_eq!(
            ledger.split_details().unwrap().completed_splits.len(),
            ledger.transactions().len()
        );
    }

    #[test]
    fn test_fully_paid_is_monotonic() {
        let mut ledger = TransactionLedger::new(Money::from_cents(1000));
        ledger.append(cash(1000, 1000)).unwrap();
        assert!(ledger.is_fully_paid());
        ledger.append(credit(200, 200)).unwrap();
        assert!(ledger.is_fully_paid());

        ledger.reset(Money::from_cents(1000));
        assert!(!ledger.is_fully_paid());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_enable_split_after_tender_is_refused() {
        let mut ledger = TransactionLedger::new(Money::from_cents(1000));
        ledger.append(cash(400, 400)).unwrap();
        assert!(matches!(
            ledger.enable_split(),
            Err(CoreError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_disable_split_only_before_first_leg() {
        let mut ledger = TransactionLedger::new(Money::from_cents(1000));
        ledger.enable_split().unwrap();
        ledger.disable_split().unwrap();
        assert!(!ledger.is_split());

        ledger.enable_split().unwrap();
        ledger.append(cash(400, 400)).unwrap();
        assert!(ledger.disable_split().is_err());
        assert!(ledger.is_split());
    }

    #[test]
    fn test_totals_from_transactions_matches_counters() {
        let mut ledger = TransactionLedger::new(Money::from_cents(5000));
        ledger.enable_split().unwrap();
        ledger.append(credit(1800, 300)).unwrap();
        ledger.append(cash(3500, 4000)).unwrap();

        let totals = LedgerTotals::from_transactions(ledger.transactions());
        assert_eq!(totals.base_amount_paid, ledger.amount_paid());
        assert_eq!(totals.total_tip_amount, ledger.total_tip_amount());
        assert_eq!(totals.base_amount_paid, Money::from_cents(5000));
    }
}
