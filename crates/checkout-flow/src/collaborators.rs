//! # External Collaborators
//!
//! Services the payment flow calls but does not implement.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Collaborator Boundaries                              │
//! │                                                                         │
//! │  CartContext     snapshot()                     read-only, sync         │
//! │  OrderBackend    complete_order(id, payload)    POST .../complete/      │
//! │  ReceiptPrinter  print_receipt(receipt, drawer) before cash completion  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`RecordingOrderBackend`] and [`RecordingPrinter`] are in-process
//! implementations with fault injection, used by the simulator and tests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use checkout_core::{LedgerTotals, Money, SettlementMethod, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cart::CartSnapshot;
use crate::error::CollaboratorError;

// =============================================================================
// Payloads
// =============================================================================

/// Body of the order completion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPayload {
    pub transactions: Vec<Transaction>,
    pub total_paid: Money,
    pub base_amount_paid: Money,
    pub total_tip_amount: Money,
    pub payment_method: SettlementMethod,
    pub discount_id: Option<String>,
    pub discount_amount: Option<Money>,
    pub completed_at: DateTime<Utc>,
}

impl CompletionPayload {
    /// Aggregates are taken from `totals`, which must come from `transactions`.
    pub fn new(
        transactions: Vec<Transaction>,
        totals: LedgerTotals,
        payment_method: SettlementMethod,
        cart: &CartSnapshot,
    ) -> Self {
        CompletionPayload {
            transactions,
            total_paid: totals.total_paid,
            base_amount_paid: totals.base_amount_paid,
            total_tip_amount: totals.total_tip_amount,
            payment_method,
            discount_id: cart.discount.as_ref().map(|d| d.id.clone()),
            discount_amount: cart.discount.as_ref().map(|d| d.amount),
            completed_at: Utc::now(),
        }
    }
}

/// Whatever the backend returned for a completed order. Consumed opaquely
/// by the completion view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionResult(pub Value);

/// What the receipt printer is asked to print.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptPayload {
    pub order_id: String,
    pub items: Vec<crate::cart::CartLine>,
    pub transactions: Vec<Transaction>,
    pub total_due: Money,
    pub total_paid: Money,
    pub total_tip_amount: Money,
    /// Change handed back across all cash tenders.
    pub change: Money,
    pub printed_at: DateTime<Utc>,
}

// =============================================================================
// Traits
// =============================================================================

/// Read-only access to the active order.
pub trait CartContext: Send + Sync {
    fn snapshot(&self) -> CartSnapshot;
}

/// The order management backend.
#[async_trait]
pub trait OrderBackend: Send + Sync {
    /// Marks the order complete. Safe to retry after a failure.
    async fn complete_order(
        &self,
        order_id: &str,
        payload: &CompletionPayload,
    ) -> Result<CompletionResult, CollaboratorError>;
}

/// Receipt printer with an attached cash drawer.
#[async_trait]
pub trait ReceiptPrinter: Send + Sync {
    async fn print_receipt(
        &self,
        receipt: &ReceiptPayload,
        open_drawer: bool,
    ) -> Result<(), CollaboratorError>;
}

// =============================================================================
// Recording Implementations
// =============================================================================

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct BackendState {
    calls: Vec<(String, CompletionPayload)>,
    failures: Vec<CollaboratorError>,
}

/// Order backend that records every completion call.
///
/// ## Example
/// ```rust,ignore
/// let backend = RecordingOrderBackend::new();
/// backend.fail_next(CollaboratorError::Timeout(5000));
/// // first completion fails, the retry succeeds
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingOrderBackend {
    state: Arc<Mutex<BackendState>>,
}

impl RecordingOrderBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a failure for the next call.
    pub fn fail_next(&self, error: CollaboratorError) {
        lock(&self.state).failures.push(error);
    }

    pub fn call_count(&self) -> usize {
        lock(&self.state).calls.len()
    }

    pub fn last_call(&self) -> Option<(String, CompletionPayload)> {
        lock(&self.state).calls.last().cloned()
    }
}

#[async_trait]
impl OrderBackend for RecordingOrderBackend {
    async fn complete_order(
        &self,
        order_id: &str,
        payload: &CompletionPayload,
    ) -> Result<CompletionResult, CollaboratorError> {
        let mut state = lock(&self.state);
        state.calls.push((order_id.to_string(), payload.clone()));
        if !state.failures.is_empty() {
            return Err(state.failures.remove(0));
        }
        Ok(CompletionResult(json!({
            "orderId": order_id,
            "status": "completed",
            "receiptNumber": format!("R-{:04}", state.calls.len()),
            "totalPaid": payload.total_paid.cents(),
        })))
    }
}

#[derive(Debug, Default)]
struct PrinterState {
    printed: Vec<(ReceiptPayload, bool)>,
    failures: Vec<CollaboratorError>,
}

/// Printer that records every receipt.
#[derive(Debug, Clone, Default)]
pub struct RecordingPrinter {
    state: Arc<Mutex<PrinterState>>,
}

impl RecordingPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, error: CollaboratorError) {
        lock(&self.state).failures.push(error);
    }

    /// Successfully printed receipts with their drawer flag.
    pub fn printed(&self) -> Vec<(ReceiptPayload, bool)> {
        lock(&self.state).printed.clone()
    }
}

#[async_trait]
impl ReceiptPrinter for RecordingPrinter {
    async fn print_receipt(
        &self,
        receipt: &ReceiptPayload,
        open_drawer: bool,
    ) -> Result<(), CollaboratorError> {
        let mut state = lock(&self.state);
        if !state.failures.is_empty() {
            return Err(state.failures.remove(0));
        }
        state.printed.push((receipt.clone(), open_drawer));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::AppliedDiscount;
    use checkout_core::types::{CashDetails, MethodDetails, TenderRecord};
    use checkout_core::TransactionLedger;

    fn paid_ledger() -> TransactionLedger {
        let mut ledger = TransactionLedger::new(Money::from_cents(2150));
        ledger
            .append(TenderRecord {
                amount_charged: Money::from_cents(2150),
                tip: Money::zero(),
                details: MethodDetails::Cash(CashDetails {
                    cash_tendered: Money::from_cents(2500),
                    change: Money::from_cents(350),
                }),
            })
            .unwrap();
        ledger
    }

    #[test]
    fn test_completion_payload_wire_shape() {
        let ledger = paid_ledger();
        let cart = CartSnapshot {
            discount: Some(AppliedDiscount {
                id: "promo".into(),
                amount: Money::from_cents(100),
            }),
            ..Default::default()
        };
        let payload = CompletionPayload::new(
            ledger.transactions().to_vec(),
            ledger.totals(),
            SettlementMethod::Cash,
            &cart,
        );

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["totalPaid"], 2150);
        assert_eq!(value["baseAmountPaid"], 2150);
        assert_eq!(value["totalTipAmount"], 0);
        assert_eq!(value["paymentMethod"], "cash");
        assert_eq!(value["discountId"], "promo");
        assert_eq!(value["discountAmount"], 100);
        assert_eq!(value["transactions"].as_array().map(Vec::len), Some(1));
        assert!(value.get("completedAt").is_some());
    }

    #[tokio::test]
    async fn test_recording_backend_fails_then_succeeds() {
        let ledger = paid_ledger();
        let payload = CompletionPayload::new(
            ledger.transactions().to_vec(),
            ledger.totals(),
            SettlementMethod::Cash,
            &CartSnapshot::default(),
        );
        let backend = RecordingOrderBackend::new();
        backend.fail_next(CollaboratorError::Timeout(5000));

        assert!(backend.complete_order("order-1", &payload).await.is_err());
        let result = backend.complete_order("order-1", &payload).await.unwrap();
        assert_eq!(result.0["orderId"], "order-1");
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_recording_printer() {
        let printer = RecordingPrinter::new();
        printer.fail_next(CollaboratorError::Unavailable("out of paper".into()));
        let receipt = ReceiptPayload {
            order_id: "order-1".into(),
            items: Vec::new(),
            transactions: Vec::new(),
            total_due: Money::from_cents(2150),
            total_paid: Money::from_cents(2150),
            total_tip_amount: Money::zero(),
            change: Money::from_cents(350),
            printed_at: Utc::now(),
        };

        assert!(printer.print_receipt(&receipt, true).await.is_err());
        assert!(printer.printed().is_empty());
        printer.print_receipt(&receipt, true).await.unwrap();
        assert_eq!(printer.printed().len(), 1);
        assert!(printer.printed()[0].1);
    }
}
