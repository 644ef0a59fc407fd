//! # Domain Types
//!
//! Core domain types used throughout the checkout flow.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  Transaction    │   │ CompletedSplit  │   │  SplitDetails   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  method         │   │  method         │   │  currentIndex   │       │
//! │  │  amount         │   │  amount         │   │  remaining      │       │
//! │  │  baseAmountPaid │   │  tip            │   │  completed[]    │       │
//! │  │  tipAmount      │   │  index          │   └─────────────────┘       │
//! │  │  methodDetails  │   └─────────────────┘                              │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ PaymentMethod   │   │     ViewId      │   │    FlowStep     │       │
//! │  │  Cash           │   │  InitialOptions │   │  Cart → Rewards │       │
//! │  │  Credit         │   │  Cash / Credit  │   │  → Tip →        │       │
//! │  └─────────────────┘   │  Split          │   │  Payment →      │       │
//! │                        │  Completion     │   │  Receipt        │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ledger entries are immutable once appended; nothing in this module exposes
//! a way to edit one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Payment Method
// =============================================================================

/// How a single tender was collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Physical cash handed to the cashier.
    Cash,
    /// Card payment on the customer-facing terminal.
    Credit,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Credit => "credit",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the whole order was settled, as reported to the order backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SettlementMethod {
    Cash,
    Credit,
    Split,
}

impl From<PaymentMethod> for SettlementMethod {
    fn from(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Cash => SettlementMethod::Cash,
            PaymentMethod::Credit => SettlementMethod::Credit,
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Status of a recorded tender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Cash received and counted.
    Completed,
    /// Card authorization approved by the terminal.
    Approved,
}

impl TransactionStatus {
    pub fn for_method(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Cash => TransactionStatus::Completed,
            PaymentMethod::Credit => TransactionStatus::Approved,
        }
    }
}

/// Card data echoed back by the terminal. Never contains a full PAN.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CardInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub last4: Option<String>,
}

/// Cash-specific tender details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CashDetails {
    /// Amount the customer handed over.
    pub cash_tendered: Money,
    /// Change returned to the customer.
    pub change: Money,
}

/// Credit-specific tender details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CreditDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub card_info: Option<CardInfo>,
    /// Terminal/processor reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub transaction_id: Option<String>,
}

/// Method-specific fields of a tender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MethodDetails {
    Cash(CashDetails),
    Credit(CreditDetails),
}

impl MethodDetails {
    /// The method these details belong to.
    pub fn method(&self) -> PaymentMethod {
        match self {
            MethodDetails::Cash(_) => PaymentMethod::Cash,
            MethodDetails::Credit(_) => PaymentMethod::Credit,
        }
    }
}

/// Where a tender sits within a split payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SplitContext {
    /// Zero-based leg index.
    pub leg_index: u32,
    /// Balance owed before this leg was applied.
    pub remaining_before: Money,
}

/// One immutable tender entry in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub method: PaymentMethod,
    /// Total charged, tip included.
    pub amount: Money,
    /// Portion of `amount` applied to the order total.
    pub base_amount_paid: Money,
    pub tip_amount: Money,
    pub status: TransactionStatus,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
    pub method_details: MethodDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub split_context: Option<SplitContext>,
}

/// Input for a new ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenderRecord {
    /// Total charged, tip included.
    pub amount_charged: Money,
    pub tip: Money,
    pub details: MethodDetails,
}

// =============================================================================
// Split Bookkeeping
// =============================================================================

/// Audit entry for one completed split leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSplit {
    pub method: PaymentMethod,
    pub amount: Money,
    pub tip: Money,
    pub index: u32,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

/// Split-mode progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SplitDetails {
    pub current_split_index: u32,
    pub remaining_amount: Money,
    pub completed_splits: Vec<CompletedSplit>,
}

// =============================================================================
// Views and Customer Steps
// =============================================================================

/// Cashier-side payment views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ViewId {
    InitialOptions,
    Cash,
    Credit,
    Split,
    Completion,
}

impl ViewId {
    /// Views where a single tender is collected.
    pub fn is_tender_view(&self) -> bool {
        matches!(self, ViewId::Cash | ViewId::Credit)
    }

    /// The tender method a view collects, if any.
    pub fn tender_method(&self) -> Option<PaymentMethod> {
        match self {
            ViewId::Cash => Some(PaymentMethod::Cash),
            ViewId::Credit => Some(PaymentMethod::Credit),
            _ => None,
        }
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViewId::InitialOptions => "initial_options",
            ViewId::Cash => "cash",
            ViewId::Credit => "credit",
            ViewId::Split => "split",
            ViewId::Completion => "completion",
        };
        f.write_str(name)
    }
}

/// Steps shown on the customer display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum FlowStep {
    Cart,
    Rewards,
    Tip,
    Payment,
    Receipt,
}

impl FlowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStep::Cart => "cart",
            FlowStep::Rewards => "rewards",
            FlowStep::Tip => "tip",
            FlowStep::Payment => "payment",
            FlowStep::Receipt => "receipt",
        }
    }
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_details_wire_format() {
        let details = MethodDetails::Cash(CashDetails {
            cash_tendered: Money::from_cents(2500),
            change: Money::from_cents(350),
        });
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["kind"], "cash");
        assert_eq!(json["cashTendered"], 2500);
        assert_eq!(json["change"], 350);
        assert_eq!(details.method(), PaymentMethod::Cash);
    }

    #[test]
    fn test_absent_card_fields_are_optional() {
        let details = CreditDetails::default();
        assert_eq!(serde_json::to_value(&details).unwrap(), serde_json::json!({}));

        let decl = CreditDetails::decl();
        assert!(decl.contains("cardInfo?:"), "{decl}");
        assert!(decl.contains("transactionId?:"), "{decl}");
        assert!(!decl.contains("| null"), "{decl}");
        assert!(CardInfo::decl().contains("last4?:"));
        assert!(Transaction::decl().contains("splitContext?:"));
    }

    #[test]
    fn test_settlement_method_serializes_split() {
        let json = serde_json::to_string(&SettlementMethod::Split).unwrap();
        assert_eq!(json, "\"split\"");
        assert_eq!(
            SettlementMethod::from(PaymentMethod::Credit),
            SettlementMethod::Credit
        );
    }

    #[test]
    fn test_view_tender_method() {
        assert_eq!(ViewId::Cash.tender_method(), Some(PaymentMethod::Cash));
        assert_eq!(ViewId::Split.tender_method(), None);
        assert!(ViewId::Credit.is_tender_view());
        assert!(!ViewId::Completion.is_tender_view());
    }

    #[test]
    fn test_flow_step_names() {
        assert_eq!(FlowStep::Receipt.to_string(), "receipt");
        let parsed: FlowStep = serde_json::from_str("\"tip\"").unwrap();
        assert_eq!(parsed, FlowStep::Tip);
    }
}
