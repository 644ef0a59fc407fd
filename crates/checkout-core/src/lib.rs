//! # checkout-core: Pure Payment Logic
//!
//! Money, the transaction ledger and tender validation for the checkout
//! coordinator. Nothing in this crate performs I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Checkout Coordinator                                │
//! │                                                                         │
//! │  ┌──────────────────────────┐        ┌──────────────────────────┐      │
//! │  │   Cashier surface        │        │  Customer display (peer) │      │
//! │  └────────────┬─────────────┘        └────────────▲─────────────┘      │
//! │               │                                   │ FlowMessage        │
//! │  ┌────────────▼─────────────────────────┐  ┌──────┴──────────────┐     │
//! │  │ checkout-flow                        │  │ checkout-display    │     │
//! │  │ PaymentFlowController                ├─►│ CustomerDisplay     │     │
//! │  │ StepOrchestrator                     │  │ Channel             │     │
//! │  └────────────┬─────────────────────────┘  └─────────────────────┘     │
//! │               │                                                         │
//! │  ┌────────────▼─────────────────────────────────────────────────┐      │
//! │  │               ★ checkout-core (THIS CRATE) ★                 │      │
//! │  │                                                              │      │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌──────────┐ │      │
//! │  │   │   money   │  │  ledger   │  │   types   │  │validation│ │      │
//! │  │   │   Money   │  │  Ledger   │  │Transaction│  │  tender  │ │      │
//! │  │   │  epsilon  │  │  Totals   │  │  ViewId   │  │  checks  │ │      │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └──────────┘ │      │
//! │  │                                                              │      │
//! │  │   NO I/O • NO WINDOWS • NO NETWORK • PURE FUNCTIONS          │      │
//! │  └──────────────────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`ledger`] - Append-only tender ledger and derived totals
//! - [`types`] - Domain types (Transaction, SplitDetails, ViewId, FlowStep)
//! - [`validation`] - Tender validation and quick-tender helpers
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use checkout_core::{Money, TransactionLedger};
//! use checkout_core::types::{CashDetails, MethodDetails, TenderRecord};
//!
//! let mut ledger = TransactionLedger::new(Money::from_cents(2150));
//! ledger.enable_split().unwrap();
//!
//! for leg in [1000, 1150] {
//!     ledger
//!         .append(TenderRecord {
//!             amount_charged: Money::from_cents(leg),
//!             tip: Money::zero(),
//!             details: MethodDetails::Cash(CashDetails {
//!                 cash_tendered: Money::from_cents(leg),
//!                 change: Money::zero(),
//!             }),
//!         })
//!         .unwrap();
//! }
//!
//! assert!(ledger.is_fully_paid());
//! assert_eq!(ledger.split_details().unwrap().completed_splits.len(), 2);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::{LedgerTotals, TransactionLedger};
pub use money::{is_payment_complete, remaining_after, Money, MAX_AMOUNT, PAYMENT_EPSILON};
pub use types::*;
