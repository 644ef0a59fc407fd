//! # checkout-flow: Payment Flow
//!
//! Drives one order from "take payment" to a completed order: the cashier's
//! view state machine, the customer's step-by-step flow on the second
//! display, and the calls to the order backend and receipt printer.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Payment Flow                                   │
//! │                                                                         │
//! │  Cashier UI                                                             │
//! │      │ start_payment / navigate / process_payment / complete            │
//! │      ▼                                                                  │
//! │  ┌──────────────────────────────┐      ┌────────────────────────────┐  │
//! │  │    PaymentFlowController     │─────►│     StepOrchestrator       │  │
//! │  │  PaymentState + Ledger       │◄─────│  StepContext, listener     │  │
//! │  └───┬──────────┬──────────┬────┘ event└─────────────┬──────────────┘  │
//! │      │          │          │                         │                  │
//! │      ▼          ▼          ▼                         ▼                  │
//! │  CartContext  OrderBackend  ReceiptPrinter   DisplayChannelHandle       │
//! │                                              (checkout-display)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`cart`] - Cart snapshot and the shared cart used by the cashier UI
//! - [`collaborators`] - Backend and printer traits with recording doubles
//! - [`controller`] - The payment state machine
//! - [`error`] - Flow error categories
//! - [`notify`] - Cashier notifications
//! - [`orchestrator`] - Customer step sequencing
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_flow::{Collaborators, PaymentFlowController, NavDirection, NavigateOptions};
//!
//! let mut controller = PaymentFlowController::new(display, collaborators);
//! controller.start_payment().await?;
//! controller
//!     .navigate(ViewId::Credit, NavDirection::Forward, NavigateOptions::default())
//!     .await?;
//!
//! while let Some(event) = controller.next_customer_event().await {
//!     if let CustomerOutcome::Completed(_) = controller.handle_customer_event(event).await? {
//!         break;
//!     }
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod collaborators;
pub mod controller;
pub mod error;
pub mod notify;
pub mod orchestrator;

// =============================================================================
// Re-exports
// =============================================================================

pub use cart::{AppliedDiscount, CartLine, CartSnapshot, SharedCart};
pub use collaborators::{
    CartContext, CompletionPayload, CompletionResult, OrderBackend, ReceiptPayload,
    ReceiptPrinter, RecordingOrderBackend, RecordingPrinter,
};
pub use controller::{
    Collaborators, CustomerOutcome, NavDirection, NavigateOptions, PaymentDetails,
    PaymentFlowController, PaymentState,
};
pub use error::{CollaboratorError, FlowError, FlowResult};
pub use notify::{FlowNotifier, Notice, NoticeLevel, RecordingNotifier, TracingNotifier};
pub use orchestrator::{
    next_step, steps_for, CustomerEvent, PaymentUpdate, StepContext, StepOrchestrator,
    CASH_STEPS, CREDIT_STEPS,
};
