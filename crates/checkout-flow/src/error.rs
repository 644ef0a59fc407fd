//! # Flow Error Types
//!
//! Error taxonomy for the payment flow.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Flow Error Categories                              │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Validation     │  │   Protocol      │  │     Network             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  bad order id,  │  │  display send   │  │  order backend or       │ │
//! │  │  amount, tender │  │  failed; logged │  │  printer failed;        │ │
//! │  │  no mutation    │  │  and retried    │  │  ledger kept, retry OK  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  State                                                          │   │
//! │  │  operation in the wrong state; logged with view, amount paid    │   │
//! │  │  and order id                                                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use checkout_core::{CoreError, ValidationError};
use checkout_display::DisplayError;
use thiserror::Error;

/// Result type alias for flow operations.
pub type FlowResult<T> = Result<T, FlowError>;

// =============================================================================
// Collaborator Error
// =============================================================================

/// Failure reported by an external collaborator (order backend, printer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// Could not reach the service.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The call did not finish in time.
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// The service answered with a refusal.
    #[error("rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl CollaboratorError {
    /// Refusals in the 4xx range will not succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            CollaboratorError::Unavailable(_) | CollaboratorError::Timeout(_) => true,
            CollaboratorError::Rejected { status, .. } => *status >= 500,
        }
    }
}

// =============================================================================
// Flow Error
// =============================================================================

/// Payment flow error.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Cashier input rejected before any state changed.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The customer display could not be reached.
    #[error("Customer display error: {0}")]
    Protocol(#[from] DisplayError),

    /// An external collaborator failed. Tendered money is kept.
    #[error("{collaborator} failed: {source}")]
    Network {
        collaborator: &'static str,
        #[source]
        source: CollaboratorError,
    },

    /// Operation attempted in the wrong state.
    #[error("Cannot {operation}: {reason}")]
    State { operation: String, reason: String },
}

impl FlowError {
    pub fn state(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        FlowError::State {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn network(collaborator: &'static str, source: CollaboratorError) -> Self {
        FlowError::Network {
            collaborator,
            source,
        }
    }

    /// Whether the cashier can simply try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            FlowError::Network { source, .. } => source.is_retryable(),
            FlowError::Protocol(e) => e.is_retryable(),
            FlowError::Validation(_) | FlowError::State { .. } => false,
        }
    }

    /// Integration faults that must be surfaced loudly.
    pub fn is_state_error(&self) -> bool {
        matches!(self, FlowError::State { .. })
    }
}

impl From<CoreError> for FlowError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => FlowError::Validation(e),
            CoreError::InvalidState { operation, reason } => FlowError::State { operation, reason },
            CoreError::NotFullyPaid { paid, due } => FlowError::State {
                operation: "complete payment".to_string(),
                reason: format!("paid {paid} of {due}"),
            },
        }
    }
}
