//! # Error Types
//!
//! Domain-specific error types for checkout-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  checkout-core errors (this file)                                       │
//! │  ├── CoreError        - Ledger / state rule violations                  │
//! │  └── ValidationError  - Cashier input failures (no state mutated)       │
//! │                                                                         │
//! │  checkout-display errors (separate crate)                               │
//! │  └── DisplayError     - Peer window / protocol failures                 │
//! │                                                                         │
//! │  checkout-flow errors (separate crate)                                  │
//! │  └── FlowError        - Validation | Protocol | Network | State         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → FlowError → cashier notification   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Core ledger errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An operation ran against a ledger in the wrong state.
    ///
    /// ## When This Occurs
    /// - Finalizing while the fully-paid invariant is unmet
    /// - Recording a split leg when split bookkeeping was never enabled
    #[error("Cannot {operation}: {reason}")]
    InvalidState { operation: String, reason: String },

    /// The order is not covered by the recorded tender.
    #[error("Order not fully paid: paid {paid}, due {due}")]
    NotFullyPaid { paid: Money, due: Money },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any state is touched, so the cashier can correct the input
/// and try again.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// The entered number is NaN or infinite.
    #[error("{field} is not a number")]
    NotANumber { field: String },

    /// Amount is lower than the current step requires.
    #[error("{field} must be at least {minimum}, got {actual}")]
    BelowMinimum {
        field: String,
        minimum: Money,
        actual: Money,
    },

    /// Amount is larger than what is still owed.
    #[error("{field} of {actual} exceeds the remaining balance of {remaining}")]
    ExceedsRemaining {
        field: String,
        remaining: Money,
        actual: Money,
    },

    /// Invalid format (e.g., malformed decimal amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::NotFullyPaid {
            paid: Money::from_cents(1000),
            due: Money::from_cents(2150),
        };
        assert_eq!(err.to_string(), "Order not fully paid: paid $10.00, due $21.50");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "order id".to_string(),
        };
        assert_eq!(err.to_string(), "order id is required");

        let err = ValidationError::BelowMinimum {
            field: "cash tendered".to_string(),
            minimum: Money::from_cents(2150),
            actual: Money::from_cents(2000),
        };
        assert_eq!(
            err.to_string(),
            "cash tendered must be at least $21.50, got $20.00"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "amount".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
