//! # Validation Module
//!
//! Cashier input checks that run before the ledger is touched.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Cashier surface                                               │
//! │  ├── Number entry, quick-tender buttons                                 │
//! │  └── Money::from_major_f64 / Money::parse at the boundary               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  ├── order id present, amounts positive                                 │
//! │  ├── cash tendered covers the step                                      │
//! │  └── split leg within remaining balance                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: TransactionLedger::append                                     │
//! │  └── final positivity check, invariants                                 │
//! │                                                                         │
//! │  A failure here never mutates state.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use checkout_core::validation::{compute_change, validate_cash_tender};
//! use checkout_core::Money;
//!
//! let due = Money::from_cents(2150);
//! let tendered = Money::from_cents(2500);
//!
//! validate_cash_tender(tendered, due).unwrap();
//! assert_eq!(compute_change(tendered, due).unwrap(), Money::from_cents(350));
//! ```

use crate::error::ValidationError;
use crate::money::Money;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Bill denominations offered as quick-tender buttons, in cents.
const QUICK_TENDER_STEPS: [i64; 6] = [100, 500, 1_000, 2_000, 5_000, 10_000];

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates the order id bound to a payment flow.
///
/// ## Rules
/// - Must be present
/// - Must not be blank
///
/// ## Returns
/// The trimmed order id.
pub fn validate_order_id(order_id: Option<&str>) -> ValidationResult<String> {
    let id = order_id.map(str::trim).unwrap_or_default();

    if id.is_empty() {
        return Err(ValidationError::Required {
            field: "order id".to_string(),
        });
    }

    Ok(id.to_string())
}

// =============================================================================
// Amount Validators
// =============================================================================

/// Validates a charged amount.
///
/// ## Rules
/// - Must be positive (> 0)
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

/// Validates a tip against the amount it is charged with.
///
/// ## Rules
/// - Must be non-negative
/// - Must not exceed the charged amount
pub fn validate_tip(tip: Money, amount_charged: Money) -> ValidationResult<()> {
    if tip.is_negative() || tip > amount_charged {
        return Err(ValidationError::OutOfRange {
            field: "tip".to_string(),
            min: 0,
            max: amount_charged.cents(),
        });
    }

    Ok(())
}

/// Validates cash handed over for the current step.
///
/// ## User Workflow
/// ```text
/// Amount due: $21.50
///      │
///      ▼
/// Cashier enters tendered: $20.00
///      │
///      ▼
/// validate_cash_tender ← THIS FUNCTION
///      │
///      ├── tendered < due → "cash tendered must be at least $21.50, got $20.00"
///      │
///      └── OK → compute_change → processPayment
/// ```
pub fn validate_cash_tender(tendered: Money, due: Money) -> ValidationResult<()> {
    validate_payment_amount(tendered)?;

    if tendered < due {
        return Err(ValidationError::BelowMinimum {
            field: "cash tendered".to_string(),
            minimum: due,
            actual: tendered,
        });
    }

    Ok(())
}

/// Validates a split leg amount.
///
/// ## Rules
/// - Must be positive
/// - Must not exceed what is still owed on the order
pub fn validate_split_leg(leg: Money, remaining: Money) -> ValidationResult<()> {
    if !leg.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "split amount".to_string(),
        });
    }

    if leg > remaining {
        return Err(ValidationError::ExceedsRemaining {
            field: "split amount".to_string(),
            remaining,
            actual: leg,
        });
    }

    Ok(())
}

// =============================================================================
// Cash Helpers
// =============================================================================

/// Change owed for a cash tender.
pub fn compute_change(tendered: Money, due: Money) -> ValidationResult<Money> {
    validate_cash_tender(tendered, due)?;
    Ok(tendered - due)
}

/// Quick-tender amounts for the cashier's cash view.
///
/// The exact amount first, then the next whole unit and the next 5/10/20/50/100
/// bill, deduplicated and ascending. Empty when nothing is due.
///
/// ## Example
/// ```rust
/// use checkout_core::validation::suggested_cash_tenders;
/// use checkout_core::Money;
///
/// let cents: Vec<i64> = suggested_cash_tenders(Money::from_cents(2150))
///     .iter()
///     .map(|m| m.cents())
///     .collect();
/// assert_eq!(cents, vec![2150, 2200, 2500, 3000, 4000, 5000, 10000]);
/// ```
pub fn suggested_cash_tenders(due: Money) -> Vec<Money> {
    if !due.is_positive() {
        return Vec::new();
    }

    let mut tenders: Vec<Money> = std::iter::once(due)
        .chain(
            QUICK_TENDER_STEPS
                .iter()
                .map(|step| due.round_up_to(Money::from_cents(*step))),
        )
        .collect();
    tenders.sort();
    tenders.dedup();
    tenders
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_order_id() {
        assert_eq!(validate_order_id(Some(" 42 ")).unwrap(), "42");
        assert!(validate_order_id(Some("   ")).is_err());
        assert!(validate_order_id(None).is_err());
    }

    #[test]
    fn test_validate_payment_amount() {
        assert!(validate_payment_amount(Money::from_cents(1)).is_ok());
        assert!(validate_payment_amount(Money::zero()).is_err());
        assert!(validate_payment_amount(Money::from_cents(-100)).is_err());
    }

    #[test]
    fn test_validate_tip() {
        let charged = Money::from_cents(2300);
        assert!(validate_tip(Money::zero(), charged).is_ok());
        assert!(validate_tip(Money::from_cents(300), charged).is_ok());
        assert!(validate_tip(Money::from_cents(-1), charged).is_err());
        assert!(validate_tip(Money::from_cents(2301), charged).is_err());
    }

    #[test]
    fn test_validate_cash_tender() {
        let due = Money::from_cents(2150);
        assert!(validate_cash_tender(Money::from_cents(2150), due).is_ok());
        assert!(validate_cash_tender(Money::from_cents(2500), due).is_ok());

        let err = validate_cash_tender(Money::from_cents(2000), due).unwrap_err();
        assert!(matches!(err, ValidationError::BelowMinimum { .. }));
    }

    #[test]
    fn test_validate_split_leg() {
        let remaining = Money::from_cents(1150);
        assert!(validate_split_leg(Money::from_cents(1000), remaining).is_ok());
        assert!(validate_split_leg(remaining, remaining).is_ok());
        assert!(matches!(
            validate_split_leg(Money::from_cents(1151), remaining),
            Err(ValidationError::ExceedsRemaining { .. })
        ));
        assert!(validate_split_leg(Money::zero(), remaining).is_err());
    }

    #[test]
    fn test_compute_change() {
        let change = compute_change(Money::from_cents(2500), Money::from_cents(2150)).unwrap();
        assert_eq!(change, Money::from_cents(350));
        assert!(compute_change(Money::from_cents(100), Money::from_cents(2150)).is_err());
    }

    #[test]
    fn test_suggested_tenders_dedupe_round_amounts() {
        let cents: Vec<i64> = suggested_cash_tenders(Money::from_cents(2000))
            .iter()
            .map(|m| m.cents())
            .collect();
        assert_eq!(cents, vec![2000, 5000, 10000]);

        assert!(suggested_cash_tenders(Money::zero()).is_empty());
    }
}
