//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Ten cash legs of $0.10 in binary floating point:                       │
//! │    0.1 + 0.1 + ... + 0.1 = 0.9999999999999999  ❌ "not fully paid"       │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    10 + 10 + ... + 10 = 100 cents                ✅ exact               │
//! │                                                                         │
//! │  Floats only exist at the cashier input boundary                        │
//! │  (`Money::from_major_f64`), rejected when NaN, infinite or too large.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use checkout_core::money::{is_payment_complete, Money};
//!
//! let due = Money::from_cents(2150); // $21.50
//! let leg1 = Money::from_cents(1000);
//! let leg2 = Money::from_cents(1150);
//!
//! assert!(!is_payment_complete(leg1, due));
//! assert!(is_payment_complete(leg1 + leg2, due));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::error::ValidationError;

/// Currency-rounding slack used when comparing paid against due (one cent).
pub const PAYMENT_EPSILON: Money = Money::from_cents(1);

/// Largest amount accepted from cashier input, in either direction ($10M).
///
/// ## Business Reason
/// Keeps every sum the ledger can form well inside `i64`, so the plain
/// arithmetic operators below never overflow.
pub const MAX_AMOUNT: Money = Money::from_cents(1_000_000_000);

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (cents for USD).
///
/// ## Design Decisions
/// - **i64 (signed)**: intermediate results such as `due - paid` may go negative
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Serialized as cents**: the backend and the display both receive integers
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Cart total ──► totalDue ──► step amount due ──► processPayment()       │
/// │                                                    │                    │
/// │                     Transaction.amount ◄───────────┤                    │
/// │                     Transaction.baseAmountPaid ◄───┤                    │
/// │                     Transaction.tipAmount ◄────────┘                    │
/// │                                                                         │
/// │  Ledger.amountPaid = Σ baseAmountPaid      (exact, never drifts)        │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Wraps a count of cents.
    ///
    /// ## Example
    /// ```rust
    /// use checkout_core::money::Money;
    ///
    /// let price = Money::from_cents(2150); // Represents $21.50
    /// assert_eq!(price.cents(), 2150);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// `from_major_minor(21, 50)` is $21.50 and `from_major_minor(-5, 50)` is
    /// -$5.50: the sign of `major` applies to both parts.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Converts a cashier-entered number into cents.
    ///
    /// This is the only place a float may enter the system. NaN, infinite and
    /// anything beyond [`MAX_AMOUNT`] is rejected; the rest is rounded half
    /// away from zero to the nearest cent.
    ///
    /// ## Example
    /// ```rust
    /// use checkout_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_f64(21.5).unwrap().cents(), 2150);
    /// assert!(Money::from_major_f64(f64::NAN).is_err());
    /// ```
    pub fn from_major_f64(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NotANumber {
                field: "amount".to_string(),
            });
        }

        let cents = (value * 100.0).round();
        if cents.abs() > MAX_AMOUNT.0 as f64 {
            return Err(Self::out_of_range());
        }

        Ok(Money(cents as i64))
    }

    fn out_of_range() -> ValidationError {
        ValidationError::OutOfRange {
            field: "amount".to_string(),
            min: -MAX_AMOUNT.0,
            max: MAX_AMOUNT.0,
        }
    }

    /// Parses a decimal string such as `"21.50"`, `"$3.5"` or `"-4"`.
    ///
    /// At most two fractional digits are accepted; no float is involved.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let rest = rest.strip_prefix('$').unwrap_or(rest);

        let (major, minor) = match rest.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (rest, ""),
        };

        if major.is_empty() && minor.is_empty() {
            return Err(invalid("empty amount"));
        }
        if minor.len() > 2 {
            return Err(invalid("at most two decimal places"));
        }
        if !major.chars().chain(minor.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid("must contain only digits and one decimal point"));
        }

        let major_value: i64 = if major.is_empty() {
            0
        } else {
            major.parse().map_err(|_| invalid("amount too large"))?
        };
        let minor_value: i64 = match minor.len() {
            0 => 0,
            1 => minor.parse::<i64>().map_err(|_| invalid("bad cents"))? * 10,
            _ => minor.parse().map_err(|_| invalid("bad cents"))?,
        };

        let cents = major_value
            .checked_mul(100)
            .and_then(|c| c.checked_add(minor_value))
            .ok_or_else(|| invalid("amount too large"))?;
        if cents > MAX_AMOUNT.0 {
            return Err(Self::out_of_range());
        }

        Ok(Money(if negative { -cents } else { cents }))
    }

    /// Raw cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Whole dollars, truncated toward zero.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Cents past the whole dollar, 0-99.
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Strictly greater than zero.
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Clamps negative values to zero.
    #[inline]
    pub const fn clamp_non_negative(self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            self
        }
    }

    /// Rounds up to the next multiple of `step` (used for quick-tender bills).
    pub fn round_up_to(self, step: Money) -> Money {
        if step.0 <= 0 {
            return self;
        }
        let remainder = self.0.rem_euclid(step.0);
        if remainder == 0 {
            self
        } else {
            Money(self.0 + step.0 - remainder)
        }
    }
}

// =============================================================================
// Payment Predicates
// =============================================================================

/// Returns true when `paid` covers `due` within [`PAYMENT_EPSILON`].
///
/// Monotonic in `paid`: once true for a fixed `due`, any larger `paid`
/// keeps it true.
#[inline]
pub fn is_payment_complete(paid: Money, due: Money) -> bool {
    paid >= due - PAYMENT_EPSILON
}

/// `max(0, due - paid)`.
#[inline]
pub fn remaining_after(due: Money, paid: Money) -> Money {
    (due - paid).clamp_non_negative()
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows money as `$21.50`. Debug/log formatting only; the display surface
/// localises its own rendering.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.dollars().abs(), self.cents_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Multiplication by i64 (line totals).
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
