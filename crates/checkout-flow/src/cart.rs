//! # Cart Snapshot
//!
//! The read-only view of the active order that the payment flow works from.
//!
//! ## Thread Safety
//! [`SharedCart`] wraps the cart in `Arc<Mutex<T>>` so the cashier UI can
//! keep editing lines while the flow takes snapshots. The flow itself only
//! ever reads through [`CartContext`](crate::collaborators::CartContext).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Snapshot Lifecycle                              │
//! │                                                                         │
//! │  Cashier UI ──► with_cart_mut() ──► lines / discount / order id         │
//! │                                                                         │
//! │  start_payment() ──► snapshot() ──► frozen CartSnapshot                 │
//! │                                     (total due for the whole flow)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use checkout_core::Money;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collaborators::CartContext;

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub sku: String,
    pub name: String,
    /// Price at the time the line was added.
    pub unit_price: Money,
    pub quantity: i64,
}

impl CartLine {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, unit_price: Money, quantity: i64) -> Self {
        CartLine {
            sku: sku.into(),
            name: name.into(),
            unit_price,
            quantity,
        }
    }

    pub fn line_total(&self) -> Money {
        self.unit_price * self.quantity
    }
}

/// Order-level discount applied by the cashier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedDiscount {
    pub id: String,
    pub amount: Money,
}

/// Frozen copy of the active order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub items: Vec<CartLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<AppliedDiscount>,
    pub tax: Money,
}

impl CartSnapshot {
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartLine::line_total).sum()
    }

    pub fn discount_amount(&self) -> Money {
        self.discount
            .as_ref()
            .map_or(Money::zero(), |d| d.amount)
    }

    /// `subtotal - discount + tax`, never negative.
    pub fn total(&self) -> Money {
        (self.subtotal() - self.discount_amount()).clamp_non_negative() + self.tax
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Cart object for the customer display, totals included.
    pub fn to_display_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert("subtotal".into(), Value::from(self.subtotal().cents()));
            map.insert("discountAmount".into(), Value::from(self.discount_amount().cents()));
            map.insert("total".into(), Value::from(self.total().cents()));
        }
        value
    }
}

/// Cart shared between the cashier UI and the payment flow.
#[derive(Debug, Clone, Default)]
pub struct SharedCart {
    cart: Arc<Mutex<CartSnapshot>>,
}

impl SharedCart {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CartSnapshot> {
        self.cart.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read access.
    pub fn with_cart<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&CartSnapshot) -> R,
    {
        f(&self.lock())
    }

    /// Write access.
    pub fn with_cart_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut CartSnapshot) -> R,
    {
        f(&mut self.lock())
    }

    pub fn set_order_id(&self, order_id: impl Into<String>) {
        let order_id = order_id.into();
        self.with_cart_mut(|cart| cart.order_id = Some(order_id));
    }

    /// Adds a line, or bumps the quantity of an existing SKU.
    pub fn add_line(&self, line: CartLine) {
        self.with_cart_mut(|cart| {
            match cart.items.iter_mut().find(|l| l.sku == line.sku) {
                Some(existing) => existing.quantity += line.quantity,
                None => cart.items.push(line),
            }
        });
    }

    pub fn apply_discount(&self, discount: Option<AppliedDiscount>) {
        self.with_cart_mut(|cart| cart.discount = discount);
    }

    pub fn set_tax(&self, tax: Money) {
        self.with_cart_mut(|cart| cart.tax = tax);
    }

    /// Empties the cart for the next order.
    pub fn clear(&self) {
        self.with_cart_mut(|cart| *cart = CartSnapshot::default());
    }
}

impl CartContext for SharedCart {
    fn snapshot(&self) -> CartSnapshot {
        self.with_cart(CartSnapshot::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cart() -> SharedCart {
        let cart = SharedCart::new();
        cart.set_order_id("order-1");
        cart.add_line(CartLine::new("COFFEE", "Coffee", Money::from_cents(450), 3));
        cart.add_line(CartLine::new("MUFFIN", "Muffin", Money::from_cents(400), 2));
        cart
    }

    #[test]
    fn test_totals() {
        let cart = cart();
        cart.apply_discount(Some(AppliedDiscount {
            id: "promo-10".into(),
            amount: Money::from_cents(200),
        }));
        cart.set_tax(Money::from_cents(50));

        let snapshot = cart.snapshot();
        assert_eq!(snapshot.subtotal().cents(), 2150);
        assert_eq!(snapshot.total().cents(), 2000);
    }

    #[test]
    fn test_add_line_merges_sku() {
        let cart = cart();
        cart.add_line(CartLine::new("COFFEE", "Coffee", Money::from_cents(450), 1));
        let snapshot = cart.snapshot();
        assert_eq!(snapshot.items.len(), 2);
        assert_eq!(snapshot.items[0].quantity, 4);
    }

    #[test]
    fn test_discount_never_makes_total_negative() {
        let cart = cart();
        cart.apply_discount(Some(AppliedDiscount {
            id: "comp".into(),
            amount: Money::from_cents(5000),
        }));
        assert_eq!(cart.snapshot().total(), Money::zero());
    }

    #[test]
    fn test_snapshot_is_frozen() {
        let cart = cart();
        let before = cart.snapshot();
        cart.clear();
        assert_eq!(before.total().cents(), 2150);
        assert!(cart.snapshot().is_empty());
        assert!(cart.snapshot().order_id.is_none());
    }

    #[test]
    fn test_display_value() {
        let value = cart().snapshot().to_display_value();
        assert_eq!(value["orderId"], "order-1");
        assert_eq!(value["total"], 2150);
        assert_eq!(value["items"][0]["unitPrice"], 450);
        assert!(value.get("discount").is_none());
    }
}
