//! Flow snapshot merging for `UPDATE_CUSTOMER_FLOW`.
//!
//! ```text
//! base (cached snapshot)        payload (step data)
//! ┌──────────────────────┐      ┌──────────────────────┐
//! │ currentStep: "tip"   │      │ tipAmount: 300       │
//! │ cart: {total, items} │  +   │ cart: {total: 2450}  │
//! │ currentPaymentAmount │      │ orderId: null        │
//! │   {base, tip}        │      └──────────────────────┘
//! │ orderId: "o-1"       │
//! └──────────────────────┘
//!             │
//!             ▼
//! ┌────────────────────────────────────────────┐
//! │ currentStep: <step>                        │  set from the step
//! │ cart: {total: 2450, items}                 │  deep merged
//! │ currentPaymentAmount {base, tip}           │  untouched
//! │ tipAmount: 300                             │  shallow merged
//! │                                            │  orderId pruned (null)
//! └────────────────────────────────────────────┘
//! ```

use checkout_core::FlowStep;
use serde_json::Value;

use crate::protocol::Content;

/// Keys merged field-by-field instead of replaced wholesale.
pub const DEEP_MERGE_KEYS: [&str; 3] = ["currentPaymentAmount", "totalRemainingAmount", "cart"];

/// Key holding the display's current step.
pub const CURRENT_STEP_KEY: &str = "currentStep";

/// Builds the outbound content of an `UPDATE_CUSTOMER_FLOW`.
pub fn merge_flow_update(base: &Content, step: FlowStep, payload: &Content) -> Content {
    let mut merged = base.clone();

    for (key, value) in payload {
        let deep = DEEP_MERGE_KEYS.contains(&key.as_str());
        match (merged.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) if deep => {
                deep_merge(existing, incoming);
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    merged.insert(
        CURRENT_STEP_KEY.to_string(),
        Value::String(step.as_str().to_string()),
    );
    prune_nulls(&mut merged);
    merged
}

fn deep_merge(target: &mut Content, incoming: &Content) {
    for (key, value) in incoming {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => deep_merge(existing, nested),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Removes null-valued keys at every depth, including inside arrays.
pub fn prune_nulls(content: &mut Content) {
    content.retain(|_, value| !value.is_null());
    for value in content.values_mut() {
        prune_value(value);
    }
}

fn prune_value(value: &mut Value) {
    match value {
        Value::Object(map) => prune_nulls(map),
        Value::Array(items) => items.iter_mut().for_each(prune_value),
        _ => {}
    }
}
