//! # Step Orchestrator
//!
//! Drives the customer-facing sub-flow on the display.
//!
//! ## Step Sequences
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Customer Step Sequences                              │
//! │                                                                         │
//! │  CREDIT:  cart ──► rewards ──► tip ──► payment ──► receipt              │
//! │                                                                         │
//! │  CASH:                                 payment ──► receipt              │
//! │           (any earlier step jumps straight to payment)                  │
//! │                                                                         │
//! │  display ── CUSTOMER_FLOW_STEP_COMPLETE {step, data} ──► next_event()   │
//! │                                                            │            │
//! │  advance(step, data) ◄── controller ◄── CustomerEvent ◄────┘            │
//! │       │                                 (context as of arrival)         │
//! │       ▼                                                                 │
//! │  UPDATE_CUSTOMER_FLOW {merged snapshot, currentStep: next}              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every event carries an immutable [`StepContext`]: the step data
//! accumulated so far is read from the event, never from a handler's
//! captured state.

use checkout_core::{FlowStep, Money, PaymentMethod};
use checkout_display::{
    merge_flow_update, Content, DisplayChannelHandle, DisplayError, DisplayListener,
    InboundMessage, ListenerId,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{FlowError, FlowResult};

/// Steps of the card flow, in order. Also the global step order.
pub const CREDIT_STEPS: [FlowStep; 5] = [
    FlowStep::Cart,
    FlowStep::Rewards,
    FlowStep::Tip,
    FlowStep::Payment,
    FlowStep::Receipt,
];

/// Steps of the cash flow, in order.
pub const CASH_STEPS: [FlowStep; 2] = [FlowStep::Payment, FlowStep::Receipt];

/// The steps `method` walks through.
pub fn steps_for(method: PaymentMethod) -> &'static [FlowStep] {
    match method {
        PaymentMethod::Credit => &CREDIT_STEPS,
        PaymentMethod::Cash => &CASH_STEPS,
    }
}

pub fn first_step(method: PaymentMethod) -> FlowStep {
    steps_for(method)[0]
}

fn ordinal(step: FlowStep) -> usize {
    CREDIT_STEPS
        .iter()
        .position(|s| *s == step)
        .unwrap_or(CREDIT_STEPS.len())
}

/// The step after `completed` for `method`, or `None` after the receipt.
///
/// ```rust
/// use checkout_core::{FlowStep, PaymentMethod};
/// use checkout_flow::orchestrator::next_step;
///
/// assert_eq!(next_step(PaymentMethod::Credit, FlowStep::Rewards), Some(FlowStep::Tip));
/// assert_eq!(next_step(PaymentMethod::Cash, FlowStep::Cart), Some(FlowStep::Payment));
/// assert_eq!(next_step(PaymentMethod::Cash, FlowStep::Receipt), None);
/// ```
pub fn next_step(method: PaymentMethod, completed: FlowStep) -> Option<FlowStep> {
    let after = ordinal(completed);
    steps_for(method)
        .iter()
        .copied()
        .find(|step| ordinal(*step) > after)
}

// =============================================================================
// Step Context
// =============================================================================

/// The state of one customer flow at a point in time.
///
/// Never mutated in place; every transition yields a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct StepContext {
    flow_id: String,
    method: PaymentMethod,
    step: FlowStep,
    data: Content,
    amount_due: Money,
    /// Cart shown when the flow started, kept for restarts.
    cart: Value,
    listener: ListenerId,
}

impl StepContext {
    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    /// Step the display is currently showing.
    pub fn step(&self) -> FlowStep {
        self.step
    }

    /// Step data accumulated from every completion so far.
    pub fn data(&self) -> &Content {
        &self.data
    }

    pub fn amount_due(&self) -> Money {
        self.amount_due
    }

    pub fn cart(&self) -> &Value {
        &self.cart
    }

    pub fn listener(&self) -> ListenerId {
        self.listener
    }

    /// Accumulated `key` as cents, if present and numeric.
    pub fn money(&self, key: &str) -> Option<Money> {
        self.data.get(key).and_then(Value::as_i64).map(Money::from_cents)
    }

    fn with_data(&self, data: &Content) -> StepContext {
        let mut next = self.clone();
        for (key, value) in data {
            next.data.insert(key.clone(), value.clone());
        }
        next
    }

    fn at_step(&self, step: FlowStep) -> StepContext {
        StepContext {
            step,
            ..self.clone()
        }
    }
}

/// What the customer did, with the context in effect when it arrived.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomerEvent {
    StepCompleted {
        context: StepContext,
        step: FlowStep,
        data: Content,
    },
    RewardsRegistered {
        context: StepContext,
        data: Content,
    },
}

impl CustomerEvent {
    pub fn context(&self) -> &StepContext {
        match self {
            CustomerEvent::StepCompleted { context, .. }
            | CustomerEvent::RewardsRegistered { context, .. } => context,
        }
    }
}

/// Payment figures pushed to the display after a tender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentUpdate {
    pub method: PaymentMethod,
    pub amount_charged: Money,
    pub tip: Money,
    pub amount_paid: Money,
    pub remaining: Money,
    /// What the tender view still collects after this tender.
    pub amount_due: Money,
    pub cash_tendered: Option<Money>,
    pub change: Option<Money>,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Sequences customer steps over a [`DisplayChannelHandle`].
pub struct StepOrchestrator {
    display: DisplayChannelHandle,
    context: Option<StepContext>,
    listener: Option<DisplayListener>,
}

impl StepOrchestrator {
    pub fn new(display: DisplayChannelHandle) -> Self {
        StepOrchestrator {
            display,
            context: None,
            listener: None,
        }
    }

    /// The running flow, if any.
    pub fn context(&self) -> Option<&StepContext> {
        self.context.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.context.is_some()
    }

    /// Starts a customer flow for `method` at its first step.
    ///
    /// Any previous flow is torn down first.
    pub async fn begin(
        &mut self,
        method: PaymentMethod,
        amount_due: Money,
        cart: Value,
    ) -> FlowResult<StepContext> {
        self.teardown().await;

        let listener = self.display.add_listener().await?;
        let step = first_step(method);
        let context = StepContext {
            flow_id: Uuid::new_v4().to_string(),
            method,
            step,
            data: Content::new(),
            amount_due,
            cart,
            listener: listener.id(),
        };
        self.listener = Some(listener);
        self.context = Some(context.clone());

        info!(
            flow_id = %context.flow_id,
            method = %method,
            step = %step,
            amount_due = %amount_due,
            "Starting customer flow"
        );
        self.display
            .start_flow(&context.flow_id, Self::start_content(&context))
            .await?;
        Ok(context)
    }

    /// Full snapshot for `START_CUSTOMER_FLOW`: the flow basics with every
    /// piece of step data accumulated so far merged on top.
    fn start_content(context: &StepContext) -> Content {
        let tip = context.money("tipAmount").unwrap_or_else(Money::zero);
        let mut base = Content::new();
        base.insert("paymentMethod".into(), json!(context.method.as_str()));
        base.insert(
            "currentPaymentAmount".into(),
            json!({ "base": context.amount_due.cents(), "tip": tip.cents() }),
        );
        if !context.cart.is_null() {
            base.insert("cart".into(), context.cart.clone());
        }
        merge_flow_update(&base, context.step, &context.data)
    }

    /// Waits for the next message that belongs to the running flow.
    ///
    /// Returns `None` when no flow is running or the display channel dropped
    /// the listener.
    pub async fn next_event(&mut self) -> Option<CustomerEvent> {
        loop {
            let listener = self.listener.as_mut()?;
            let message = listener.recv().await?;
            let context = self.context.as_ref()?;

            match message {
                InboundMessage::StepComplete {
                    flow_id,
                    step,
                    data,
                } => {
                    if flow_id.as_deref() != Some(context.flow_id.as_str()) {
                        debug!(
                            expected = %context.flow_id,
                            got = ?flow_id,
                            "Dropping step completion from another flow"
                        );
                        continue;
                    }
                    let context = context.with_data(&data);
                    self.context = Some(context.clone());
                    debug!(flow_id = %context.flow_id, step = %step, "Customer completed step");
                    return Some(CustomerEvent::StepCompleted {
                        context,
                        step,
                        data,
                    });
                }
                InboundMessage::RewardsRegistrationComplete { data } => {
                    let context = context.with_data(&data);
                    self.context = Some(context.clone());
                    return Some(CustomerEvent::RewardsRegistered { context, data });
                }
                InboundMessage::DisplayReady => continue,
            }
        }
    }

    /// Moves the display past `completed`.
    ///
    /// If the display channel lost the flow snapshot (window closed and
    /// reopened), the flow is restarted at the next step from the context.
    pub async fn advance(&mut self, completed: FlowStep, payload: Content) -> FlowResult<StepContext> {
        let context = self
            .context
            .clone()
            .ok_or_else(|| FlowError::state("advance customer flow", "no customer flow is running"))?;

        let next = next_step(context.method, completed).ok_or_else(|| {
            FlowError::state(
                "advance customer flow",
                format!("{} is the last step", completed),
            )
        })?;
        let context = context.with_data(&payload).at_step(next);

        match self
            .display
            .update_flow(&context.flow_id, next, payload)
            .await
        {
            Ok(_) => {}
            Err(DisplayError::FlowNotStarted { .. }) => {
                warn!(flow_id = %context.flow_id, step = %next, "Display lost the flow, restarting it");
                self.display
                    .start_flow(&context.flow_id, Self::start_content(&context))
                    .await?;
            }
            Err(e) => return Err(e.into()),
        }

        debug!(flow_id = %context.flow_id, from = %completed, to = %next, "Advanced customer flow");
        self.context = Some(context.clone());
        Ok(context)
    }

    /// Shows a tender's effect on the display.
    ///
    /// Cash goes out as `DIRECT_CASH_UPDATE` so tendered/change appear
    /// without waiting on the merge; card payments go through the snapshot.
    pub async fn publish_payment(&mut self, update: &PaymentUpdate) -> FlowResult<()> {
        let Some(context) = self.context.clone() else {
            debug!("No customer flow running, payment not mirrored");
            return Ok(());
        };

        let mut content = Content::new();
        content.insert(
            "currentPaymentAmount".into(),
            json!({
                "base": (update.amount_charged - update.tip).clamp_non_negative().cents(),
                "tip": update.tip.cents(),
            }),
        );
        content.insert(
            "totalRemainingAmount".into(),
            json!({ "paid": update.amount_paid.cents(), "remaining": update.remaining.cents() }),
        );
        content.insert("amountDue".into(), json!(update.amount_due.cents()));

        match update.method {
            PaymentMethod::Cash => {
                if let Some(tendered) = update.cash_tendered {
                    content.insert("cashTendered".into(), json!(tendered.cents()));
                }
                if let Some(change) = update.change {
                    content.insert("change".into(), json!(change.cents()));
                }
                self.display
                    .direct_cash_update(&context.flow_id, content)
                    .await?;
            }
            PaymentMethod::Credit => {
                match self
                    .display
                    .update_flow(&context.flow_id, context.step, content.clone())
                    .await
                {
                    Ok(_) => {}
                    Err(DisplayError::FlowNotStarted { .. }) => {
                        let restarted = context.with_data(&content);
                        self.display
                            .start_flow(&context.flow_id, Self::start_content(&restarted))
                            .await?;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    /// Ends the running flow and removes its listener.
    ///
    /// With `show_welcome` the display returns to its welcome screen.
    pub async fn cancel(&mut self, show_welcome: bool) -> FlowResult<()> {
        if let Some(context) = &self.context {
            info!(flow_id = %context.flow_id, "Ending customer flow");
        }
        self.teardown().await;
        if show_welcome {
            self.display.show_welcome().await?;
        }
        Ok(())
    }

    async fn teardown(&mut self) {
        self.context = None;
        if let Some(listener) = self.listener.take() {
            if let Err(e) = self.display.remove_listener(listener.id()).await {
                debug!(error = %e, "Listener already gone");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_display::{
        CustomerDisplayChannel, DisplayConfig, FlowMessage, InMemorySurface, MessageType,
    };
    use std::sync::Arc;
    use std::time::Duration;

    const ORIGIN: &str = "http://localhost:1420";

    fn setup() -> (InMemorySurface, DisplayChannelHandle) {
        let surface = InMemorySurface::new(ORIGIN).with_auto_ready();
        let handle =
            CustomerDisplayChannel::spawn(DisplayConfig::default(), Arc::new(surface.clone()))
                .unwrap();
        (surface, handle)
    }

    fn content(value: Value) -> Content {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_credit_sequence() {
        let mut step = first_step(PaymentMethod::Credit);
        let mut seen = vec![step];
        while let Some(next) = next_step(PaymentMethod::Credit, step) {
            seen.push(next);
            step = next;
        }
        assert_eq!(seen, CREDIT_STEPS.to_vec());
    }

    #[test]
    fn test_cash_skips_to_payment() {
        assert_eq!(first_step(PaymentMethod::Cash), FlowStep::Payment);
        assert_eq!(next_step(PaymentMethod::Cash, FlowStep::Tip), Some(FlowStep::Payment));
        assert_eq!(
            next_step(PaymentMethod::Cash, FlowStep::Payment),
            Some(FlowStep::Receipt)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_starts_flow_at_first_step() {
        let (surface, handle) = setup();
        let mut orchestrator = StepOrchestrator::new(handle);

        let context = orchestrator
            .begin(PaymentMethod::Credit, Money::from_cents(2150), json!({ "total": 2150 }))
            .await
            .unwrap();
        assert_eq!(context.step(), FlowStep::Cart);

        let start = surface.last_posted().unwrap();
        assert_eq!(start.kind, MessageType::StartCustomerFlow);
        assert_eq!(start.flow_id.as_deref(), Some(context.flow_id()));
        assert_eq!(start.content["currentStep"], "cart");
        assert_eq!(start.content["currentPaymentAmount"]["base"], 2150);
        assert_eq!(start.content["cart"]["total"], 2150);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_carry_accumulated_context() {
        let (surface, handle) = setup();
        let mut orchestrator = StepOrchestrator::new(handle);
        let context = orchestrator
            .begin(PaymentMethod::Credit, Money::from_cents(2150), Value::Null)
            .await
            .unwrap();
        let window = surface.current_window().unwrap();

        // A completion from an earlier flow is ignored.
        surface.peer_send(
            window,
            &FlowMessage::step_complete("old-flow", FlowStep::Tip, Content::new()),
        );
        surface.peer_send(
            window,
            &FlowMessage::step_complete(
                context.flow_id(),
                FlowStep::Tip,
                content(json!({ "tipAmount": 300 })),
            ),
        );

        let event = orchestrator.next_event().await.unwrap();
        match &event {
            CustomerEvent::StepCompleted { step, context, .. } => {
                assert_eq!(*step, FlowStep::Tip);
                assert_eq!(context.money("tipAmount"), Some(Money::from_cents(300)));
            }
            other => panic!("Expected StepCompleted, got {other:?}"),
        }

        let advanced = orchestrator
            .advance(FlowStep::Tip, Content::new())
            .await
            .unwrap();
        assert_eq!(advanced.step(), FlowStep::Payment);
        assert_eq!(advanced.money("tipAmount"), Some(Money::from_cents(300)));
        // The event's context is a snapshot and did not move.
        assert_eq!(event.context().step(), FlowStep::Cart);

        let update = surface.last_posted().unwrap();
        assert_eq!(update.kind, MessageType::UpdateCustomerFlow);
        assert_eq!(update.content["currentStep"], "payment");
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_restarts_lost_flow() {
        let (surface, handle) = setup();
        let mut orchestrator = StepOrchestrator::new(handle.clone());
        orchestrator
            .begin(PaymentMethod::Credit, Money::from_cents(2150), Value::Null)
            .await
            .unwrap();

        // Mode switch elsewhere dropped the snapshot.
        handle.show_welcome().await.unwrap();

        let context = orchestrator
            .advance(FlowStep::Cart, Content::new())
            .await
            .unwrap();
        let restart = surface.last_posted().unwrap();
        assert_eq!(restart.kind, MessageType::StartCustomerFlow);
        assert_eq!(restart.content["currentStep"], "rewards");
        assert_eq!(restart.flow_id.as_deref(), Some(context.flow_id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_window_closed_keeps_cart_and_tip() {
        let (surface, handle) = setup();
        let mut orchestrator = StepOrchestrator::new(handle.clone());
        orchestrator
            .begin(PaymentMethod::Credit, Money::from_cents(2150), json!({ "total": 2150 }))
            .await
            .unwrap();
        orchestrator.advance(FlowStep::Cart, Content::new()).await.unwrap();
        orchestrator.advance(FlowStep::Rewards, Content::new()).await.unwrap();
        orchestrator
            .advance(FlowStep::Tip, content(json!({ "tipAmount": 300 })))
            .await
            .unwrap();

        // The liveness poll notices the closed window and drops the snapshot.
        let first = surface.current_window().unwrap();
        surface.close_externally(first);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!handle.status().await.unwrap().has_flow_snapshot);

        let context = orchestrator
            .advance(FlowStep::Payment, Content::new())
            .await
            .unwrap();
        handle.status().await.unwrap();

        let second = surface.current_window().unwrap();
        assert_ne!(first, second);
        let restart = surface.posted_to(second).pop().unwrap();
        assert_eq!(restart.kind, MessageType::StartCustomerFlow);
        assert_eq!(restart.flow_id.as_deref(), Some(context.flow_id()));
        assert_eq!(restart.content["currentStep"], "receipt");
        assert_eq!(restart.content["cart"]["total"], 2150);
        assert_eq!(restart.content["tipAmount"], 300);
        assert_eq!(
            restart.content["currentPaymentAmount"],
            json!({ "base": 2150, "tip": 300 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_past_receipt_fails() {
        let (_surface, handle) = setup();
        let mut orchestrator = StepOrchestrator::new(handle);
        orchestrator
            .begin(PaymentMethod::Cash, Money::from_cents(500), Value::Null)
            .await
            .unwrap();

        let err = orchestrator
            .advance(FlowStep::Receipt, Content::new())
            .await
            .unwrap_err();
        assert!(err.is_state_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cash_payment_uses_direct_update() {
        let (surface, handle) = setup();
        let mut orchestrator = StepOrchestrator::new(handle.clone());
        orchestrator
            .begin(PaymentMethod::Cash, Money::from_cents(2150), Value::Null)
            .await
            .unwrap();

        orchestrator
            .publish_payment(&PaymentUpdate {
                method: PaymentMethod::Cash,
                amount_charged: Money::from_cents(2150),
                tip: Money::zero(),
                amount_paid: Money::from_cents(2150),
                remaining: Money::zero(),
                amount_due: Money::zero(),
                cash_tendered: Some(Money::from_cents(2500)),
                change: Some(Money::from_cents(350)),
            })
            .await
            .unwrap();

        let last = surface.last_posted().unwrap();
        assert_eq!(last.kind, MessageType::DirectCashUpdate);
        assert_eq!(last.content["change"], 350);
        assert_eq!(last.content["cashTendered"], 2500);

        let snapshot = handle.last_flow_snapshot().await.unwrap().unwrap();
        assert!(!snapshot.content.contains_key("change"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_removes_listener() {
        let (surface, handle) = setup();
        let mut orchestrator = StepOrchestrator::new(handle.clone());
        orchestrator
            .begin(PaymentMethod::Credit, Money::from_cents(2150), Value::Null)
            .await
            .unwrap();
        assert_eq!(handle.status().await.unwrap().listeners, 1);

        orchestrator.cancel(true).await.unwrap();

        assert!(!orchestrator.is_active());
        let status = handle.status().await.unwrap();
        assert_eq!(status.listeners, 0);
        assert!(!status.has_flow_snapshot);
        assert_eq!(surface.last_posted().unwrap().kind, MessageType::ShowWelcome);
        assert!(orchestrator.next_event().await.is_none());
    }
}
