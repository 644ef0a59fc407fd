//! # Payment Flow Controller
//!
//! The cashier-side state machine for one order's payment.
//!
//! ## View State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Payment Views                                     │
//! │                                                                         │
//! │                    ┌─────────────────┐                                  │
//! │                    │ InitialOptions  │                                  │
//! │                    └──┬─────┬─────┬──┘                                  │
//! │             forward   │     │     │   forward                           │
//! │            ┌──────────┘     │     └──────────┐                          │
//! │            ▼                ▼                ▼                          │
//! │       ┌────────┐       ┌────────┐       ┌────────┐                      │
//! │       │  Cash  │       │ Split  │       │ Credit │                      │
//! │       └───┬────┘       └─┬────┬─┘       └───┬────┘                      │
//! │           │    leg with  │    │  leg with   │                           │
//! │           │    amount ◄──┘    └──► amount   │                           │
//! │           │                                 │                           │
//! │           └──────────►┌────────────┐◄───────┘                           │
//! │                       │ Completion │  (terminal)                        │
//! │                       └────────────┘                                    │
//! │                                                                         │
//! │  back from Cash/Credit in split mode once fully paid ──► Completion     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Money Rules
//! - Tender only enters through [`PaymentFlowController::process_payment`],
//!   which appends to the [`TransactionLedger`].
//! - Completion recomputes every aggregate from the transaction list and
//!   refuses to call the backend unless the order is fully paid.
//! - No error path discards recorded tender.

use std::sync::Arc;

use checkout_core::validation::{
    compute_change, suggested_cash_tenders, validate_cash_tender, validate_order_id,
    validate_payment_amount, validate_split_leg, validate_tip,
};
use checkout_core::{
    is_payment_complete, CardInfo, CashDetails, CoreError, CreditDetails, FlowStep, LedgerTotals,
    MethodDetails, Money, PaymentMethod, SettlementMethod, SplitDetails, TenderRecord, Transaction,
    TransactionLedger, ValidationError, ViewId,
};
use checkout_display::{Content, DisplayChannelHandle};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cart::CartSnapshot;
use crate::collaborators::{
    CartContext, CompletionPayload, CompletionResult, OrderBackend, ReceiptPayload, ReceiptPrinter,
};
use crate::error::{FlowError, FlowResult};
use crate::notify::{FlowNotifier, Notice};
use crate::orchestrator::{CustomerEvent, PaymentUpdate, StepOrchestrator};

// =============================================================================
// Types
// =============================================================================

/// Navigation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavDirection {
    Forward,
    Backward,
}

impl NavDirection {
    /// Positive is forward, negative is backward, zero is neither.
    pub fn from_delta(delta: i32) -> Option<Self> {
        match delta.signum() {
            1 => Some(NavDirection::Forward),
            -1 => Some(NavDirection::Backward),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigateOptions {
    /// Explicit split-leg amount for a tender view.
    pub amount: Option<Money>,
}

impl NavigateOptions {
    pub fn leg(amount: Money) -> Self {
        NavigateOptions {
            amount: Some(amount),
        }
    }
}

/// Tender-specific input to [`PaymentFlowController::process_payment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentDetails {
    pub tip: Money,
    pub method_details: MethodDetails,
}

impl PaymentDetails {
    pub fn cash(cash_tendered: Money, change: Money) -> Self {
        PaymentDetails {
            tip: Money::zero(),
            method_details: MethodDetails::Cash(CashDetails {
                cash_tendered,
                change,
            }),
        }
    }

    pub fn credit(card_info: Option<CardInfo>, transaction_id: Option<String>) -> Self {
        PaymentDetails {
            tip: Money::zero(),
            method_details: MethodDetails::Credit(CreditDetails {
                card_info,
                transaction_id,
            }),
        }
    }

    pub fn with_tip(mut self, tip: Money) -> Self {
        self.tip = tip;
        self
    }

    pub fn method(&self) -> PaymentMethod {
        self.method_details.method()
    }
}

/// Navigation and order context of the running payment.
///
/// Money lives in the ledger; see [`PaymentFlowController::ledger`].
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentState {
    pub order_id: String,
    pub current_view: ViewId,
    pub view_history: Vec<ViewId>,
    pub payment_method: Option<PaymentMethod>,
    pub split_mode: bool,
    /// What the tender view currently shown is collecting.
    pub step_amount_due: Money,
    pub discount_id: Option<String>,
    pub discount_amount: Option<Money>,
    pub completion_result: Option<CompletionResult>,
}

impl PaymentState {
    fn new(order_id: String, cart: &CartSnapshot) -> Self {
        PaymentState {
            order_id,
            current_view: ViewId::InitialOptions,
            view_history: Vec::new(),
            payment_method: None,
            split_mode: false,
            step_amount_due: cart.total(),
            discount_id: cart.discount.as_ref().map(|d| d.id.clone()),
            discount_amount: cart.discount.as_ref().map(|d| d.amount),
            completion_result: None,
        }
    }

    fn push_view(&mut self, view: ViewId) {
        self.view_history.push(self.current_view);
        self.current_view = view;
    }
}

/// What handling a customer event led to.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomerOutcome {
    /// The display moved on to this step.
    Advanced(FlowStep),
    /// A card tender was recorded.
    Paid { fully_paid: bool },
    /// The order was completed.
    Completed(CompletionResult),
    RewardsRegistered,
    Ignored,
}

/// External services the controller depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub cart: Arc<dyn CartContext>,
    pub backend: Arc<dyn OrderBackend>,
    pub printer: Arc<dyn ReceiptPrinter>,
    pub notifier: Arc<dyn FlowNotifier>,
}

// =============================================================================
// Controller
// =============================================================================

/// Cashier-side payment state machine.
///
/// ## Usage
/// ```rust,ignore
/// let mut controller = PaymentFlowController::new(display, collaborators);
/// controller.start_payment().await?;
/// controller
///     .navigate(ViewId::Cash, NavDirection::Forward, NavigateOptions::default())
///     .await?;
///
/// if controller.process_cash_tender(Money::from_cents(2500)).await? {
///     controller.finalize_cash_payment(true).await?;
/// }
/// ```
pub struct PaymentFlowController {
    display: DisplayChannelHandle,
    orchestrator: StepOrchestrator,
    cart: Arc<dyn CartContext>,
    backend: Arc<dyn OrderBackend>,
    printer: Arc<dyn ReceiptPrinter>,
    notifier: Arc<dyn FlowNotifier>,

    ledger: TransactionLedger,
    state: Option<PaymentState>,
    cart_snapshot: CartSnapshot,
}

impl PaymentFlowController {
    pub fn new(display: DisplayChannelHandle, collaborators: Collaborators) -> Self {
        PaymentFlowController {
            orchestrator: StepOrchestrator::new(display.clone()),
            display,
            cart: collaborators.cart,
            backend: collaborators.backend,
            printer: collaborators.printer,
            notifier: collaborators.notifier,
            ledger: TransactionLedger::new(Money::zero()),
            state: None,
            cart_snapshot: CartSnapshot::default(),
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn state(&self) -> Option<&PaymentState> {
        self.state.as_ref()
    }

    pub fn ledger(&self) -> &TransactionLedger {
        &self.ledger
    }

    pub fn current_view(&self) -> Option<ViewId> {
        self.state.as_ref().map(|s| s.current_view)
    }

    pub fn amount_paid(&self) -> Money {
        self.ledger.amount_paid()
    }

    pub fn remaining(&self) -> Money {
        self.ledger.remaining()
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.ledger.transactions()
    }

    pub fn split_details(&self) -> Option<&SplitDetails> {
        self.ledger.split_details()
    }

    pub fn orchestrator(&self) -> &StepOrchestrator {
        &self.orchestrator
    }

    /// `paid >= total_due - epsilon` for the running order.
    pub fn is_payment_complete(&self, paid: Money) -> bool {
        is_payment_complete(paid, self.ledger.total_due())
    }

    /// Quick-tender buttons for the current cash view.
    pub fn suggested_tenders(&self) -> Vec<Money> {
        self.state
            .as_ref()
            .map(|s| suggested_cash_tenders(s.step_amount_due))
            .unwrap_or_default()
    }

    // -------------------------------------------------------------------------
    // Error reporting
    // -------------------------------------------------------------------------

    fn report(&self, err: &FlowError) {
        if err.is_state_error() {
            error!(
                view = ?self.current_view(),
                amount_paid = %self.ledger.amount_paid(),
                order_id = ?self.state.as_ref().map(|s| s.order_id.as_str()),
                error = %err,
                "Payment flow state error"
            );
        } else {
            warn!(error = %err, "Payment flow operation failed");
        }
        self.notifier.notify(Notice::from_error(err));
    }

    fn reported<T>(&self, result: FlowResult<T>) -> FlowResult<T> {
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }

    /// Display updates never block the cashier.
    fn soft<T>(&self, result: FlowResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Customer display not updated");
                self.notifier.notify(Notice::from_error(&e));
                None
            }
        }
    }

    fn require(&self, operation: &str) -> FlowResult<&PaymentState> {
        self.state
            .as_ref()
            .ok_or_else(|| FlowError::state(operation, "no payment in progress"))
    }

    fn require_mut(&mut self, operation: &str) -> FlowResult<&mut PaymentState> {
        self.state
            .as_mut()
            .ok_or_else(|| FlowError::state(operation, "no payment in progress"))
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Binds a new payment to the active cart. Returns the total due.
    pub async fn start_payment(&mut self) -> FlowResult<Money> {
        let result = self.start_payment_inner().await;
        self.reported(result)
    }

    async fn start_payment_inner(&mut self) -> FlowResult<Money> {
        if let Some(state) = &self.state {
            if !self.ledger.is_empty() && state.completion_result.is_none() {
                return Err(FlowError::state(
                    "start payment",
                    format!("order {} has recorded tender", state.order_id),
                ));
            }
        }

        let snapshot = self.cart.snapshot();
        let order_id = validate_order_id(snapshot.order_id.as_deref())?;
        let total = snapshot.total();
        validate_payment_amount(total)?;

        let cancelled = self.orchestrator.cancel(false).await;
        self.soft(cancelled);

        self.ledger.reset(total);
        self.state = Some(PaymentState::new(order_id.clone(), &snapshot));
        let cart_value = snapshot.to_display_value();
        self.cart_snapshot = snapshot;

        info!(order_id = %order_id, total = %total, "Payment started");
        let shown = self.display.display_cart(cart_value).await;
        self.soft(shown.map_err(FlowError::from));
        Ok(total)
    }

    /// Abandons a payment that has no tender yet.
    pub async fn cancel_payment(&mut self) -> FlowResult<()> {
        let result = self.cancel_payment_inner().await;
        self.reported(result)
    }

    async fn cancel_payment_inner(&mut self) -> FlowResult<()> {
        let order_id = self.require("cancel payment")?.order_id.clone();
        if !self.ledger.is_empty() {
            return Err(FlowError::state(
                "cancel payment",
                format!("{} tender(s) already recorded", self.ledger.transactions().len()),
            ));
        }

        let cancelled = self.orchestrator.cancel(false).await;
        self.soft(cancelled);
        self.state = None;
        self.ledger.reset(Money::zero());

        info!(order_id = %order_id, "Payment cancelled");
        self.show_cart_inner().await
    }

    /// Clears everything for the next customer.
    pub async fn start_new_order(&mut self) -> FlowResult<()> {
        let result = self.start_new_order_inner().await;
        self.reported(result)
    }

    async fn start_new_order_inner(&mut self) -> FlowResult<()> {
        if let Some(state) = &self.state {
            if !self.ledger.is_empty() && state.completion_result.is_none() {
                return Err(FlowError::state(
                    "start new order",
                    format!("order {} has tender that was never completed", state.order_id),
                ));
            }
        }

        let cancelled = self.orchestrator.cancel(true).await;
        self.soft(cancelled);
        self.state = None;
        self.ledger.reset(Money::zero());
        self.cart_snapshot = CartSnapshot::default();
        info!("Ready for next order");
        Ok(())
    }

    /// Mirrors the current cart on the idle display.
    pub async fn show_cart_on_display(&self) -> FlowResult<()> {
        let result = self.show_cart_inner().await;
        self.reported(result)
    }

    async fn show_cart_inner(&self) -> FlowResult<()> {
        self.display
            .display_cart(self.cart.snapshot().to_display_value())
            .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    /// Moves between payment views. Returns the view now shown.
    pub async fn navigate(
        &mut self,
        target: ViewId,
        direction: NavDirection,
        options: NavigateOptions,
    ) -> FlowResult<ViewId> {
        let result = match direction {
            NavDirection::Forward => self.navigate_forward(target, options).await,
            NavDirection::Backward => self.navigate_back().await,
        };
        self.reported(result)
    }

    /// Re-entering the open tender view with a new leg amount re-prices it;
    /// without one, or with the same amount, nothing changes.
    async fn reprice_current_view(&mut self, view: ViewId, options: NavigateOptions) -> FlowResult<ViewId> {
        let (Some(leg), Some(method)) = (options.amount, view.tender_method()) else {
            return Ok(view);
        };
        let state = self.require("navigate")?;
        if leg == state.step_amount_due {
            return Ok(view);
        }

        validate_split_leg(leg, self.ledger.remaining())?;
        self.require_mut("navigate")?.step_amount_due = leg;
        info!(view = %view, amount_due = %leg, "Tender view re-priced");

        let cart = self.cart_snapshot.to_display_value();
        let begun = self.orchestrator.begin(method, leg, cart).await;
        self.soft(begun);
        Ok(view)
    }

    async fn navigate_forward(&mut self, target: ViewId, options: NavigateOptions) -> FlowResult<ViewId> {
        let state = self.require("navigate")?;
        let current = state.current_view;
        let split_mode = state.split_mode;

        if current == target {
            return self.reprice_current_view(current, options).await;
        }
        if current == ViewId::Completion {
            return Err(FlowError::state("navigate", "payment is already complete"));
        }

        match target {
            ViewId::Cash | ViewId::Credit => {
                let remaining = self.ledger.remaining();
                let amount_due = match options.amount {
                    Some(leg) => {
                        validate_split_leg(leg, remaining)?;
                        leg
                    }
                    None => remaining,
                };
                validate_payment_amount(amount_due)?;

                let leaving_options = current == ViewId::InitialOptions;
                if leaving_options {
                    self.ledger.disable_split()?;
                }

                let method = match target.tender_method() {
                    Some(method) => method,
                    None => return Err(FlowError::state("navigate", "not a tender view")),
                };
                let state = self.require_mut("navigate")?;
                state.push_view(target);
                state.payment_method = Some(method);
                state.step_amount_due = amount_due;
                if leaving_options {
                    state.split_mode = false;
                }

                info!(view = %target, amount_due = %amount_due, split = split_mode && !leaving_options, "Entered tender view");
                let cart = self.cart_snapshot.to_display_value();
                let begun = self.orchestrator.begin(method, amount_due, cart).await;
                self.soft(begun);
            }
            ViewId::Split => {
                self.ledger.enable_split()?;
                let remaining = self.ledger.remaining();
                let state = self.require_mut("navigate")?;
                state.push_view(ViewId::Split);
                state.split_mode = true;
                state.payment_method = None;
                state.step_amount_due = remaining;
                info!(remaining = %remaining, "Entered split payment");
            }
            ViewId::Completion => {
                if !self.ledger.is_fully_paid() {
                    return Err(CoreError::NotFullyPaid {
                        paid: self.ledger.amount_paid(),
                        due: self.ledger.total_due(),
                    }
                    .into());
                }
                self.require_mut("navigate")?.push_view(ViewId::Completion);
            }
            ViewId::InitialOptions => {
                if !self.ledger.is_empty() {
                    return Err(FlowError::state(
                        "restart payment",
                        "tender is already recorded",
                    ));
                }
                self.ledger.disable_split()?;
                let total = self.ledger.total_due();
                let state = self.require_mut("navigate")?;
                state.view_history.clear();
                state.current_view = ViewId::InitialOptions;
                state.payment_method = None;
                state.split_mode = false;
                state.step_amount_due = total;

                let cancelled = self.orchestrator.cancel(false).await;
                self.soft(cancelled);
            }
        }

        Ok(target)
    }

    async fn navigate_back(&mut self) -> FlowResult<ViewId> {
        let state = self.require("navigate back")?;
        let current = state.current_view;
        let split_mode = state.split_mode;
        let previous = state
            .view_history
            .last()
            .copied()
            .unwrap_or(ViewId::InitialOptions);

        // A finished split leg must not be re-entered.
        if split_mode && current.is_tender_view() && self.ledger.is_fully_paid() {
            info!(from = %current, "Split fully paid, continuing to completion");
            self.require_mut("navigate back")?
                .push_view(ViewId::Completion);
            return Ok(ViewId::Completion);
        }

        if current == ViewId::Completion {
            return Err(FlowError::state("navigate back", "payment is already complete"));
        }
        if previous == ViewId::InitialOptions {
            self.ledger.disable_split()?;
        }

        let remaining = self.ledger.remaining();
        let state = self.require_mut("navigate back")?;
        state.view_history.pop();
        state.current_view = previous;
        match previous {
            ViewId::InitialOptions => {
                state.payment_method = None;
                state.split_mode = false;
                state.step_amount_due = remaining;
            }
            ViewId::Split => {
                state.payment_method = None;
                state.step_amount_due = remaining;
            }
            _ => {}
        }
        debug!(from = %current, to = %previous, "Navigated back");

        if current.is_tender_view() {
            let cancelled = self.orchestrator.cancel(false).await;
            self.soft(cancelled);
            let shown = self.show_cart_inner().await;
            self.soft(shown);
        }
        Ok(previous)
    }

    // -------------------------------------------------------------------------
    // Tender
    // -------------------------------------------------------------------------

    /// Records one tender. Returns whether the whole order is now paid.
    pub async fn process_payment(
        &mut self,
        amount_charged: Money,
        details: PaymentDetails,
    ) -> FlowResult<bool> {
        let result = self.process_payment_inner(amount_charged, details).await;
        self.reported(result)
    }

    /// Cash tender against the amount due in the current view ("exact
    /// amount" control); change is computed here.
    pub async fn process_cash_tender(&mut self, tendered: Money) -> FlowResult<bool> {
        let result = self.cash_tender_inner(tendered).await;
        self.reported(result)
    }

    async fn cash_tender_inner(&mut self, tendered: Money) -> FlowResult<bool> {
        let due = self.require("take cash")?.step_amount_due;
        let change = compute_change(tendered, due)?;
        self.process_payment_inner(due, PaymentDetails::cash(tendered, change))
            .await
    }

    async fn process_payment_inner(
        &mut self,
        amount_charged: Money,
        details: PaymentDetails,
    ) -> FlowResult<bool> {
        let state = self.require("process payment")?;
        if state.completion_result.is_some() || state.current_view == ViewId::Completion {
            return Err(FlowError::state("process payment", "payment is already complete"));
        }
        let order_id = state.order_id.clone();

        validate_payment_amount(amount_charged)?;
        validate_tip(details.tip, amount_charged)?;

        let remaining = self.ledger.remaining();
        if remaining.is_zero() {
            return Err(FlowError::state("process payment", "order is already fully paid"));
        }
        let base = (amount_charged - details.tip).clamp_non_negative();
        if self.ledger.is_split() {
            validate_split_leg(base, remaining)?;
        } else if base > remaining {
            return Err(ValidationError::ExceedsRemaining {
                field: "payment amount".to_string(),
                remaining,
                actual: base,
            }
            .into());
        }

        let (cash_tendered, change) = match &details.method_details {
            MethodDetails::Cash(cash) => {
                validate_cash_tender(cash.cash_tendered, amount_charged)?;
                (Some(cash.cash_tendered), Some(cash.change))
            }
            MethodDetails::Credit(_) => (None, None),
        };

        let method = details.method();
        let tip = details.tip;
        let transaction_id = self
            .ledger
            .append(TenderRecord {
                amount_charged,
                tip,
                details: details.method_details,
            })?
            .id
            .clone();

        let fully_paid = self.ledger.is_fully_paid();
        let remaining = self.ledger.remaining();
        let split = self.ledger.is_split();
        let state = self.require_mut("process payment")?;
        // A partial tender leaves the view collecting only what is still owed.
        state.step_amount_due = if split {
            (state.step_amount_due - base).clamp_non_negative().min(remaining)
        } else {
            remaining
        };
        let amount_due = state.step_amount_due;

        info!(
            order_id = %order_id,
            transaction_id = %transaction_id,
            method = %method,
            amount = %amount_charged,
            tip = %tip,
            amount_paid = %self.ledger.amount_paid(),
            remaining = %remaining,
            amount_due = %amount_due,
            fully_paid,
            "Tender recorded"
        );

        let update = PaymentUpdate {
            method,
            amount_charged,
            tip,
            amount_paid: self.ledger.amount_paid(),
            remaining,
            amount_due,
            cash_tendered,
            change,
        };
        let published = self.orchestrator.publish_payment(&update).await;
        self.soft(published);

        if fully_paid {
            self.notifier.notify(Notice::success("Order fully paid"));
        } else {
            self.notifier
                .notify(Notice::info(format!("{remaining} remaining")));
        }
        Ok(fully_paid)
    }

    // -------------------------------------------------------------------------
    // Completion
    // -------------------------------------------------------------------------

    /// Finalizes the order with the backend.
    ///
    /// Aggregates are recomputed from `transactions`. Fails with a state error,
    /// without calling the backend, unless they cover the total due. A backend
    /// failure leaves the ledger as it was, so calling again is safe.
    pub async fn complete_payment_flow(
        &mut self,
        transactions: &[Transaction],
    ) -> FlowResult<CompletionResult> {
        let result = self.complete_inner(transactions).await;
        self.reported(result)
    }

    async fn complete_inner(&mut self, transactions: &[Transaction]) -> FlowResult<CompletionResult> {
        let state = self.require("complete payment")?;
        if let Some(result) = &state.completion_result {
            return Ok(result.clone());
        }
        let order_id = state.order_id.clone();

        let totals = LedgerTotals::from_transactions(transactions);
        let due = self.ledger.total_due();
        if !is_payment_complete(totals.base_amount_paid, due) {
            return Err(CoreError::NotFullyPaid {
                paid: totals.base_amount_paid,
                due,
            }
            .into());
        }

        let method = if self.ledger.is_split() {
            SettlementMethod::Split
        } else {
            match transactions.first() {
                Some(tx) => SettlementMethod::from(tx.method),
                None => return Err(FlowError::state("complete payment", "no tender recorded")),
            }
        };

        let payload =
            CompletionPayload::new(transactions.to_vec(), totals, method, &self.cart_snapshot);
        info!(
            order_id = %order_id,
            total_paid = %payload.total_paid,
            tip = %payload.total_tip_amount,
            method = ?method,
            "Completing order"
        );
        let result = self
            .backend
            .complete_order(&order_id, &payload)
            .await
            .map_err(|e| FlowError::network("order backend", e))?;

        let state = self.require_mut("complete payment")?;
        state.completion_result = Some(result.clone());
        if state.current_view != ViewId::Completion {
            state.push_view(ViewId::Completion);
        }

        let on_receipt = self
            .orchestrator
            .context()
            .map_or(true, |ctx| ctx.step() == FlowStep::Receipt);
        if !on_receipt {
            let mut receipt = Content::new();
            receipt.insert("completion".into(), result.0.clone());
            let shown = self.orchestrator.advance(FlowStep::Payment, receipt).await;
            self.soft(shown);
        }
        let ended = self.orchestrator.cancel(false).await;
        self.soft(ended);

        self.notifier
            .notify(Notice::success(format!("Order {order_id} completed")));
        Ok(result)
    }

    /// Prints the receipt (optionally opening the drawer), then completes.
    ///
    /// A printer failure is retryable and leaves the ledger untouched.
    pub async fn finalize_cash_payment(&mut self, open_drawer: bool) -> FlowResult<CompletionResult> {
        let result = self.finalize_cash_inner(open_drawer).await;
        self.reported(result)
    }

    async fn finalize_cash_inner(&mut self, open_drawer: bool) -> FlowResult<CompletionResult> {
        let state = self.require("finalize cash payment")?;
        if let Some(result) = &state.completion_result {
            return Ok(result.clone());
        }
        if !self.ledger.is_fully_paid() {
            return Err(CoreError::NotFullyPaid {
                paid: self.ledger.amount_paid(),
                due: self.ledger.total_due(),
            }
            .into());
        }

        let transactions = self.ledger.transactions().to_vec();
        let totals = LedgerTotals::from_transactions(&transactions);
        let change = transactions
            .iter()
            .filter_map(|tx| match &tx.method_details {
                MethodDetails::Cash(cash) => Some(cash.change),
                MethodDetails::Credit(_) => None,
            })
            .sum();
        let receipt = ReceiptPayload {
            order_id: state.order_id.clone(),
            items: self.cart_snapshot.items.clone(),
            transactions: transactions.clone(),
            total_due: self.ledger.total_due(),
            total_paid: totals.total_paid,
            total_tip_amount: totals.total_tip_amount,
            change,
            printed_at: Utc::now(),
        };

        self.printer
            .print_receipt(&receipt, open_drawer)
            .await
            .map_err(|e| FlowError::network("receipt printer", e))?;
        debug!(order_id = %receipt.order_id, open_drawer, "Receipt printed");

        self.complete_inner(&transactions).await
    }

    // -------------------------------------------------------------------------
    // Customer events
    // -------------------------------------------------------------------------

    /// Next customer action for the running flow.
    pub async fn next_customer_event(&mut self) -> Option<CustomerEvent> {
        self.orchestrator.next_event().await
    }

    /// Applies what the customer did on the display.
    pub async fn handle_customer_event(&mut self, event: CustomerEvent) -> FlowResult<CustomerOutcome> {
        let result = self.handle_event_inner(event).await;
        self.reported(result)
    }

    async fn handle_event_inner(&mut self, event: CustomerEvent) -> FlowResult<CustomerOutcome> {
        if self.state.is_none() {
            debug!("Customer event with no payment in progress");
            return Ok(CustomerOutcome::Ignored);
        }

        match event {
            CustomerEvent::StepCompleted {
                context,
                step,
                data,
            } => match (context.method(), step) {
                (PaymentMethod::Credit, FlowStep::Payment) => {
                    let tip = context.money("tipAmount").unwrap_or_else(Money::zero);
                    let amount = money_field(&data, "amountCharged")
                        .unwrap_or_else(|| context.amount_due() + tip);
                    let card_info = data
                        .get("cardInfo")
                        .and_then(|v| serde_json::from_value::<CardInfo>(v.clone()).ok());
                    let transaction_id = data
                        .get("transactionId")
                        .and_then(Value::as_str)
                        .map(str::to_string);

                    let details = PaymentDetails::credit(card_info, transaction_id).with_tip(tip);
                    let fully_paid = self.process_payment_inner(amount, details).await?;
                    if fully_paid {
                        let shown = self.orchestrator.advance(FlowStep::Payment, Content::new()).await;
                        self.soft(shown);
                    } else {
                        let ended = self.orchestrator.cancel(false).await;
                        self.soft(ended);
                    }
                    Ok(CustomerOutcome::Paid { fully_paid })
                }
                (_, FlowStep::Receipt) => {
                    let transactions = self.ledger.transactions().to_vec();
                    let result = self.complete_inner(&transactions).await?;
                    Ok(CustomerOutcome::Completed(result))
                }
                (PaymentMethod::Cash, FlowStep::Payment) => {
                    debug!("Cash is tendered at the register, ignoring display payment step");
                    Ok(CustomerOutcome::Ignored)
                }
                (_, step) => {
                    let next = self.orchestrator.advance(step, data).await?;
                    Ok(CustomerOutcome::Advanced(next.step()))
                }
            },
            CustomerEvent::RewardsRegistered { context, data } => {
                info!(flow_id = %context.flow_id(), "Customer registered for rewards");
                self.notifier
                    .notify(Notice::info("Customer registered for rewards"));
                if context.step() == FlowStep::Rewards {
                    let next = self.orchestrator.advance(FlowStep::Rewards, data).await?;
                    return Ok(CustomerOutcome::Advanced(next.step()));
                }
                Ok(CustomerOutcome::RewardsRegistered)
            }
        }
    }
}

fn money_field(data: &Content, key: &str) -> Option<Money> {
    data.get(key).and_then(Value::as_i64).map(Money::from_cents)
}

// =============================================================================
// Unit Tests
// =============================================================================
