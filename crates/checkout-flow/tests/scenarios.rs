//! End-to-end checkout scenarios.
//!
//! Validates:
//! - A $21.50 order split into $10.00 + $11.50 legs settles as a split.
//! - Exact cash: $25.00 tendered against $21.50 gives $3.50 change.
//! - Flow updates carry a superset of the cached snapshot.
//! - A display the customer closed is reopened with the flow snapshot intact.
//! - Completion is refused, without calling the backend, until fully paid.
//! - Amount paid always equals the sum of recorded base amounts.
//! - Amount paid never decreases and completion is idempotent.
//! - Backing out of a paid split leg lands on completion.

use std::sync::Arc;

use checkout_core::{FlowStep, Money, PaymentMethod, SettlementMethod, ViewId};
use checkout_display::{
    merge_flow_update, Content, CustomerDisplayChannel, DisplayChannelHandle, DisplayConfig,
    FlowMessage, InMemorySurface, MessageType,
};
use checkout_flow::{
    CartLine, Collaborators, FlowError, NavDirection, NavigateOptions, NoticeLevel,
    PaymentDetails, PaymentFlowController, RecordingNotifier, RecordingOrderBackend,
    RecordingPrinter, SharedCart,
};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ORIGIN: &str = "http://localhost:1420";

struct Checkout {
    controller: PaymentFlowController,
    display: DisplayChannelHandle,
    surface: InMemorySurface,
    backend: RecordingOrderBackend,
    printer: RecordingPrinter,
    notifier: Arc<RecordingNotifier>,
}

/// Coffee x3 + muffin x2 = $21.50.
fn checkout() -> Checkout {
    let surface = InMemorySurface::new(ORIGIN).with_auto_ready();
    let display =
        CustomerDisplayChannel::spawn(DisplayConfig::default(), Arc::new(surface.clone())).unwrap();

    let cart = SharedCart::new();
    cart.set_order_id("order-42");
    cart.add_line(CartLine::new("COFFEE", "Coffee", Money::from_cents(450), 3));
    cart.add_line(CartLine::new("MUFFIN", "Muffin", Money::from_cents(400), 2));

    let backend = RecordingOrderBackend::new();
    let printer = RecordingPrinter::new();
    let notifier = Arc::new(RecordingNotifier::new());
    let controller = PaymentFlowController::new(
        display.clone(),
        Collaborators {
            cart: Arc::new(cart),
            backend: Arc::new(backend.clone()),
            printer: Arc::new(printer.clone()),
            notifier: notifier.clone(),
        },
    );

    Checkout {
        controller,
        display,
        surface,
        backend,
        printer,
        notifier,
    }
}

fn content(value: Value) -> Content {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

async fn go(controller: &mut PaymentFlowController, view: ViewId, leg: Option<i64>) {
    let options = NavigateOptions {
        amount: leg.map(Money::from_cents),
    };
    controller
        .navigate(view, NavDirection::Forward, options)
        .await
        .unwrap();
}

async fn back(controller: &mut PaymentFlowController) -> ViewId {
    controller
        .navigate(ViewId::Split, NavDirection::Backward, NavigateOptions::default())
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn split_tender_settles_in_two_legs() {
    let mut c = checkout();
    assert_eq!(c.controller.start_payment().await.unwrap().cents(), 2150);
    go(&mut c.controller, ViewId::Split, None).await;

    go(&mut c.controller, ViewId::Cash, Some(1000)).await;
    assert!(!c.controller.process_cash_tender(Money::from_cents(1000)).await.unwrap());
    assert_eq!(c.controller.remaining().cents(), 1150);
    assert_eq!(back(&mut c.controller).await, ViewId::Split);

    go(&mut c.controller, ViewId::Credit, Some(1150)).await;
    let paid = c
        .controller
        .process_payment(
            Money::from_cents(1150),
            PaymentDetails::credit(None, Some("txn-2".into())),
        )
        .await
        .unwrap();
    assert!(paid);
    assert_eq!(c.controller.remaining(), Money::zero());

    let split = c.controller.split_details().unwrap();
    assert_eq!(split.completed_splits.len(), 2);
    assert_eq!(split.remaining_amount, Money::zero());
    assert_eq!(split.completed_splits[0].method, PaymentMethod::Cash);
    assert_eq!(split.completed_splits[1].amount.cents(), 1150);

    let transactions = c.controller.transactions().to_vec();
    c.controller.complete_payment_flow(&transactions).await.unwrap();
    let (order_id, payload) = c.backend.last_call().unwrap();
    assert_eq!(order_id, "order-42");
    assert_eq!(payload.payment_method, SettlementMethod::Split);
    assert_eq!(payload.total_paid.cents(), 2150);
    assert_eq!(payload.transactions.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn exact_cash_gives_change() {
    let mut c = checkout();
    c.controller.start_payment().await.unwrap();
    go(&mut c.controller, ViewId::Cash, None).await;

    assert!(c
        .controller
        .suggested_tenders()
        .contains(&Money::from_cents(2500)));
    assert!(c.controller.process_cash_tender(Money::from_cents(2500)).await.unwrap());

    // The tender is mirrored straight to the display.
    let direct = c
        .surface
        .posted()
        .into_iter()
        .map(|p| p.message)
        .filter(|m| m.kind == MessageType::DirectCashUpdate)
        .last()
        .unwrap();
    assert_eq!(direct.content["cashTendered"], 2500);
    assert_eq!(direct.content["change"], 350);

    c.controller.finalize_cash_payment(true).await.unwrap();
    let printed = c.printer.printed();
    assert_eq!(printed.len(), 1);
    assert_eq!(printed[0].0.change.cents(), 350);
    assert_eq!(printed[0].0.total_paid.cents(), 2150);
    assert_eq!(c.backend.last_call().unwrap().1.payment_method, SettlementMethod::Cash);
    assert_eq!(c.controller.current_view(), Some(ViewId::Completion));
}

#[test]
fn flow_update_is_superset_of_snapshot() {
    let base = content(json!({
        "currentStep": "tip",
        "paymentMethod": "credit",
        "cart": { "total": 2150, "items": [{ "sku": "COFFEE" }] },
        "currentPaymentAmount": { "base": 2150, "tip": 0 },
    }));
    let payload = content(json!({
        "tipAmount": 300,
        "currentPaymentAmount": { "tip": 300 },
        "orderId": null,
    }));

    let merged = merge_flow_update(&base, FlowStep::Payment, &payload);

    for key in base.keys() {
        assert!(merged.contains_key(key), "{key} lost in merge");
    }
    assert_eq!(merged["currentStep"], "payment");
    assert_eq!(merged["tipAmount"], 300);
    assert_eq!(merged["currentPaymentAmount"], json!({ "base": 2150, "tip": 300 }));
    assert_eq!(merged["cart"]["items"][0]["sku"], "COFFEE");
    assert!(!merged.contains_key("orderId"));
}

#[tokio::test(start_paused = true)]
async fn closed_display_reopens_with_flow_snapshot() {
    let mut c = checkout();
    c.controller.start_payment().await.unwrap();
    go(&mut c.controller, ViewId::Credit, None).await;
    c.display.status().await.unwrap();

    let first = c.surface.current_window().unwrap();
    c.surface.close_externally(first);

    // The next update notices the dead window before the liveness poll does.
    c.controller
        .process_payment(Money::from_cents(1000), PaymentDetails::credit(None, None))
        .await
        .unwrap();
    let status = c.display.status().await.unwrap();

    assert_eq!(c.surface.open_count(), 2);
    let second = c.surface.current_window().unwrap();
    assert_ne!(first, second);
    assert!(status.has_flow_snapshot);

    let replayed = c.surface.posted_to(second);
    let update = replayed
        .iter()
        .find(|m| m.kind == MessageType::UpdateCustomerFlow)
        .unwrap();
    assert_eq!(update.content["paymentMethod"], "credit");
    assert_eq!(update.content["cart"]["total"], 2150);
    assert_eq!(update.content["totalRemainingAmount"]["remaining"], 1150);
    assert_eq!(c.controller.amount_paid().cents(), 1000);
}

#[tokio::test(start_paused = true)]
async fn completion_refused_until_fully_paid() {
    let mut c = checkout();
    c.controller.start_payment().await.unwrap();
    go(&mut c.controller, ViewId::Split, None).await;
    go(&mut c.controller, ViewId::Cash, Some(1000)).await;
    c.controller
        .process_cash_tender(Money::from_cents(2000))
        .await
        .unwrap();

    let transactions = c.controller.transactions().to_vec();
    let err = c
        .controller
        .complete_payment_flow(&transactions)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::State { .. }));
    assert_eq!(c.backend.call_count(), 0);

    let err = c.controller.finalize_cash_payment(false).await.unwrap_err();
    assert!(err.is_state_error());
    assert!(c.printer.printed().is_empty());

    // Jumping straight to completion is refused as well.
    let err = c
        .controller
        .navigate(ViewId::Completion, NavDirection::Forward, NavigateOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_state_error());
    assert_eq!(c.notifier.count(NoticeLevel::Error), 3);
    assert_eq!(c.controller.amount_paid().cents(), 1000);
}

#[tokio::test(start_paused = true)]
async fn amount_paid_is_sum_of_base_amounts() {
    let mut c = checkout();
    c.controller.start_payment().await.unwrap();
    go(&mut c.controller, ViewId::Split, None).await;

    let legs = [
        (ViewId::Cash, 500, 0),
        (ViewId::Credit, 700, 150),
        (ViewId::Credit, 950, 0),
    ];
    for (view, base, tip) in legs {
        go(&mut c.controller, view, Some(base)).await;
        let details = match view {
            ViewId::Cash => PaymentDetails::cash(Money::from_cents(base), Money::zero()),
            _ => PaymentDetails::credit(None, None).with_tip(Money::from_cents(tip)),
        };
        c.controller
            .process_payment(Money::from_cents(base + tip), details)
            .await
            .unwrap();

        let sum: Money = c
            .controller
            .transactions()
            .iter()
            .map(|tx| tx.base_amount_paid)
            .sum();
        assert_eq!(c.controller.amount_paid(), sum);
        assert!(c.controller.ledger().is_consistent());
        back(&mut c.controller).await;
    }

    let totals = c.controller.ledger().totals();
    assert_eq!(totals.base_amount_paid.cents(), 2150);
    assert_eq!(totals.total_tip_amount.cents(), 150);
    assert_eq!(totals.total_paid.cents(), 2300);
}

#[tokio::test(start_paused = true)]
async fn amount_paid_is_monotonic_and_completion_idempotent() {
    let mut c = checkout();
    c.controller.start_payment().await.unwrap();
    go(&mut c.controller, ViewId::Split, None).await;

    let mut previous = Money::zero();
    for cents in [300, 850, 1000] {
        go(&mut c.controller, ViewId::Cash, Some(cents)).await;
        c.controller
            .process_cash_tender(Money::from_cents(cents))
            .await
            .unwrap();
        assert!(c.controller.amount_paid() >= previous);
        previous = c.controller.amount_paid();

        // Rejected input never moves the total backwards.
        let rejected = c
            .controller
            .process_payment(Money::from_cents(-100), PaymentDetails::credit(None, None))
            .await;
        assert!(rejected.is_err());
        assert_eq!(c.controller.amount_paid(), previous);
        back(&mut c.controller).await;
    }
    assert!(c.controller.is_payment_complete(previous));

    let transactions = c.controller.transactions().to_vec();
    let first = c.controller.complete_payment_flow(&transactions).await.unwrap();
    let second = c.controller.complete_payment_flow(&transactions).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(c.backend.call_count(), 1);

    let over = c
        .controller
        .process_payment(Money::from_cents(100), PaymentDetails::credit(None, None))
        .await;
    assert!(over.is_err());
    assert_eq!(c.controller.amount_paid().cents(), 2150);
}

#[tokio::test(start_paused = true)]
async fn back_from_paid_split_leg_goes_to_completion() {
    let mut c = checkout();
    c.controller.start_payment().await.unwrap();
    go(&mut c.controller, ViewId::Split, None).await;

    go(&mut c.controller, ViewId::Credit, Some(1000)).await;
    c.controller
        .process_payment(Money::from_cents(1000), PaymentDetails::credit(None, None))
        .await
        .unwrap();
    assert_eq!(back(&mut c.controller).await, ViewId::Split);

    go(&mut c.controller, ViewId::Cash, None).await;
    assert_eq!(c.controller.state().unwrap().step_amount_due.cents(), 1150);
    c.controller
        .process_cash_tender(Money::from_cents(2000))
        .await
        .unwrap();

    assert_eq!(back(&mut c.controller).await, ViewId::Completion);
    let state = c.controller.state().unwrap();
    assert_eq!(state.current_view, ViewId::Completion);
    assert!(state.split_mode);
    assert_eq!(state.view_history.last(), Some(&ViewId::Cash));
}

#[tokio::test(start_paused = true)]
async fn stale_flow_replies_are_ignored() {
    let mut c = checkout();
    c.controller.start_payment().await.unwrap();
    go(&mut c.controller, ViewId::Credit, None).await;
    let window = c.surface.current_window().unwrap();
    let flow_id = c
        .controller
        .orchestrator()
        .context()
        .unwrap()
        .flow_id()
        .to_string();

    c.surface.peer_send(
        window,
        &FlowMessage::step_complete("old-flow", FlowStep::Payment, Content::new()),
    );
    c.surface.peer_send(
        window,
        &FlowMessage::step_complete(&flow_id, FlowStep::Cart, Content::new()),
    );

    let event = c.controller.next_customer_event().await.unwrap();
    assert_eq!(event.context().flow_id(), flow_id);
    c.controller.handle_customer_event(event).await.unwrap();
    assert!(c.controller.transactions().is_empty());
    assert_eq!(
        c.controller.orchestrator().context().unwrap().step(),
        FlowStep::Rewards
    );
}
