//! # Checkout Simulator
//!
//! Runs scripted checkouts against the in-memory customer display and the
//! recording collaborators, logging every step.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Simulated Checkouts                              │
//! │                                                                         │
//! │  1. Cash      $21.50, $25 tendered, receipt printed, drawer opened      │
//! │  2. Split     $10.00 cash leg + $11.50 card leg with a $2.00 tip        │
//! │                                                                         │
//! │  The card leg is driven by simulated customer replies on the display.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `RUST_LOG=checkout=trace cargo run --bin checkout-sim` for full detail.

use std::error::Error;
use std::sync::Arc;

use checkout_core::{FlowStep, Money, ViewId};
use checkout_display::{
    Content, CustomerDisplayChannel, DisplayConfig, FlowMessage, InMemorySurface,
};
use checkout_flow::{
    CartLine, Collaborators, CustomerOutcome, NavDirection, NavigateOptions,
    PaymentFlowController, RecordingOrderBackend, RecordingPrinter, SharedCart, TracingNotifier,
};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    info!("Starting checkout simulator");

    let config = DisplayConfig::load_or_default(None);
    let origin = config.target_origin()?;
    let surface = InMemorySurface::new(origin).with_auto_ready();
    let display = CustomerDisplayChannel::spawn(config, Arc::new(surface.clone()))?;

    let cart = SharedCart::new();
    let backend = RecordingOrderBackend::new();
    let printer = RecordingPrinter::new();
    let mut controller = PaymentFlowController::new(
        display.clone(),
        Collaborators {
            cart: Arc::new(cart.clone()),
            backend: Arc::new(backend.clone()),
            printer: Arc::new(printer.clone()),
            notifier: Arc::new(TracingNotifier),
        },
    );

    // -------------------------------------------------------------------------
    // 1. Cash
    // -------------------------------------------------------------------------
    fill_cart(&cart, "order-1001");
    controller.start_payment().await?;
    controller
        .navigate(ViewId::Cash, NavDirection::Forward, NavigateOptions::default())
        .await?;
    info!(suggestions = ?controller.suggested_tenders(), "Quick tender buttons");

    controller.process_cash_tender(Money::from_cents(2500)).await?;
    let result = controller.finalize_cash_payment(true).await?;
    info!(result = %result.0, "Cash order completed");

    controller.start_new_order().await?;
    cart.clear();

    // -------------------------------------------------------------------------
    // 2. Split: cash leg, then card leg on the customer display
    // -------------------------------------------------------------------------
    fill_cart(&cart, "order-1002");
    controller.start_payment().await?;
    controller
        .navigate(ViewId::Split, NavDirection::Forward, NavigateOptions::default())
        .await?;

    controller
        .navigate(
            ViewId::Cash,
            NavDirection::Forward,
            NavigateOptions::leg(Money::from_cents(1000)),
        )
        .await?;
    controller.process_cash_tender(Money::from_cents(1000)).await?;
    controller
        .navigate(ViewId::Split, NavDirection::Backward, NavigateOptions::default())
        .await?;
    info!(remaining = %controller.remaining(), "First leg taken");

    controller
        .navigate(ViewId::Credit, NavDirection::Forward, NavigateOptions::default())
        .await?;

    let (window, flow_id) = match (
        surface.current_window(),
        controller.orchestrator().context(),
    ) {
        (Some(window), Some(context)) => (window, context.flow_id().to_string()),
        _ => return Err("customer display did not start the card flow".into()),
    };

    let replies = [
        (FlowStep::Cart, json!({})),
        (FlowStep::Rewards, json!({ "rewardsSkipped": true })),
        (FlowStep::Tip, json!({ "tipAmount": 200 })),
        (
            FlowStep::Payment,
            json!({
                "cardInfo": { "brand": "visa", "last4": "4242" },
                "transactionId": "sim-txn-1"
            }),
        ),
        (FlowStep::Receipt, json!({ "receipt": "email" })),
    ];
    let mut replies = replies.into_iter();

    if let Some((step, data)) = replies.next() {
        surface.peer_send(window, &FlowMessage::step_complete(&flow_id, step, content(data)));
    }
    while let Some(event) = controller.next_customer_event().await {
        let outcome = controller.handle_customer_event(event).await?;
        info!(?outcome, "Customer step handled");
        if let CustomerOutcome::Completed(result) = outcome {
            info!(result = %result.0, "Split order completed");
            break;
        }
        match replies.next() {
            Some((step, data)) => {
                surface.peer_send(window, &FlowMessage::step_complete(&flow_id, step, content(data)));
            }
            None => break,
        }
    }

    let totals = controller.ledger().totals();
    info!(
        paid = %totals.base_amount_paid,
        tips = %totals.total_tip_amount,
        charged = %totals.total_paid,
        legs = controller.split_details().map_or(0, |s| s.completed_splits.len()),
        "Split totals"
    );
    controller.start_new_order().await?;

    info!(
        completions = backend.call_count(),
        receipts = printer.printed().len(),
        posted = surface.posted().len(),
        "Simulation finished"
    );
    display.shutdown().await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,checkout=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn fill_cart(cart: &SharedCart, order_id: &str) {
    cart.set_order_id(order_id);
    cart.add_line(CartLine::new("COFFEE", "Coffee", Money::from_cents(450), 3));
    cart.add_line(CartLine::new("MUFFIN", "Muffin", Money::from_cents(400), 2));
}

fn content(value: serde_json::Value) -> Content {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Content::new(),
    }
}
