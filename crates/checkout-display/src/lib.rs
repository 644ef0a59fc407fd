//! # checkout-display: Customer Display Channel
//!
//! The cashier side of the customer-facing second screen. One actor owns the
//! display window and everything known about it; the rest of the checkout
//! talks to it through a cloneable handle.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Customer Display Channel                            │
//! │                                                                         │
//! │  PaymentFlowController / StepOrchestrator                               │
//! │               │ DisplayChannelHandle (mpsc + oneshot)                   │
//! │               ▼                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │            CustomerDisplayChannel (actor task)                   │  │
//! │  │                                                                  │  │
//! │  │  window handle • handshake • outbound queue • flow snapshot      │  │
//! │  │  liveness poll • ready timeout • retry budget • listeners        │  │
//! │  └───────────────┬──────────────────────────────▲───────────────────┘  │
//! │                  │ post_message(msg, origin)    │ RawMessage            │
//! │                  ▼                              │ (origin + source      │
//! │  ┌──────────────────────────────────────────────┴───────────────────┐  │
//! │  │                DisplaySurface / PeerWindow                       │  │
//! │  │      webview, browser popup, or InMemorySurface in tests         │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`channel`] - The actor and its handle
//! - [`config`] - Window and channel settings (TOML + env)
//! - [`error`] - Display error types
//! - [`merge`] - Snapshot merging for incremental flow updates
//! - [`protocol`] - Wire envelope and the closed message tag set
//! - [`surface`] - Window substrate traits and the in-memory substrate
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_display::{CustomerDisplayChannel, DisplayConfig, InMemorySurface};
//!
//! let config = DisplayConfig::load_or_default(None);
//! let surface = Arc::new(InMemorySurface::new("http://localhost:1420").with_auto_ready());
//! let display = CustomerDisplayChannel::spawn(config, surface)?;
//!
//! display.show_welcome().await?;
//! let status = display.status().await?;
//! println!("Display: {}", status.handshake);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod channel;
pub mod config;
pub mod error;
pub mod merge;
pub mod protocol;
pub mod surface;

// =============================================================================
// Re-exports
// =============================================================================

pub use channel::{
    ChannelStatus, CustomerDisplayChannel, DisplayChannelHandle, DisplayListener, FlowSnapshot,
    HandshakeState, ListenerId,
};
pub use config::{ChannelSettings, DisplayConfig, WindowSettings};
pub use error::{DisplayError, DisplayResult};
pub use merge::{merge_flow_update, prune_nulls};
pub use protocol::{Content, FlowMessage, InboundMessage, MessageType, SequenceGuard};
pub use surface::{
    DisplaySurface, InMemorySurface, PeerWindow, PostedMessage, RawMessage, WindowId, WindowSpec,
};
