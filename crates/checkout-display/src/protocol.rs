//! # Customer Display Protocol
//!
//! Message types exchanged with the customer display window.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Customer Display Messages                            │
//! │                                                                         │
//! │  IDLE / MODE SWITCHES (cashier → display)                               │
//! │  ────────────────────────────────────────                               │
//! │  CUSTOMER_DISPLAY_UPDATE { cart }       idle cart mirror                │
//! │  SHOW_WELCOME / SHOW_REWARDS            clears cached flow snapshot     │
//! │                                                                         │
//! │  CUSTOMER FLOW (cashier → display)                                      │
//! │  ─────────────────────────────────                                      │
//! │  START_CUSTOMER_FLOW  { currentStep, cart, amounts... }   full snapshot │
//! │  UPDATE_CUSTOMER_FLOW { merged snapshot }                 incremental   │
//! │  DIRECT_CASH_UPDATE   { cashTendered, change, ... }       no merge      │
//! │                                                                         │
//! │  REPLIES (display → cashier)                                            │
//! │  ───────────────────────────                                            │
//! │  CUSTOMER_DISPLAY_READY                 handshake                       │
//! │  CUSTOMER_FLOW_STEP_COMPLETE { step, data }                             │
//! │  REWARDS_REGISTRATION_COMPLETE { ... }                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! ```json
//! { "type": "UPDATE_CUSTOMER_FLOW", "content": { ... }, "seq": 7, "flowId": "..." }
//! ```
//!
//! The tag set is closed. A message with any other `type` fails to decode and
//! is rejected at the channel boundary.
//!
//! Every outbound message carries a `seq` that increases for the lifetime of
//! the channel. The display applies a message only if its `seq` is greater
//! than the last one it applied (see [`SequenceGuard`]).

use checkout_core::FlowStep;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use ts_rs::TS;

use crate::error::{DisplayError, DisplayResult};

/// JSON object carried in `content`.
pub type Content = Map<String, Value>;

// =============================================================================
// Message Type
// =============================================================================

/// The closed set of message tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    // =========================================================================
    // Outbound
    // =========================================================================
    CustomerDisplayUpdate,
    ShowWelcome,
    ShowRewards,
    StartCustomerFlow,
    UpdateCustomerFlow,
    DirectCashUpdate,

    // =========================================================================
    // Inbound
    // =========================================================================
    CustomerDisplayReady,
    CustomerFlowStepComplete,
    RewardsRegistrationComplete,
}

impl MessageType {
    /// Wire tag (for logging).
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::CustomerDisplayUpdate => "CUSTOMER_DISPLAY_UPDATE",
            MessageType::ShowWelcome => "SHOW_WELCOME",
            MessageType::ShowRewards => "SHOW_REWARDS",
            MessageType::StartCustomerFlow => "START_CUSTOMER_FLOW",
            MessageType::UpdateCustomerFlow => "UPDATE_CUSTOMER_FLOW",
            MessageType::DirectCashUpdate => "DIRECT_CASH_UPDATE",
            MessageType::CustomerDisplayReady => "CUSTOMER_DISPLAY_READY",
            MessageType::CustomerFlowStepComplete => "CUSTOMER_FLOW_STEP_COMPLETE",
            MessageType::RewardsRegistrationComplete => "REWARDS_REGISTRATION_COMPLETE",
        }
    }

    /// Sent by the display, never by the cashier side.
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            MessageType::CustomerDisplayReady
                | MessageType::CustomerFlowStepComplete
                | MessageType::RewardsRegistrationComplete
        )
    }

    /// Mode switches that end any customer flow on the display.
    pub fn clears_flow(&self) -> bool {
        matches!(self, MessageType::ShowWelcome | MessageType::ShowRewards)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// The wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,

    #[serde(default)]
    pub content: Content,

    /// Channel-assigned sequence number; absent on inbound messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,

    /// Customer flow this message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<String>,
}

impl FlowMessage {
    pub fn new(kind: MessageType, content: Content) -> Self {
        FlowMessage {
            kind,
            content,
            seq: None,
            flow_id: None,
        }
    }

    pub fn with_flow_id(mut self, flow_id: impl Into<String>) -> Self {
        self.flow_id = Some(flow_id.into());
        self
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Idle cart mirror.
    pub fn display_update(cart: Value) -> Self {
        let mut content = Content::new();
        content.insert("cart".to_string(), cart);
        FlowMessage::new(MessageType::CustomerDisplayUpdate, content)
    }

    pub fn show_welcome() -> Self {
        FlowMessage::new(MessageType::ShowWelcome, Content::new())
    }

    pub fn show_rewards(content: Content) -> Self {
        FlowMessage::new(MessageType::ShowRewards, content)
    }

    /// Handshake reply from the display.
    pub fn ready() -> Self {
        FlowMessage::new(MessageType::CustomerDisplayReady, Content::new())
    }

    /// Step completion reply from the display.
    pub fn step_complete(flow_id: &str, step: FlowStep, data: Content) -> Self {
        let mut content = Content::new();
        content.insert("step".to_string(), Value::String(step.as_str().to_string()));
        content.insert("data".to_string(), Value::Object(data));
        FlowMessage::new(MessageType::CustomerFlowStepComplete, content).with_flow_id(flow_id)
    }

    /// Serializes to JSON string.
    pub fn to_json(&self) -> DisplayResult<String> {
        serde_json::to_string(self).map_err(|e| DisplayError::SerializationFailed(e.to_string()))
    }

    /// Deserializes from JSON string.
    pub fn from_json(json: &str) -> DisplayResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Decodes what the substrate delivered.
    pub fn from_value(value: Value) -> DisplayResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> DisplayResult<Value> {
        serde_json::to_value(self).map_err(|e| DisplayError::SerializationFailed(e.to_string()))
    }
}

// =============================================================================
// Inbound View
// =============================================================================

/// Typed view of the messages the display sends back.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// The display finished loading and is listening.
    DisplayReady,

    /// The customer finished a step.
    StepComplete {
        flow_id: Option<String>,
        step: FlowStep,
        data: Content,
    },

    /// The customer registered for rewards on the display.
    RewardsRegistrationComplete { data: Content },
}

impl InboundMessage {
    pub fn kind(&self) -> MessageType {
        match self {
            InboundMessage::DisplayReady => MessageType::CustomerDisplayReady,
            InboundMessage::StepComplete { .. } => MessageType::CustomerFlowStepComplete,
            InboundMessage::RewardsRegistrationComplete { .. } => {
                MessageType::RewardsRegistrationComplete
            }
        }
    }
}

impl TryFrom<FlowMessage> for InboundMessage {
    type Error = DisplayError;

    fn try_from(message: FlowMessage) -> Result<Self, Self::Error> {
        let FlowMessage {
            kind,
            mut content,
            flow_id,
            ..
        } = message;

        match kind {
            MessageType::CustomerDisplayReady => Ok(InboundMessage::DisplayReady),
            MessageType::CustomerFlowStepComplete => {
                let step = content
                    .remove("step")
                    .ok_or_else(|| DisplayError::InvalidMessage("step is required".into()))?;
                let step: FlowStep = serde_json::from_value(step)?;
                let data = match content.remove("data") {
                    Some(Value::Object(data)) => data,
                    Some(Value::Null) | None => Content::new(),
                    Some(other) => {
                        return Err(DisplayError::InvalidMessage(format!(
                            "step data must be an object, got {other}"
                        )))
                    }
                };
                Ok(InboundMessage::StepComplete {
                    flow_id,
                    step,
                    data,
                })
            }
            MessageType::RewardsRegistrationComplete => {
                Ok(InboundMessage::RewardsRegistrationComplete { data: content })
            }
            other => Err(DisplayError::UnexpectedMessage {
                kind: other.to_string(),
            }),
        }
    }
}

// =============================================================================
// Sequencing
// =============================================================================

/// Display-side discard rule for out-of-order delivery.
///
/// ## Example
/// ```rust
/// use checkout_display::protocol::{FlowMessage, SequenceGuard};
///
/// let mut guard = SequenceGuard::default();
/// assert!(guard.accept(&FlowMessage::show_welcome().with_seq(2)));
/// assert!(!guard.accept(&FlowMessage::show_welcome().with_seq(1)));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceGuard {
    last_applied: Option<u64>,
}

impl SequenceGuard {
    /// Returns true if `message` should be applied, recording its `seq`.
    ///
    /// Messages without a `seq` are always applied.
    pub fn accept(&mut self, message: &FlowMessage) -> bool {
        let Some(seq) = message.seq else {
            return true;
        };
        match self.last_applied {
            Some(last) if seq <= last => false,
            _ => {
                self.last_applied = Some(seq);
                true
            }
        }
    }

    pub fn last_applied(&self) -> Option<u64> {
        self.last_applied
    }
}
