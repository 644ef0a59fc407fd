//! # Display Error Types
//!
//! Error types for the customer display channel.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Display Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Peer Window   │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  OpenFailed     │  │  InvalidMessage         │ │
//! │  │  WildcardOrigin │  │  PostFailed     │  │  UnexpectedMessage      │ │
//! │  │  InvalidUrl     │  │  RetriesExhaust │  │  SerializationFailed    │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │     State       │                                                   │
//! │  │                 │                                                   │
//! │  │  FlowNotStarted │                                                   │
//! │  │  ShuttingDown   │                                                   │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for display operations.
pub type DisplayResult<T> = Result<T, DisplayError>;

/// Everything that can go wrong talking to the customer display.
#[derive(Debug, Error)]
pub enum DisplayError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid display configuration.
    #[error("Invalid display configuration: {0}")]
    InvalidConfig(String),

    /// A wildcard target origin was configured.
    #[error("Wildcard target origin '*' is not allowed")]
    WildcardOrigin,

    /// Display URL could not be parsed or has no usable origin.
    #[error("Invalid display URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Peer Window Errors
    // =========================================================================
    /// The substrate refused to open the display window.
    #[error("Failed to open customer display: {0}")]
    OpenFailed(String),

    /// Posting to the window failed (closed or detached handle).
    #[error("Failed to post to customer display: {0}")]
    PostFailed(String),

    /// Reopen-and-retry gave up.
    #[error("Customer display unreachable after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Message could not be decoded (unknown type tag, bad shape).
    #[error("Invalid display message: {0}")]
    InvalidMessage(String),

    /// Well-formed message in the wrong direction.
    #[error("Unexpected {kind} message from customer display")]
    UnexpectedMessage { kind: String },

    /// Failed to serialize a message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // State Errors
    // =========================================================================
    /// Incremental update without a started flow (or for another flow).
    #[error("Customer flow {flow_id} has not been started")]
    FlowNotStarted { flow_id: String },

    /// The channel actor has stopped.
    #[error("Customer display channel is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for DisplayError {
    fn from(err: serde_json::Error) -> Self {
        DisplayError::InvalidMessage(err.to_string())
    }
}

impl From<url::ParseError> for DisplayError {
    fn from(err: url::ParseError) -> Self {
        DisplayError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for DisplayError {
    fn from(err: std::io::Error) -> Self {
        DisplayError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for DisplayError {
    fn from(err: toml::de::Error) -> Self {
        DisplayError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for DisplayError {
    fn from(err: toml::ser::Error) -> Self {
        DisplayError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl DisplayError {
    /// Returns true if reopening the window and trying again can help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DisplayError::OpenFailed(_) | DisplayError::PostFailed(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            DisplayError::InvalidConfig(_)
                | DisplayError::WildcardOrigin
                | DisplayError::InvalidUrl(_)
                | DisplayError::ConfigLoadFailed(_)
                | DisplayError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if this error came from the message protocol.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            DisplayError::InvalidMessage(_)
                | DisplayError::UnexpectedMessage { .. }
                | DisplayError::SerializationFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(DisplayError::OpenFailed("blocked".into()).is_retryable());
        assert!(DisplayError::PostFailed("detached".into()).is_retryable());

        assert!(!DisplayError::RetriesExhausted { attempts: 3 }.is_retryable());
        assert!(!DisplayError::WildcardOrigin.is_retryable());
        assert!(!DisplayError::FlowNotStarted {
            flow_id: "f-1".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert!(DisplayError::WildcardOrigin.is_config_error());
        assert!(DisplayError::InvalidMessage("unknown variant".into()).is_protocol_error());
        assert!(!DisplayError::ShuttingDown.is_protocol_error());
    }

    #[test]
    fn test_error_display() {
        let err = DisplayError::RetriesExhausted { attempts: 4 };
        assert_eq!(
            err.to_string(),
            "Customer display unreachable after 4 attempts"
        );
    }
}
