//! Error types for stasis-amqp

use thiserror::Error;

/// Errors that can occur while bridging bus events to the broker
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Missing or invalid configuration field (fatal at load)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection or exchange name unset in the active snapshot
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Broker connection could not be resolved by name
    #[error("AMQP connection '{0}' is unavailable")]
    ConnectionUnavailable(String),

    /// Broker rejected or failed the publish call
    #[error("Failed to publish to exchange '{exchange}' with routing key '{routing_key}': {reason}")]
    BrokerPublish {
        exchange: String,
        routing_key: String,
        reason: String,
    },

    /// Event lacks an extractable type or name
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Programming-contract violation (e.g. empty routing key suffix)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Host bus refused a subscription or registration
    #[error("Failed to subscribe to {target}: {reason}")]
    Subscribe {
        target: String,
        reason: String,
    },

    /// Lifecycle operation attempted in the wrong module state
    #[error("Invalid state: expected {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file syntax error
    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

impl BridgeError {
    /// True for errors confined to a single event's handling path
    pub fn is_per_event(&self) -> bool {
        matches!(
            self,
            BridgeError::NotConfigured(_)
                | BridgeError::ConnectionUnavailable(_)
                | BridgeError::BrokerPublish { .. }
                | BridgeError::MalformedEvent(_)
                | BridgeError::InvalidInput(_)
                | BridgeError::Serialization(_)
        )
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
