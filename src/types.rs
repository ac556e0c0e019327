//! Core message types for the stasis-amqp bridge
//!
//! Inbound messages arrive from the host bus as [`BusMessage`]; every accepted
//! event leaves as an [`Envelope`] serialized to JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `{name, data, application?}` wrapper placed around each published event
///
/// `data` is the original event document, passed through untouched except for
/// the `application` field injected on per-application events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    name: String,

    data: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    application: Option<String>,
}

impl Envelope {
    /// Create an envelope for a bus-wide or management event
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
            application: None,
        }
    }

    /// Create an envelope for a per-application event
    pub fn for_application(name: impl Into<String>, data: Value, application: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data,
            application: Some(application.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn application(&self) -> Option<&str> {
        self.application.as_deref()
    }

    /// Serialize to the broker payload format
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Parse an envelope back out of a broker payload
    pub fn from_payload(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

/// Management-protocol (AMI) representation of a bus message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerEventBlob {
    /// Management event name (e.g. `Newstate`)
    pub manager_event: String,

    /// `key: value` lines separated by `\r\n`
    pub extra_fields: String,
}

impl ManagerEventBlob {
    pub fn new(manager_event: impl Into<String>, extra_fields: impl Into<String>) -> Self {
        Self {
            manager_event: manager_event.into(),
            extra_fields: extra_fields.into(),
        }
    }
}

/// A message published on the host bus
///
/// A message may carry a JSON document, a management-protocol representation,
/// both, or neither, depending on its type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StasisMessage {
    /// JSON representation (channel and application events)
    pub document: Option<Value>,

    /// AMI representation, when the message type has one
    pub manager_event: Option<ManagerEventBlob>,
}

impl StasisMessage {
    /// A message with only a JSON representation
    pub fn json(document: Value) -> Self {
        Self {
            document: Some(document),
            manager_event: None,
        }
    }

    /// A message with only a management-protocol representation
    pub fn manager(blob: ManagerEventBlob) -> Self {
        Self {
            document: None,
            manager_event: Some(blob),
        }
    }
}

/// Item delivered by a bus subscription
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    /// A regular bus message
    Stasis(StasisMessage),

    /// Final message of a subscription; nothing follows it
    SubscriptionEnd,
}

impl BusMessage {
    pub fn is_final(&self) -> bool {
        matches!(self, BusMessage::SubscriptionEnd)
    }
}

impl From<StasisMessage> for BusMessage {
    fn from(message: StasisMessage) -> Self {
        BusMessage::Stasis(message)
    }
}
