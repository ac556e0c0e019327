//! Event transformation: filter, wrap and route inbound bus messages
//!
//! Three source classes share one shape: extract the event name, consult the
//! filter (plus the variable allow-list for `ChannelVarset`), then build the
//! envelope, headers and routing key and hand them to the [`Publisher`].
//!
//! - [`EventClass::Channel`]: bus-wide channel events (`stasis.channel.<type>`)
//! - [`EventClass::Application`]: per-application events (`stasis.app.<app>`)
//! - [`EventClass::Manager`]: management-protocol events (`ami.<event>`)

mod application;
mod channel;
mod manager;

pub use manager::parse_manager_fields;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::filter::{EventFilter, CHANNEL_VARSET};
use crate::headers::Headers;
use crate::publisher::Publisher;
use crate::routing::RoutingKey;
use crate::types::{BusMessage, Envelope};
use serde_json::Value;
use std::fmt;

/// Header category for bus (channel and application) events
pub const CATEGORY_STASIS: &str = "stasis";

/// Header category for management-protocol events
pub const CATEGORY_AMI: &str = "ami";

/// Source class of an inbound message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventClass {
    Channel,
    Application(String),
    Manager,
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventClass::Channel => f.write_str("channel"),
            EventClass::Application(app) => write!(f, "application:{}", app),
            EventClass::Manager => f.write_str("ami"),
        }
    }
}

/// Why an event was silently dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Final message of a subscription
    SubscriptionEnd,
    /// Event name is in the exclude-list
    Excluded,
    /// `ChannelVarset` for a variable outside the allow-list
    VariableNotIncluded,
    /// Message has no management-protocol representation
    NoManagerRepresentation,
}

/// Result of handling one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Published(RoutingKey),
    Dropped(DropReason),
}

/// Turns bus messages into broker publishes
#[derive(Clone)]
pub struct EventTransformer {
    publisher: Publisher,
}

impl EventTransformer {
    pub fn new(publisher: Publisher) -> Self {
        Self { publisher }
    }

    /// Dispatch a message according to its source class
    pub async fn handle(&self, class: &EventClass, message: BusMessage) -> Result<Outcome> {
        match class {
            EventClass::Channel => self.handle_channel(message).await,
            EventClass::Application(app) => self.handle_application(app, message).await,
            EventClass::Manager => self.handle_manager(message).await,
        }
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    async fn emit(
        &self,
        config: &BridgeConfig,
        envelope: Envelope,
        headers: Headers,
        routing_key: RoutingKey,
    ) -> Result<Outcome> {
        self.publisher
            .publish_with(config, envelope, headers, &routing_key)
            .await?;
        Ok(Outcome::Published(routing_key))
    }
}

/// Apply the exclude-list and, for `ChannelVarset`, the variable allow-list
fn check_filter(filter: &EventFilter, event_name: &str, data: &Value) -> Option<DropReason> {
    if filter.is_excluded(Some(event_name)) {
        return Some(DropReason::Excluded);
    }
    if event_name == CHANNEL_VARSET {
        let variable = data.get("variable").and_then(Value::as_str);
        if !filter.is_variable_included(variable) {
            return Some(DropReason::VariableNotIncluded);
        }
    }
    None
}

/// Read the event type from a bus event document
fn event_type(document: &Value) -> Result<String> {
    match document.get("type").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(BridgeError::MalformedEvent(
            "event document has no 'type'".to_string(),
        )),
    }
}

fn log_drop(class: &EventClass, event_name: &str, reason: DropReason) {
    tracing::trace!(class = %class, event = %event_name, reason = ?reason, "Event dropped");
}
