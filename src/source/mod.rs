//! Inbound event source trait: the host bus abstraction
//!
//! The host engine exposes two global topics and a per-application
//! registration API. Each subscription is a pull handle; the bridge drains it
//! from a dedicated task, so delivery order within one subscription is kept.

use crate::error::Result;
use crate::types::BusMessage;
use async_trait::async_trait;
use std::fmt;

pub mod memory;

/// Global topics the bridge can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Management-event topic
    Manager,
    /// All-channel event topic
    ChannelAll,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Manager => f.write_str("manager"),
            Topic::ChannelAll => f.write_str("channel:all"),
        }
    }
}

/// Host-assigned subscription identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Core trait for host event buses
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Subscribe to a global topic
    async fn subscribe(&self, topic: Topic) -> Result<Box<dyn BusSubscription>>;

    /// Stop a topic subscription
    ///
    /// After this returns the host delivers at most a final
    /// [`BusMessage::SubscriptionEnd`] and then closes the handle.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;

    /// Register an application and receive its events
    async fn register_application(&self, application: &str) -> Result<Box<dyn BusSubscription>>;

    /// Unregister an application; its handle is closed like `unsubscribe`
    async fn unregister_application(&self, application: &str) -> Result<()>;

    /// Names of all applications currently known to the host
    async fn applications(&self) -> Result<Vec<String>>;

    /// Source name (e.g., "memory")
    fn name(&self) -> &str;
}

/// Async subscription handle for receiving bus messages
#[async_trait]
pub trait BusSubscription: Send {
    fn id(&self) -> SubscriptionId;

    /// Receive the next message; `None` once the host closed the subscription
    async fn next(&mut self) -> Option<BusMessage>;
}
