//! Outbound broker port
//!
//! The bridge does not own broker connections. It resolves a named
//! connection through a [`ConnectionResolver`] on every publish and issues a
//! single `basic_publish` on it.

use crate::error::Result;
use crate::headers::Headers;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

pub mod memory;

/// Content type of every published payload
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// AMQP delivery mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Transient,
    Persistent,
}

impl DeliveryMode {
    /// Wire value of the `delivery-mode` property
    pub fn as_u8(&self) -> u8 {
        match self {
            DeliveryMode::Transient => 1,
            DeliveryMode::Persistent => 2,
        }
    }
}

/// Basic publish properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicProperties {
    pub delivery_mode: DeliveryMode,
    pub content_type: String,
    /// Header table, only attached when non-empty
    pub headers: Option<Headers>,
}

impl BasicProperties {
    /// Persistent JSON properties with an optional header table
    pub fn json(headers: Headers) -> Self {
        Self {
            delivery_mode: DeliveryMode::Persistent,
            content_type: CONTENT_TYPE_JSON.to_string(),
            headers: if headers.is_empty() { None } else { Some(headers) },
        }
    }
}

/// A single publish request
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    pub exchange: &'a str,
    pub routing_key: &'a str,
    /// Return unroutable messages to the publisher
    pub mandatory: bool,
    /// Require immediate delivery to a consumer
    pub immediate: bool,
    pub properties: &'a BasicProperties,
    pub body: Bytes,
}

/// A live broker connection
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Issue one `basic.publish`; no confirmation is requested
    async fn basic_publish(&self, request: PublishRequest<'_>) -> Result<()>;
}

/// Resolves broker connections by configured name
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    /// Look up a connection; `None` when it is not currently available
    ///
    /// Implementations must fail fast rather than block on an unreachable
    /// broker.
    async fn get_connection(&self, name: &str) -> Option<Arc<dyn BrokerConnection>>;
}
