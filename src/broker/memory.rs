//! In-memory broker for testing and single-process use
//!
//! Records every publish per named connection. Connections can be taken
//! offline (resolution fails) or switched into a failing mode (publish
//! returns an error) to exercise the error paths.

use super::{BasicProperties, BrokerConnection, ConnectionResolver, PublishRequest};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// A message captured by a [`MemoryConnection`]
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub mandatory: bool,
    pub immediate: bool,
    pub properties: BasicProperties,
    pub body: Bytes,
}

impl PublishedMessage {
    /// Decode the body as JSON
    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// One named in-memory connection
#[derive(Debug, Default)]
pub struct MemoryConnection {
    published: RwLock<Vec<PublishedMessage>>,
    failing: AtomicBool,
}

impl MemoryConnection {
    /// Make every subsequent publish fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All messages published so far, oldest first
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn basic_publish(&self, request: PublishRequest<'_>) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BridgeError::BrokerPublish {
                exchange: request.exchange.to_string(),
                routing_key: request.routing_key.to_string(),
                reason: "connection is in failing mode".to_string(),
            });
        }

        let message = PublishedMessage {
            exchange: request.exchange.to_string(),
            routing_key: request.routing_key.to_string(),
            mandatory: request.mandatory,
            immediate: request.immediate,
            properties: request.properties.clone(),
            body: request.body,
        };

        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        Ok(())
    }
}

/// In-memory connection registry
#[derive(Debug, Default)]
pub struct MemoryBroker {
    connections: RwLock<HashMap<String, Arc<MemoryConnection>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or fetch) a named connection
    pub fn add_connection(&self, name: &str) -> Arc<MemoryConnection> {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Take a connection offline; later lookups return `None`
    pub fn remove_connection(&self, name: &str) -> Option<Arc<MemoryConnection>> {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn connection(&self, name: &str) -> Option<Arc<MemoryConnection>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

#[async_trait]
impl ConnectionResolver for MemoryBroker {
    async fn get_connection(&self, name: &str) -> Option<Arc<dyn BrokerConnection>> {
        self.connection(name)
            .map(|conn| conn as Arc<dyn BrokerConnection>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::Headers;

    fn request<'a>(props: &'a BasicProperties) -> PublishRequest<'a> {
        PublishRequest {
            exchange: "xivo",
            routing_key: "ami.newstate",
            mandatory: false,
            immediate: false,
            properties: props,
            body: Bytes::from_static(br#"{"name":"Newstate"}"#),
        }
    }

    #[tokio::test]
    async fn test_publish_is_recorded() {
        let broker = MemoryBroker::new();
        let conn = broker.add_connection("default");
        let props = BasicProperties::json(Headers::build("Newstate", "ami", None));

        let resolved = broker.get_connection("default").await.unwrap();
        resolved.basic_publish(request(&props)).await.unwrap();

        let published = conn.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].routing_key, "ami.newstate");
        assert_eq!(published[0].json().unwrap()["name"], "Newstate");
    }

    #[tokio::test]
    async fn test_unknown_or_removed_connection() {
        let broker = MemoryBroker::new();
        assert!(broker.get_connection("default").await.is_none());

        broker.add_connection("default");
        broker.remove_connection("default");
        assert!(broker.get_connection("default").await.is_none());
    }

    #[tokio::test]
    async fn test_failing_connection() {
        let broker = MemoryBroker::new();
        let conn = broker.add_connection("default");
        conn.set_failing(true);
        let props = BasicProperties::json(Headers::default());

        let err = conn.basic_publish(request(&props)).await.unwrap_err();
        assert!(matches!(err, BridgeError::BrokerPublish { .. }));
        assert_eq!(conn.count(), 0);
    }
}
