//! Publisher: serialize an envelope and hand it to the broker
//!
//! At most one delivery attempt per event. Failures are logged and returned;
//! nothing is retried or persisted.

use crate::broker::{BasicProperties, ConnectionResolver, PublishRequest};
use crate::config::{BridgeConfig, ConfigHandle};
use crate::error::{BridgeError, Result};
use crate::headers::Headers;
use crate::routing::RoutingKey;
use crate::types::Envelope;
use bytes::Bytes;
use std::sync::Arc;

/// Publishes envelopes on the configured exchange
#[derive(Clone)]
pub struct Publisher {
    config: ConfigHandle,
    connections: Arc<dyn ConnectionResolver>,
}

impl Publisher {
    pub fn new(config: ConfigHandle, connections: Arc<dyn ConnectionResolver>) -> Self {
        Self {
            config,
            connections,
        }
    }

    /// Publish against the snapshot active at entry
    pub async fn publish(
        &self,
        envelope: Envelope,
        headers: Headers,
        routing_key: &RoutingKey,
    ) -> Result<()> {
        let snapshot = self.config.snapshot();
        self.publish_with(&snapshot, envelope, headers, routing_key)
            .await
    }

    /// Publish against an explicitly captured snapshot
    pub async fn publish_with(
        &self,
        config: &BridgeConfig,
        envelope: Envelope,
        headers: Headers,
        routing_key: &RoutingKey,
    ) -> Result<()> {
        config.ensure_publishable()?;

        let connection = match self.connections.get_connection(&config.connection).await {
            Some(conn) => conn,
            None => {
                tracing::error!(
                    connection = %config.connection,
                    routing_key = %routing_key,
                    "Failed to get an AMQP connection"
                );
                return Err(BridgeError::ConnectionUnavailable(config.connection.clone()));
            }
        };

        let body = Bytes::from(envelope.to_payload()?);
        let properties = BasicProperties::json(headers);

        let request = PublishRequest {
            exchange: &config.exchange,
            routing_key: routing_key.as_str(),
            mandatory: false,
            immediate: false,
            properties: &properties,
            body,
        };

        if let Err(e) = connection.basic_publish(request).await {
            tracing::error!(
                exchange = %config.exchange,
                routing_key = %routing_key,
                error = %e,
                "Error publishing event to AMQP"
            );
            return Err(match e {
                err @ BridgeError::BrokerPublish { .. } => err,
                other => BridgeError::BrokerPublish {
                    exchange: config.exchange.clone(),
                    routing_key: routing_key.to_string(),
                    reason: other.to_string(),
                },
            });
        }

        tracing::debug!(
            event = %envelope.name(),
            exchange = %config.exchange,
            routing_key = %routing_key,
            "Event published"
        );

        Ok(())
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::broker::DeliveryMode;
    use serde_json::json;

    fn setup(config: BridgeConfig) -> (Publisher, Arc<MemoryBroker>) {
        let broker = Arc::new(MemoryBroker::new());
        let publisher = Publisher::new(ConfigHandle::new(config), broker.clone());
        (publisher, broker)
    }

    fn key() -> RoutingKey {
        RoutingKey::build("stasis.channel", "ChannelCreated").unwrap()
    }

    #[tokio::test]
    async fn test_publish_sets_fixed_properties() {
        let (publisher, broker) = setup(BridgeConfig::new("default", "xivo"));
        let conn = broker.add_connection("default");

        let envelope = Envelope::new("ChannelCreated", json!({"type": "ChannelCreated"}));
        let headers = Headers::build("ChannelCreated", "stasis", None);
        publisher.publish(envelope, headers, &key()).await.unwrap();

        let published = conn.published();
        assert_eq!(published.len(), 1);
        let msg = &published[0];
        assert_eq!(msg.exchange, "xivo");
        assert_eq!(msg.routing_key, "stasis.channel.channelcreated");
        assert!(!msg.mandatory);
        assert!(!msg.immediate);
        assert_eq!(msg.properties.delivery_mode, DeliveryMode::Persistent);
        assert_eq!(msg.properties.content_type, "application/json");
        let headers = msg.properties.headers.as_ref().unwrap();
        assert_eq!(headers.get("name"), Some("ChannelCreated"));

        let body = msg.json().unwrap();
        assert_eq!(body["name"], "ChannelCreated");
        assert_eq!(body["data"]["type"], "ChannelCreated");
        assert!(body.get("application").is_none());
    }

    #[tokio::test]
    async fn test_empty_headers_not_attached() {
        let (publisher, broker) = setup(BridgeConfig::new("default", "xivo"));
        let conn = broker.add_connection("default");

        publisher
            .publish(Envelope::new("X", json!({})), Headers::default(), &key())
            .await
            .unwrap();

        assert!(conn.published()[0].properties.headers.is_none());
    }

    #[tokio::test]
    async fn test_not_configured() {
        let (publisher, broker) = setup(BridgeConfig::default());
        broker.add_connection("");

        let err = publisher
            .publish(Envelope::new("X", json!({})), Headers::default(), &key())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_connection_unavailable() {
        let (publisher, _broker) = setup(BridgeConfig::new("missing", "xivo"));

        let err = publisher
            .publish(Envelope::new("X", json!({})), Headers::default(), &key())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::ConnectionUnavailable(ref name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_broker_failure_is_reported_once() {
        let (publisher, broker) = setup(BridgeConfig::new("default", "xivo"));
        let conn = broker.add_connection("default");
        conn.set_failing(true);

        let err = publisher
            .publish(Envelope::new("X", json!({})), Headers::default(), &key())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::BrokerPublish { .. }));
        assert_eq!(conn.count(), 0);

        conn.set_failing(false);
        publisher
            .publish(Envelope::new("Y", json!({})), Headers::default(), &key())
            .await
            .unwrap();
        assert_eq!(conn.count(), 1);
    }

    #[tokio::test]
    async fn test_publish_uses_current_snapshot() {
        let (publisher, broker) = setup(BridgeConfig::new("default", "first"));
        let conn = broker.add_connection("default");

        publisher.config().replace(BridgeConfig::new("default", "second"));
        publisher
            .publish(Envelope::new("X", json!({})), Headers::default(), &key())
            .await
            .unwrap();

        assert_eq!(conn.published()[0].exchange, "second");
    }

    #[tokio::test]
    async fn test_publish_with_captured_snapshot() {
        let (publisher, broker) = setup(BridgeConfig::new("default", "first"));
        let conn = broker.add_connection("default");

        let captured = publisher.config().snapshot();
        publisher.config().replace(BridgeConfig::new("default", "second"));
        publisher
            .publish_with(&captured, Envelope::new("X", json!({})), Headers::default(), &key())
            .await
            .unwrap();

        assert_eq!(conn.published()[0].exchange, "first");
    }
}
