//! In-memory event source for testing and embedding
//!
//! Each subscription is backed by an unbounded channel, so publishes never
//! block and per-subscription order is preserved.

use super::{BusSubscription, EventSource, SubscriptionId, Topic};
use crate::error::{BridgeError, Result};
use crate::types::{BusMessage, ManagerEventBlob, StasisMessage};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

type Sender = mpsc::UnboundedSender<BusMessage>;

#[derive(Default)]
struct SourceState {
    next_id: u64,
    topics: HashMap<SubscriptionId, (Topic, Sender)>,
    applications: HashMap<String, (SubscriptionId, Sender)>,
    known_applications: BTreeSet<String>,
    refused_topics: HashSet<Topic>,
}

impl SourceState {
    fn allocate(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }
}

/// In-memory host bus
#[derive(Clone, Default)]
pub struct MemoryEventSource {
    state: Arc<Mutex<SourceState>>,
}

impl MemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish on a global topic, returning the number of subscribers reached
    pub fn publish(&self, topic: Topic, message: StasisMessage) -> usize {
        let state = self.state();
        let mut delivered = 0;
        for (subscribed, tx) in state.topics.values() {
            if *subscribed == topic && tx.send(BusMessage::Stasis(message.clone())).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Publish a channel event document on the all-channel topic
    pub fn publish_channel(&self, document: Value) -> usize {
        self.publish(Topic::ChannelAll, StasisMessage::json(document))
    }

    /// Publish a management event on the manager topic
    pub fn publish_manager(&self, blob: ManagerEventBlob) -> usize {
        self.publish(Topic::Manager, StasisMessage::manager(blob))
    }

    /// Deliver an event to a registered application
    pub fn publish_application(&self, application: &str, document: Value) -> bool {
        let state = self.state();
        match state.applications.get(application) {
            Some((_, tx)) => tx
                .send(BusMessage::Stasis(StasisMessage::json(document)))
                .is_ok(),
            None => false,
        }
    }

    /// Make an application known to the host without registering it
    pub fn add_application(&self, application: &str) {
        self.state()
            .known_applications
            .insert(application.to_string());
    }

    /// Refuse future subscriptions to `topic`
    pub fn refuse_topic(&self, topic: Topic) {
        self.state().refused_topics.insert(topic);
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.state()
            .topics
            .values()
            .filter(|(t, _)| *t == topic)
            .count()
    }

    pub fn is_registered(&self, application: &str) -> bool {
        self.state().applications.contains_key(application)
    }
}

#[async_trait]
impl EventSource for MemoryEventSource {
    async fn subscribe(&self, topic: Topic) -> Result<Box<dyn BusSubscription>> {
        let mut state = self.state();
        if state.refused_topics.contains(&topic) {
            return Err(BridgeError::Subscribe {
                target: topic.to_string(),
                reason: "topic refused by host".to_string(),
            });
        }

        let id = state.allocate();
        let (tx, rx) = mpsc::unbounded_channel();
        state.topics.insert(id, (topic, tx));

        tracing::debug!(topic = %topic, id = %id, "Topic subscription created");
        Ok(Box::new(MemorySubscription { id, rx }))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let removed = self.state().topics.remove(&id);
        match removed {
            Some((_, tx)) => {
                // Dropping the sender closes the handle after the final message
                let _ = tx.send(BusMessage::SubscriptionEnd);
                Ok(())
            }
            None => Err(BridgeError::Subscribe {
                target: id.to_string(),
                reason: "unknown subscription".to_string(),
            }),
        }
    }

    async fn register_application(&self, application: &str) -> Result<Box<dyn BusSubscription>> {
        let mut state = self.state();
        if state.applications.contains_key(application) {
            return Err(BridgeError::Subscribe {
                target: application.to_string(),
                reason: "application already registered".to_string(),
            });
        }

        let id = state.allocate();
        let (tx, rx) = mpsc::unbounded_channel();
        state.applications.insert(application.to_string(), (id, tx));
        state.known_applications.insert(application.to_string());

        Ok(Box::new(MemorySubscription { id, rx }))
    }

    async fn unregister_application(&self, application: &str) -> Result<()> {
        let mut state = self.state();
        state.known_applications.remove(application);
        if let Some((_, tx)) = state.applications.remove(application) {
            let _ = tx.send(BusMessage::SubscriptionEnd);
        }
        Ok(())
    }

    async fn applications(&self) -> Result<Vec<String>> {
        Ok(self.state().known_applications.iter().cloned().collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Subscription handle returned by [`MemoryEventSource`]
pub struct MemorySubscription {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<BusMessage>,
}

#[async_trait]
impl BusSubscription for MemorySubscription {
    fn id(&self) -> SubscriptionId {
        self.id
    }

    async fn next(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }
}
