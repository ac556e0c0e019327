//! # stasis-amqp
//!
//! Bridge telephony engine bus events onto an AMQP exchange.
//!
//! ## Overview
//!
//! `stasis-amqp` subscribes to the engine's event bus (channel events,
//! per-application events and management-protocol events), filters each
//! event against operator-configured sets, wraps it into a
//! `{name, data, application?}` envelope and publishes it with a derived
//! routing key and header table.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use stasis_amqp::{BridgeConfig, MemoryBroker, MemoryEventSource, SubscriptionManager};
//!
//! # tokio_test::block_on(async {
//! let source = MemoryEventSource::new();
//! let broker = Arc::new(MemoryBroker::new());
//! let connection = broker.add_connection("default");
//!
//! let manager = SubscriptionManager::new(Arc::new(source.clone()), broker);
//! manager.load(BridgeConfig::new("default", "xivo")).await?;
//!
//! source.publish_channel(serde_json::json!({"type": "ChannelCreated"}));
//! // ...published as `stasis.channel.channelcreated` on exchange `xivo`
//!
//! manager.unload().await?;
//! assert_eq!(connection.count(), 1);
//! # Ok::<(), stasis_amqp::BridgeError>(())
//! # }).unwrap();
//! ```
//!
//! ## Architecture
//!
//! - **EventSource** trait: inbound host bus (topics + application registration)
//! - **SubscriptionManager**: load/reload/unload lifecycle and dispatch tasks
//! - **EventTransformer**: channel, application and AMI variants
//! - **Publisher**: envelope serialization and the single publish call
//! - **ConnectionResolver** / **BrokerConnection**: outbound broker port

pub mod broker;
pub mod config;
pub mod control;
pub mod error;
pub mod filter;
pub mod headers;
pub mod manager;
pub mod publisher;
pub mod routing;
pub mod scheduler;
pub mod source;
pub mod transform;
pub mod types;

// Re-export core types
pub use broker::{BasicProperties, BrokerConnection, ConnectionResolver, DeliveryMode, PublishRequest};
pub use config::{BridgeConfig, ConfigHandle};
pub use control::{ControlApi, ControlResponse};
pub use error::{BridgeError, Result};
pub use filter::EventFilter;
pub use headers::Headers;
pub use manager::{ModuleState, SubscriptionManager};
pub use publisher::Publisher;
pub use routing::{RoutingKey, RoutingPrefix};
pub use source::{BusSubscription, EventSource, SubscriptionId, Topic};
pub use transform::{DropReason, EventClass, EventTransformer, Outcome};
pub use types::{BusMessage, Envelope, ManagerEventBlob, StasisMessage};

// Re-export in-memory adapters for convenience
pub use broker::memory::{MemoryBroker, MemoryConnection, PublishedMessage};
pub use source::memory::MemoryEventSource;
