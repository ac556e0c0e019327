//! Bridge configuration and the shared snapshot handle
//!
//! The configuration file is TOML with a single `[global]` table:
//!
//! ```toml
//! [global]
//! connection = "default"
//! exchange = "xivo"
//! publish_ami_events = true
//! publish_channel_events = true
//! exclude_events = "Newexten, VarSet"
//! include_channelvarset_events = "WAZO_CALL_RECORD_ACTIVE"
//! ```

use crate::error::{BridgeError, Result};
use crate::filter::EventFilter;
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// One immutable, fully-loaded configuration instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Name of the broker connection to publish on
    pub connection: String,

    /// Exchange to publish to
    pub exchange: String,

    /// Subscribe to the management-event stream at load
    pub publish_ami_events: bool,

    /// Subscribe to the all-channel event stream at load
    pub publish_channel_events: bool,

    /// Exclude-list and `ChannelVarset` allow-list
    pub filter: EventFilter,

    /// Periodically register every application known to the host
    pub auto_register_applications: bool,

    /// Period of the application registration job
    pub application_poll_interval: Duration,
}

impl Default for BridgeConfig {
    /// An unconfigured snapshot: publishing fails with `NotConfigured`
    fn default() -> Self {
        Self {
            connection: String::new(),
            exchange: String::new(),
            publish_ami_events: true,
            publish_channel_events: true,
            filter: EventFilter::default(),
            auto_register_applications: false,
            application_poll_interval: Duration::from_millis(default_poll_interval_ms()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    global: GlobalSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GlobalSection {
    #[serde(default)]
    connection: Option<String>,
    #[serde(default)]
    exchange: Option<String>,
    #[serde(default = "default_true")]
    publish_ami_events: bool,
    #[serde(default = "default_true")]
    publish_channel_events: bool,
    #[serde(default)]
    exclude_events: String,
    #[serde(default)]
    include_channelvarset_events: String,
    #[serde(default)]
    auto_register_applications: bool,
    #[serde(default = "default_poll_interval_ms")]
    application_poll_interval_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl BridgeConfig {
    /// Create a snapshot with the required fields and defaults for the rest
    pub fn new(connection: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            exchange: exchange.into(),
            ..Default::default()
        }
    }

    /// Replace the filter sets
    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Toggle the two bus-wide subscriptions
    pub fn with_streams(mut self, ami: bool, channel: bool) -> Self {
        self.publish_ami_events = ami;
        self.publish_channel_events = channel;
        self
    }

    /// Enable periodic registration of all host applications
    pub fn with_auto_registration(mut self, interval: Duration) -> Self {
        self.auto_register_applications = true;
        self.application_poll_interval = interval;
        self
    }

    /// Parse and validate a TOML configuration document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        let global = file.global;

        let config = Self {
            connection: trimmed(global.connection),
            exchange: trimmed(global.exchange),
            publish_ami_events: global.publish_ami_events,
            publish_channel_events: global.publish_channel_events,
            filter: EventFilter::from_lists(
                &global.exclude_events,
                &global.include_channelvarset_events,
            ),
            auto_register_applications: global.auto_register_applications,
            application_poll_interval: Duration::from_millis(global.application_poll_interval_ms),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check required fields and the registration period
    ///
    /// Run on every snapshot before it is installed, whether it was parsed or
    /// built in code.
    pub fn validate(&self) -> Result<()> {
        required(&self.connection, "connection")?;
        required(&self.exchange, "exchange")?;

        if self.application_poll_interval.is_zero() {
            return Err(BridgeError::Config(
                "application_poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Read and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Check that publishing has a connection and an exchange to use
    pub fn ensure_publishable(&self) -> Result<()> {
        if self.connection.is_empty() {
            return Err(BridgeError::NotConfigured("connection name is unset".to_string()));
        }
        if self.exchange.is_empty() {
            return Err(BridgeError::NotConfigured("exchange name is unset".to_string()));
        }
        Ok(())
    }
}

fn trimmed(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

fn required(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BridgeError::Config(format!(
            "'{}' is required in the [global] section",
            field
        )));
    }
    Ok(())
}

/// Shared handle to the current configuration snapshot
///
/// Readers take an `Arc` once per operation; `replace` swaps the pointer
/// without disturbing snapshots already handed out.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<BridgeConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// The snapshot active right now
    pub fn snapshot(&self) -> Arc<BridgeConfig> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Atomically install a new snapshot, returning the previous one
    pub fn replace(&self, config: BridgeConfig) -> Arc<BridgeConfig> {
        let next = Arc::new(config);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, next)
    }
}
