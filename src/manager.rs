//! Subscription lifecycle: load, reload, unload and per-application subscriptions
//!
//! `SubscriptionManager` owns every live bus subscription. Each subscription
//! is drained by its own dispatch task that feeds the [`EventTransformer`].
//! Per-event failures are logged inside that task and never stop it.

use crate::broker::ConnectionResolver;
use crate::config::{BridgeConfig, ConfigHandle};
use crate::error::{BridgeError, Result};
use crate::publisher::Publisher;
use crate::scheduler::Scheduler;
use crate::source::{BusSubscription, EventSource, SubscriptionId, Topic};
use crate::transform::{EventClass, EventTransformer, Outcome};
use futures::future::join_all;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, Weak};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Module lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Unloaded,
    Loading,
    Active,
    Unloading,
}

impl ModuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Unloaded => "Unloaded",
            ModuleState::Loading => "Loading",
            ModuleState::Active => "Active",
            ModuleState::Unloading => "Unloading",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subscription and the task draining it
struct Dispatch {
    id: SubscriptionId,
    task: JoinHandle<()>,
}

/// Subscriptions created at load
#[derive(Default)]
struct Live {
    manager: Option<Dispatch>,
    channel: Option<Dispatch>,
    scheduler: Option<Scheduler>,
}

struct Inner {
    source: Arc<dyn EventSource>,
    config: ConfigHandle,
    transformer: EventTransformer,
    state: std::sync::Mutex<ModuleState>,
    live: Mutex<Live>,
    applications: Mutex<HashMap<String, Dispatch>>,
}

/// Owns the bridge's bus subscriptions
///
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<Inner>,
}

impl SubscriptionManager {
    /// Create an unloaded manager
    pub fn new(source: Arc<dyn EventSource>, connections: Arc<dyn ConnectionResolver>) -> Self {
        let config = ConfigHandle::default();
        let transformer = EventTransformer::new(Publisher::new(config.clone(), connections));
        Self {
            inner: Arc::new(Inner {
                source,
                config,
                transformer,
                state: std::sync::Mutex::new(ModuleState::Unloaded),
                live: Mutex::new(Live::default()),
                applications: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn state(&self) -> ModuleState {
        self.inner.state()
    }

    /// The configuration snapshot active right now
    pub fn config(&self) -> Arc<BridgeConfig> {
        self.inner.config.snapshot()
    }

    pub fn config_handle(&self) -> &ConfigHandle {
        &self.inner.config
    }

    pub fn transformer(&self) -> &EventTransformer {
        &self.inner.transformer
    }

    /// Load the module: install `config` and create its subscriptions
    ///
    /// An invalid `config` is rejected before anything is installed.
    /// On any failure every partially created subscription is torn down and
    /// the manager returns to `Unloaded`.
    pub async fn load(&self, config: BridgeConfig) -> Result<()> {
        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "stasis-amqp failed to load");
            return Err(e);
        }
        self.inner
            .transition(ModuleState::Unloaded, ModuleState::Loading)?;

        self.inner.config.replace(config);
        let snapshot = self.inner.config.snapshot();

        match self.inner.start(&snapshot).await {
            Ok(live) => {
                *self.inner.live.lock().await = live;
                self.inner.set_state(ModuleState::Active);
                tracing::info!(
                    source = self.inner.source.name(),
                    connection = %snapshot.connection,
                    exchange = %snapshot.exchange,
                    ami = snapshot.publish_ami_events,
                    channel = snapshot.publish_channel_events,
                    "stasis-amqp loaded"
                );
                Ok(())
            }
            Err(e) => {
                self.inner.config.replace(BridgeConfig::default());
                self.inner.set_state(ModuleState::Unloaded);
                tracing::error!(error = %e, "stasis-amqp failed to load");
                Err(e)
            }
        }
    }

    /// Read a configuration file and load the module with it
    pub async fn load_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let config = BridgeConfig::from_file(path)?;
        self.load(config).await
    }

    /// Swap in a new configuration snapshot
    ///
    /// Filters, connection and exchange apply to the next event. Bus
    /// subscriptions are not recreated: stream flag changes only take effect
    /// after an unload/load cycle.
    pub async fn reload(&self, config: BridgeConfig) -> Result<()> {
        self.inner.ensure_active()?;
        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration rejected; keeping the current one");
            return Err(e);
        }

        let previous = self.inner.config.replace(config);
        let current = self.inner.config.snapshot();

        if previous.publish_ami_events != current.publish_ami_events
            || previous.publish_channel_events != current.publish_channel_events
            || previous.auto_register_applications != current.auto_register_applications
        {
            tracing::warn!(
                ami = current.publish_ami_events,
                channel = current.publish_channel_events,
                auto_register = current.auto_register_applications,
                "Subscription settings changed; they apply after the module is reloaded from scratch"
            );
        }

        tracing::info!(
            connection = %current.connection,
            exchange = %current.exchange,
            excluded = current.filter.excluded_events().len(),
            included_variables = current.filter.included_variables().len(),
            "Configuration reloaded"
        );
        Ok(())
    }

    /// Read a configuration file and swap it in
    pub async fn reload_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let config = BridgeConfig::from_file(path)?;
        self.reload(config).await
    }

    /// Unload the module
    ///
    /// The scheduler is destroyed first, then each subscription is
    /// unsubscribed and its dispatch task joined. Applications are
    /// unregistered concurrently.
    pub async fn unload(&self) -> Result<()> {
        self.inner
            .transition(ModuleState::Active, ModuleState::Unloading)?;

        let snapshot = self.inner.config.snapshot();
        let live = std::mem::take(&mut *self.inner.live.lock().await);
        tracing::debug!(
            ami = snapshot.publish_ami_events,
            channel = snapshot.publish_channel_events,
            "Tearing down subscriptions"
        );
        self.inner.teardown(live).await;

        let applications = std::mem::take(&mut *self.inner.applications.lock().await);
        join_all(applications.into_iter().map(|(name, dispatch)| {
            let inner = &self.inner;
            async move { inner.unregister_and_join(&name, dispatch).await }
        }))
        .await;

        self.inner.set_state(ModuleState::Unloaded);
        tracing::info!("stasis-amqp unloaded");
        Ok(())
    }

    /// Start forwarding events of `application`
    ///
    /// Subscribing an application that is already subscribed is a no-op.
    pub async fn subscribe_application(&self, application: &str) -> Result<()> {
        self.inner.subscribe_application(application).await
    }

    /// Stop forwarding events of `application`
    pub async fn unsubscribe_application(&self, application: &str) -> Result<()> {
        if application.is_empty() {
            return Err(BridgeError::InvalidInput("empty application name".to_string()));
        }
        self.inner.ensure_active()?;

        let dispatch = self.inner.applications.lock().await.remove(application);
        match dispatch {
            Some(dispatch) => {
                self.inner.unregister_and_join(application, dispatch).await;
                tracing::info!(application = %application, "Application unsubscribed");
            }
            None => {
                tracing::debug!(application = %application, "Application was not subscribed");
            }
        }
        Ok(())
    }

    /// Sorted names of subscribed applications
    pub async fn applications(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.applications.lock().await.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Inner {
    fn state(&self) -> ModuleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: ModuleState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn transition(&self, from: ModuleState, to: ModuleState) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != from {
            return Err(BridgeError::InvalidState {
                expected: from.as_str(),
                actual: state.as_str(),
            });
        }
        *state = to;
        tracing::debug!(from = %from, to = %to, "Module state changed");
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state() {
            ModuleState::Active => Ok(()),
            other => Err(BridgeError::InvalidState {
                expected: ModuleState::Active.as_str(),
                actual: other.as_str(),
            }),
        }
    }

    /// Create the load-time subscriptions for `config`
    async fn start(self: &Arc<Self>, config: &BridgeConfig) -> Result<Live> {
        let mut live = Live::default();

        if config.publish_ami_events {
            match self.source.subscribe(Topic::Manager).await {
                Ok(sub) => live.manager = Some(self.spawn_dispatch(sub, EventClass::Manager)),
                Err(e) => {
                    self.teardown(live).await;
                    return Err(e);
                }
            }
        }

        let mut scheduler = Scheduler::start();
        if config.auto_register_applications {
            let weak = Arc::downgrade(self);
            scheduler.schedule_every(
                "register-applications",
                config.application_poll_interval,
                move || register_known_applications(weak.clone()),
            );
        }
        live.scheduler = Some(scheduler);

        if config.publish_channel_events {
            match self.source.subscribe(Topic::ChannelAll).await {
                Ok(sub) => live.channel = Some(self.spawn_dispatch(sub, EventClass::Channel)),
                Err(e) => {
                    self.teardown(live).await;
                    return Err(e);
                }
            }
        }

        Ok(live)
    }

    async fn teardown(&self, live: Live) {
        if let Some(scheduler) = live.scheduler {
            scheduler.destroy().await;
        }
        if let Some(dispatch) = live.manager {
            self.unsubscribe_and_join(dispatch).await;
        }
        if let Some(dispatch) = live.channel {
            self.unsubscribe_and_join(dispatch).await;
        }
    }

    async fn subscribe_application(&self, application: &str) -> Result<()> {
        if application.is_empty() {
            return Err(BridgeError::InvalidInput("empty application name".to_string()));
        }
        self.ensure_active()?;

        let mut applications = self.applications.lock().await;
        if applications.contains_key(application) {
            tracing::debug!(application = %application, "Application already subscribed");
            return Ok(());
        }

        let sub = self.source.register_application(application).await?;
        let dispatch = self.spawn_dispatch(sub, EventClass::Application(application.to_string()));
        applications.insert(application.to_string(), dispatch);

        tracing::info!(application = %application, "Application subscribed");
        Ok(())
    }

    fn spawn_dispatch(&self, mut subscription: Box<dyn BusSubscription>, class: EventClass) -> Dispatch {
        let id = subscription.id();
        let transformer = self.transformer.clone();

        let task = tokio::spawn(async move {
            while let Some(message) = subscription.next().await {
                let is_final = message.is_final();
                match transformer.handle(&class, message).await {
                    Ok(Outcome::Published(routing_key)) => {
                        tracing::trace!(class = %class, routing_key = %routing_key, "Event forwarded");
                    }
                    Ok(Outcome::Dropped(_)) => {}
                    Err(e @ BridgeError::MalformedEvent(_)) => {
                        tracing::debug!(class = %class, error = %e, "Skipping malformed event");
                    }
                    // Already logged by the publisher
                    Err(BridgeError::ConnectionUnavailable(_)) | Err(BridgeError::BrokerPublish { .. }) => {}
                    Err(e) => {
                        tracing::warn!(class = %class, error = %e, "Event dropped");
                    }
                }
                if is_final {
                    break;
                }
            }
            tracing::debug!(class = %class, id = %id, "Dispatch finished");
        });

        Dispatch { id, task }
    }

    async fn unsubscribe_and_join(&self, dispatch: Dispatch) {
        if let Err(e) = self.source.unsubscribe(dispatch.id).await {
            tracing::warn!(id = %dispatch.id, error = %e, "Unsubscribe failed; aborting dispatch");
            dispatch.task.abort();
        }
        join(dispatch.task).await;
    }

    async fn unregister_and_join(&self, application: &str, dispatch: Dispatch) {
        if let Err(e) = self.source.unregister_application(application).await {
            tracing::warn!(
                application = %application,
                error = %e,
                "Unregister failed; aborting dispatch"
            );
            dispatch.task.abort();
        }
        join(dispatch.task).await;
    }
}

async fn join(task: JoinHandle<()>) {
    if let Err(e) = task.await {
        if !e.is_cancelled() {
            tracing::warn!(error = %e, "Dispatch task panicked");
        }
    }
}

/// Register every host application that is not subscribed yet
async fn register_known_applications(inner: Weak<Inner>) {
    let Some(inner) = inner.upgrade() else {
        return;
    };

    let names = match inner.source.applications().await {
        Ok(names) => names,
        Err(e) => {
            tracing::error!(error = %e, "Unable to retrieve registered applications");
            return;
        }
    };

    for name in names {
        if inner.applications.lock().await.contains_key(&name) {
            continue;
        }
        if let Err(e) = inner.subscribe_application(&name).await {
            tracing::debug!(application = %name, error = %e, "Automatic registration failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::source::memory::MemoryEventSource;
    use std::time::Duration;

    fn setup() -> (SubscriptionManager, MemoryEventSource, Arc<MemoryBroker>) {
        let source = MemoryEventSource::new();
        let broker = Arc::new(MemoryBroker::new());
        broker.add_connection("default");
        let manager = SubscriptionManager::new(Arc::new(source.clone()), broker.clone());
        (manager, source, broker)
    }

    #[tokio::test]
    async fn test_load_creates_both_subscriptions() {
        let (manager, source, _broker) = setup();
        assert_eq!(manager.state(), ModuleState::Unloaded);

        manager.load(BridgeConfig::new("default", "xivo")).await.unwrap();
        assert_eq!(manager.state(), ModuleState::Active);
        assert_eq!(source.subscriber_count(Topic::Manager), 1);
        assert_eq!(source.subscriber_count(Topic::ChannelAll), 1);

        manager.unload().await.unwrap();
        assert_eq!(manager.state(), ModuleState::Unloaded);
        assert_eq!(source.subscriber_count(Topic::Manager), 0);
        assert_eq!(source.subscriber_count(Topic::ChannelAll), 0);
    }

    #[tokio::test]
    async fn test_load_respects_stream_flags() {
        let (manager, source, _broker) = setup();
        manager
            .load(BridgeConfig::new("default", "xivo").with_streams(false, true))
            .await
            .unwrap();
        assert_eq!(source.subscriber_count(Topic::Manager), 0);
        assert_eq!(source.subscriber_count(Topic::ChannelAll), 1);
        manager.unload().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_load_tears_down_partial_subscriptions() {
        let (manager, source, _broker) = setup();
        source.refuse_topic(Topic::ChannelAll);

        let err = manager
            .load(BridgeConfig::new("default", "xivo"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Subscribe { .. }));
        assert_eq!(manager.state(), ModuleState::Unloaded);
        assert_eq!(source.subscriber_count(Topic::Manager), 0);
        assert!(manager.config().connection.is_empty());
    }

    #[tokio::test]
    async fn test_double_load_rejected() {
        let (manager, _source, _broker) = setup();
        manager.load(BridgeConfig::new("default", "xivo")).await.unwrap();
        let err = manager
            .load(BridgeConfig::new("default", "xivo"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidState { actual: "Active", .. }));
        manager.unload().await.unwrap();
    }

    #[tokio::test]
    async fn test_unload_when_unloaded_rejected() {
        let (manager, _source, _broker) = setup();
        assert!(matches!(
            manager.unload().await,
            Err(BridgeError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_reload_swaps_snapshot_without_resubscribing() {
        let (manager, source, _broker) = setup();
        manager
            .load(BridgeConfig::new("default", "first").with_streams(false, true))
            .await
            .unwrap();

        manager
            .reload(BridgeConfig::new("default", "second").with_streams(true, true))
            .await
            .unwrap();
        assert_eq!(manager.config().exchange, "second");
        assert_eq!(source.subscriber_count(Topic::Manager), 0);

        manager.unload().await.unwrap();
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_config() {
        let (manager, source, _broker) = setup();
        source.add_application("ivr");

        let err = manager
            .load(BridgeConfig::new("default", "xivo").with_auto_registration(Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
        assert_eq!(manager.state(), ModuleState::Unloaded);
        assert_eq!(source.subscriber_count(Topic::Manager), 0);
        assert_eq!(source.subscriber_count(Topic::ChannelAll), 0);

        let err = manager.load(BridgeConfig::default()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
        assert_eq!(manager.state(), ModuleState::Unloaded);

        manager.load(BridgeConfig::new("default", "xivo")).await.unwrap();
        assert_eq!(manager.state(), ModuleState::Active);
        manager.unload().await.unwrap();
    }

    #[tokio::test]
    async fn test_reload_rejects_invalid_config() {
        let (manager, _source, _broker) = setup();
        manager.load(BridgeConfig::new("default", "first")).await.unwrap();

        let err = manager
            .reload(BridgeConfig::new("default", "second").with_auto_registration(Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));

        let err = manager.reload(BridgeConfig::new("", "second")).await.unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));

        assert_eq!(manager.config().exchange, "first");
        assert_eq!(manager.state(), ModuleState::Active);
        manager.unload().await.unwrap();
    }

    #[tokio::test]
    async fn test_unload_releases_subscriptions_after_flags_turned_off() {
        let (manager, source, _broker) = setup();
        manager.load(BridgeConfig::new("default", "xivo")).await.unwrap();

        manager
            .reload(BridgeConfig::new("default", "xivo").with_streams(false, false))
            .await
            .unwrap();
        assert_eq!(source.subscriber_count(Topic::Manager), 1);
        assert_eq!(source.subscriber_count(Topic::ChannelAll), 1);

        manager.unload().await.unwrap();
        assert_eq!(source.subscriber_count(Topic::Manager), 0);
        assert_eq!(source.subscriber_count(Topic::ChannelAll), 0);
    }

    #[tokio::test]
    async fn test_reload_requires_active() {
        let (manager, _source, _broker) = setup();
        assert!(matches!(
            manager.reload(BridgeConfig::new("default", "xivo")).await,
            Err(BridgeError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_application_subscription_lifecycle() {
        let (manager, source, _broker) = setup();
        assert!(manager.subscribe_application("A").await.is_err());

        manager.load(BridgeConfig::new("default", "xivo")).await.unwrap();
        manager.subscribe_application("B").await.unwrap();
        manager.subscribe_application("A").await.unwrap();
        manager.subscribe_application("A").await.unwrap();
        assert_eq!(manager.applications().await, vec!["A", "B"]);
        assert!(source.is_registered("A"));

        manager.unsubscribe_application("A").await.unwrap();
        manager.unsubscribe_application("unknown").await.unwrap();
        assert!(!source.is_registered("A"));
        assert_eq!(manager.applications().await, vec!["B"]);

        manager.unload().await.unwrap();
        assert!(!source.is_registered("B"));
        assert!(manager.applications().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_application_name_rejected() {
        let (manager, _source, _broker) = setup();
        manager.load(BridgeConfig::new("default", "xivo")).await.unwrap();
        assert!(matches!(
            manager.subscribe_application("").await,
            Err(BridgeError::InvalidInput(_))
        ));
        assert!(matches!(
            manager.unsubscribe_application("").await,
            Err(BridgeError::InvalidInput(_))
        ));
        manager.unload().await.unwrap();
    }

    #[tokio::test]
    async fn test_auto_registration_picks_up_host_applications() {
        let (manager, source, _broker) = setup();
        source.add_application("ivr");

        manager
            .load(BridgeConfig::new("default", "xivo").with_auto_registration(Duration::from_millis(10)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.applications().await, vec!["ivr"]);

        source.add_application("queue");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.applications().await, vec!["ivr", "queue"]);

        manager.unload().await.unwrap();
        assert!(!source.is_registered("ivr"));
    }
}
