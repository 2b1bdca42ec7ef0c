//! Event subsystem.
//!
//! # Data Flow
//! ```text
//! EventRouter::on / once (filter, listener)
//!     → resolve NetworkRef via NetworkResolver
//!     → block filter → finality.rs (FinalityRegistry, shared per provider)
//!     → log filter   → eventlog.rs (one LogSubscription per call)
//!                          → socket.rs (SocketConnector)
//!
//! EventRouter::off(SubscriptionId)
//!     → close the log subscription, or unregister the finality listener
//! ```
//!
//! # Design Decisions
//! - Subscriptions are removed by the id returned from `on`/`once`
//! - Block events fire once per registration, so `on` rejects block filters
//! - Each log subscription owns its own socket

pub mod eventlog;
pub mod finality;
pub mod socket;

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::{BtpError, BtpResult};
use crate::provider::query::NetworkResolver;
use crate::provider::types::{BlockFilter, EventLog, LogFilter, Network, NetworkRef};

pub use eventlog::{LogListener, LogSubscription, LogTarget};
pub use finality::{FinalityListener, FinalityRegistry};
pub use socket::{SocketChannel, SocketConnector, SocketEvent, WsConnector};

/// Opaque handle identifying one `on`/`once` registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Block,
    Log,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventFilter {
    Block(BlockFilter),
    Log(LogFilter),
}

impl EventFilter {
    pub fn event_type(&self) -> EventType {
        match self {
            EventFilter::Block(_) => EventType::Block,
            EventFilter::Log(_) => EventType::Log,
        }
    }
}

impl From<BlockFilter> for EventFilter {
    fn from(filter: BlockFilter) -> Self {
        EventFilter::Block(filter)
    }
}

impl From<LogFilter> for EventFilter {
    fn from(filter: LogFilter) -> Self {
        EventFilter::Log(filter)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Finalized {
        network: String,
        id: String,
        height: u64,
    },
    Log(EventLog),
}

pub type EventListener = Box<dyn FnMut(BtpResult<Event>) + Send + 'static>;

/// Outward-facing `on` / `once` / `off` surface.
pub struct EventRouter {
    resolver: Arc<dyn NetworkResolver>,
    finality: FinalityRegistry,
    connector: Arc<dyn SocketConnector>,
    ws_base: String,
    logs: DashMap<SubscriptionId, LogSubscription>,
}

impl EventRouter {
    pub fn new(
        resolver: Arc<dyn NetworkResolver>,
        finality: FinalityRegistry,
        connector: Arc<dyn SocketConnector>,
        ws_base: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            finality,
            connector,
            ws_base: ws_base.into(),
            logs: DashMap::new(),
        }
    }

    pub fn finality(&self) -> &FinalityRegistry {
        &self.finality
    }

    /// Subscribe until `off`. Block filters are rejected.
    pub async fn on(
        &self,
        filter: impl Into<EventFilter>,
        listener: EventListener,
    ) -> BtpResult<SubscriptionId> {
        match filter.into() {
            EventFilter::Block(_) => Err(BtpError::UnsupportedOperation(
                "block finality fires once; use `once`".into(),
            )),
            EventFilter::Log(filter) => self.subscribe_log(filter, listener, false).await,
        }
    }

    /// Subscribe for a single notification.
    pub async fn once(
        &self,
        filter: impl Into<EventFilter>,
        listener: EventListener,
    ) -> BtpResult<SubscriptionId> {
        match filter.into() {
            EventFilter::Block(filter) => self.register_block(filter, listener).await,
            EventFilter::Log(filter) => self.subscribe_log(filter, listener, true).await,
        }
    }

    /// Remove a subscription by the id `on`/`once` returned.
    pub fn off(&self, subscription: SubscriptionId) -> BtpResult<()> {
        self.prune();
        if let Some((_, mut log)) = self.logs.remove(&subscription) {
            log.unsubscribe();
            debug!(subscription = %subscription, "Removed log subscription");
            return Ok(());
        }
        if self.finality.unregister(subscription) {
            return Ok(());
        }
        Err(BtpError::IllegalState(format!(
            "no such subscription - id({subscription})"
        )))
    }

    /// Remove every subscription of `event_type`.
    pub fn off_all(&self, event_type: EventType) -> usize {
        match event_type {
            EventType::Block => self.finality.clear(),
            EventType::Log => {
                let ids: Vec<SubscriptionId> = self.logs.iter().map(|entry| *entry.key()).collect();
                ids.iter()
                    .filter_map(|id| self.logs.remove(id))
                    .map(|(_, mut log)| log.unsubscribe())
                    .count()
            }
        }
    }

    /// Live log subscriptions.
    pub fn log_subscriptions(&self) -> usize {
        self.prune();
        self.logs.len()
    }

    async fn resolve(&self, network: &NetworkRef) -> BtpResult<Network> {
        match network {
            NetworkRef::Resolved(network) => Ok(network.clone()),
            NetworkRef::Name(name) => self.resolver.resolve_network(name).await,
        }
    }

    async fn register_block(
        &self,
        filter: BlockFilter,
        mut listener: EventListener,
    ) -> BtpResult<SubscriptionId> {
        let network = self.resolve(&filter.network).await?;
        let event = Event::Finalized {
            network: network.name.clone(),
            id: filter.id.clone(),
            height: filter.height,
        };
        Ok(self.finality.register(
            &network.name,
            &filter.id,
            filter.height,
            Box::new(move |error| {
                listener(match error {
                    None => Ok(event),
                    Some(e) => Err(e),
                })
            }),
        ))
    }

    async fn subscribe_log(
        &self,
        filter: LogFilter,
        mut listener: EventListener,
        once: bool,
    ) -> BtpResult<SubscriptionId> {
        let network = self.resolve(&filter.network).await?;
        let target = LogTarget {
            network,
            service: filter.service,
            event: filter.event,
        };
        let subscription = LogSubscription::spawn(
            self.connector.clone(),
            &self.ws_base,
            target,
            Box::new(move |result| listener(result.map(Event::Log))),
            once,
        );
        let id = subscription.id();
        self.prune();
        self.logs.insert(id, subscription);
        Ok(id)
    }

    fn prune(&self) {
        self.logs.retain(|_, subscription| !subscription.is_finished());
    }
}
