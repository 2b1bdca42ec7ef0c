//! Block-finality confirmation registry.
//!
//! # Responsibilities
//! - Keep, per network, a height-ordered queue of `(id, height)` checks
//! - Run exactly one polling loop per non-empty queue
//! - Notify every listener of a check exactly once
//!
//! # Data Flow
//! ```text
//! register(network, id, height, listener)
//!     → queue[network] (sorted by height, one item per (id, height))
//!     → poll loop (spawned on first item)
//!
//! poll loop, per round:
//!     head item → BlockFinality::get_block_finality
//!         true / InconsistentBlock / other error
//!             → remove item, notify listeners, re-poll immediately
//!         false
//!             → sleep poll interval
//!     queue empty → loop exits
//! ```
//!
//! # Design Decisions
//! - Queue state sits behind a `std::sync::Mutex` never held across `.await`
//! - Listeners run after the lock is released
//! - After a poll the item is looked up again by `(id, height)`
//! - Non-fork finality errors resolve the head item with that error

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::BtpError;
use crate::events::SubscriptionId;
use crate::observability::metrics;
use crate::provider::query::BlockFinality;

/// Receives `None` once the block is final, or the error that resolved it.
pub type FinalityListener = Box<dyn FnOnce(Option<BtpError>) + Send + 'static>;

struct PoolItem {
    id: String,
    height: u64,
    listeners: Vec<(SubscriptionId, FinalityListener)>,
}

struct NetworkQueue {
    items: Vec<PoolItem>,
    generation: u64,
    poller: Option<JoinHandle<()>>,
}

struct RegistryState {
    queues: HashMap<String, NetworkQueue>,
    next_generation: u64,
}

struct RegistryInner {
    oracle: Arc<dyn BlockFinality>,
    interval: Duration,
    state: Mutex<RegistryState>,
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Listeners never run under the lock, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Per-network finality polling with listener fan-out.
///
/// Cloning yields another handle to the same registry. Registration must
/// happen inside a Tokio runtime since it may spawn the polling task.
#[derive(Clone)]
pub struct FinalityRegistry {
    inner: Arc<RegistryInner>,
}

impl FinalityRegistry {
    pub fn new(oracle: Arc<dyn BlockFinality>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                oracle,
                interval,
                state: Mutex::new(RegistryState {
                    queues: HashMap::new(),
                    next_generation: 0,
                }),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Queue a finality check for `(id, height)` on `network`.
    pub fn register(
        &self,
        network: &str,
        id: &str,
        height: u64,
        listener: FinalityListener,
    ) -> SubscriptionId {
        let subscription = SubscriptionId::new();
        let mut state = self.inner.lock();
        let RegistryState {
            queues,
            next_generation,
        } = &mut *state;

        let queue = queues.entry(network.to_string()).or_insert_with(|| {
            *next_generation += 1;
            NetworkQueue {
                items: Vec::new(),
                generation: *next_generation,
                poller: None,
            }
        });

        match queue
            .items
            .iter_mut()
            .find(|item| item.id == id && item.height == height)
        {
            Some(item) => item.listeners.push((subscription, listener)),
            None => {
                let position = queue
                    .items
                    .iter()
                    .position(|item| item.height > height)
                    .unwrap_or(queue.items.len());
                queue.items.insert(
                    position,
                    PoolItem {
                        id: id.to_string(),
                        height,
                        listeners: vec![(subscription, listener)],
                    },
                );
            }
        }
        metrics::record_queue_depth(network, queue.items.len());
        debug!(
            network = %network,
            id = %id,
            height,
            subscription = %subscription,
            "Registered finality listener"
        );

        if queue.poller.is_none() {
            let task = poll_loop(
                Arc::downgrade(&self.inner),
                network.to_string(),
                queue.generation,
            );
            queue.poller = Some(tokio::spawn(task));
            debug!(network = %network, "Started finality polling");
        }
        subscription
    }

    /// Remove one listener. Returns `false` if it is not registered.
    ///
    /// An item left without listeners is dropped; an empty queue stops its loop.
    pub fn unregister(&self, subscription: SubscriptionId) -> bool {
        let mut state = self.inner.lock();
        let found = state.queues.iter().find_map(|(network, queue)| {
            queue.items.iter().enumerate().find_map(|(index, item)| {
                item.listeners
                    .iter()
                    .position(|(id, _)| *id == subscription)
                    .map(|position| (network.clone(), index, position))
            })
        });
        let Some((network, index, position)) = found else {
            return false;
        };

        if let Some(queue) = state.queues.get_mut(&network) {
            let item = &mut queue.items[index];
            drop(item.listeners.remove(position));
            if item.listeners.is_empty() {
                queue.items.remove(index);
            }
            metrics::record_queue_depth(&network, queue.items.len());
            if queue.items.is_empty() {
                if let Some(poller) = queue.poller.take() {
                    poller.abort();
                }
                state.queues.remove(&network);
                debug!(network = %network, "Stopped finality polling");
            }
        }
        debug!(network = %network, subscription = %subscription, "Unregistered finality listener");
        true
    }

    /// Stop the loop and drop every pending check for `network`.
    ///
    /// Dropped listeners are never invoked. Returns how many were dropped.
    pub fn unregister_all(&self, network: &str) -> usize {
        let mut state = self.inner.lock();
        let Some(mut queue) = state.queues.remove(network) else {
            return 0;
        };
        if let Some(poller) = queue.poller.take() {
            poller.abort();
        }
        metrics::record_queue_depth(network, 0);
        let dropped: usize = queue.items.iter().map(|item| item.listeners.len()).sum();
        debug!(network = %network, dropped, "Dropped finality queue");
        dropped
    }

    /// [`unregister_all`](Self::unregister_all) for every network.
    pub fn clear(&self) -> usize {
        let networks: Vec<String> = self.inner.lock().queues.keys().cloned().collect();
        networks.iter().map(|n| self.unregister_all(n)).sum()
    }

    /// Pending `(id, height)` checks for `network`, in polling order.
    pub fn pending(&self, network: &str) -> Vec<(String, u64)> {
        self.inner
            .lock()
            .queues
            .get(network)
            .map(|queue| {
                queue
                    .items
                    .iter()
                    .map(|item| (item.id.clone(), item.height))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn listener_count(&self, network: &str) -> usize {
        self.inner
            .lock()
            .queues
            .get(network)
            .map(|queue| queue.items.iter().map(|item| item.listeners.len()).sum())
            .unwrap_or(0)
    }

    pub fn is_polling(&self, network: &str) -> bool {
        self.inner
            .lock()
            .queues
            .get(network)
            .is_some_and(|queue| queue.poller.is_some())
    }

    pub fn contains(&self, subscription: SubscriptionId) -> bool {
        self.inner.lock().queues.values().any(|queue| {
            queue
                .items
                .iter()
                .any(|item| item.listeners.iter().any(|(id, _)| *id == subscription))
        })
    }
}

/// Head of the queue when `generation` still owns it.
fn head(inner: &RegistryInner, network: &str, generation: u64) -> Option<(String, u64)> {
    let mut state = inner.lock();
    let queue = state.queues.get_mut(network)?;
    if queue.generation != generation {
        return None;
    }
    match queue.items.first() {
        Some(item) => Some((item.id.clone(), item.height)),
        None => {
            queue.poller = None;
            state.queues.remove(network);
            None
        }
    }
}

/// Remove `(id, height)` and hand back its listeners.
fn take_item(
    inner: &RegistryInner,
    network: &str,
    generation: u64,
    id: &str,
    height: u64,
) -> Vec<(SubscriptionId, FinalityListener)> {
    let mut state = inner.lock();
    let Some(queue) = state.queues.get_mut(network) else {
        return Vec::new();
    };
    if queue.generation != generation {
        return Vec::new();
    }
    let Some(position) = queue
        .items
        .iter()
        .position(|item| item.id == id && item.height == height)
    else {
        return Vec::new();
    };
    let item = queue.items.remove(position);
    metrics::record_queue_depth(network, queue.items.len());
    item.listeners
}

async fn poll_loop(registry: Weak<RegistryInner>, network: String, generation: u64) {
    loop {
        let Some(inner) = registry.upgrade() else {
            return;
        };
        let Some((id, height)) = head(&inner, &network, generation) else {
            debug!(network = %network, "Finality queue drained");
            return;
        };

        metrics::record_finality_poll(&network);
        let outcome = inner.oracle.get_block_finality(&network, &id, height).await;

        let (error, label) = match outcome {
            Ok(false) => {
                let interval = inner.interval;
                drop(inner);
                tokio::time::sleep(interval).await;
                continue;
            }
            Ok(true) => (None, "finalized"),
            Err(e) if e.is_inconsistent_block() => (Some(e), "inconsistent"),
            Err(e) => {
                warn!(network = %network, id = %id, height, error = %e, "Finality query failed");
                (Some(e), "error")
            }
        };

        let listeners = take_item(&inner, &network, generation, &id, height);
        drop(inner);
        debug!(
            network = %network,
            id = %id,
            height,
            outcome = label,
            listeners = listeners.len(),
            "Block resolved"
        );
        metrics::record_finality_notification(&network, label, listeners.len());
        for (_, listener) in listeners {
            listener(error.clone());
        }
        tokio::task::yield_now().await;
    }
}
