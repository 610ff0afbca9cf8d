//! In-memory transport for testing and single-process deployments.
//!
//! `InMemoryTransport` is a process-local broker with Redis pub/sub
//! semantics:
//! - Thread-safe and clone-friendly (clones share the same broker)
//! - Glob pattern subscriptions, one message per matching pattern
//! - Subscription confirmations and remaining-subscription counts are
//!   delivered on the subscriber's own queue, in order with messages
//! - Publishes can be kept in an append-only log for inspection; the log is
//!   off unless the transport was created with
//!   [`InMemoryTransport::recording`]
//!
//! It also tracks pooled connection checkouts and exposes fault switches so
//! tests can exercise the bus's failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{glob_match, Connection, Notification, Subscription, Transport, TransportError};

enum Delivery {
    Notification(Notification),
    Fault(TransportError),
}

struct SubscriberSlot {
    patterns: Vec<String>,
    tx: Sender<Delivery>,
}

#[derive(Default)]
struct BrokerState {
    subscribers: HashMap<u64, SubscriberSlot>,
    log: Vec<(String, Vec<u8>)>,
}

#[derive(Default)]
struct Broker {
    state: Mutex<BrokerState>,
    next_subscriber: AtomicU64,
    connections_acquired: AtomicUsize,
    connections_released: AtomicUsize,
    subscriptions_released: AtomicUsize,
    record_publishes: AtomicBool,
    fail_publishes: AtomicBool,
    fail_subscribes: AtomicBool,
    suppress_subscribe_acks: AtomicBool,
    suppress_unsubscribe_acks: AtomicBool,
}

impl Broker {
    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn deliver(&self, channel: &str, payload: &[u8]) -> usize {
        let mut state = self.state();
        if self.record_publishes.load(Ordering::SeqCst) {
            state.log.push((channel.to_string(), payload.to_vec()));
        }

        let mut receivers = 0;
        for slot in state.subscribers.values() {
            for pattern in slot.patterns.iter().filter(|p| glob_match(p, channel)) {
                let message = Notification::Message {
                    pattern: pattern.clone(),
                    channel: channel.to_string(),
                    payload: payload.to_vec(),
                };
                if slot.tx.send(Delivery::Notification(message)).is_ok() {
                    receivers += 1;
                }
            }
        }
        receivers
    }
}

/// In-memory pub/sub broker.
///
/// ## Example
///
/// ```ignore
/// use sourced_bus::{BusConfig, EventBus, InMemoryTransport};
///
/// let transport = InMemoryTransport::new();
/// let first = EventBus::new(transport.clone(), BusConfig::new("app"))?;
/// let second = EventBus::new(transport.clone(), BusConfig::new("app"))?;
/// // events published on `first` reach the global handlers of both buses
/// ```
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    broker: Arc<Broker>,
}

impl InMemoryTransport {
    /// Create a new, empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a broker that keeps every publish for [`published`](Self::published).
    pub fn recording() -> Self {
        let transport = Self::new();
        transport.record_publishes(true);
        transport
    }

    /// Start or stop keeping publishes in the log. Stopping keeps what was
    /// already recorded.
    pub fn record_publishes(&self, record: bool) {
        self.broker.record_publishes.store(record, Ordering::SeqCst);
    }

    /// Publish raw bytes on `channel`, bypassing any publish fault.
    ///
    /// Returns the number of deliveries made.
    pub fn inject(&self, channel: &str, payload: &[u8]) -> usize {
        self.broker.deliver(channel, payload)
    }

    /// Every `(channel, payload)` recorded so far, in order.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.broker.state().log.clone()
    }

    /// Channels of every recorded publish, in order.
    pub fn published_channels(&self) -> Vec<String> {
        self.broker
            .state()
            .log
            .iter()
            .map(|(channel, _)| channel.clone())
            .collect()
    }

    /// Number of subscription connections currently open.
    pub fn open_subscriptions(&self) -> usize {
        self.broker.state().subscribers.len()
    }

    /// Number of pattern subscriptions currently active across all
    /// connections.
    pub fn active_patterns(&self) -> usize {
        self.broker
            .state()
            .subscribers
            .values()
            .map(|slot| slot.patterns.len())
            .sum()
    }

    /// Pooled connections handed out so far.
    pub fn connections_acquired(&self) -> usize {
        self.broker.connections_acquired.load(Ordering::SeqCst)
    }

    /// Pooled connections returned so far.
    pub fn connections_released(&self) -> usize {
        self.broker.connections_released.load(Ordering::SeqCst)
    }

    /// Subscription connections closed so far.
    pub fn subscriptions_released(&self) -> usize {
        self.broker.subscriptions_released.load(Ordering::SeqCst)
    }

    /// Make every publish through a pooled connection fail.
    pub fn fail_publishes(&self, fail: bool) {
        self.broker.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Make every pattern subscription request fail.
    pub fn fail_subscribes(&self, fail: bool) {
        self.broker.fail_subscribes.store(fail, Ordering::SeqCst);
    }

    /// Accept pattern subscriptions without confirming them.
    pub fn suppress_subscribe_acks(&self, suppress: bool) {
        self.broker
            .suppress_subscribe_acks
            .store(suppress, Ordering::SeqCst);
    }

    /// Stop confirming unsubscription requests.
    pub fn suppress_unsubscribe_acks(&self, suppress: bool) {
        self.broker
            .suppress_unsubscribe_acks
            .store(suppress, Ordering::SeqCst);
    }

    /// Deliver a transport error to every open subscription.
    pub fn sever_subscriptions(&self) {
        let state = self.broker.state();
        for slot in state.subscribers.values() {
            let _ = slot.tx.send(Delivery::Fault(TransportError::Closed));
        }
    }
}

impl Transport for InMemoryTransport {
    type Connection = InMemoryConnection;
    type Subscription = InMemorySubscription;

    fn connection(&self) -> Result<Self::Connection, TransportError> {
        self.broker
            .connections_acquired
            .fetch_add(1, Ordering::SeqCst);
        Ok(InMemoryConnection {
            broker: Arc::clone(&self.broker),
        })
    }

    fn subscription(&self) -> Result<Self::Subscription, TransportError> {
        let id = self.broker.next_subscriber.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel();
        self.broker.state().subscribers.insert(
            id,
            SubscriberSlot {
                patterns: Vec::new(),
                tx,
            },
        );

        Ok(InMemorySubscription {
            id,
            broker: Arc::clone(&self.broker),
            rx,
        })
    }
}

/// A pooled connection; returned to the pool on drop.
pub struct InMemoryConnection {
    broker: Arc<Broker>,
}

impl Connection for InMemoryConnection {
    fn publish(&mut self, channel: &str, payload: &[u8]) -> Result<usize, TransportError> {
        if self.broker.fail_publishes.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed(format!(
                "publish to {} refused",
                channel
            )));
        }
        Ok(self.broker.deliver(channel, payload))
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        self.broker
            .connections_released
            .fetch_add(1, Ordering::SeqCst);
    }
}

/// A dedicated subscription connection; closed on drop.
pub struct InMemorySubscription {
    id: u64,
    broker: Arc<Broker>,
    rx: Receiver<Delivery>,
}

impl Subscription for InMemorySubscription {
    fn psubscribe(&mut self, pattern: &str) -> Result<(), TransportError> {
        if self.broker.fail_subscribes.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(format!(
                "psubscribe {} refused",
                pattern
            )));
        }
        let suppress = self.broker.suppress_subscribe_acks.load(Ordering::SeqCst);
        let mut state = self.broker.state();
        let slot = state
            .subscribers
            .get_mut(&self.id)
            .ok_or(TransportError::Closed)?;

        if !slot.patterns.iter().any(|p| p == pattern) {
            slot.patterns.push(pattern.to_string());
        }
        if suppress {
            return Ok(());
        }
        let confirmation = Notification::Subscribed {
            pattern: pattern.to_string(),
            count: slot.patterns.len(),
        };
        slot.tx
            .send(Delivery::Notification(confirmation))
            .map_err(|_| TransportError::Closed)
    }

    fn punsubscribe(&mut self) -> Result<(), TransportError> {
        let suppress = self.broker.suppress_unsubscribe_acks.load(Ordering::SeqCst);
        let mut state = self.broker.state();
        let slot = state
            .subscribers
            .get_mut(&self.id)
            .ok_or(TransportError::Closed)?;

        let removed: Vec<String> = slot.patterns.drain(..).collect();
        if suppress {
            return Ok(());
        }

        // Like Redis, unsubscribing with nothing subscribed still replies
        // once with a zero count.
        let confirmations: Vec<Notification> = if removed.is_empty() {
            vec![Notification::Unsubscribed {
                pattern: String::new(),
                count: 0,
            }]
        } else {
            let total = removed.len();
            removed
                .into_iter()
                .enumerate()
                .map(|(i, pattern)| Notification::Unsubscribed {
                    pattern,
                    count: total - i - 1,
                })
                .collect()
        };

        for confirmation in confirmations {
            slot.tx
                .send(Delivery::Notification(confirmation))
                .map_err(|_| TransportError::Closed)?;
        }
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Notification>, TransportError> {
        match self.rx.recv_timeout(timeout) {
            Ok(Delivery::Notification(notification)) => Ok(Some(notification)),
            Ok(Delivery::Fault(err)) => Err(err),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }
}

impl Drop for InMemorySubscription {
    fn drop(&mut self) {
        self.broker.state().subscribers.remove(&self.id);
        self.broker
            .subscriptions_released
            .fetch_add(1, Ordering::SeqCst);
    }
}
