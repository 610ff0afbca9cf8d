use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of a bus instance, read with [`EventBus::stats`](crate::EventBus::stats).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BusStats {
    /// Events sent on the transport.
    pub published: u64,
    /// Publishes that failed to acquire a connection, encode or send.
    pub publish_failures: u64,
    /// Data messages received by the listener.
    pub received: u64,
    /// Received events decoded and handed to the global handlers.
    pub dispatched: u64,
    /// Received messages skipped because their type is not registered.
    pub unregistered: u64,
    /// Received messages skipped because their payload did not decode.
    pub decode_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    published: AtomicU64,
    publish_failures: AtomicU64,
    received: AtomicU64,
    dispatched: AtomicU64,
    unregistered: AtomicU64,
    decode_failures: AtomicU64,
}

impl Counters {
    pub(crate) fn published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unregistered(&self) {
        self.unregistered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decode_failed(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BusStats {
        BusStats {
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            unregistered: self.unregistered.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
        }
    }
}
