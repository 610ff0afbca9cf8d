//! Startup and shutdown rendezvous between the bus and its listener thread.
//!
//! Each rendezvous is a one-shot signal: the notifier is consumed by
//! `notify`, so a value is delivered at most once, and the waiter is consumed
//! by `wait`, which gives up after a timeout. If the notifier is dropped
//! without notifying (the listener thread panicked), the waiter learns so
//! immediately instead of blocking until the timeout.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

/// Create a connected one-shot notifier/waiter pair.
pub(crate) fn signal<T>() -> (Notifier<T>, Waiter<T>) {
    let (tx, rx) = mpsc::sync_channel(1);
    (Notifier(tx), Waiter(rx))
}

pub(crate) struct Notifier<T>(SyncSender<T>);

impl<T> Notifier<T> {
    pub(crate) fn notify(self, value: T) {
        // The waiter may already have given up.
        let _ = self.0.send(value);
    }
}

pub(crate) struct Waiter<T>(Receiver<T>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitError {
    TimedOut,
    Abandoned,
}

impl<T> Waiter<T> {
    pub(crate) fn wait(self, timeout: Duration) -> Result<T, WaitError> {
        self.0.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => WaitError::TimedOut,
            RecvTimeoutError::Disconnected => WaitError::Abandoned,
        })
    }
}

/// Lifecycle of a bus's listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Subscription requested, confirmation not yet received.
    Starting,
    /// Subscription active; inbound events are dispatched.
    Running,
    /// Terminal. No further inbound events are processed.
    Closed,
}

#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ListenerState::Starting as u8))
    }

    pub(crate) fn get(&self) -> ListenerState {
        match self.0.load(Ordering::SeqCst) {
            0 => ListenerState::Starting,
            1 => ListenerState::Running,
            _ => ListenerState::Closed,
        }
    }

    pub(crate) fn set(&self, state: ListenerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}
