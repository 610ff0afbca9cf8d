//! Background listener for inbound (global) events.
//!
//! One thread per bus owns the subscription connection for its whole life.
//! The bus never touches that connection: it asks the thread to unsubscribe
//! through a control channel, and the thread drops the connection when it
//! exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::lifecycle::{signal, ListenerState, Notifier, WaitError, Waiter};
use super::Shared;
use crate::config::BusConfig;
use crate::error::BusError;
use crate::transport::{Notification, Subscription, TransportError};

pub(crate) enum Control {
    Unsubscribe,
}

/// Why the listener loop ended.
#[derive(Debug)]
pub(crate) enum ListenerExit {
    /// The transport confirmed that no subscriptions remain.
    Unsubscribed,
    /// The transport failed; the listener does not reconnect.
    Failed(TransportError),
    /// The bus stopped waiting and asked the thread to exit.
    Aborted,
}

/// Handle to a running listener thread, owned by the bus.
pub(crate) struct ListenerHandle {
    control: Sender<Control>,
    closed: Waiter<ListenerExit>,
    abort: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl ListenerHandle {
    /// Spawn the listener and block until its subscription is confirmed.
    pub(crate) fn start<S: Subscription>(
        subscription: S,
        shared: Arc<Shared>,
        config: &BusConfig,
    ) -> Result<Self, BusError> {
        let (control_tx, control_rx) = channel();
        let (ready_tx, ready_rx) = signal();
        let (closed_tx, closed_rx) = signal();
        let abort = Arc::new(AtomicBool::new(false));

        let listener = Listener {
            subscription,
            shared,
            prefix: config.prefix(),
            pattern: config.pattern(),
            poll_interval: config.poll_interval(),
            control: control_rx,
            abort: Arc::clone(&abort),
        };

        let thread = thread::Builder::new()
            .name(format!("sourced-bus:{}", config.app_id))
            .spawn(move || listener.run(ready_tx, closed_tx))
            .map_err(|e| BusError::Spawn(e.to_string()))?;

        let handle = Self {
            control: control_tx,
            closed: closed_rx,
            abort,
            thread,
        };

        let timeout = config.startup_timeout();
        match ready_rx.wait(timeout) {
            Ok(Ok(())) => Ok(handle),
            Ok(Err(err)) => {
                handle.join();
                Err(BusError::Transport(err))
            }
            Err(WaitError::TimedOut) => {
                handle.signal_stop();
                Err(BusError::StartupTimeout(timeout))
            }
            Err(WaitError::Abandoned) => {
                handle.join();
                Err(BusError::Transport(TransportError::Closed))
            }
        }
    }

    /// Ask the listener to unsubscribe, wait for it to close and release
    /// the connection.
    pub(crate) fn shutdown(self, timeout: Duration) -> Result<(), BusError> {
        // A send error means the listener already exited; its closed signal
        // is still pending or abandoned.
        let _ = self.control.send(Control::Unsubscribe);

        match self.closed.wait(timeout) {
            Ok(exit) => {
                debug!(?exit, "event bus listener closed");
                join_thread(self.thread);
                Ok(())
            }
            Err(WaitError::Abandoned) => {
                join_thread(self.thread);
                Ok(())
            }
            Err(WaitError::TimedOut) => {
                self.abort.store(true, Ordering::SeqCst);
                Err(BusError::ShutdownTimeout(timeout))
            }
        }
    }

    /// Whether the caller is running on the listener thread, i.e. inside a
    /// global handler.
    pub(crate) fn is_current(&self) -> bool {
        self.thread.thread().id() == thread::current().id()
    }

    /// Ask the listener to exit at its next poll without waiting.
    pub(crate) fn signal_stop(&self) {
        self.abort.store(true, Ordering::SeqCst);
        let _ = self.control.send(Control::Unsubscribe);
    }

    fn join(self) {
        join_thread(self.thread);
    }
}

fn join_thread(thread: JoinHandle<()>) {
    if thread.join().is_err() {
        error!("event bus listener panicked");
    }
}

// Marks the listener closed even when a panicking handler unwinds the thread.
struct MarkClosed<'a>(&'a Shared);

impl Drop for MarkClosed<'_> {
    fn drop(&mut self) {
        self.0.state.set(ListenerState::Closed);
    }
}

struct Listener<S> {
    subscription: S,
    shared: Arc<Shared>,
    prefix: String,
    pattern: String,
    poll_interval: Duration,
    control: Receiver<Control>,
    abort: Arc<AtomicBool>,
}

impl<S: Subscription> Listener<S> {
    fn run(
        mut self,
        ready: Notifier<Result<(), TransportError>>,
        closed: Notifier<ListenerExit>,
    ) {
        let shared = Arc::clone(&self.shared);
        let _closed = MarkClosed(&shared);
        let mut ready = Some(ready);

        let exit = match self.subscription.psubscribe(&self.pattern) {
            Ok(()) => self.receive_loop(&mut ready),
            Err(err) => {
                error!(pattern = %self.pattern, error = %err, "event bus subscribe failed");
                ListenerExit::Failed(err)
            }
        };

        self.shared.state.set(ListenerState::Closed);
        if let Some(ready) = ready.take() {
            let err = match &exit {
                ListenerExit::Failed(err) => err.clone(),
                _ => TransportError::Closed,
            };
            ready.notify(Err(err));
        }
        closed.notify(exit);
        // `self.subscription` is dropped here, releasing the connection.
    }

    fn receive_loop(
        &mut self,
        ready: &mut Option<Notifier<Result<(), TransportError>>>,
    ) -> ListenerExit {
        let mut unsubscribing = false;

        loop {
            if self.abort.load(Ordering::SeqCst) {
                return ListenerExit::Aborted;
            }

            if !unsubscribing {
                match self.control.try_recv() {
                    Ok(Control::Unsubscribe) | Err(TryRecvError::Disconnected) => {
                        unsubscribing = true;
                        if let Err(err) = self.subscription.punsubscribe() {
                            error!(error = %err, "event bus unsubscribe failed");
                            return ListenerExit::Failed(err);
                        }
                    }
                    Err(TryRecvError::Empty) => {}
                }
            }

            match self.subscription.receive(self.poll_interval) {
                Ok(None) => {}
                Ok(Some(Notification::Message {
                    channel, payload, ..
                })) => {
                    if self.abort.load(Ordering::SeqCst) {
                        return ListenerExit::Aborted;
                    }
                    self.dispatch(&channel, &payload);
                }
                Ok(Some(Notification::Subscribed { pattern, count })) => {
                    if let Some(ready) = ready.take() {
                        self.shared.state.set(ListenerState::Running);
                        info!(%pattern, count, "event bus subscribed");
                        ready.notify(Ok(()));
                    }
                }
                Ok(Some(Notification::Unsubscribed { count, .. })) => {
                    if count == 0 {
                        info!(pattern = %self.pattern, "event bus unsubscribed");
                        return ListenerExit::Unsubscribed;
                    }
                }
                Err(err) => {
                    error!(error = %err, "event bus receive failed");
                    return ListenerExit::Failed(err);
                }
            }
        }
    }

    fn dispatch(&self, channel: &str, payload: &[u8]) {
        self.shared.counters.received();
        let event_type = channel.strip_prefix(self.prefix.as_str()).unwrap_or(channel);

        match self.shared.types.decode(event_type, payload) {
            Ok(event) => {
                let handlers = self.shared.handlers.global();
                debug!(
                    event_type,
                    aggregate_id = %event.aggregate_id(),
                    handlers = handlers.len(),
                    "dispatching global event"
                );
                handlers.dispatch(&*event);
                self.shared.counters.dispatched();
            }
            Err(err @ BusError::EventNotRegistered { .. }) => {
                warn!(event_type, error = %err, "event bus receive: skipping message");
                self.shared.counters.unregistered();
            }
            Err(err) => {
                warn!(event_type, error = %err, "event bus receive: skipping message");
                self.shared.counters.decode_failed();
            }
        }
    }
}
