use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::lifecycle::ListenerState;
use super::stats::BusStats;
use super::subscriber::ListenerHandle;
use super::Shared;
use crate::config::BusConfig;
use crate::error::BusError;
use crate::event::Event;
use crate::handler::EventHandler;
use crate::transport::Transport;

/// A distributed event bus bound to one application id.
///
/// Events published on one instance run that instance's per-type and local
/// handlers synchronously, then travel over the transport to the global
/// handlers of every instance subscribed to the same application id.
///
/// Construction blocks until the inbound subscription is confirmed. Call
/// [`close`](Self::close) to unsubscribe and wait for the listener to exit;
/// dropping the bus only asks it to stop.
pub struct EventBus<T: Transport> {
    pub(super) transport: T,
    pub(super) config: BusConfig,
    pub(super) shared: Arc<Shared>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl<T: Transport> EventBus<T> {
    /// Open the subscription connection, start the listener and wait until
    /// the subscription on `<app_id>:events:*` is active.
    ///
    /// Fails with [`BusError::InvalidAppId`] before touching the transport
    /// if the app id contains glob metacharacters or whitespace.
    pub fn new(transport: T, config: BusConfig) -> Result<Self, BusError> {
        config.validate()?;
        let subscription = transport.subscription()?;
        let shared = Arc::new(Shared::new());

        let listener = ListenerHandle::start(subscription, Arc::clone(&shared), &config)?;
        info!(app_id = %config.app_id, pattern = %config.pattern(), "event bus started");

        Ok(Self {
            transport,
            config,
            shared,
            listener: Mutex::new(Some(listener)),
        })
    }

    pub fn app_id(&self) -> &str {
        &self.config.app_id
    }

    /// Channel prefix, `<app_id>:events:`.
    pub fn prefix(&self) -> String {
        self.config.prefix()
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> ListenerState {
        self.shared.state.get()
    }

    pub fn stats(&self) -> BusStats {
        self.shared.counters.snapshot()
    }

    /// Run `handler` for every locally published event of the same type as
    /// `event`. Adding the same handler twice has no effect.
    pub fn add_handler(&self, handler: Arc<dyn EventHandler>, event: &dyn Event) {
        let event_type = event.event_type();
        if !self.shared.handlers.add_for_type(event_type, handler) {
            debug!(event_type, "handler already registered");
        }
    }

    /// Run `handler` for every event published on this instance.
    pub fn add_local_handler(&self, handler: Arc<dyn EventHandler>) {
        if !self.shared.handlers.add_local(handler) {
            debug!("local handler already registered");
        }
    }

    /// Run `handler` on the listener thread for every event received over
    /// the transport, including this instance's own.
    pub fn add_global_handler(&self, handler: Arc<dyn EventHandler>) {
        if !self.shared.handlers.add_global(handler) {
            debug!("global handler already registered");
        }
    }

    /// Bind `event.event_type()` to `factory`, which produces the empty
    /// instance inbound payloads of that type are decoded into.
    ///
    /// Fails if the type already has a factory; the first one stays active.
    pub fn register_event_type<E, F>(&self, event: &E, factory: F) -> Result<(), BusError>
    where
        E: Event,
        F: Fn() -> E + Send + Sync + 'static,
    {
        self.shared.types.register(event, factory)?;
        debug!(event_type = event.event_type(), "event type registered");
        Ok(())
    }

    /// Register `E` using its `Default` instance as the factory.
    pub fn register<E: Event + Default>(&self) -> Result<(), BusError> {
        self.register_event_type(&E::default(), E::default)
    }

    pub fn is_registered(&self, event_type: &str) -> bool {
        self.shared.types.is_registered(event_type)
    }

    /// Registered event type names, sorted.
    pub fn event_types(&self) -> Vec<String> {
        self.shared.types.event_types()
    }

    /// Unsubscribe and wait for the listener to exit.
    ///
    /// Waits at most the configured shutdown timeout; on timeout the
    /// listener is told to abort at its next poll and
    /// [`BusError::ShutdownTimeout`] is returned. Calling `close` again
    /// returns `Ok(())`. Once it returned `Ok`, no global handler runs again.
    ///
    /// Called from a global handler, `close` cannot wait for the thread it
    /// runs on. It tells the listener to stop once the handler returns and
    /// returns `Ok(())` at once; the remaining handlers for the current
    /// event still run.
    pub fn close(&self) -> Result<(), BusError> {
        let Some(listener) = self.take_listener() else {
            return Ok(());
        };

        if listener.is_current() {
            listener.signal_stop();
            info!(app_id = %self.config.app_id, "event bus closing from a global handler");
            return Ok(());
        }

        let result = listener.shutdown(self.config.shutdown_timeout());
        match &result {
            Ok(()) => info!(app_id = %self.config.app_id, "event bus closed"),
            Err(err) => warn!(app_id = %self.config.app_id, error = %err, "event bus close"),
        }
        result
    }

    fn take_listener(&self) -> Option<ListenerHandle> {
        lock(&self.listener).take()
    }
}

impl<T: Transport> Drop for EventBus<T> {
    fn drop(&mut self) {
        if let Some(listener) = self.take_listener() {
            listener.signal_stop();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
