//! Local dispatch and transport send for `publish_event`.

use tracing::{debug, error};

use super::EventBus;
use crate::error::BusError;
use crate::event::Event;
use crate::transport::{Connection, Transport};

impl<T: Transport> EventBus<T> {
    /// Publish an event.
    ///
    /// Per-type handlers for the event's type run first, then the local
    /// handlers, both on the calling thread. The event is then encoded and
    /// sent on `<app_id>:events:<type>`, from where it reaches the global
    /// handlers of every subscribed instance, this one included.
    ///
    /// Never fails: transport and encode failures are logged and counted in
    /// [`stats`](Self::stats).
    pub fn publish_event(&self, event: &dyn Event) {
        let event_type = event.event_type();

        self.shared.handlers.for_type(event_type).dispatch(event);
        self.shared.handlers.local().dispatch(event);

        match self.publish_global(event) {
            Ok(receivers) => {
                self.shared.counters.published();
                debug!(event_type, receivers, "event published");
            }
            Err(err) => {
                self.shared.counters.publish_failed();
                error!(
                    app_id = %self.config.app_id,
                    event_type,
                    error = %err,
                    "could not publish event"
                );
            }
        }
    }

    fn publish_global(&self, event: &dyn Event) -> Result<usize, BusError> {
        let event_type = event.event_type();

        // Held for the rest of the call and returned to the pool on every
        // exit path.
        let mut conn = self.transport.connection()?;

        let payload = event.encode().map_err(|e| BusError::Encode {
            event_type: event_type.to_string(),
            reason: e.to_string(),
        })?;

        let receivers = conn.publish(&self.config.channel(event_type), &payload)?;
        Ok(receivers)
    }
}
