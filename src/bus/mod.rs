//! Event bus - local dispatch plus transport fan-out.
//!
//! ## Architecture
//!
//! ```text
//!  publish_event(event)
//!        │
//!        ├─► per-type handlers ─► local handlers        (caller's thread)
//!        │
//!        ▼
//!  encode + PUBLISH "<app>:events:<type>"  ─────────►  transport
//!                                                          │
//!  ┌───────────────────────────────────────────────────────┘
//!  ▼  (every instance subscribed to "<app>:events:*", this one included)
//!  listener thread: strip prefix ─► factory ─► decode ─► global handlers
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let bus = EventBus::new(InMemoryTransport::new(), BusConfig::new("invitations"))?;
//! bus.register::<InviteCreated>()?;
//! bus.add_global_handler(Arc::new(Projection::new(InvitationProjector::new(store))));
//!
//! bus.publish_event(&InviteCreated { invitation_id: "abc".into(), name: "Alice".into() });
//!
//! bus.close()?;
//! ```

mod event_bus;
mod lifecycle;
mod publisher;
mod stats;
mod subscriber;

pub use event_bus::EventBus;
pub use lifecycle::ListenerState;
pub use stats::BusStats;

use crate::registry::{HandlerRegistry, TypeRegistry};
use lifecycle::StateCell;
use stats::Counters;

/// State shared between the caller-facing bus and its listener thread.
pub(crate) struct Shared {
    pub(crate) handlers: HandlerRegistry,
    pub(crate) types: TypeRegistry,
    pub(crate) state: StateCell,
    pub(crate) counters: Counters,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            handlers: HandlerRegistry::new(),
            types: TypeRegistry::new(),
            state: StateCell::new(),
            counters: Counters::default(),
        }
    }
}
