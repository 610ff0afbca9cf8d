//! A distributed event bus.
//!
//! Events published on an [`EventBus`] are dispatched to in-process handlers
//! and sent over a pub/sub [`Transport`] to every bus instance sharing the
//! same application id, where they are decoded and handed to global
//! handlers (typically [`Projection`]s maintaining read models).

// Lets the derive macros name `::sourced_bus` from inside this crate's tests.
extern crate self as sourced_bus;

mod bus;
mod config;
mod error;
mod event;
mod handler;
pub mod projection;
pub mod read_model;
mod registry;
pub mod transport;

pub use bus::{BusStats, EventBus, ListenerState};
pub use config::{BusConfig, RedisConfig};
pub use error::BusError;
pub use event::{CodecError, Event, EventCodec};
pub use handler::{EventHandler, HandlerSet};
pub use projection::{EventSet, Projection, ProjectionError, Projector};
pub use read_model::{
    InMemoryReadModelStore, ReadModel, ReadModelError, ReadModelRepository, ReadModelStore,
    ReadModelsExt, Versioned,
};
pub use registry::{HandlerRegistry, TypeRegistry};
pub use transport::{
    Connection, InMemoryTransport, Notification, Subscription, Transport, TransportError,
};
#[cfg(feature = "redis")]
pub use transport::RedisTransport;

// Derive macros share their names with the traits they implement.
pub use sourced_bus_macros::{Event, ReadModel};
