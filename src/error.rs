use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

/// Errors returned by the event bus.
///
/// Only setup operations (construction, registration, close) return these to
/// the caller. Runtime publish and receive failures are logged and counted
/// instead; see [`BusStats`](crate::BusStats).
#[derive(Debug, Error)]
pub enum BusError {
    #[error("invalid app id {app_id:?}: {reason}")]
    InvalidAppId {
        app_id: String,
        reason: &'static str,
    },

    #[error("event type {event_type} already has a registered factory")]
    AlreadyRegistered { event_type: String },

    #[error("invalid event type name {event_type:?}: {reason}")]
    InvalidEventType {
        event_type: String,
        reason: &'static str,
    },

    #[error("event type {event_type} is not registered")]
    EventNotRegistered { event_type: String },

    #[error("could not encode {event_type} event: {reason}")]
    Encode { event_type: String, reason: String },

    #[error("could not decode {event_type} event: {reason}")]
    Decode { event_type: String, reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("subscription was not confirmed within {0:?}")]
    StartupTimeout(Duration),

    #[error("unsubscription was not confirmed within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("could not start listener thread: {0}")]
    Spawn(String),
}
