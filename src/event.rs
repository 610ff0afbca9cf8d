//! Event capabilities.
//!
//! Every event carries two capabilities: [`Event`] (its type name and the
//! aggregate it belongs to) and [`EventCodec`] (wire encoding and
//! downcasting). `EventCodec` is implemented for every serde record, so a
//! concrete event only has to derive `Serialize`/`Deserialize` and implement
//! (or derive) `Event`.
//!
//! ## Example
//!
//! ```ignore
//! use serde::{Deserialize, Serialize};
//! use sourced_bus::Event;
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Event)]
//! #[event(name = "InviteCreated")]
//! pub struct InviteCreated {
//!     #[event(aggregate_id)]
//!     pub invitation_id: String,
//!     pub name: String,
//! }
//! ```

use std::any::Any;
use std::fmt;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Errors produced while moving an event to or from its wire format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("could not encode event: {0}")]
    Encode(String),
    #[error("could not decode event: {0}")]
    Decode(String),
}

/// An immutable record of something that happened to an aggregate.
pub trait Event: EventCodec + fmt::Debug + Send + Sync + 'static {
    /// Self-reported type name. Used as the channel suffix on the transport
    /// and as the key of the type and handler registries.
    fn event_type(&self) -> &str;

    /// Identifier of the aggregate this event pertains to.
    fn aggregate_id(&self) -> String;
}

/// Wire encoding and downcasting for events.
///
/// Blanket-implemented for every `Serialize + DeserializeOwned` type using
/// `bitcode`.
pub trait EventCodec {
    /// Encode this event into the bus wire format.
    fn encode(&self) -> Result<Vec<u8>, CodecError>;

    /// Overwrite `self` with the event decoded from `payload`.
    ///
    /// The bus calls this on a fresh, empty instance produced by the
    /// registered factory.
    fn decode_into(&mut self, payload: &[u8]) -> Result<(), CodecError>;

    fn as_any(&self) -> &dyn Any;
}

impl<T> EventCodec for T
where
    T: Serialize + DeserializeOwned + Any,
{
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        bitcode::serialize(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_into(&mut self, payload: &[u8]) -> Result<(), CodecError> {
        *self = bitcode::deserialize(payload).map_err(|e| CodecError::Decode(e.to_string()))?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn Event {
    /// Returns `true` if the concrete event type is `E`.
    pub fn is<E: Event>(&self) -> bool {
        self.as_any().is::<E>()
    }

    /// Downcast to the concrete event type.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }
}
