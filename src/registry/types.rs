use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{read, write};
use crate::error::BusError;
use crate::event::Event;
use crate::transport::pattern::literal_segment_problem;

type Factory = Arc<dyn Fn() -> Box<dyn Event> + Send + Sync>;

/// Maps event type names to factories producing empty instances, so inbound
/// payloads can be decoded into their concrete type.
///
/// Each type name is write-once: a second registration fails and the first
/// stays active.
#[derive(Default)]
pub struct TypeRegistry {
    factories: RwLock<HashMap<String, Factory>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `event.event_type()` to `factory`.
    pub fn register<E, F>(&self, event: &E, factory: F) -> Result<(), BusError>
    where
        E: Event,
        F: Fn() -> E + Send + Sync + 'static,
    {
        let event_type = event.event_type();
        validate_event_type(event_type)?;

        let mut factories = write(self.factories.write());
        if factories.contains_key(event_type) {
            return Err(BusError::AlreadyRegistered {
                event_type: event_type.to_string(),
            });
        }

        factories.insert(
            event_type.to_string(),
            Arc::new(move || Box::new(factory()) as Box<dyn Event>),
        );
        Ok(())
    }

    pub fn is_registered(&self, event_type: &str) -> bool {
        read(self.factories.read()).contains_key(event_type)
    }

    /// Registered type names, sorted.
    pub fn event_types(&self) -> Vec<String> {
        let mut names: Vec<String> = read(self.factories.read()).keys().cloned().collect();
        names.sort();
        names
    }

    /// Build an empty instance of `event_type` and decode `payload` into it.
    pub fn decode(&self, event_type: &str, payload: &[u8]) -> Result<Box<dyn Event>, BusError> {
        let factory = read(self.factories.read())
            .get(event_type)
            .cloned()
            .ok_or_else(|| BusError::EventNotRegistered {
                event_type: event_type.to_string(),
            })?;

        let mut event = factory();
        event
            .decode_into(payload)
            .map_err(|e| BusError::Decode {
                event_type: event_type.to_string(),
                reason: e.to_string(),
            })?;
        Ok(event)
    }
}

/// Type names become channel suffixes and are recovered by prefix stripping
/// on receive; glob metacharacters would leak into pattern matching.
pub(crate) fn validate_event_type(event_type: &str) -> Result<(), BusError> {
    match literal_segment_problem(event_type) {
        None => Ok(()),
        Some(reason) => Err(BusError::InvalidEventType {
            event_type: event_type.to_string(),
            reason,
        }),
    }
}
