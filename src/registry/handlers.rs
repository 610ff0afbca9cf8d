use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{read, write};
use crate::handler::{EventHandler, HandlerSet};

/// The three independent handler sets of a bus instance.
///
/// - per-type: handlers for one event type, invoked on local publish
/// - local: handlers for every locally published event
/// - global: handlers for every event arriving over the transport
///
/// Sets only grow; there is no removal.
#[derive(Default)]
pub struct HandlerRegistry {
    by_type: RwLock<HashMap<String, HandlerSet>>,
    local: RwLock<HandlerSet>,
    global: RwLock<HandlerSet>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for one event type. Returns `false` if already present.
    pub fn add_for_type(&self, event_type: &str, handler: Arc<dyn EventHandler>) -> bool {
        write(self.by_type.write())
            .entry(event_type.to_string())
            .or_default()
            .insert(handler)
    }

    pub fn add_local(&self, handler: Arc<dyn EventHandler>) -> bool {
        write(self.local.write()).insert(handler)
    }

    pub fn add_global(&self, handler: Arc<dyn EventHandler>) -> bool {
        write(self.global.write()).insert(handler)
    }

    /// Snapshot of the per-type set for `event_type` (empty if none).
    pub fn for_type(&self, event_type: &str) -> HandlerSet {
        read(self.by_type.read())
            .get(event_type)
            .cloned()
            .unwrap_or_default()
    }

    pub fn local(&self) -> HandlerSet {
        read(self.local.read()).clone()
    }

    pub fn global(&self) -> HandlerSet {
        read(self.global.read()).clone()
    }
}
