//! Event handlers and identity sets of handlers.

use std::fmt;
use std::sync::Arc;

use crate::event::Event;

/// A capability invoked with an event to perform a side effect, e.g.
/// updating a read model.
///
/// Failures inside a handler are the handler's own responsibility; the bus
/// neither catches nor reports them.
///
/// Any `Fn(&dyn Event) + Send + Sync` closure is a handler:
///
/// ```ignore
/// let handler: Arc<dyn EventHandler> = Arc::new(|event: &dyn Event| {
///     println!("{} for {}", event.event_type(), event.aggregate_id());
/// });
/// bus.add_global_handler(handler);
/// ```
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &dyn Event);
}

impl<F> EventHandler for F
where
    F: Fn(&dyn Event) + Send + Sync,
{
    fn handle_event(&self, event: &dyn Event) {
        self(event)
    }
}

/// A set of handlers with identity semantics.
///
/// Two entries are the same handler when they share the same `Arc`
/// allocation; inserting a handler that is already present has no effect.
#[derive(Clone, Default)]
pub struct HandlerSet {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. Returns `false` if it was already a member.
    pub fn insert(&mut self, handler: Arc<dyn EventHandler>) -> bool {
        if self.contains(&handler) {
            return false;
        }
        self.handlers.push(handler);
        true
    }

    pub fn contains(&self, handler: &Arc<dyn EventHandler>) -> bool {
        self.handlers.iter().any(|h| same_handler(h, handler))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn EventHandler>> {
        self.handlers.iter()
    }

    /// Invoke every member once with `event`.
    pub fn dispatch(&self, event: &dyn Event) {
        for handler in &self.handlers {
            handler.handle_event(event);
        }
    }
}

impl fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSet")
            .field("len", &self.handlers.len())
            .finish()
    }
}

// Compare data pointers only; vtable pointers for the same type may differ
// between codegen units.
fn same_handler(a: &Arc<dyn EventHandler>, b: &Arc<dyn EventHandler>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
