//! Projections - event handlers that maintain read models.
//!
//! A projector declares the closed set of event kinds it understands as an
//! enum implementing [`EventSet`]. [`Projection`] adapts a projector to an
//! [`EventHandler`]: events outside the set are ignored, and projector
//! failures are logged, since the bus does not report handler failures.
//!
//! ## Example
//!
//! ```ignore
//! enum InvitationEvent {
//!     Created(InviteCreated),
//!     Accepted(InviteAccepted),
//! }
//!
//! impl EventSet for InvitationEvent {
//!     fn from_event(event: &dyn Event) -> Option<Self> {
//!         if let Some(e) = event.downcast_ref::<InviteCreated>() {
//!             return Some(Self::Created(e.clone()));
//!         }
//!         event.downcast_ref::<InviteAccepted>().cloned().map(Self::Accepted)
//!     }
//! }
//!
//! impl Projector for InvitationProjector {
//!     type Event = InvitationEvent;
//!
//!     fn project(&self, event: InvitationEvent) -> Result<(), ProjectionError> {
//!         match event { /* upsert read models */ }
//!     }
//! }
//!
//! bus.add_global_handler(Arc::new(Projection::new(InvitationProjector::new(store))));
//! ```

use thiserror::Error;
use tracing::warn;

use crate::event::Event;
use crate::handler::EventHandler;
use crate::read_model::ReadModelError;

/// Error type for projector failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error(transparent)]
    ReadModel(#[from] ReadModelError),
    /// The event cannot be applied to the current view state, e.g. it
    /// refers to a read model that does not exist.
    #[error("cannot apply {event_type} to {id}: {reason}")]
    Rejected {
        event_type: String,
        id: String,
        reason: String,
    },
}

/// A closed set of event kinds, usually an enum with one variant per
/// concrete event type.
pub trait EventSet: Sized {
    /// Convert a type-erased event into a member of the set, or `None` if
    /// its concrete type is not part of the set.
    fn from_event(event: &dyn Event) -> Option<Self>;
}

/// Applies the events of its [`EventSet`] to one or more read models.
pub trait Projector: Send + Sync {
    type Event: EventSet;

    fn project(&self, event: Self::Event) -> Result<(), ProjectionError>;
}

/// [`EventHandler`] adapter for a [`Projector`].
pub struct Projection<P> {
    projector: P,
}

impl<P: Projector> Projection<P> {
    pub fn new(projector: P) -> Self {
        Self { projector }
    }

    pub fn projector(&self) -> &P {
        &self.projector
    }
}

impl<P: Projector> EventHandler for Projection<P> {
    fn handle_event(&self, event: &dyn Event) {
        let Some(member) = P::Event::from_event(event) else {
            return;
        };

        if let Err(err) = self.projector.project(member) {
            warn!(
                event_type = event.event_type(),
                aggregate_id = %event.aggregate_id(),
                error = %err,
                "projection failed"
            );
        }
    }
}
