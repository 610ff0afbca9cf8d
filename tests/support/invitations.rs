//! Invitation domain used across the suites: three events, two views and
//! the projectors maintaining them.

use serde::{Deserialize, Serialize};
use sourced_bus::{
    Event, EventBus, EventSet, ProjectionError, Projector, ReadModel, ReadModelStore,
    ReadModelsExt, Transport,
};

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Event)]
pub struct InviteCreated {
    #[event(aggregate_id)]
    pub invitation_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Event)]
pub struct InviteAccepted {
    #[event(aggregate_id)]
    pub invitation_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Event)]
#[event(name = "InviteDeclined")]
pub struct InviteDeclined {
    #[event(aggregate_id)]
    pub invitation_id: String,
    pub reason: Option<String>,
}

pub fn created(id: &str, name: &str) -> InviteCreated {
    InviteCreated {
        invitation_id: id.into(),
        name: name.into(),
    }
}

pub fn accepted(id: &str) -> InviteAccepted {
    InviteAccepted {
        invitation_id: id.into(),
    }
}

pub fn declined(id: &str) -> InviteDeclined {
    InviteDeclined {
        invitation_id: id.into(),
        reason: None,
    }
}

/// Register every invitation event on `bus`.
pub fn register_all<T: Transport>(bus: &EventBus<T>) {
    bus.register::<InviteCreated>().unwrap();
    bus.register::<InviteAccepted>().unwrap();
    bus.register::<InviteDeclined>().unwrap();
}

pub enum InvitationEvent {
    Created(InviteCreated),
    Accepted(InviteAccepted),
    Declined(InviteDeclined),
}

impl EventSet for InvitationEvent {
    fn from_event(event: &dyn Event) -> Option<Self> {
        if let Some(e) = event.downcast_ref::<InviteCreated>() {
            return Some(Self::Created(e.clone()));
        }
        if let Some(e) = event.downcast_ref::<InviteAccepted>() {
            return Some(Self::Accepted(e.clone()));
        }
        event
            .downcast_ref::<InviteDeclined>()
            .cloned()
            .map(Self::Declined)
    }
}

// ============================================================================
// Views
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ReadModel)]
#[readmodel(collection = "invitations")]
pub struct Invitation {
    #[readmodel(id)]
    pub id: String,
    pub name: String,
    pub status: InvitationStatus,
}

pub const GUEST_LIST_ID: &str = "all";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ReadModel)]
#[readmodel(collection = "guest_lists")]
pub struct GuestList {
    pub id: String,
    pub invited: u32,
    pub accepted: u32,
    pub declined: u32,
}

// ============================================================================
// Projectors
// ============================================================================

/// One `Invitation` per invitation id.
pub struct InvitationProjector<S> {
    store: S,
}

impl<S: ReadModelStore> InvitationProjector<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn set_status(
        &self,
        event_type: &str,
        id: &str,
        status: InvitationStatus,
    ) -> Result<(), ProjectionError> {
        let invitations = self.store.read_models::<Invitation>();
        let mut invitation = invitations
            .find(id)?
            .ok_or_else(|| ProjectionError::Rejected {
                event_type: event_type.to_string(),
                id: id.to_string(),
                reason: "invitation does not exist".into(),
            })?;
        invitation.status = status;
        invitations.save(&invitation)?;
        Ok(())
    }
}

impl<S: ReadModelStore> Projector for InvitationProjector<S> {
    type Event = InvitationEvent;

    fn project(&self, event: InvitationEvent) -> Result<(), ProjectionError> {
        match event {
            InvitationEvent::Created(e) => {
                self.store.read_models::<Invitation>().save(&Invitation {
                    id: e.invitation_id,
                    name: e.name,
                    status: InvitationStatus::Pending,
                })?;
                Ok(())
            }
            InvitationEvent::Accepted(e) => {
                self.set_status("InviteAccepted", &e.invitation_id, InvitationStatus::Accepted)
            }
            InvitationEvent::Declined(e) => {
                self.set_status("InviteDeclined", &e.invitation_id, InvitationStatus::Declined)
            }
        }
    }
}

/// A single `GuestList` counting invitations by outcome.
pub struct GuestListProjector<S> {
    store: S,
}

impl<S: ReadModelStore> GuestListProjector<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: ReadModelStore> Projector for GuestListProjector<S> {
    type Event = InvitationEvent;

    fn project(&self, event: InvitationEvent) -> Result<(), ProjectionError> {
        let lists = self.store.read_models::<GuestList>();
        let mut list = lists.find(GUEST_LIST_ID)?.unwrap_or_else(|| GuestList {
            id: GUEST_LIST_ID.into(),
            ..GuestList::default()
        });

        match event {
            InvitationEvent::Created(_) => list.invited += 1,
            InvitationEvent::Accepted(_) => list.accepted += 1,
            InvitationEvent::Declined(_) => list.declined += 1,
        }

        lists.save(&list)?;
        Ok(())
    }
}
