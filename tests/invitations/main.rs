//! End-to-end: invitation events published on one instance are projected
//! into read models by the global handlers of another.

#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sourced_bus::{InMemoryReadModelStore, InMemoryTransport, Projection, ReadModelsExt};
use support::invitations::{
    accepted, created, declined, register_all, GuestList, GuestListProjector, Invitation,
    InvitationProjector, InvitationStatus, GUEST_LIST_ID,
};
use support::{bus, eventually, Journal};

#[test]
fn invite_created_is_recorded_exactly_once() {
    let transport = InMemoryTransport::new();
    let bus = bus(&transport, "invitations");
    register_all(&bus);

    let journal = Journal::new();
    bus.add_global_handler(journal.recorder("global"));

    bus.publish_event(&created("abc", "Alice"));

    assert!(eventually(|| journal.len() == 1));
    thread::sleep(Duration::from_millis(50));

    let entries = journal.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event_type, "InviteCreated");
    assert_eq!(entries[0].aggregate_id, "abc");

    bus.close().unwrap();
}

#[test]
fn projectors_build_views_on_a_remote_instance() {
    let transport = InMemoryTransport::new();
    let writer = bus(&transport, "invitations");
    let reader = bus(&transport, "invitations");
    register_all(&reader);

    let store = InMemoryReadModelStore::new();
    reader.add_global_handler(Arc::new(Projection::new(InvitationProjector::new(
        store.clone(),
    ))));
    reader.add_global_handler(Arc::new(Projection::new(GuestListProjector::new(
        store.clone(),
    ))));

    writer.publish_event(&created("abc", "Alice"));
    writer.publish_event(&created("def", "Bob"));
    writer.publish_event(&created("ghi", "Carol"));
    writer.publish_event(&accepted("abc"));
    writer.publish_event(&declined("def"));

    let lists = store.read_models::<GuestList>();
    assert!(eventually(|| {
        lists
            .find(GUEST_LIST_ID)
            .unwrap()
            .is_some_and(|l| l.accepted + l.declined == 2)
    }));

    let list = lists.find(GUEST_LIST_ID).unwrap().unwrap();
    assert_eq!((list.invited, list.accepted, list.declined), (3, 1, 1));

    let invitations = store.read_models::<Invitation>();
    let status = |id: &str| invitations.find(id).unwrap().map(|i| i.status);
    assert_eq!(status("abc"), Some(InvitationStatus::Accepted));
    assert_eq!(status("def"), Some(InvitationStatus::Declined));
    assert_eq!(status("ghi"), Some(InvitationStatus::Pending));
    assert_eq!(invitations.find("abc").unwrap().unwrap().name, "Alice");

    // Two saves per answered invitation.
    assert_eq!(invitations.get("abc").unwrap().version, 2);
    assert_eq!(invitations.get("ghi").unwrap().version, 1);
    assert_eq!(invitations.all().unwrap().len(), 3);

    writer.close().unwrap();
    reader.close().unwrap();
}

#[test]
fn projection_failures_do_not_stop_the_listener() {
    let transport = InMemoryTransport::new();
    let bus = bus(&transport, "invitations");
    register_all(&bus);

    let store = InMemoryReadModelStore::new();
    bus.add_global_handler(Arc::new(Projection::new(InvitationProjector::new(
        store.clone(),
    ))));

    // Accepting an invitation nobody created is rejected by the projector.
    bus.publish_event(&accepted("nobody"));
    bus.publish_event(&created("abc", "Alice"));

    let invitations = store.read_models::<Invitation>();
    assert!(eventually(|| invitations.find("abc").unwrap().is_some()));
    assert!(invitations.find("nobody").unwrap().is_none());
    assert!(eventually(|| bus.stats().dispatched == 2));

    bus.close().unwrap();
}

#[test]
fn views_stop_changing_after_close() {
    let transport = InMemoryTransport::new();
    let writer = bus(&transport, "invitations");
    let reader = bus(&transport, "invitations");
    register_all(&reader);

    let store = InMemoryReadModelStore::new();
    reader.add_global_handler(Arc::new(Projection::new(GuestListProjector::new(
        store.clone(),
    ))));

    writer.publish_event(&created("abc", "Alice"));
    let lists = store.read_models::<GuestList>();
    assert!(eventually(|| lists.find(GUEST_LIST_ID).unwrap().is_some()));

    reader.close().unwrap();
    writer.publish_event(&created("def", "Bob"));
    thread::sleep(Duration::from_millis(50));

    assert_eq!(lists.find(GUEST_LIST_ID).unwrap().unwrap().invited, 1);
    writer.close().unwrap();
}
