//! Event bus integration tests on the in-memory transport.
//!
//! Covers local dispatch, the transport round trip to global handlers,
//! inbound failure handling, lifecycle (close, timeouts, transport errors)
//! and concurrent use.

#[path = "../support/mod.rs"]
mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize, Serializer};
use sourced_bus::{
    BusError, Event, EventBus, EventCodec, EventHandler, InMemoryTransport, ListenerState,
    TransportError,
};
use support::invitations::{accepted, created, declined, register_all, InviteAccepted, InviteCreated};
use support::{bus, config, eventually, Journal};

// ============================================================================
// Local dispatch
// ============================================================================

#[test]
fn per_type_then_local_handlers_run_before_the_global_copy() {
    let transport = InMemoryTransport::new();
    let bus = bus(&transport, "invitations");
    register_all(&bus);

    let journal = Journal::new();
    let sample = InviteCreated::default();
    for i in 0..3 {
        bus.add_handler(journal.recorder(&format!("type-{i}")), &sample);
    }
    for i in 0..2 {
        bus.add_local_handler(journal.recorder(&format!("local-{i}")));
    }
    bus.add_global_handler(journal.recorder("global"));

    bus.publish_event(&created("abc", "Alice"));

    // Publish returned: every local handler already ran, exactly once.
    let labels = journal.labels();
    assert!(labels.len() >= 5);
    let mut local: Vec<&str> = labels[..5].iter().map(String::as_str).collect();
    assert!(local[..3].iter().all(|l| l.starts_with("type-")));
    assert!(local[3..].iter().all(|l| l.starts_with("local-")));
    local.sort();
    assert_eq!(local, vec!["local-0", "local-1", "type-0", "type-1", "type-2"]);

    assert!(eventually(|| journal.count("global") == 1));
    assert_eq!(journal.len(), 6);
    assert_eq!(journal.labels().last().map(String::as_str), Some("global"));
    assert!(journal.entries().iter().all(|e| e.aggregate_id == "abc"));

    bus.close().unwrap();
}

#[test]
fn per_type_handlers_only_see_their_type() {
    let transport = InMemoryTransport::new();
    let bus = bus(&transport, "invitations");

    let journal = Journal::new();
    bus.add_handler(journal.recorder("created"), &InviteCreated::default());
    bus.add_handler(journal.recorder("accepted"), &InviteAccepted::default());

    bus.publish_event(&accepted("abc"));
    bus.publish_event(&declined("abc"));

    assert_eq!(journal.labels(), vec!["accepted"]);
    bus.close().unwrap();
}

#[test]
fn adding_the_same_handler_twice_invokes_it_once() {
    let transport = InMemoryTransport::new();
    let bus = bus(&transport, "invitations");
    register_all(&bus);

    let journal = Journal::new();
    let typed = journal.recorder("type");
    let local = journal.recorder("local");
    let global = journal.recorder("global");
    for _ in 0..2 {
        bus.add_handler(typed.clone(), &InviteCreated::default());
        bus.add_local_handler(local.clone());
        bus.add_global_handler(global.clone());
    }

    bus.publish_event(&created("abc", "Alice"));

    assert!(eventually(|| journal.count("global") == 1));
    assert_eq!(journal.count("type"), 1);
    assert_eq!(journal.count("local"), 1);
    bus.close().unwrap();
}

#[test]
fn handlers_may_publish_from_inside_dispatch() {
    let transport = InMemoryTransport::new();
    let bus = Arc::new(bus(&transport, "invitations"));
    register_all(&bus);

    let journal = Journal::new();
    bus.add_global_handler(journal.recorder("global"));

    let inner = Arc::downgrade(&bus);
    bus.add_handler(
        Arc::new(move |event: &dyn Event| {
            if let Some(bus) = inner.upgrade() {
                bus.publish_event(&accepted(&event.aggregate_id()));
            }
        }),
        &InviteCreated::default(),
    );

    bus.publish_event(&created("abc", "Alice"));

    assert!(eventually(|| journal.count("global") == 2));
    let types: Vec<String> = journal.entries().into_iter().map(|e| e.event_type).collect();
    assert!(types.contains(&"InviteCreated".to_string()));
    assert!(types.contains(&"InviteAccepted".to_string()));
    bus.close().unwrap();
}

// ============================================================================
// Transport round trip
// ============================================================================

#[test]
fn events_are_sent_on_the_app_channel() {
    let transport = InMemoryTransport::recording();
    let bus = bus(&transport, "invitations");

    bus.publish_event(&created("abc", "Alice"));
    bus.publish_event(&declined("abc"));

    assert_eq!(
        transport.published_channels(),
        vec![
            "invitations:events:InviteCreated",
            "invitations:events:InviteDeclined"
        ]
    );

    let (_, payload) = &transport.published()[0];
    let mut decoded = InviteCreated::default();
    decoded.decode_into(payload).unwrap();
    assert_eq!(decoded, created("abc", "Alice"));

    assert_eq!(bus.stats().published, 2);
    bus.close().unwrap();
}

#[test]
fn global_handlers_of_every_instance_receive_remote_events() {
    let transport = InMemoryTransport::new();
    let writer = bus(&transport, "invitations");
    let reader = bus(&transport, "invitations");
    let stranger = bus(&transport, "billing");
    for bus in [&writer, &reader, &stranger] {
        register_all(bus);
    }

    let journal = Journal::new();
    writer.add_global_handler(journal.recorder("writer"));
    reader.add_global_handler(journal.recorder("reader"));
    reader.add_local_handler(journal.recorder("reader-local"));
    stranger.add_global_handler(journal.recorder("stranger"));

    writer.publish_event(&created("abc", "Alice"));

    assert!(eventually(|| journal.count("writer") == 1 && journal.count("reader") == 1));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(journal.count("reader-local"), 0);
    assert_eq!(journal.count("stranger"), 0);

    for bus in [&writer, &reader, &stranger] {
        bus.close().unwrap();
    }
}

#[test]
fn unknown_event_types_do_not_stop_the_listener() {
    let transport = InMemoryTransport::new();
    let bus = bus(&transport, "invitations");
    bus.register::<InviteCreated>().unwrap();

    let journal = Journal::new();
    bus.add_global_handler(journal.recorder("global"));

    // InviteAccepted is not registered on this instance.
    bus.publish_event(&accepted("abc"));
    transport.inject("invitations:events:NoSuchEvent", b"whatever");
    bus.publish_event(&created("def", "Bob"));

    assert!(eventually(|| journal.count("global") == 1));
    assert_eq!(journal.entries()[0].aggregate_id, "def");
    assert!(eventually(|| bus.stats().unregistered == 2));
    assert_eq!(bus.state(), ListenerState::Running);
    bus.close().unwrap();
}

#[test]
fn undecodable_payloads_are_skipped() {
    let transport = InMemoryTransport::new();
    let bus = bus(&transport, "invitations");
    register_all(&bus);

    let journal = Journal::new();
    bus.add_global_handler(journal.recorder("global"));

    transport.inject("invitations:events:InviteCreated", &[]);
    bus.publish_event(&created("abc", "Alice"));

    assert!(eventually(|| journal.count("global") == 1));
    assert!(eventually(|| bus.stats().decode_failures == 1));
    assert!(eventually(|| bus.stats().dispatched == 1));
    assert_eq!(bus.stats().received, 2);
    bus.close().unwrap();
}

#[test]
fn first_registration_stays_active() {
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Impostor {
        code: u32,
    }

    impl Event for Impostor {
        fn event_type(&self) -> &str {
            "InviteCreated"
        }

        fn aggregate_id(&self) -> String {
            self.code.to_string()
        }
    }

    let transport = InMemoryTransport::new();
    let bus = bus(&transport, "invitations");
    bus.register::<InviteCreated>().unwrap();

    let err = bus.register::<Impostor>().unwrap_err();
    assert!(matches!(err, BusError::AlreadyRegistered { ref event_type } if event_type == "InviteCreated"));

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    bus.add_global_handler(Arc::new(move |event: &dyn Event| {
        assert_eq!(
            event.downcast_ref::<InviteCreated>(),
            Some(&created("abc", "Alice"))
        );
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    bus.publish_event(&created("abc", "Alice"));

    assert!(eventually(|| seen.load(Ordering::SeqCst) == 1));
    bus.close().unwrap();
}

// ============================================================================
// Publish failures
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
struct Unencodable {
    id: String,
}

impl Serialize for Unencodable {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("refusing to encode"))
    }
}

impl Event for Unencodable {
    fn event_type(&self) -> &str {
        "Unencodable"
    }

    fn aggregate_id(&self) -> String {
        self.id.clone()
    }
}

#[test]
fn encode_failure_releases_the_connection_and_returns_normally() {
    let transport = InMemoryTransport::recording();
    let bus = bus(&transport, "invitations");

    let journal = Journal::new();
    bus.add_local_handler(journal.recorder("local"));

    bus.publish_event(&Unencodable { id: "x".into() });

    assert_eq!(journal.count("local"), 1);
    assert!(transport.published().is_empty());
    assert_eq!(transport.connections_acquired(), 1);
    assert_eq!(transport.connections_released(), 1);

    let stats = bus.stats();
    assert_eq!(stats.published, 0);
    assert_eq!(stats.publish_failures, 1);
    bus.close().unwrap();
}

#[test]
fn send_failure_releases_the_connection_and_returns_normally() {
    let transport = InMemoryTransport::new();
    let bus = bus(&transport, "invitations");
    register_all(&bus);

    let journal = Journal::new();
    bus.add_local_handler(journal.recorder("local"));
    bus.add_global_handler(journal.recorder("global"));

    transport.fail_publishes(true);
    bus.publish_event(&created("abc", "Alice"));
    transport.fail_publishes(false);
    bus.publish_event(&created("def", "Bob"));

    assert_eq!(journal.count("local"), 2);
    assert!(eventually(|| journal.count("global") == 1));
    assert_eq!(transport.connections_acquired(), 2);
    assert_eq!(transport.connections_released(), 2);

    let stats = bus.stats();
    assert_eq!(stats.published, 1);
    assert_eq!(stats.publish_failures, 1);
    bus.close().unwrap();
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn app_ids_with_pattern_syntax_are_rejected_before_subscribing() {
    let transport = InMemoryTransport::new();

    for app_id in [r"tenant\eu", "a*", "tenant?", "[ab]", "my app", ""] {
        let Err(err) = EventBus::new(transport.clone(), config(app_id)) else {
            panic!("{app_id:?} was accepted");
        };
        assert!(
            matches!(&err, BusError::InvalidAppId { app_id: id, .. } if id == app_id),
            "{app_id:?}: {err}"
        );
    }

    assert_eq!(transport.open_subscriptions(), 0);
    assert_eq!(transport.subscriptions_released(), 0);
}

#[test]
fn unconfirmed_subscription_fails_startup_and_releases_the_connection() {
    let transport = InMemoryTransport::new();
    transport.suppress_subscribe_acks(true);

    let timeout = Duration::from_millis(100);
    let Err(err) = EventBus::new(
        transport.clone(),
        config("invitations").with_startup_timeout(timeout),
    ) else {
        panic!("startup succeeded without a confirmation");
    };

    assert!(matches!(err, BusError::StartupTimeout(t) if t == timeout), "{err}");
    assert!(eventually(|| transport.subscriptions_released() == 1));
    assert_eq!(transport.open_subscriptions(), 0);
}

#[test]
fn subscribe_error_is_returned_from_new() {
    let transport = InMemoryTransport::new();
    transport.fail_subscribes(true);

    let Err(err) = EventBus::new(transport.clone(), config("invitations")) else {
        panic!("startup succeeded with a failing subscribe");
    };

    assert!(
        matches!(err, BusError::Transport(TransportError::ConnectionFailed(_))),
        "{err}"
    );
    // The listener is joined before `new` returns.
    assert_eq!(transport.open_subscriptions(), 0);
    assert_eq!(transport.subscriptions_released(), 1);

    transport.fail_subscribes(false);
    let bus = bus(&transport, "invitations");
    assert_eq!(bus.state(), ListenerState::Running);
    bus.close().unwrap();
}

#[test]
fn close_from_a_global_handler_returns_without_waiting() {
    let transport = InMemoryTransport::new();
    let bus = Arc::new(bus(&transport, "invitations"));
    register_all(&*bus);

    let slot: Arc<Mutex<Weak<EventBus<InMemoryTransport>>>> =
        Arc::new(Mutex::new(Weak::new()));
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let (target, seen) = (Arc::clone(&slot), Arc::clone(&outcomes));
    bus.add_global_handler(Arc::new(move |_: &dyn Event| {
        let Some(bus) = target.lock().unwrap().upgrade() else {
            return;
        };
        let started = Instant::now();
        let result = bus.close();
        seen.lock().unwrap().push((result.is_ok(), started.elapsed()));
    }));
    *slot.lock().unwrap() = Arc::downgrade(&bus);

    bus.publish_event(&created("abc", "Alice"));

    assert!(eventually(|| outcomes.lock().unwrap().len() == 1));
    let (ok, elapsed) = outcomes.lock().unwrap()[0];
    assert!(ok);
    assert!(elapsed < Duration::from_secs(1), "close waited {elapsed:?}");

    assert!(eventually(|| bus.state() == ListenerState::Closed));
    assert!(eventually(|| transport.open_subscriptions() == 0));

    bus.publish_event(&created("def", "Bob"));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(outcomes.lock().unwrap().len(), 1);
    bus.close().unwrap();
}

#[test]
fn no_global_invocations_after_close() {
    let transport = InMemoryTransport::new();
    let bus = bus(&transport, "invitations");
    register_all(&bus);

    let journal = Journal::new();
    bus.add_global_handler(journal.recorder("global"));

    bus.close().unwrap();
    assert_eq!(bus.state(), ListenerState::Closed);
    assert_eq!(transport.open_subscriptions(), 0);

    let payload = created("abc", "Alice").encode().unwrap();
    assert_eq!(transport.inject("invitations:events:InviteCreated", &payload), 0);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(journal.count("global"), 0);
}

#[test]
fn publish_after_close_still_runs_local_handlers_and_sends() {
    let transport = InMemoryTransport::new();
    let closed = bus(&transport, "invitations");
    let open = bus(&transport, "invitations");
    register_all(&open);

    let journal = Journal::new();
    closed.add_local_handler(journal.recorder("local"));
    open.add_global_handler(journal.recorder("remote"));

    closed.close().unwrap();
    closed.publish_event(&created("abc", "Alice"));

    assert_eq!(journal.count("local"), 1);
    assert!(eventually(|| journal.count("remote") == 1));
    open.close().unwrap();
}

#[test]
fn close_is_idempotent() {
    let transport = InMemoryTransport::new();
    let bus = bus(&transport, "invitations");

    bus.close().unwrap();
    bus.close().unwrap();
    bus.close().unwrap();

    assert_eq!(transport.subscriptions_released(), 1);
}

#[test]
fn close_times_out_when_unsubscribe_is_never_confirmed() {
    let transport = InMemoryTransport::new();
    let bus = EventBus::new(
        transport.clone(),
        config("invitations").with_shutdown_timeout(Duration::from_millis(100)),
    )
    .unwrap();

    transport.suppress_unsubscribe_acks(true);

    let err = bus.close().unwrap_err();
    assert!(matches!(err, BusError::ShutdownTimeout(t) if t == Duration::from_millis(100)));

    // The listener aborts at its next poll and releases the connection.
    assert!(eventually(|| transport.open_subscriptions() == 0));
    assert!(eventually(|| bus.state() == ListenerState::Closed));
    bus.close().unwrap();
}

#[test]
fn transport_error_terminates_the_listener() {
    let transport = InMemoryTransport::new();
    let bus = bus(&transport, "invitations");
    register_all(&bus);

    let journal = Journal::new();
    bus.add_global_handler(journal.recorder("global"));

    transport.sever_subscriptions();

    assert!(eventually(|| bus.state() == ListenerState::Closed));
    assert!(eventually(|| transport.open_subscriptions() == 0));

    // Publishing keeps working; the copy is simply not received.
    bus.publish_event(&created("abc", "Alice"));
    assert_eq!(bus.stats().published, 1);

    bus.close().unwrap();
    assert_eq!(journal.count("global"), 0);
}

#[test]
fn dropping_the_bus_stops_the_listener() {
    let transport = InMemoryTransport::new();
    {
        let _bus = bus(&transport, "invitations");
        assert_eq!(transport.open_subscriptions(), 1);
    }
    assert!(eventually(|| transport.open_subscriptions() == 0));
}

// ============================================================================
// Concurrency
// ============================================================================

/// Counts invocations and fails if it ever sees an event of another type.
struct TypeGuard<E> {
    calls: AtomicUsize,
    leaks: AtomicUsize,
    _event: std::marker::PhantomData<fn() -> E>,
}

impl<E> TypeGuard<E> {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            leaks: AtomicUsize::new(0),
            _event: std::marker::PhantomData,
        }
    }
}

impl<E: Event> EventHandler for TypeGuard<E> {
    fn handle_event(&self, event: &dyn Event) {
        if event.is::<E>() {
            self.calls.fetch_add(1, Ordering::SeqCst);
        } else {
            self.leaks.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn concurrent_publishers_and_registrations() {
    const THREADS: usize = 50;
    const EVENTS: usize = 100;
    const TOTAL: usize = THREADS * EVENTS;

    let transport = InMemoryTransport::new();
    let bus = Arc::new(bus(&transport, "invitations"));
    register_all(&bus);

    let created_guard = Arc::new(TypeGuard::<InviteCreated>::new());
    let accepted_guard = Arc::new(TypeGuard::<InviteAccepted>::new());
    bus.add_handler(created_guard.clone(), &InviteCreated::default());
    bus.add_handler(accepted_guard.clone(), &InviteAccepted::default());

    let received = Arc::new(AtomicUsize::new(0));
    let counter = received.clone();
    bus.add_global_handler(Arc::new(move |_: &dyn Event| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let journal = Journal::new();
    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let bus = Arc::clone(&bus);
            let journal = journal.clone();
            thread::spawn(move || {
                // Registration races with publishing on other threads.
                let mine = journal.recorder(&format!("worker-{t}"));
                bus.add_local_handler(mine);

                for i in 0..EVENTS {
                    let id = format!("{t}-{i}");
                    if i % 2 == 0 {
                        bus.publish_event(&created(&id, "guest"));
                    } else {
                        bus.publish_event(&accepted(&id));
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(created_guard.calls.load(Ordering::SeqCst), TOTAL / 2);
    assert_eq!(accepted_guard.calls.load(Ordering::SeqCst), TOTAL / 2);
    assert_eq!(created_guard.leaks.load(Ordering::SeqCst), 0);
    assert_eq!(accepted_guard.leaks.load(Ordering::SeqCst), 0);

    assert!(eventually(|| received.load(Ordering::SeqCst) == TOTAL));
    assert_eq!(bus.stats().published, TOTAL as u64);
    assert_eq!(transport.connections_acquired(), transport.connections_released());

    // Every concurrently registered local handler is in place exactly once.
    let before = journal.len();
    bus.publish_event(&declined("after"));
    let after: Vec<_> = journal.entries()[before..].to_vec();
    assert_eq!(after.len(), THREADS);
    for t in 0..THREADS {
        assert_eq!(
            after.iter().filter(|e| e.label == format!("worker-{t}")).count(),
            1
        );
    }

    bus.close().unwrap();
}
