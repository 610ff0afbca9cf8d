//! Transport - publish/subscribe back-ends for the event bus.
//!
//! The bus needs three things from a messaging backend: a pooled connection
//! to publish on a named channel, one dedicated connection holding a
//! pattern subscription, and the control signals reporting how many
//! subscriptions that connection holds.
//!
//! ```text
//! ┌──────────────────────────┐        ┌──────────────────────────────┐
//! │ EventBus::publish_event  │        │ listener thread              │
//! │  transport.connection()  │        │  transport.subscription()    │
//! │  conn.publish(ch, bytes) │        │  psubscribe / receive / ...  │
//! └────────────┬─────────────┘        └──────────────▲───────────────┘
//!              │                                     │
//!              ▼                                     │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  InMemoryTransport (included)   │   RedisTransport ("redis")    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod in_memory;
pub(crate) mod pattern;
#[cfg(feature = "redis")]
mod redis;

use std::time::Duration;

use thiserror::Error;

pub use in_memory::{InMemoryConnection, InMemorySubscription, InMemoryTransport};
pub use pattern::glob_match;
#[cfg(feature = "redis")]
pub use self::redis::{RedisConnection, RedisSubscription, RedisTransport};

/// Error type for transport operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Could not obtain a connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// The backend rejected or failed to deliver a publish.
    #[error("send failed: {0}")]
    SendFailed(String),
    /// The backend replied with something the bus does not understand.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The connection was closed by the backend.
    #[error("connection closed")]
    Closed,
    /// Other backend error.
    #[error("transport error: {0}")]
    Backend(String),
}

/// A message or control signal received on a subscription connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A payload published on a channel matching `pattern`.
    Message {
        pattern: String,
        channel: String,
        payload: Vec<u8>,
    },
    /// A pattern subscription became active; `count` is the number of
    /// subscriptions now held by the connection.
    Subscribed { pattern: String, count: usize },
    /// A pattern subscription was removed; `count` is the number remaining.
    Unsubscribed { pattern: String, count: usize },
}

/// A pooled connection used for a single publish.
///
/// Dropping the connection returns it to the pool.
pub trait Connection {
    /// Publish `payload` on `channel`. Returns the number of receivers the
    /// backend reported.
    fn publish(&mut self, channel: &str, payload: &[u8]) -> Result<usize, TransportError>;
}

/// A dedicated connection holding pattern subscriptions.
///
/// Owned by exactly one thread for its whole life; dropping it releases the
/// underlying connection.
pub trait Subscription: Send + 'static {
    /// Request a pattern subscription. Confirmation arrives later as
    /// [`Notification::Subscribed`].
    fn psubscribe(&mut self, pattern: &str) -> Result<(), TransportError>;

    /// Request removal of every pattern subscription. Confirmation arrives
    /// as one or more [`Notification::Unsubscribed`], the last with count 0.
    fn punsubscribe(&mut self) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next notification. `Ok(None)` means the
    /// timeout elapsed.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Notification>, TransportError>;
}

/// A publish/subscribe messaging backend.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Subscription: Subscription;

    /// Borrow a connection from the pool for one publish.
    fn connection(&self) -> Result<Self::Connection, TransportError>;

    /// Open a dedicated connection for subscribing.
    fn subscription(&self) -> Result<Self::Subscription, TransportError>;
}
