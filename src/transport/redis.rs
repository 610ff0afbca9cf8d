//! Redis transport (requires the "redis" feature).
//!
//! Publishes go through an `r2d2` pool of ordinary connections. The
//! subscription uses its own connection and speaks `PSUBSCRIBE` /
//! `PUNSUBSCRIBE` directly, reading raw replies so the subscription counts
//! Redis reports are visible to the bus.

use std::time::Duration;

use redis::{Client, IntoConnectionInfo, Value};

use super::{Connection, Notification, Subscription, Transport, TransportError};
use crate::config::RedisConfig;

/// Redis-backed pub/sub transport.
///
/// ## Example
///
/// ```ignore
/// use sourced_bus::{BusConfig, EventBus, RedisConfig, RedisTransport};
///
/// let transport = RedisTransport::connect(&RedisConfig::new("localhost:6379"))?;
/// let bus = EventBus::new(transport, BusConfig::new("invitations"))?;
/// ```
pub struct RedisTransport {
    client: Client,
    pool: r2d2::Pool<Client>,
}

impl RedisTransport {
    /// Build a client and a lazily filled connection pool from `config`.
    ///
    /// No connection is opened until the first publish or subscription.
    pub fn connect(config: &RedisConfig) -> Result<Self, TransportError> {
        let mut info = config
            .url()
            .as_str()
            .into_connection_info()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        if let Some(password) = &config.password {
            info.redis.password = Some(password.clone());
        }

        let client =
            Client::open(info).map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let pool = r2d2::Pool::builder()
            .max_size(config.pool_size.max(1))
            .min_idle(Some(0))
            .idle_timeout(Some(config.idle_timeout()))
            .test_on_check_out(config.test_on_borrow)
            .connection_timeout(config.connect_timeout())
            .build(client.clone())
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        Ok(Self::with_pool(client, pool))
    }

    /// Use a pool the host application already manages for publishes.
    /// `client` opens the dedicated subscription connection and should
    /// point at the same server as the pool.
    pub fn with_pool(client: Client, pool: r2d2::Pool<Client>) -> Self {
        Self { client, pool }
    }

    /// The pool publishes are sent through.
    pub fn pool(&self) -> &r2d2::Pool<Client> {
        &self.pool
    }
}

impl Transport for RedisTransport {
    type Connection = RedisConnection;
    type Subscription = RedisSubscription;

    fn connection(&self) -> Result<Self::Connection, TransportError> {
        self.pool
            .get()
            .map(|conn| RedisConnection { conn })
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))
    }

    fn subscription(&self) -> Result<Self::Subscription, TransportError> {
        self.client
            .get_connection()
            .map(|conn| RedisSubscription { conn })
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))
    }
}

/// A pooled publish connection; returned to the pool on drop.
pub struct RedisConnection {
    conn: r2d2::PooledConnection<Client>,
}

impl Connection for RedisConnection {
    fn publish(&mut self, channel: &str, payload: &[u8]) -> Result<usize, TransportError> {
        redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query::<usize>(&mut *self.conn)
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

/// The dedicated subscription connection; closed on drop.
pub struct RedisSubscription {
    conn: redis::Connection,
}

impl RedisSubscription {
    fn send(&mut self, packed: &[u8]) -> Result<(), TransportError> {
        self.conn
            .send_packed_command(packed)
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

impl Subscription for RedisSubscription {
    fn psubscribe(&mut self, pattern: &str) -> Result<(), TransportError> {
        let packed = redis::cmd("PSUBSCRIBE").arg(pattern).get_packed_command();
        self.send(&packed)
    }

    fn punsubscribe(&mut self) -> Result<(), TransportError> {
        let packed = redis::cmd("PUNSUBSCRIBE").get_packed_command();
        self.send(&packed)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Notification>, TransportError> {
        // A zero read timeout is rejected by the socket.
        let timeout = timeout.max(Duration::from_millis(1));
        self.conn
            .set_read_timeout(Some(timeout))
            .map_err(|e| TransportError::Backend(e.to_string()))?;

        match self.conn.recv_response() {
            Ok(value) => parse_notification(&value),
            Err(e) if e.is_timeout() => Ok(None),
            Err(e) if e.is_connection_dropped() => Err(TransportError::Closed),
            Err(e) => Err(TransportError::Backend(e.to_string())),
        }
    }
}

/// Decode a pub/sub push reply. Replies of other kinds yield `None`.
fn parse_notification(value: &Value) -> Result<Option<Notification>, TransportError> {
    let items: Vec<Value> = redis::from_redis_value(value).map_err(protocol)?;
    let (kind, rest) = items
        .split_first()
        .ok_or_else(|| TransportError::Protocol("empty pub/sub reply".into()))?;
    let kind: String = redis::from_redis_value(kind).map_err(protocol)?;

    let notification = match (kind.as_str(), rest) {
        ("pmessage", [pattern, channel, payload]) => Notification::Message {
            pattern: redis::from_redis_value(pattern).map_err(protocol)?,
            channel: redis::from_redis_value(channel).map_err(protocol)?,
            payload: redis::from_redis_value(payload).map_err(protocol)?,
        },
        ("psubscribe", [pattern, count]) => Notification::Subscribed {
            pattern: optional_string(pattern)?,
            count: redis::from_redis_value(count).map_err(protocol)?,
        },
        ("punsubscribe", [pattern, count]) => Notification::Unsubscribed {
            pattern: optional_string(pattern)?,
            count: redis::from_redis_value(count).map_err(protocol)?,
        },
        _ => return Ok(None),
    };
    Ok(Some(notification))
}

// PUNSUBSCRIBE with nothing subscribed replies with a nil pattern.
fn optional_string(value: &Value) -> Result<String, TransportError> {
    let pattern: Option<String> = redis::from_redis_value(value).map_err(protocol)?;
    Ok(pattern.unwrap_or_default())
}

fn protocol(err: redis::RedisError) -> TransportError {
    TransportError::Protocol(err.to_string())
}
