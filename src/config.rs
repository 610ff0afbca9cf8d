//! Configuration consumed when constructing a bus and its transport.
//!
//! Both structs deserialize with serde, so a hosting application can embed
//! them in its own configuration file; every field except the identifiers
//! has a default.
//!
//! ```ignore
//! let config: BusConfig = serde_json::from_str(r#"{ "app_id": "invitations" }"#)?;
//! assert_eq!(config.prefix(), "invitations:events:");
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BusError;
use crate::transport::pattern::literal_segment_problem;

const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

const DEFAULT_POOL_SIZE: u32 = 3;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 240;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Settings for one [`EventBus`](crate::EventBus) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Application or tenant identifier. Every channel of this bus is
    /// named `<app_id>:events:<event type>`.
    pub app_id: String,
    /// How long construction waits for the subscription to be confirmed.
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
    /// How long `close` waits for the unsubscription to be confirmed.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Receive timeout of the listener; bounds how quickly it notices a
    /// close request while the transport is idle.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl BusConfig {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = duration_ms(interval);
        self
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero receive timeout would turn the listener into a busy loop.
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Check that `app_id` can be used literally in the subscription
    /// pattern. Glob metacharacters would let the bus match other
    /// applications' channels, or miss its own.
    pub fn validate(&self) -> Result<(), BusError> {
        match literal_segment_problem(&self.app_id) {
            None => Ok(()),
            Some(reason) => Err(BusError::InvalidAppId {
                app_id: self.app_id.clone(),
                reason,
            }),
        }
    }

    /// Channel prefix shared by every event of this application.
    pub fn prefix(&self) -> String {
        format!("{}:events:", self.app_id)
    }

    /// Pattern matching every event channel of this application.
    pub fn pattern(&self) -> String {
        format!("{}*", self.prefix())
    }

    /// Channel an event of `event_type` is published on.
    pub fn channel(&self, event_type: &str) -> String {
        format!("{}{}", self.prefix(), event_type)
    }
}

/// Connection settings for the Redis transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// `host:port` or a full `redis://` URL.
    pub server: String,
    /// Optional `AUTH` password.
    #[serde(default)]
    pub password: Option<String>,
    /// Maximum number of publish connections the pool keeps open, busy or
    /// idle. This bounds concurrent publishes as well: once all are checked
    /// out, a publish waits up to `connect_timeout_ms` for one to return.
    /// There is no separate cap on idle connections; they are closed after
    /// `idle_timeout_secs`.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Idle pooled connections are closed after this long.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// PING a pooled connection before handing it out.
    #[serde(default = "default_test_on_borrow")]
    pub test_on_borrow: bool,
    /// How long to wait for a pooled connection.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl RedisConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            password: None,
            pool_size: DEFAULT_POOL_SIZE,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            test_on_borrow: true,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_test_on_borrow(mut self, test: bool) -> Self {
        self.test_on_borrow = test;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// The server address as a `redis://` URL.
    pub fn url(&self) -> String {
        if self.server.contains("://") {
            self.server.clone()
        } else {
            format!("redis://{}", self.server)
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn default_startup_timeout_ms() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_MS
}

fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

fn default_test_on_borrow() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}
