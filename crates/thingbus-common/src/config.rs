//! Configuration types for Thingbus
//!
//! This module defines configuration structures shared by the services.
//! Every section has defaults so a partial TOML file is enough.

use crate::error::{Error, Result};
use crate::THINGS_STREAM;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for a Thingbus service
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Keyed store configuration
    pub store: StoreConfig,
    /// Lifecycle subscription configuration
    pub events: EventsConfig,
    /// Route-map configuration
    pub route_map: RouteMapConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or spin the subscription loop.
    pub fn validate(&self) -> Result<()> {
        if self.store.backend == StoreBackend::Remote && self.store.address.is_empty() {
            return Err(Error::configuration(
                "store.address is required for the remote backend",
            ));
        }
        if self.store.timeout_ms == 0 {
            return Err(Error::configuration("store.timeout_ms must be positive"));
        }
        let events = &self.events;
        if events.stream.is_empty() {
            return Err(Error::configuration("events.stream must not be empty"));
        }
        if events.group.is_empty() {
            return Err(Error::configuration("events.group must not be empty"));
        }
        if events.batch_size == 0 {
            return Err(Error::configuration("events.batch_size must be positive"));
        }
        if events.block_ms == 0 {
            return Err(Error::configuration("events.block_ms must be positive"));
        }
        if events.pending_retry_ms == 0 {
            return Err(Error::configuration(
                "events.pending_retry_ms must be positive",
            ));
        }
        if events.min_backoff_ms > events.max_backoff_ms {
            return Err(Error::configuration(
                "events.min_backoff_ms must not exceed events.max_backoff_ms",
            ));
        }
        if events.connect_attempts == 0 {
            return Err(Error::configuration(
                "events.connect_attempts must be positive",
            ));
        }
        Ok(())
    }
}

/// How a service reaches the keyed store
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Open the database file in-process. The file is locked, so only one
    /// process can use it.
    #[default]
    Embedded,
    /// Connect to a `thingbus-stored` server shared by all services
    Remote,
}

/// Keyed store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Path of the durable store database file (embedded backend and server)
    pub path: PathBuf,
    /// Store server address: listen address of the server, target of
    /// remote clients
    pub address: String,
    /// Timeout of a single store request, on top of any blocking wait
    /// (milliseconds)
    pub timeout_ms: u64,
}

impl StoreConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Embedded,
            path: PathBuf::from("./thingbus-data/store.redb"),
            address: "127.0.0.1:7400".to_string(),
            timeout_ms: 5000,
        }
    }
}

/// Where a newly created consumer group starts reading
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStartConfig {
    /// Deliver the whole retained history
    #[default]
    Beginning,
    /// Deliver only entries appended after the group is created
    Latest,
}

/// Lifecycle event subscription configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Stream to subscribe to
    pub stream: String,
    /// Consumer group name (the service identity)
    pub group: String,
    /// Deployment instance tag, appended to the group name to form the
    /// consumer name. Must be stable across restarts for crash recovery.
    pub instance: String,
    /// Maximum records fetched per read
    pub batch_size: usize,
    /// Bounded wait for new records (milliseconds)
    pub block_ms: u64,
    /// Cap on the delay before a failed record is retried from the pending list (milliseconds)
    pub pending_retry_ms: u64,
    /// Idle time after which another consumer may claim a record (milliseconds, 0 disables)
    pub claim_idle_ms: u64,
    /// First backoff after a store failure (milliseconds)
    pub min_backoff_ms: u64,
    /// Backoff cap after repeated store failures (milliseconds)
    pub max_backoff_ms: u64,
    /// Attempts made to set up the consumer group before giving up
    pub connect_attempts: u32,
    /// Starting position of a newly created group
    pub group_start: GroupStartConfig,
}

impl EventsConfig {
    /// Consumer name within the group: `<group>` or `<group>-<instance>`.
    #[must_use]
    pub fn consumer_name(&self) -> String {
        if self.instance.is_empty() {
            self.group.clone()
        } else {
            format!("{}-{}", self.group, self.instance)
        }
    }

    #[must_use]
    pub const fn block(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }

    #[must_use]
    pub const fn pending_retry(&self) -> Duration {
        Duration::from_millis(self.pending_retry_ms)
    }

    #[must_use]
    pub const fn claim_idle(&self) -> Option<Duration> {
        if self.claim_idle_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.claim_idle_ms))
        }
    }

    #[must_use]
    pub const fn min_backoff(&self) -> Duration {
        Duration::from_millis(self.min_backoff_ms)
    }

    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            stream: THINGS_STREAM.to_string(),
            group: "thingbus-lora".to_string(),
            instance: String::new(),
            batch_size: 100,
            block_ms: 1000,
            pending_retry_ms: 5000,
            claim_idle_ms: 60_000,
            min_backoff_ms: 100,
            max_backoff_ms: 10_000,
            connect_attempts: 5,
            group_start: GroupStartConfig::Beginning,
        }
    }
}

/// Route-map settings for one entity class
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteClassConfig {
    /// Key prefix scoping this class in the shared store
    pub prefix: String,
    /// JSON pointer locating the foreign id inside entity metadata
    pub metadata_pointer: String,
}

/// Route-map configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteMapConfig {
    /// Thing (device) mappings
    pub thing: RouteClassConfig,
    /// Channel (application) mappings
    pub channel: RouteClassConfig,
}

impl Default for RouteMapConfig {
    fn default() -> Self {
        Self {
            thing: RouteClassConfig {
                prefix: "lora:thing".to_string(),
                metadata_pointer: "/lora/dev_eui".to_string(),
            },
            channel: RouteClassConfig {
                prefix: "lora:channel".to_string(),
                metadata_pointer: "/lora/app_id".to_string(),
            },
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
