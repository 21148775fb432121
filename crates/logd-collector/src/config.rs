//! Configuration for the collector and syslog listener

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use logd_core::MAX_MESSAGE_SIZE;
use logd_storage::{RetentionPolicy, StoreConfig};

/// Default page size for `get_events`
pub const DEFAULT_LIMIT: usize = 500;

/// Largest accepted page size for `get_events`
pub const MAX_LIMIT: usize = 10_000;

/// Default capacity of the single-writer agent inbox
pub const DEFAULT_AGENT_INBOX_CAPACITY: usize = 300;

/// Default interval between eviction passes
pub const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(5);

/// Default UDP port for syslog ingestion
pub const DEFAULT_SYSLOG_PORT: u16 = 4500;

/// Configuration for a [`crate::Collector`]
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Base directory for the state file and the event store
    pub home_dir: PathBuf,
    /// Event store configuration
    pub store: StoreConfig,
    /// Interval between eviction passes
    pub eviction_interval: Duration,
    /// Capacity of the single-writer agent inbox
    pub agent_inbox_capacity: usize,
    /// Page size used when `get_events` is called without a limit
    pub default_limit: usize,
    /// Largest accepted page size
    pub max_limit: usize,
    /// Longer lines and messages are truncated to this many bytes
    pub max_message_size: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self::with_home_dir("./logd-data")
    }
}

impl CollectorConfig {
    /// Create a configuration rooted at `home_dir`
    pub fn with_home_dir(home_dir: impl Into<PathBuf>) -> Self {
        let home_dir = home_dir.into();
        Self {
            store: StoreConfig::new(Self::store_path_in(&home_dir)),
            home_dir,
            eviction_interval: DEFAULT_EVICTION_INTERVAL,
            agent_inbox_capacity: DEFAULT_AGENT_INBOX_CAPACITY,
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    fn store_path_in(home_dir: &Path) -> PathBuf {
        home_dir.join("logs").join("events.redb")
    }

    /// Path of the persisted collector state
    pub fn state_path(&self) -> PathBuf {
        self.home_dir.join("logd.json")
    }

    /// Set the store configuration
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Set the retention policy
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.store.retention = retention;
        self
    }

    /// Set whether appends are flushed synchronously
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.store.sync_on_write = sync;
        self
    }

    /// Set the eviction interval
    pub fn with_eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = interval;
        self
    }

    /// Set the agent inbox capacity
    pub fn with_agent_inbox_capacity(mut self, capacity: usize) -> Self {
        self.agent_inbox_capacity = capacity;
        self
    }

    /// Set the maximum message size
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}

/// Configuration for a [`crate::SyslogListener`]
#[derive(Debug, Clone)]
pub struct SyslogConfig {
    /// UDP address to listen on
    pub bind_addr: SocketAddr,
    /// Datagrams larger than this are truncated by the socket read
    pub max_packet_size: usize,
}

impl Default for SyslogConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_SYSLOG_PORT)),
            // RFC 5425 section 4.3.1
            max_packet_size: 8192,
        }
    }
}

impl SyslogConfig {
    /// Listen on `bind_addr`
    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    /// Listen on localhost at `port`
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }
}
