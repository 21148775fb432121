//! redb-backed event store
//!
//! One database file holds the events of every log in a single table. Logs
//! are partitioned by key prefix (see [`crate::codec`]); [`Store::log`] hands
//! out cheap per-log handles that share the database and the ID generator.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use logd_core::{EventId, IdGenerator};
use parking_lot::RwLock;
use redb::{Database, Durability, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::codec;
use crate::error::{StorageError, StorageResult};
use crate::log::LogStore;
use crate::retention::RetentionPolicy;

// Key: log name ∥ 0x00 ∥ event id, Value: versioned event payload
pub(crate) const EVENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("events");

/// Configuration for the event store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the database file
    pub db_path: PathBuf,
    /// Flush every append to disk before acknowledging it
    pub sync_on_write: bool,
    /// Per-log retention bound applied by eviction passes
    pub retention: RetentionPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/logs/events.redb"),
            sync_on_write: true,
            retention: RetentionPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Create a config for a database at `db_path`
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Default::default()
        }
    }

    /// Set whether appends are flushed synchronously
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    /// Set the retention policy
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }
}

struct StoreInner {
    db: RwLock<Option<Database>>,
    ids: IdGenerator,
    config: StoreConfig,
}

/// Shared handle to the event database
///
/// Cloning is cheap. Once [`Store::close`] has run, every operation on this
/// store or its [`LogStore`] handles fails with [`StorageError::Closed`].
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("db_path", &self.inner.config.db_path)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Store {
    /// Open or create the database
    #[instrument(skip(config), fields(path = %config.db_path.display()))]
    pub fn open(config: StoreConfig) -> StorageResult<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&config.db_path)?;

        // Create the table up front so read transactions never miss it
        let txn = db.begin_write()?;
        txn.open_table(EVENTS)?;
        txn.commit()?;

        info!("Opened event store");

        Ok(Self {
            inner: Arc::new(StoreInner {
                db: RwLock::new(Some(db)),
                ids: IdGenerator::new(),
                config,
            }),
        })
    }

    /// Handle for the log called `name`
    ///
    /// The log need not exist; reads on a never-written log are empty.
    pub fn log(&self, name: impl Into<String>) -> LogStore {
        LogStore::new(self.clone(), name.into())
    }

    /// Names of every log that currently holds at least one event, sorted
    pub fn log_names(&self) -> StorageResult<Vec<String>> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(EVENTS)?;

            let mut names = Vec::new();
            let mut start: Vec<u8> = Vec::new();
            loop {
                // Jump straight past each log's key range to the next name
                let next = {
                    let mut range = table.range::<&[u8]>(start.as_slice()..)?;
                    match range.next() {
                        Some(entry) => {
                            let (key, _) = entry?;
                            let (name, _) = codec::decode_key(key.value())?;
                            Some(name.to_string())
                        }
                        None => None,
                    }
                };
                let Some(name) = next else {
                    break;
                };
                start = codec::log_upper_bound(&name);
                names.push(name);
            }
            Ok(names)
        })
    }

    /// Release the database
    ///
    /// Waits for in-flight operations to finish. Calling this more than once
    /// is a no-op.
    #[instrument(skip(self), fields(path = %self.inner.config.db_path.display()))]
    pub fn close(&self) {
        if self.inner.db.write().take().is_some() {
            info!("Closed event store");
        } else {
            debug!("Event store already closed");
        }
    }

    /// Check whether the store is still open
    pub fn is_open(&self) -> bool {
        self.inner.db.read().is_some()
    }

    /// Get the configuration
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Get the retention policy
    pub fn retention(&self) -> RetentionPolicy {
        self.inner.config.retention
    }

    /// Run `f` against the open database
    pub(crate) fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let guard = self.inner.db.read();
        let db = guard.as_ref().ok_or(StorageError::Closed)?;
        f(db)
    }

    /// Begin a write transaction with the configured durability
    pub(crate) fn begin_write(&self, db: &Database) -> StorageResult<WriteTransaction> {
        let mut txn = db.begin_write()?;
        if !self.inner.config.sync_on_write {
            txn.set_durability(Durability::Eventual);
        }
        Ok(txn)
    }

    /// Mint the next event ID
    pub(crate) fn next_id(&self) -> StorageResult<EventId> {
        Ok(self.inner.ids.next_id()?)
    }
}
