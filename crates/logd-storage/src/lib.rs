//! # Logd Storage
//!
//! Durable storage for named, append-only event logs.
//!
//! All logs share one embedded [redb](https://docs.rs/redb) database. Each
//! event is stored under `log name ∥ 0x00 ∥ event id`, so a log's events
//! form one contiguous, time-ordered key range.
//!
//! ## Features
//!
//! - **Store**: owns the database and the event ID generator
//! - **LogStore**: append, cursor-based reads in either direction, eviction
//! - **RetentionPolicy**: per-log event cap enforced by eviction passes
//! - **codec**: the on-disk key and value layout
//!
//! ## Example
//!
//! ```rust,ignore
//! use chrono::Utc;
//! use logd_core::Direction;
//! use logd_storage::{Store, StoreConfig};
//!
//! let store = Store::open(StoreConfig::new("/tmp/logd/events.redb"))?;
//! let log = store.log("web:out");
//! log.add_event(Utc::now(), b"listening on :8080")?;
//!
//! let page = log.get_events(None, 100, Direction::Backward, None)?;
//! for item in page {
//!     println!("{} {}", item.event.timestamp, item.event.message_lossy());
//! }
//! store.close();
//! ```

pub mod codec;
pub mod error;
pub mod log;
pub mod retention;
pub mod store;

// Re-exports
pub use error::{StorageError, StorageResult};
pub use log::LogStore;
pub use retention::{DEFAULT_MAX_EVENTS_PER_LOG, RetentionPolicy};
pub use store::{Store, StoreConfig};
