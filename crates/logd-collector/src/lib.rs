//! # Logd Collector
//!
//! Collects newline-delimited streams and syslog messages into named,
//! append-only logs.
//!
//! This crate provides [`Collector`], which ties together:
//! - Registered logs, persisted across restarts in `home/logd.json`
//! - One stream worker per log, tailing a FIFO or file
//! - The shared event store with periodic retention enforcement
//! - [`SyslogListener`], routing RFC 5424 datagrams into logs
//!
//! ## Example
//!
//! ```rust,ignore
//! use logd_collector::{Collector, CollectorConfig, GetEventsInput};
//!
//! let collector = Collector::new(CollectorConfig::with_home_dir("./logd"));
//! collector.start().await?;
//!
//! collector.add_log("web:out", "/var/run/web.out").await?;
//!
//! // Most recent page, then older ones
//! let page = collector.get_events(GetEventsInput::for_logs(["web:out"])).await?;
//! let older = collector
//!     .get_events(GetEventsInput::for_logs(["web:out"]).with_cursor(page.next_cursor))
//!     .await?;
//!
//! collector.stop().await?;
//! ```

pub mod agent;
mod api;
mod collector;
mod config;
mod error;
mod eviction;
mod state;
pub mod syslog;
mod worker;

pub use agent::{Agent, AgentFailure, AgentOutcome, AgentRunner};
pub use api::{EventsPage, GetEventsInput, LogDescription};
pub use collector::Collector;
pub use config::{
    CollectorConfig, DEFAULT_AGENT_INBOX_CAPACITY, DEFAULT_EVICTION_INTERVAL, DEFAULT_LIMIT,
    DEFAULT_SYSLOG_PORT, MAX_LIMIT, SyslogConfig,
};
pub use error::{AgentError, CollectorError, CollectorResult};
pub use state::{CollectorState, LogState, StateFile};
pub use syslog::{IngestEvent, SyslogError, SyslogListener, SyslogMessage, parse_rfc5424, route};
pub use worker::StreamWorker;
