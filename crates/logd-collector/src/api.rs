//! Request and response shapes of the collector operations
//!
//! These serialize with camelCase field names and string cursors, so an
//! outer HTTP or RPC layer can pass them through unchanged.

use chrono::{DateTime, Utc};
use logd_core::Event;
use serde::{Deserialize, Serialize};

/// Input to [`crate::Collector::get_events`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetEventsInput {
    /// Logs to read; empty means every registered log
    pub logs: Vec<String>,
    /// Serialized cursor; absent or empty reads the most recent page
    pub cursor: Option<String>,
    /// Page size; defaults to the configured default limit
    pub limit: Option<usize>,
    /// Case-insensitive substring the message must contain
    pub filter: Option<String>,
}

impl GetEventsInput {
    pub fn for_logs<I, S>(logs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            logs: logs.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// One page of events, ascending by ID
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsPage {
    pub items: Vec<Event>,
    /// Reverses the scan direction of this page
    pub prev_cursor: String,
    /// Continues the scan direction of this page
    pub next_cursor: String,
}

/// Registration and activity of one log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDescription {
    pub name: String,
    /// Source path; `None` when the log is not registered
    pub source: Option<String>,
    /// Timestamp of the most recent event
    pub last_event_at: Option<DateTime<Utc>>,
}
