//! Stored events

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::cursor::Cursor;
use crate::id::EventId;

/// One immutable, timestamped message within a log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Time-ordered identifier, unique within the log
    pub id: EventId,
    /// Name of the owning log
    pub log: String,
    /// When the message was observed
    pub timestamp: DateTime<Utc>,
    /// Raw payload
    #[serde(serialize_with = "serialize_lossy")]
    pub message: Bytes,
}

impl Event {
    /// Create a new event
    pub fn new(
        id: EventId,
        log: impl Into<String>,
        timestamp: DateTime<Utc>,
        message: impl Into<Bytes>,
    ) -> Self {
        Self {
            id,
            log: log.into(),
            timestamp,
            message: message.into(),
        }
    }

    /// The payload as text, with invalid UTF-8 replaced
    pub fn message_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.message)
    }
}

fn serialize_lossy<S: Serializer>(message: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(message))
}

/// An event paired with the cursors that continue a scan from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventWithCursors {
    pub event: Event,
    /// Backward cursor: resumes with events older than this one
    pub prev_cursor: Cursor,
    /// Forward cursor: resumes with events newer than this one
    pub next_cursor: Cursor,
}

impl From<Event> for EventWithCursors {
    fn from(event: Event) -> Self {
        Self {
            prev_cursor: Cursor::backward(event.id),
            next_cursor: Cursor::forward(event.id),
            event,
        }
    }
}
