//! Per-log operations
//!
//! A [`LogStore`] reads and writes the key range owned by one log name.
//! Scans are bounded to that range, so a log never sees another log's
//! events even when one name is a prefix of the other.

use std::ops::Bound;

use chrono::{DateTime, Utc};
use logd_core::{Cursor, Direction, Event, EventId, EventWithCursors, validate_log_name};
use redb::ReadableTable;
use tracing::{debug, instrument};

use crate::codec;
use crate::error::StorageResult;
use crate::store::{EVENTS, Store};

/// Handle to one named log
#[derive(Debug, Clone)]
pub struct LogStore {
    store: Store,
    name: String,
    prefix: Vec<u8>,
    upper: Vec<u8>,
}

impl LogStore {
    pub(crate) fn new(store: Store, name: String) -> Self {
        Self {
            prefix: codec::log_prefix(&name),
            upper: codec::log_upper_bound(&name),
            store,
            name,
        }
    }

    /// The log name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append one event and return its ID
    pub fn add_event(&self, timestamp: DateTime<Utc>, message: &[u8]) -> StorageResult<EventId> {
        validate_log_name(&self.name)?;
        let value = codec::encode_value(timestamp, message)?;

        self.store.with_db(|db| {
            let txn = self.store.begin_write(db)?;
            // Minted under the write lock so commit order matches ID order
            let id = self.store.next_id()?;
            let key = codec::encode_key(&self.name, &id);
            {
                let mut table = txn.open_table(EVENTS)?;
                table.insert(key.as_slice(), value.as_slice())?;
            }
            txn.commit()?;
            Ok(id)
        })
    }

    /// Read up to `limit` events on one side of `cursor`
    ///
    /// Without a cursor a forward scan starts at the oldest event and a
    /// backward scan at the newest. When `filter` is set, only events whose
    /// message contains it (ignoring case) are returned and counted.
    /// The result is always in ascending ID order.
    pub fn get_events(
        &self,
        cursor: Option<&EventId>,
        limit: usize,
        direction: Direction,
        filter: Option<&str>,
    ) -> StorageResult<Vec<EventWithCursors>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let needle = filter.filter(|f| !f.is_empty()).map(str::to_lowercase);
        let cursor_key = cursor.map(|id| codec::encode_key(&self.name, id));

        let (lower, upper) = match direction {
            Direction::Forward => (
                cursor_key
                    .as_deref()
                    .map_or(Bound::Included(self.prefix.as_slice()), Bound::Excluded),
                Bound::Excluded(self.upper.as_slice()),
            ),
            Direction::Backward => (
                Bound::Included(self.prefix.as_slice()),
                Bound::Excluded(cursor_key.as_deref().unwrap_or(self.upper.as_slice())),
            ),
        };

        let mut events = self.store.with_db(|db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(EVENTS)?;
            let range = table.range::<&[u8]>((lower, upper))?;

            let mut events = Vec::with_capacity(limit.min(1024));
            match direction {
                Direction::Forward => {
                    for entry in range {
                        let (key, value) = entry?;
                        if accept(key.value(), value.value(), needle.as_deref(), &mut events)?
                            && events.len() == limit
                        {
                            break;
                        }
                    }
                }
                Direction::Backward => {
                    for entry in range.rev() {
                        let (key, value) = entry?;
                        if accept(key.value(), value.value(), needle.as_deref(), &mut events)?
                            && events.len() == limit
                        {
                            break;
                        }
                    }
                }
            }
            Ok(events)
        })?;

        if direction == Direction::Backward {
            events.reverse();
        }
        Ok(events.into_iter().map(EventWithCursors::from).collect())
    }

    /// The most recent event, if any
    pub fn get_last_event(&self) -> StorageResult<Option<Event>> {
        Ok(self
            .get_events(None, 1, Direction::Backward, None)?
            .pop()
            .map(|e| e.event))
    }

    /// A forward cursor just past the most recent event
    ///
    /// Reading forward from it yields only events appended afterwards.
    /// `None` for an empty log.
    pub fn get_last_cursor(&self) -> StorageResult<Option<Cursor>> {
        Ok(self.get_last_event()?.map(|e| Cursor::forward(e.id)))
    }

    /// Number of events currently stored
    pub fn count_events(&self) -> StorageResult<usize> {
        self.store.with_db(|db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(EVENTS)?;
            let mut count = 0;
            for entry in table.range::<&[u8]>(self.bounds())? {
                entry?;
                count += 1;
            }
            Ok(count)
        })
    }

    /// Evict everything older than the newest `max_events_per_log` events
    ///
    /// Returns how many events were removed.
    #[instrument(skip(self), fields(log = %self.name))]
    pub fn remove_old_events(&self) -> StorageResult<usize> {
        let retention = self.store.retention();
        // Read-only count first; most passes find nothing to evict
        if retention.events_to_evict(self.count_events()?) == 0 {
            return Ok(0);
        }
        let keep = retention.max_events_per_log();
        let removed = self.remove_matching(|position| position >= keep)?;
        debug!(removed, keep, "Evicted old events");
        Ok(removed)
    }

    /// Delete every event in this log
    ///
    /// Returns how many events were removed.
    #[instrument(skip(self), fields(log = %self.name))]
    pub fn clear_events(&self) -> StorageResult<usize> {
        let removed = self.remove_matching(|_| true)?;
        debug!(removed, "Cleared events");
        Ok(removed)
    }

    /// Remove, in one write transaction, every key whose position counted
    /// from the newest event (0-based) satisfies `doomed`
    fn remove_matching(&self, doomed: impl Fn(usize) -> bool) -> StorageResult<usize> {
        self.store.with_db(|db| {
            let txn = self.store.begin_write(db)?;
            let removed = {
                let mut table = txn.open_table(EVENTS)?;
                let keys = {
                    let mut keys = Vec::new();
                    let range = table.range::<&[u8]>(self.bounds())?;
                    for (position, entry) in range.rev().enumerate() {
                        let (key, _) = entry?;
                        if doomed(position) {
                            keys.push(key.value().to_vec());
                        }
                    }
                    keys
                };
                for key in &keys {
                    table.remove(key.as_slice())?;
                }
                keys.len()
            };
            txn.commit()?;
            Ok(removed)
        })
    }

    fn bounds(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        (
            Bound::Included(self.prefix.as_slice()),
            Bound::Excluded(self.upper.as_slice()),
        )
    }
}

/// Decode one entry and keep it if it matches; returns whether it was kept
fn accept(
    key: &[u8],
    value: &[u8],
    needle: Option<&str>,
    events: &mut Vec<Event>,
) -> StorageResult<bool> {
    let event = codec::decode_event(key, value)?;
    if let Some(needle) = needle {
        if !event.message_lossy().to_lowercase().contains(needle) {
            return Ok(false);
        }
    }
    events.push(event);
    Ok(true)
}
