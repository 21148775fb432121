//! On-disk event encoding
//!
//! Key: `log name ∥ 0x00 ∥ id (16 bytes)`. The NUL separator cannot occur in a
//! log name, so the key range `[name ∥ 0x00, name ∥ 0x01)` holds exactly one
//! log's events, sorted by ID.
//!
//! Value: `version (1 byte) ∥ timestamp nanos (u64 BE) ∥ message`.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use logd_core::{Event, EventId, ID_LEN};

use crate::error::{StorageError, StorageResult};

/// Current value format version
pub const EVENT_VERSION: u8 = 1;

/// Byte separating the log name from the ID in a key
pub const KEY_SEPARATOR: u8 = 0x00;

const VALUE_HEADER_LEN: usize = 1 + 8;
const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Inclusive lower bound of a log's key range
pub fn log_prefix(name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(name.len() + 1);
    key.extend_from_slice(name.as_bytes());
    key.push(KEY_SEPARATOR);
    key
}

/// Exclusive upper bound of a log's key range
pub fn log_upper_bound(name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(name.len() + 1);
    key.extend_from_slice(name.as_bytes());
    key.push(KEY_SEPARATOR + 1);
    key
}

/// Encode the key for event `id` in log `name`
pub fn encode_key(name: &str, id: &EventId) -> Vec<u8> {
    let mut key = Vec::with_capacity(name.len() + 1 + ID_LEN);
    key.extend_from_slice(name.as_bytes());
    key.push(KEY_SEPARATOR);
    key.extend_from_slice(id.as_bytes());
    key
}

/// Split a key into its log name and event ID
pub fn decode_key(key: &[u8]) -> StorageResult<(&str, EventId)> {
    if key.len() < 1 + ID_LEN {
        return Err(StorageError::malformed_key(format!(
            "{} bytes is shorter than separator and id",
            key.len()
        )));
    }
    let split = key.len() - ID_LEN - 1;
    if key[split] != KEY_SEPARATOR {
        return Err(StorageError::malformed_key("missing separator"));
    }
    let name = std::str::from_utf8(&key[..split])
        .map_err(|e| StorageError::malformed_key(format!("log name is not utf-8: {}", e)))?;
    let id = EventId::from_slice(&key[split + 1..])?;
    Ok((name, id))
}

/// Nanoseconds since the epoch as stored in a value
///
/// `None` for timestamps before 1970 or past the end of the i64 nanosecond
/// range (year 2262).
pub fn timestamp_nanos(timestamp: DateTime<Utc>) -> Option<u64> {
    timestamp
        .timestamp_nanos_opt()
        .and_then(|n| u64::try_from(n).ok())
}

/// Encode an event value
pub fn encode_value(timestamp: DateTime<Utc>, message: &[u8]) -> StorageResult<Vec<u8>> {
    let nanos = timestamp_nanos(timestamp)
        .ok_or_else(|| StorageError::InvalidTimestamp(timestamp.to_rfc3339()))?;

    let mut value = Vec::with_capacity(VALUE_HEADER_LEN + message.len());
    value.push(EVENT_VERSION);
    value.extend_from_slice(&nanos.to_be_bytes());
    value.extend_from_slice(message);
    Ok(value)
}

/// Decode an event value into its timestamp and message
pub fn decode_value(value: &[u8]) -> StorageResult<(DateTime<Utc>, Bytes)> {
    let Some(&version) = value.first() else {
        return Err(StorageError::malformed_value("empty value"));
    };
    if version != EVENT_VERSION {
        return Err(StorageError::UnsupportedVersion(version));
    }
    if value.len() < VALUE_HEADER_LEN {
        return Err(StorageError::malformed_value(format!(
            "{} bytes is shorter than the header",
            value.len()
        )));
    }

    let mut nanos_bytes = [0u8; 8];
    nanos_bytes.copy_from_slice(&value[1..VALUE_HEADER_LEN]);
    let nanos = u64::from_be_bytes(nanos_bytes);
    let secs = i64::try_from(nanos / NANOS_PER_SEC)
        .map_err(|_| StorageError::malformed_value("timestamp out of range"))?;
    let timestamp = DateTime::from_timestamp(secs, (nanos % NANOS_PER_SEC) as u32)
        .ok_or_else(|| StorageError::malformed_value("timestamp out of range"))?;

    Ok((
        timestamp,
        Bytes::copy_from_slice(&value[VALUE_HEADER_LEN..]),
    ))
}

/// Decode a stored key/value pair into an event
pub fn decode_event(key: &[u8], value: &[u8]) -> StorageResult<Event> {
    let (name, id) = decode_key(key)?;
    let (timestamp, message) = decode_value(value)?;
    Ok(Event::new(id, name, timestamp, message))
}
