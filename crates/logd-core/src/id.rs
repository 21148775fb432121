//! Event identifiers
//!
//! Every event is keyed by a 16-byte [`EventId`]: a 48-bit big-endian
//! millisecond timestamp followed by 80 bits of entropy. Byte-lexicographic
//! order of IDs is therefore time order, which is what lets a log's events
//! sort correctly inside an ordered key-value store.
//!
//! The [`IdGenerator`] guarantees that IDs it hands out are strictly
//! increasing in call order, even when the clock has not advanced (or has
//! stepped backwards) between two calls.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use parking_lot::Mutex;
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, CoreResult};

/// Length of an encoded ID in bytes
pub const ID_LEN: usize = 16;

/// Length of the textual (Crockford base32) form of an ID
pub const ID_TEXT_LEN: usize = 26;

const ENTROPY_BITS: u32 = 80;
const ENTROPY_MAX: u128 = (1u128 << ENTROPY_BITS) - 1;
const TIMESTAMP_MAX_MS: u64 = (1u64 << 48) - 1;

const CROCKFORD: &[u8; 32] = b"0123456789abcdefghjkmnpqrstvwxyz";

/// A 16-byte, time-ordered event identifier
///
/// Displays as a 26-character lowercase Crockford base32 string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId([u8; ID_LEN]);

impl EventId {
    /// The smallest possible ID; sorts before every generated ID
    pub const MIN: EventId = EventId([0u8; ID_LEN]);

    /// The largest possible ID
    pub const MAX: EventId = EventId([0xff; ID_LEN]);

    /// Wrap raw bytes
    pub fn new(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Build an ID from a millisecond timestamp and 80 bits of entropy
    pub fn from_parts(timestamp_ms: u64, entropy: u128) -> Self {
        let value = ((timestamp_ms.min(TIMESTAMP_MAX_MS) as u128) << ENTROPY_BITS)
            | (entropy & ENTROPY_MAX);
        Self(value.to_be_bytes())
    }

    /// Decode an ID from a byte slice, which must be exactly 16 bytes long
    pub fn from_slice(bytes: &[u8]) -> CoreResult<Self> {
        let array: [u8; ID_LEN] = bytes.try_into().map_err(|_| {
            CoreError::invalid_id(format!(
                "expected {} bytes, got {}",
                ID_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Millisecond timestamp prefix
    pub fn timestamp_ms(&self) -> u64 {
        (u128::from_be_bytes(self.0) >> ENTROPY_BITS) as u64
    }

    /// Low 80 bits
    pub fn entropy(&self) -> u128 {
        u128::from_be_bytes(self.0) & ENTROPY_MAX
    }

    fn encode(&self) -> String {
        let value = u128::from_be_bytes(self.0);
        (0..ID_TEXT_LEN)
            .map(|i| {
                let shift = 125 - 5 * i as u32;
                CROCKFORD[((value >> shift) & 0x1f) as usize] as char
            })
            .collect()
    }
}

fn decode_digit(c: u8) -> Option<u8> {
    let c = c.to_ascii_lowercase();
    CROCKFORD.iter().position(|&d| d == c).map(|i| i as u8)
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self)
    }
}

impl FromStr for EventId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != ID_TEXT_LEN {
            return Err(CoreError::invalid_id(format!(
                "expected {} characters, got {}",
                ID_TEXT_LEN,
                bytes.len()
            )));
        }
        let mut value: u128 = 0;
        for (i, &c) in bytes.iter().enumerate() {
            let digit = decode_digit(c)
                .ok_or_else(|| CoreError::invalid_id(format!("invalid character {:?}", c as char)))?;
            // The leading character only carries 3 bits.
            if i == 0 && digit > 7 {
                return Err(CoreError::invalid_id("value overflows 128 bits"));
            }
            value = (value << 5) | digit as u128;
        }
        Ok(Self(value.to_be_bytes()))
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Default)]
struct GeneratorState {
    last: Option<(u64, u128)>,
}

/// Monotonic ID generator
///
/// Safe to share between threads; every caller observes a single total
/// order of generated IDs.
#[derive(Debug, Default)]
pub struct IdGenerator {
    state: Mutex<GeneratorState>,
}

impl IdGenerator {
    /// Create a new generator
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the next ID using the current wall-clock time
    pub fn next_id(&self) -> CoreResult<EventId> {
        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        self.next_id_at(now_ms)
    }

    /// Mint the next ID as if the clock read `now_ms`
    ///
    /// When `now_ms` is not past the previously used timestamp, the previous
    /// entropy is incremented instead of re-randomized, so the result still
    /// sorts after the previous ID.
    pub fn next_id_at(&self, now_ms: u64) -> CoreResult<EventId> {
        let mut state = self.state.lock();
        let (ms, entropy) = match state.last {
            Some((last_ms, last_entropy)) if now_ms <= last_ms => {
                if last_entropy < ENTROPY_MAX {
                    (last_ms, last_entropy + 1)
                } else {
                    // Entropy exhausted within this millisecond; borrow the next one.
                    (last_ms.saturating_add(1), random_entropy()?)
                }
            }
            _ => (now_ms, random_entropy()?),
        };
        state.last = Some((ms, entropy));
        Ok(EventId::from_parts(ms, entropy))
    }

    #[cfg(test)]
    fn seed(&self, ms: u64, entropy: u128) {
        self.state.lock().last = Some((ms, entropy));
    }
}

fn random_entropy() -> CoreResult<u128> {
    let mut buf = [0u8; ID_LEN];
    OsRng
        .try_fill_bytes(&mut buf[6..])
        .map_err(|e| CoreError::Entropy(e.to_string()))?;
    Ok(u128::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_strictly_increase() {
        let generator = IdGenerator::new();
        let mut previous = generator.next_id().unwrap();
        for _ in 0..10_000 {
            let next = generator.next_id().unwrap();
            assert!(next > previous, "{} should sort after {}", next, previous);
            previous = next;
        }
    }

    #[test]
    fn test_same_millisecond_increments_entropy() {
        let generator = IdGenerator::new();
        let first = generator.next_id_at(1_000).unwrap();
        let second = generator.next_id_at(1_000).unwrap();
        assert_eq!(first.timestamp_ms(), 1_000);
        assert_eq!(second.timestamp_ms(), 1_000);
        assert_eq!(second.entropy(), first.entropy() + 1);
    }

    #[test]
    fn test_clock_stepping_backwards_stays_monotonic() {
        let generator = IdGenerator::new();
        let first = generator.next_id_at(5_000).unwrap();
        let second = generator.next_id_at(4_000).unwrap();
        assert!(second > first);
        assert_eq!(second.timestamp_ms(), 5_000);
    }

    #[test]
    fn test_entropy_overflow_borrows_next_millisecond() {
        let generator = IdGenerator::new();
        generator.seed(7_000, ENTROPY_MAX);
        let id = generator.next_id_at(7_000).unwrap();
        assert_eq!(id.timestamp_ms(), 7_001);
        assert!(id > EventId::from_parts(7_000, ENTROPY_MAX));
    }

    #[test]
    fn test_timestamp_prefix_orders_bytes() {
        let early = EventId::from_parts(1, ENTROPY_MAX);
        let late = EventId::from_parts(2, 0);
        assert!(early.as_bytes() < late.as_bytes());
    }

    #[test]
    fn test_text_form() {
        assert_eq!(EventId::MIN.to_string(), "00000000000000000000000000");
        assert_eq!(EventId::MAX.to_string(), "7zzzzzzzzzzzzzzzzzzzzzzzzz");

        let id = IdGenerator::new().next_id().unwrap();
        let text = id.to_string();
        assert_eq!(text.len(), ID_TEXT_LEN);
        assert_eq!(text.parse::<EventId>().unwrap(), id);
        assert_eq!(text.to_uppercase().parse::<EventId>().unwrap(), id);
    }

    #[test]
    fn test_text_form_rejects_garbage() {
        assert!("short".parse::<EventId>().is_err());
        assert!("8zzzzzzzzzzzzzzzzzzzzzzzzz".parse::<EventId>().is_err());
        assert!("0000000000000000000000000u".parse::<EventId>().is_err());
    }

    #[test]
    fn test_from_slice_checks_length() {
        assert!(EventId::from_slice(&[0u8; 15]).is_err());
        assert_eq!(EventId::from_slice(&[0u8; 16]).unwrap(), EventId::MIN);
    }
}
