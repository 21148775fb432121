//! Pagination cursors
//!
//! A [`Cursor`] is an exclusive scan bound at an event ID together with the
//! direction in which to continue. It is a position, not a claim that the
//! event still exists: a cursor at an evicted ID resumes from the nearest
//! remaining event.
//!
//! ## Wire format
//!
//! Unpadded URL-safe base64 of the ID bytes followed by one direction tag
//! byte (`1` forward, `0` backward). A bare 16-byte payload is accepted and
//! treated as a forward cursor.

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::id::{EventId, ID_LEN};

const TAG_BACKWARD: u8 = 0;
const TAG_FORWARD: u8 = 1;

/// Scan direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Towards newer events
    Forward,
    /// Towards older events
    Backward,
}

impl Direction {
    /// The opposite direction
    pub fn reverse(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }
}

/// A resumable scan position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor {
    /// The exclusive bound
    pub id: EventId,
    /// Which side of `id` the scan continues on
    pub direction: Direction,
}

impl Cursor {
    /// Cursor yielding events newer than `id`
    pub fn forward(id: EventId) -> Self {
        Self {
            id,
            direction: Direction::Forward,
        }
    }

    /// Cursor yielding events older than `id`
    pub fn backward(id: EventId) -> Self {
        Self {
            id,
            direction: Direction::Backward,
        }
    }

    /// Forward cursor at the zero ID; yields every event
    pub fn start() -> Self {
        Self::forward(EventId::MIN)
    }

    /// Same position, opposite direction
    pub fn reversed(self) -> Self {
        Self {
            id: self.id,
            direction: self.direction.reverse(),
        }
    }

    /// Encode to the wire format
    pub fn serialize(&self) -> String {
        let mut buf = [0u8; ID_LEN + 1];
        buf[..ID_LEN].copy_from_slice(self.id.as_bytes());
        buf[ID_LEN] = match self.direction {
            Direction::Forward => TAG_FORWARD,
            Direction::Backward => TAG_BACKWARD,
        };
        URL_SAFE_NO_PAD.encode(buf)
    }

    /// Decode from the wire format
    pub fn parse(input: &str) -> CoreResult<Self> {
        let buf = URL_SAFE_NO_PAD
            .decode(input)
            .map_err(|e| CoreError::invalid_cursor(format!("decoding cursor: {}", e)))?;
        match buf.len() {
            ID_LEN => Ok(Self::forward(EventId::from_slice(&buf)?)),
            len if len == ID_LEN + 1 => {
                let id = EventId::from_slice(&buf[..ID_LEN])?;
                match buf[ID_LEN] {
                    TAG_FORWARD => Ok(Self::forward(id)),
                    TAG_BACKWARD => Ok(Self::backward(id)),
                    tag => Err(CoreError::invalid_cursor(format!(
                        "unknown direction tag {}",
                        tag
                    ))),
                }
            }
            len => Err(CoreError::invalid_cursor(format!(
                "expected {} or {} bytes, got {}",
                ID_LEN,
                ID_LEN + 1,
                len
            ))),
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl FromStr for Cursor {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::IdGenerator;

    #[test]
    fn test_round_trip_both_directions() {
        let id = IdGenerator::new().next_id().unwrap();
        for cursor in [Cursor::forward(id), Cursor::backward(id)] {
            let text = cursor.serialize();
            assert_eq!(Cursor::parse(&text).unwrap(), cursor);
        }
    }

    #[test]
    fn test_wire_format_is_url_safe_without_padding() {
        let text = Cursor::backward(EventId::MAX).serialize();
        assert!(!text.contains('='));
        assert!(!text.contains('+'));
        assert!(!text.contains('/'));
    }

    #[test]
    fn test_untagged_payload_is_forward() {
        let id = EventId::from_parts(42, 7);
        let text = URL_SAFE_NO_PAD.encode(id.as_bytes());
        assert_eq!(Cursor::parse(&text).unwrap(), Cursor::forward(id));
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(Cursor::parse("").is_err());
        assert!(Cursor::parse("not base64!").is_err());
        assert!(Cursor::parse(&URL_SAFE_NO_PAD.encode([0u8; 5])).is_err());

        let mut bad_tag = [0u8; ID_LEN + 1];
        bad_tag[ID_LEN] = 9;
        assert!(Cursor::parse(&URL_SAFE_NO_PAD.encode(bad_tag)).is_err());
    }

    #[test]
    fn test_reversed() {
        let cursor = Cursor::forward(EventId::from_parts(1, 1));
        assert_eq!(cursor.reversed().direction, Direction::Backward);
        assert_eq!(cursor.reversed().reversed(), cursor);
    }
}
