//! # Logd Core
//!
//! Shared types for the logd log collection engine.
//!
//! ## Key Types
//!
//! - [`EventId`]: 16-byte time-ordered identifier, minted by [`IdGenerator`]
//! - [`Cursor`]: Resumable scan position with a [`Direction`]
//! - [`Event`]: One stored message within a named log
//!
//! Log names are arbitrary non-empty strings that never contain a NUL byte;
//! see [`validate_log_name`].

pub mod cursor;
pub mod error;
pub mod event;
pub mod id;

pub use cursor::*;
pub use error::*;
pub use event::*;
pub use id::*;

/// Default upper bound on the size of a single event message
pub const MAX_MESSAGE_SIZE: usize = 8192;

/// Check that `name` can be used as a log name
pub fn validate_log_name(name: &str) -> CoreResult<()> {
    if name.is_empty() || name.contains('\0') {
        return Err(CoreError::InvalidLogName(name.to_string()));
    }
    Ok(())
}

/// Clip `message` to at most `max` bytes
pub fn truncate_message(message: &[u8], max: usize) -> &[u8] {
    &message[..message.len().min(max)]
}
