//! Retention limits for stored logs
//!
//! Logs are bounded by event count. Eviction always removes the oldest
//! events first, keeping the newest `max_events_per_log`.

use serde::{Deserialize, Serialize};

/// Default number of events kept per log
pub const DEFAULT_MAX_EVENTS_PER_LOG: usize = 5000;

/// Per-log retention bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    max_events_per_log: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_events_per_log: DEFAULT_MAX_EVENTS_PER_LOG,
        }
    }
}

impl RetentionPolicy {
    /// Keep at most `max_events_per_log` events in every log (minimum 1)
    pub fn new(max_events_per_log: usize) -> Self {
        Self {
            max_events_per_log: max_events_per_log.max(1),
        }
    }

    /// Get the per-log cap
    pub fn max_events_per_log(&self) -> usize {
        self.max_events_per_log
    }

    /// How many of `count` events an eviction pass removes
    pub fn events_to_evict(&self, count: usize) -> usize {
        count.saturating_sub(self.max_events_per_log)
    }
}
