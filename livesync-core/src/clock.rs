//! Clock offset estimation against the coordination server
//!
//! The server reports its wall-clock time on every poll. The local side is a
//! wall-clock reading taken once at startup and advanced by a monotonic
//! instant afterwards, so a system clock change never shows up as a jump in
//! the waits computed from it.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Signed difference between server time and local time, in milliseconds
///
/// Positive means the server clock is ahead of ours. Only the latest
/// measurement is kept; there is no averaging across polls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockOffset(i64);

impl ClockOffset {
    /// Measure the offset from a server timestamp and the local time at
    /// which the response arrived
    pub fn measure(server_time_ms: i64, local_time_ms: i64) -> Self {
        Self(server_time_ms.saturating_sub(local_time_ms))
    }

    pub fn from_millis(offset_ms: i64) -> Self {
        Self(offset_ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Translate a local timestamp onto the server's timeline
    pub fn to_server_time(&self, local_time_ms: i64) -> i64 {
        local_time_ms.saturating_add(self.0)
    }

    /// Milliseconds from `local_time_ms` until the server instant `server_at_ms`.
    /// Negative once the instant has passed.
    pub fn until(&self, server_at_ms: i64, local_time_ms: i64) -> i64 {
        server_at_ms.saturating_sub(self.to_server_time(local_time_ms))
    }
}

impl fmt::Display for ClockOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}ms", self.0)
    }
}

/// Local time in milliseconds since the UNIX epoch, advanced monotonically
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    anchor_epoch_ms: i64,
    anchor: Instant,
}

impl LocalClock {
    /// Anchor to the current system time
    pub fn new() -> Self {
        Self::anchored_at(system_time_ms())
    }

    /// Anchor to an explicit epoch timestamp (used by tests and simulations)
    pub fn anchored_at(epoch_ms: i64) -> Self {
        Self {
            anchor_epoch_ms: epoch_ms,
            anchor: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> i64 {
        let elapsed = i64::try_from(self.anchor.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.anchor_epoch_ms.saturating_add(elapsed)
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Current system time in milliseconds since the UNIX epoch
pub fn system_time_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
