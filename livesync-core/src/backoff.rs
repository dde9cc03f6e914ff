//! Retry backoff for failed polls

use std::time::Duration;

/// Delay before the first retry after a failure
pub const DEFAULT_BACKOFF_FLOOR: Duration = Duration::from_millis(1000);

/// Upper bound for the retry delay
pub const DEFAULT_BACKOFF_CEILING: Duration = Duration::from_millis(30_000);

/// Exponential backoff: each failure waits the current delay, then doubles
/// it up to the ceiling. A success drops back to the floor.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            current: floor,
        }
    }

    /// Delay the next failure will wait
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Record a failure. Returns how long to wait before retrying.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_FLOOR, DEFAULT_BACKOFF_CEILING)
    }
}
