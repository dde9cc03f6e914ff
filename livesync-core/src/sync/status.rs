//! User-facing sync status

use std::fmt;

use super::protocol::SessionPhase;

/// Condition shown on the device's status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Initializing,
    WaitingForNetwork,
    /// The server is running a session for another city
    WaitingForSession { city: String },
    Countdown {
        remaining_ms: i64,
        confirmed: u32,
        required: u32,
    },
    /// First entry into the start phase
    Starting,
    Playing { is_master: bool },
    /// Idle, nothing scheduled
    Ready,
    UnknownPhase { tag: String },
    ServerUnreachable { attempt: u32 },
    Timeout { attempt: u32 },
    SyncFailed { message: String, attempt: u32 },
}

impl SyncStatus {
    /// Whether this status reflects a failed poll
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SyncStatus::ServerUnreachable { .. }
                | SyncStatus::Timeout { .. }
                | SyncStatus::SyncFailed { .. }
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Initializing => write!(f, "Initializing..."),
            SyncStatus::WaitingForNetwork => write!(f, "Waiting for network..."),
            SyncStatus::WaitingForSession { city } => {
                write!(f, "Waiting for a session for {}", city)
            }
            SyncStatus::Countdown {
                remaining_ms,
                confirmed,
                required,
            } => write!(
                f,
                "Starting in {}s • {}/{} ready",
                (*remaining_ms).max(0) / 1000,
                confirmed,
                required
            ),
            SyncStatus::Starting => write!(f, "Starting playback"),
            SyncStatus::Playing { is_master: true } => write!(f, "Master device"),
            SyncStatus::Playing { is_master: false } => write!(f, "Playing"),
            SyncStatus::Ready => write!(f, "Ready"),
            SyncStatus::UnknownPhase { tag } => write!(f, "Unknown phase '{}'", tag),
            SyncStatus::ServerUnreachable { .. } => write!(f, "Sync server unreachable"),
            SyncStatus::Timeout { .. } => write!(f, "Sync server timed out"),
            SyncStatus::SyncFailed { .. } => write!(f, "Sync error"),
        }
    }
}

/// Read-only view of the device's sync state, published after every change
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: SyncStatus,
    pub phase: SessionPhase,
    pub is_master: bool,
    pub confirmed_devices: u32,
    pub required_devices: u32,
    pub active_devices: u32,
    /// Scheduled start on the server clock
    pub start_at_ms: Option<i64>,
    pub clock_offset_ms: i64,
    /// Failed polls since startup
    pub failure_count: u32,
    pub has_started: bool,
    pub has_confirmed_readiness: bool,
    /// Detailed error for the current failure, cleared once resolved
    pub error_message: Option<String>,
    /// Outcome of the last manual action (e.g. restart request)
    pub notice: Option<String>,
    pub network_available: bool,
    /// Most recent drift correction input
    pub last_drift_ms: Option<i64>,
}

impl Default for StatusReport {
    fn default() -> Self {
        Self {
            status: SyncStatus::Initializing,
            phase: SessionPhase::Idle,
            is_master: false,
            confirmed_devices: 0,
            required_devices: 0,
            active_devices: 0,
            start_at_ms: None,
            clock_offset_ms: 0,
            failure_count: 0,
            has_started: false,
            has_confirmed_readiness: false,
            error_message: None,
            notice: None,
            network_available: true,
            last_drift_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_countdown_line() {
        let status = SyncStatus::Countdown {
            remaining_ms: 5_000,
            confirmed: 1,
            required: 3,
        };
        assert_eq!(status.to_string(), "Starting in 5s • 1/3 ready");

        let late = SyncStatus::Countdown {
            remaining_ms: -40,
            confirmed: 3,
            required: 3,
        };
        assert_eq!(late.to_string(), "Starting in 0s • 3/3 ready");
    }

    #[test]
    fn test_failure_statuses() {
        assert!(SyncStatus::Timeout { attempt: 1 }.is_failure());
        assert!(SyncStatus::ServerUnreachable { attempt: 2 }.is_failure());
        assert!(!SyncStatus::WaitingForNetwork.is_failure());
        assert!(!SyncStatus::Playing { is_master: false }.is_failure());
    }

    #[test]
    fn test_master_line() {
        assert_eq!(SyncStatus::Playing { is_master: true }.to_string(), "Master device");
        assert_eq!(SyncStatus::Playing { is_master: false }.to_string(), "Playing");
    }
}
