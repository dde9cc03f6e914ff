//! FFI types exposed via uniffi

use crate::error::SyncError;
use crate::player::{PlaybackControl, PlayerEvent};
use crate::sync::StatusReport;

/// Error types exposed via FFI
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Sync loop already running")]
    AlreadyRunning,

    #[error("Sync loop not running")]
    NotRunning,

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<SyncError> for CoreError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Config(msg) => CoreError::InvalidConfig(msg),
            other => CoreError::Runtime(other.to_string()),
        }
    }
}

/// Session settings supplied by the host app
#[derive(Debug, Clone, uniffi::Record)]
pub struct SessionConfig {
    /// Sync server base URL, e.g. `http://10.0.0.5:3000`
    pub server_url: String,
    /// Live stream URL; its first path segment is the city
    pub stream_url: String,
    /// Persisted device id; a random one is generated when absent
    pub device_id: Option<String>,
    /// Override for the poll period
    pub poll_interval_ms: Option<u64>,
}

/// Media engine events reported by the host
#[derive(Debug, Clone, uniffi::Enum)]
pub enum PlaybackEvent {
    Ready,
    Buffering,
    Ended,
    Error {
        code: i32,
        message: String,
        network_related: bool,
    },
    Position {
        position_ms: u64,
    },
}

impl From<PlaybackEvent> for PlayerEvent {
    fn from(e: PlaybackEvent) -> Self {
        match e {
            PlaybackEvent::Ready => PlayerEvent::Ready,
            PlaybackEvent::Buffering => PlayerEvent::Buffering,
            PlaybackEvent::Ended => PlayerEvent::Ended,
            PlaybackEvent::Error {
                code,
                message,
                network_related,
            } => PlayerEvent::Error {
                code,
                message,
                network_related,
            },
            PlaybackEvent::Position { position_ms } => PlayerEvent::Position { position_ms },
        }
    }
}

/// Sync status for display
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct StatusSnapshot {
    /// Human-readable status line
    pub status_line: String,
    /// Whether the status line describes a failed poll
    pub is_failure: bool,
    pub phase: String,
    pub is_master: bool,
    pub confirmed_devices: u32,
    pub required_devices: u32,
    pub active_devices: u32,
    pub start_at_ms: Option<i64>,
    /// Server time minus local time (positive = server ahead)
    pub clock_offset_ms: i64,
    pub failure_count: u32,
    pub has_started: bool,
    pub has_confirmed_readiness: bool,
    pub error_message: Option<String>,
    pub notice: Option<String>,
    pub network_available: bool,
    /// Last measured drift (positive = behind the session)
    pub last_drift_ms: Option<i64>,
}

impl From<&StatusReport> for StatusSnapshot {
    fn from(r: &StatusReport) -> Self {
        Self {
            status_line: r.status.to_string(),
            is_failure: r.status.is_failure(),
            phase: r.phase.to_string(),
            is_master: r.is_master,
            confirmed_devices: r.confirmed_devices,
            required_devices: r.required_devices,
            active_devices: r.active_devices,
            start_at_ms: r.start_at_ms,
            clock_offset_ms: r.clock_offset_ms,
            failure_count: r.failure_count,
            has_started: r.has_started,
            has_confirmed_readiness: r.has_confirmed_readiness,
            error_message: r.error_message.clone(),
            notice: r.notice.clone(),
            network_available: r.network_available,
            last_drift_ms: r.last_drift_ms,
        }
    }
}

/// The host's media player
#[uniffi::export(callback_interface)]
pub trait PlayerCallback: Send + Sync {
    fn play(&self);
    fn pause(&self);
    fn seek_to(&self, position_ms: u64);
    fn set_speed(&self, speed: f32);
    fn current_position_ms(&self) -> u64;
    /// Rebuild the media source from `url`. Returns false on failure.
    fn load(&self, url: String) -> bool;
}

/// Callback interface for session events
#[uniffi::export(callback_interface)]
pub trait SessionCallback: Send + Sync {
    /// Called whenever the sync status changes
    fn on_status(&self, status: StatusSnapshot);
    fn on_error(&self, message: String);
}

/// Adapts the host's player callback to [`PlaybackControl`]
pub(crate) struct CallbackPlayer {
    inner: Box<dyn PlayerCallback>,
}

impl CallbackPlayer {
    pub(crate) fn new(inner: Box<dyn PlayerCallback>) -> Self {
        Self { inner }
    }
}

impl PlaybackControl for CallbackPlayer {
    fn play(&self) {
        self.inner.play();
    }

    fn pause(&self) {
        self.inner.pause();
    }

    fn seek_to(&self, position_ms: u64) {
        self.inner.seek_to(position_ms);
    }

    fn set_speed(&self, speed: f32) {
        self.inner.set_speed(speed);
    }

    fn current_position_ms(&self) -> u64 {
        self.inner.current_position_ms()
    }

    fn load(&self, url: &str) -> Result<(), SyncError> {
        if self.inner.load(url.to_string()) {
            Ok(())
        } else {
            Err(SyncError::Playback(format!("host failed to load {}", url)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{SessionPhase, SyncStatus};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeHostPlayer {
        loads: Arc<Mutex<Vec<String>>>,
    }

    impl PlayerCallback for FakeHostPlayer {
        fn play(&self) {}
        fn pause(&self) {}
        fn seek_to(&self, _position_ms: u64) {}
        fn set_speed(&self, _speed: f32) {}
        fn current_position_ms(&self) -> u64 {
            1_500
        }
        fn load(&self, url: String) -> bool {
            self.loads.lock().push(url);
            false
        }
    }

    #[test]
    fn test_status_snapshot_from_report() {
        let report = StatusReport {
            status: SyncStatus::Countdown {
                remaining_ms: 3_200,
                confirmed: 2,
                required: 4,
            },
            phase: SessionPhase::Countdown,
            start_at_ms: Some(99),
            ..StatusReport::default()
        };

        let snapshot = StatusSnapshot::from(&report);
        assert_eq!(snapshot.status_line, "Starting in 3s • 2/4 ready");
        assert_eq!(snapshot.phase, "countdown");
        assert_eq!(snapshot.start_at_ms, Some(99));
        assert!(!snapshot.is_failure);
    }

    #[test]
    fn test_callback_player_maps_load_failure() {
        let host = FakeHostPlayer::default();
        let loads = host.loads.clone();
        let player = CallbackPlayer::new(Box::new(host));

        assert_eq!(player.current_position_ms(), 1_500);
        assert!(matches!(
            player.load("http://h/ekat/stream.m3u8"),
            Err(SyncError::Playback(_))
        ));
        assert_eq!(loads.lock().as_slice(), ["http://h/ekat/stream.m3u8".to_string()]);
    }

    #[test]
    fn test_config_error_maps_to_invalid_config() {
        let err = CoreError::from(SyncError::Config("no city".into()));
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }
}
