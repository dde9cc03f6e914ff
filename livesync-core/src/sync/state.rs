//! Device runtime state

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::backoff::Backoff;
use crate::clock::ClockOffset;

use super::protocol::{SessionPhase, SyncSnapshot};
use super::status::{StatusReport, SyncStatus};

/// Where the session timeline was at a given server instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftAnchor {
    pub target_position_ms: i64,
    pub server_time_ms: i64,
}

impl DriftAnchor {
    /// Position the session should be at when the server clock reads `server_now_ms`
    pub fn expected_position_ms(&self, server_now_ms: i64) -> i64 {
        let elapsed = server_now_ms.saturating_sub(self.server_time_ms).max(0);
        self.target_position_ms.saturating_add(elapsed)
    }
}

/// Short message about a manual action, optionally expiring
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub text: String,
    pub expires_at: Option<Instant>,
}

/// Everything the sync loop knows about this device's session
///
/// Owned by the sync loop; presentation only ever sees [`StatusReport`]s.
#[derive(Debug, Clone)]
pub struct DeviceState {
    pub phase: SessionPhase,
    pub phase_tag: String,
    pub session_id: String,
    pub is_master: bool,
    pub required_devices: u32,
    pub confirmed_devices: u32,
    pub active_devices: u32,
    pub start_at_ms: Option<i64>,
    pub clock_offset: ClockOffset,
    /// Readiness acknowledged by the server for the current countdown
    pub has_confirmed_readiness: bool,
    /// Playback kicked off for the current session
    pub has_started: bool,
    pub backoff: Backoff,
    pub failure_count: u32,
    pub drift_anchor: Option<DriftAnchor>,
    pub error_message: Option<String>,
    pub notice: Option<Notice>,
    /// The media source needs a rebuild once the network is back
    pub source_stale: bool,
    pub status: SyncStatus,
}

impl DeviceState {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            phase: SessionPhase::Idle,
            phase_tag: SessionPhase::Idle.as_str().to_string(),
            session_id: String::new(),
            is_master: false,
            required_devices: 0,
            confirmed_devices: 0,
            active_devices: 0,
            start_at_ms: None,
            clock_offset: ClockOffset::default(),
            has_confirmed_readiness: false,
            has_started: false,
            backoff,
            failure_count: 0,
            drift_anchor: None,
            error_message: None,
            notice: None,
            source_stale: false,
            status: SyncStatus::Initializing,
        }
    }

    /// Fold an applicable snapshot into the state
    ///
    /// Phase transitions driven here:
    /// - leaving `countdown` ends the readiness episode
    /// - `idle` clears `has_started`, `playing` sets it
    pub fn observe(&mut self, snapshot: &SyncSnapshot, offset: ClockOffset) {
        if self.phase != snapshot.phase {
            debug!("Phase {} -> {}", self.phase, snapshot.phase);
        }

        self.phase = snapshot.phase;
        self.phase_tag = snapshot.phase_tag.clone();
        self.session_id = snapshot.session_id.clone();
        self.is_master = snapshot.is_master;
        self.required_devices = snapshot.required_devices;
        self.confirmed_devices = snapshot.confirmed_devices;
        self.active_devices = snapshot.active_devices;
        self.start_at_ms = snapshot.start_at_ms;
        self.clock_offset = offset;

        if snapshot.phase != SessionPhase::Countdown {
            self.has_confirmed_readiness = false;
        }

        match snapshot.phase {
            SessionPhase::Idle => self.has_started = false,
            SessionPhase::Playing => self.has_started = true,
            _ => {}
        }

        self.drift_anchor = match snapshot.phase {
            SessionPhase::Playing => Some(DriftAnchor {
                target_position_ms: snapshot.target_position_ms,
                server_time_ms: snapshot.server_time_ms,
            }),
            _ => None,
        };

        // Network is up and the session is live: stale errors no longer apply
        if snapshot.phase != SessionPhase::Idle && self.error_message.take().is_some() {
            debug!("Clearing error after {} failed attempts", self.failure_count);
            self.failure_count = 0;
        }
    }

    /// Local re-arm for a new start, without waiting for the server to go idle
    pub fn restart(&mut self) {
        self.has_started = false;
        self.has_confirmed_readiness = false;
        self.drift_anchor = None;
    }

    pub fn record_success(&mut self) {
        self.backoff.reset();
    }

    /// Count a failed poll. Returns the delay before the next attempt.
    pub fn record_failure(&mut self) -> Duration {
        self.failure_count = self.failure_count.saturating_add(1);
        self.backoff.next_delay()
    }

    pub fn report(&self, now: Instant, network_available: bool, last_drift_ms: Option<i64>) -> StatusReport {
        let notice = self
            .notice
            .as_ref()
            .filter(|n| n.expires_at.map_or(true, |at| now < at))
            .map(|n| n.text.clone());

        StatusReport {
            status: self.status.clone(),
            phase: self.phase,
            is_master: self.is_master,
            confirmed_devices: self.confirmed_devices,
            required_devices: self.required_devices,
            active_devices: self.active_devices,
            start_at_ms: self.start_at_ms,
            clock_offset_ms: self.clock_offset.as_millis(),
            failure_count: self.failure_count,
            has_started: self.has_started,
            has_confirmed_readiness: self.has_confirmed_readiness,
            error_message: self.error_message.clone(),
            notice,
            network_available,
            last_drift_ms,
        }
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new(Backoff::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(phase: &str) -> SyncSnapshot {
        SyncSnapshot::parse(
            &format!(
                r#"{{"serverTime": 50000, "sessionId": "live_ekat_1", "phase": "{}", "targetPositionMillis": 12000}}"#,
                phase
            ),
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_has_started_transitions() {
        let mut state = DeviceState::default();
        assert!(!state.has_started);

        state.observe(&snapshot("countdown"), ClockOffset::default());
        assert!(!state.has_started);

        state.observe(&snapshot("playing"), ClockOffset::default());
        assert!(state.has_started);

        state.observe(&snapshot("idle"), ClockOffset::default());
        assert!(!state.has_started);

        state.has_started = true;
        state.restart();
        assert!(!state.has_started);
    }

    #[test]
    fn test_readiness_resets_when_countdown_ends() {
        let mut state = DeviceState::default();
        state.observe(&snapshot("countdown"), ClockOffset::default());
        state.has_confirmed_readiness = true;

        // Still counting down: keep it
        state.observe(&snapshot("countdown"), ClockOffset::default());
        assert!(state.has_confirmed_readiness);

        // Episode over
        state.observe(&snapshot("start"), ClockOffset::default());
        assert!(!state.has_confirmed_readiness);
    }

    #[test]
    fn test_drift_anchor_only_while_playing() {
        let mut state = DeviceState::default();
        state.observe(&snapshot("playing"), ClockOffset::default());
        let anchor = state.drift_anchor.unwrap();
        assert_eq!(anchor.expected_position_ms(51_500), 13_500);
        // Clock readings before the anchor never move the target backwards
        assert_eq!(anchor.expected_position_ms(49_000), 12_000);

        state.observe(&snapshot("countdown"), ClockOffset::default());
        assert!(state.drift_anchor.is_none());
    }

    #[test]
    fn test_error_cleared_by_live_phase_only() {
        let mut state = DeviceState::default();
        state.record_failure();
        state.error_message = Some("boom".into());

        state.observe(&snapshot("idle"), ClockOffset::default());
        assert!(state.error_message.is_some());
        assert_eq!(state.failure_count, 1);

        state.observe(&snapshot("playing"), ClockOffset::default());
        assert!(state.error_message.is_none());
        assert_eq!(state.failure_count, 0);
    }

    #[test]
    fn test_failure_counting_and_backoff() {
        let mut state = DeviceState::default();
        assert_eq!(state.record_failure(), Duration::from_millis(1000));
        assert_eq!(state.record_failure(), Duration::from_millis(2000));
        assert_eq!(state.failure_count, 2);

        state.record_success();
        assert_eq!(state.record_failure(), Duration::from_millis(1000));
        assert_eq!(state.failure_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_notice_is_hidden() {
        let mut state = DeviceState::default();
        let now = Instant::now();
        state.notice = Some(Notice {
            text: "Restart requested".into(),
            expires_at: Some(now + Duration::from_secs(3)),
        });

        assert_eq!(
            state.report(now, true, None).notice.as_deref(),
            Some("Restart requested")
        );
        assert_eq!(state.report(now + Duration::from_secs(3), true, None).notice, None);
    }
}
