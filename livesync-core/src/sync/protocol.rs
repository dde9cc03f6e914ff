//! Sync snapshots, session phases and remote commands

use std::fmt;

use crate::authority::SyncResponse;
use crate::error::SyncError;

/// Stage of the shared playback session, as reported by the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// No session running; the player may run freely
    #[default]
    Idle,
    /// Session scheduled; devices pause at zero and confirm readiness
    Countdown,
    /// Scheduled start reached (or imminent)
    Start,
    /// Session running
    Playing,
    /// Tag we don't recognise
    Unknown,
}

impl SessionPhase {
    /// Parse a phase tag. A missing tag means `idle`.
    pub fn parse(tag: Option<&str>) -> Self {
        match tag.map(str::trim) {
            None | Some("") | Some("idle") => SessionPhase::Idle,
            Some("countdown") => SessionPhase::Countdown,
            Some("start") => SessionPhase::Start,
            Some("playing") => SessionPhase::Playing,
            Some(_) => SessionPhase::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Countdown => "countdown",
            SessionPhase::Start => "start",
            SessionPhase::Playing => "playing",
            SessionPhase::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command pushed by an operator through the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCommand {
    /// Rebuild the media source from the stream URL
    Reload,
    /// Re-arm for a new start: back to zero, paused
    Restart,
    Pause,
    Play,
}

impl RemoteCommand {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim() {
            "reload" => Some(RemoteCommand::Reload),
            "restart" => Some(RemoteCommand::Restart),
            "pause" => Some(RemoteCommand::Pause),
            "play" => Some(RemoteCommand::Play),
            _ => None,
        }
    }
}

/// One poll response, immutable once built
///
/// Each poll produces a fresh snapshot that replaces the previous one
/// wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSnapshot {
    /// Server wall-clock time when the response was produced
    pub server_time_ms: i64,
    pub session_id: String,
    pub phase: SessionPhase,
    /// Raw phase tag, kept for status display of unknown phases
    pub phase_tag: String,
    /// Scheduled start on the server clock
    pub start_at_ms: Option<i64>,
    pub required_devices: u32,
    pub confirmed_devices: u32,
    pub device_id: String,
    pub is_master: bool,
    pub active_devices: u32,
    pub recommended_action: String,
    /// Where the session timeline is at `server_time_ms`
    pub target_position_ms: i64,
    /// Raw remote command tag, if any
    pub remote_command: Option<String>,
}

impl SyncSnapshot {
    /// Parse a response body. `sent_position_ms` is the position we reported,
    /// used when the server omits its target position.
    pub fn parse(body: &str, sent_position_ms: u64) -> Result<Self, SyncError> {
        let value: serde_json::Value = serde_json::from_str(body)?;
        if !value.is_object() {
            return Err(SyncError::Protocol("expected a JSON object".to_string()));
        }
        let response: SyncResponse = serde_json::from_value(value)?;
        Ok(Self::from_response(response, sent_position_ms))
    }

    pub fn from_response(response: SyncResponse, sent_position_ms: u64) -> Self {
        let phase_tag = response.phase.unwrap_or_else(|| "idle".to_string());
        Self {
            server_time_ms: response.server_time,
            session_id: response.session_id,
            phase: SessionPhase::parse(Some(phase_tag.as_str())),
            phase_tag,
            start_at_ms: response.start_at_millis,
            required_devices: response.required_devices,
            confirmed_devices: response.confirmed_devices,
            device_id: response.device_id,
            is_master: response.is_master,
            active_devices: response.active_devices,
            recommended_action: response
                .recommended_action
                .unwrap_or_else(|| "play".to_string()),
            target_position_ms: response
                .target_position_millis
                .unwrap_or(sent_position_ms as i64),
            remote_command: response.remote_command.filter(|c| !c.trim().is_empty()),
        }
    }

    /// City segment of the session id (`<tag>_<city>_...`)
    pub fn session_city(&self) -> Option<&str> {
        self.session_id
            .split('_')
            .nth(1)
            .filter(|city| !city.is_empty())
    }

    /// Whether this snapshot may drive playback on a device scoped to `city`.
    /// A global idle always applies.
    pub fn applies_to(&self, city: &str) -> bool {
        self.phase == SessionPhase::Idle || self.session_city() == Some(city)
    }

    pub fn command(&self) -> Option<RemoteCommand> {
        self.remote_command.as_deref().and_then(RemoteCommand::parse)
    }
}
