//! Wire types for the coordination server API

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Body of a poll response
///
/// Every field is optional on the wire. A field that is missing or has the
/// wrong type falls back to its default instead of failing the whole poll.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Server wall-clock time in milliseconds
    #[serde(default, deserialize_with = "lenient")]
    pub server_time: i64,

    /// Session identifier, `<tag>_<city>_...`
    #[serde(default, deserialize_with = "lenient")]
    pub session_id: String,

    #[serde(default, deserialize_with = "lenient")]
    pub phase: Option<String>,

    /// Scheduled start on the server clock
    #[serde(default, deserialize_with = "lenient")]
    pub start_at_millis: Option<i64>,

    #[serde(default, deserialize_with = "lenient")]
    pub required_devices: u32,

    #[serde(default, deserialize_with = "lenient")]
    pub confirmed_devices: u32,

    #[serde(default, deserialize_with = "lenient")]
    pub device_id: String,

    #[serde(default, deserialize_with = "lenient")]
    pub is_master: bool,

    #[serde(default, deserialize_with = "lenient")]
    pub active_devices: u32,

    #[serde(default, deserialize_with = "lenient")]
    pub recommended_action: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub target_position_millis: Option<i64>,

    #[serde(default, deserialize_with = "lenient")]
    pub remote_command: Option<String>,
}

/// Request body for the confirm endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub device_id: String,
    pub city: String,
}

/// Request body for the restart endpoint
#[derive(Debug, Clone, Serialize)]
pub struct RestartRequest {
    pub city: String,
}

/// Deserialize a field, falling back to its default on a type mismatch
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}
