//! Sync configuration

use std::time::Duration;

use reqwest::Url;

use crate::backoff::{DEFAULT_BACKOFF_CEILING, DEFAULT_BACKOFF_FLOOR};
use crate::error::SyncError;

/// Pause between successful polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Pause between polls while the network is unavailable
pub const DEFAULT_OFFLINE_INTERVAL: Duration = Duration::from_secs(5);

/// TCP connect budget for requests to the sync server
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall budget for a single request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const SYNC_PATH: &str = "/api/sync";
const CONFIRM_PATH: &str = "/api/confirm";
const RESTART_PATH: &str = "/api/restart";

/// Endpoints, stream location and timings for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Poll endpoint (GET)
    pub sync_url: String,
    /// Readiness confirmation endpoint (POST)
    pub confirm_url: String,
    /// Manual restart endpoint (POST)
    pub restart_url: String,
    /// Canonical live stream; its first path segment is the city key
    pub stream_url: String,
    pub poll_interval: Duration,
    pub offline_interval: Duration,
    pub backoff_floor: Duration,
    pub backoff_ceiling: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl SyncConfig {
    /// Build a config for a sync server base URL (e.g. `http://10.0.0.5:3000`)
    /// and a stream URL (e.g. `http://10.0.0.5:8096/ekat/stream.m3u8`)
    pub fn new(server_url: &str, stream_url: &str) -> Self {
        let base = server_url.trim_end_matches('/');
        Self {
            sync_url: format!("{}{}", base, SYNC_PATH),
            confirm_url: format!("{}{}", base, CONFIRM_PATH),
            restart_url: format!("{}{}", base, RESTART_PATH),
            stream_url: stream_url.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            offline_interval: DEFAULT_OFFLINE_INTERVAL,
            backoff_floor: DEFAULT_BACKOFF_FLOOR,
            backoff_ceiling: DEFAULT_BACKOFF_CEILING,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    /// City scope key, taken from the stream URL path
    /// (`http://host:8096/<city>/stream.m3u8`)
    pub fn city(&self) -> Result<String, SyncError> {
        let url = Url::parse(&self.stream_url)
            .map_err(|e| SyncError::Config(format!("invalid stream URL {}: {}", self.stream_url, e)))?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();

        // Need at least `<city>/<playlist>`
        match segments.as_slice() {
            [city, _, ..] => Ok(city.to_string()),
            _ => Err(SyncError::Config(format!(
                "stream URL {} has no city segment",
                self.stream_url
            ))),
        }
    }

    /// Check everything the sync loop relies on
    pub fn validate(&self) -> Result<(), SyncError> {
        for (name, value) in [
            ("sync", &self.sync_url),
            ("confirm", &self.confirm_url),
            ("restart", &self.restart_url),
        ] {
            Url::parse(value)
                .map_err(|e| SyncError::Config(format!("invalid {} URL {}: {}", name, value, e)))?;
        }
        self.city()?;
        if self.poll_interval.is_zero() {
            return Err(SyncError::Config("poll interval must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_from_base() {
        let config = SyncConfig::new("http://10.0.0.5:3000/", "http://10.0.0.5:8096/ekat/stream.m3u8");
        assert_eq!(config.sync_url, "http://10.0.0.5:3000/api/sync");
        assert_eq!(config.confirm_url, "http://10.0.0.5:3000/api/confirm");
        assert_eq!(config.restart_url, "http://10.0.0.5:3000/api/restart");
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.offline_interval, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_city_from_stream_url() {
        let config = SyncConfig::new("http://h:3000", "https://cdn.example.net/kurgan/stream.m3u8");
        assert_eq!(config.city().unwrap(), "kurgan");

        let nested = SyncConfig::new("http://h:3000", "http://h:8096/ekat/hls/index.m3u8");
        assert_eq!(nested.city().unwrap(), "ekat");
    }

    #[test]
    fn test_city_missing_is_config_error() {
        let config = SyncConfig::new("http://h:3000", "http://h:8096/stream.m3u8");
        assert!(matches!(config.city(), Err(SyncError::Config(_))));

        let config = SyncConfig::new("http://h:3000", "not a url");
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config = SyncConfig::new("http://h:3000", "http://h:8096/ekat/stream.m3u8")
            .with_poll_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
