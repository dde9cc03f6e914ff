//! Sync error taxonomy

use thiserror::Error;

/// Errors that can occur while keeping in sync with the coordination server
#[derive(Debug, Error)]
pub enum SyncError {
    /// The server could not be reached at all
    #[error("Sync server unreachable: {0}")]
    Connect(String),

    /// No response within the request budget
    #[error("Sync server timed out")]
    Timeout,

    /// The server answered with a non-2xx status
    #[error("HTTP {0}")]
    Status(u16),

    /// The response body could not be understood
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The media engine reported a failure
    #[error("Playback error: {0}")]
    Playback(String),

    /// Invalid configuration; fatal for the attempt that hit it
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse failure class, used to pick the status shown for a failed poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connect,
    Timeout,
    Protocol,
    Playback,
    Config,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Connect(_) => ErrorKind::Connect,
            SyncError::Timeout => ErrorKind::Timeout,
            // The server answered, just not with something we can use
            SyncError::Status(_) | SyncError::Protocol(_) => ErrorKind::Protocol,
            SyncError::Playback(_) => ErrorKind::Playback,
            SyncError::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether this failure means the network path to the server is down
    pub fn is_network(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connect | ErrorKind::Timeout)
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        // A connect timeout is both; report it as a timeout
        if e.is_timeout() {
            SyncError::Timeout
        } else if e.is_connect() {
            SyncError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            SyncError::Status(status.as_u16())
        } else {
            SyncError::Protocol(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Protocol(format!("unparsable response: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_classification() {
        assert!(SyncError::Timeout.is_network());
        assert!(SyncError::Connect("refused".into()).is_network());
        assert!(!SyncError::Status(503).is_network());
        assert!(!SyncError::Protocol("bad".into()).is_network());
    }

    #[test]
    fn test_json_error_is_protocol() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(SyncError::from(err), SyncError::Protocol(_)));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(SyncError::Status(404).kind(), ErrorKind::Protocol);
        assert_eq!(SyncError::Config("x".into()).kind(), ErrorKind::Config);
        assert_eq!(SyncError::Timeout.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SyncError::Status(502).to_string(), "HTTP 502");
    }
}
