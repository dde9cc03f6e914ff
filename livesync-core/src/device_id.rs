//! Device identifiers
//!
//! Each device process gets one identifier for its lifetime. It is sent with
//! every poll and readiness confirmation so the server can count devices.

use std::fmt;
use uuid::Uuid;

/// Maximum accepted length for a host-supplied identifier
const MAX_ID_LENGTH: usize = 64;

/// Identifier of this device, stable for the process
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    /// Generate a random version 4 UUID
    pub fn random() -> Self {
        DeviceId(Uuid::new_v4().to_string())
    }

    /// Accept an identifier supplied by the host (e.g. a persisted install id)
    ///
    /// Only ASCII alphanumerics, `-` and `_` are allowed so the id can go
    /// into a query string untouched.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_ID_LENGTH {
            return None;
        }
        if trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            Some(DeviceId(trimmed.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
