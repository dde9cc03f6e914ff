//! Readiness confirmation
//!
//! During a countdown each device pauses at zero and tells the server it is
//! ready. The server counts confirmations and reports them back on the next
//! poll.

use std::sync::Arc;
use tracing::{info, warn};

use crate::authority::Authority;
use crate::device_id::DeviceId;

/// Sends this device's readiness confirmation
#[derive(Clone)]
pub struct ReadinessConfirmer {
    authority: Arc<dyn Authority>,
    device_id: DeviceId,
    city: String,
}

impl ReadinessConfirmer {
    pub fn new(authority: Arc<dyn Authority>, device_id: DeviceId, city: String) -> Self {
        Self {
            authority,
            device_id,
            city,
        }
    }

    /// Confirm readiness. Returns whether the server accepted it.
    ///
    /// Failures are logged and reported as `false`; the caller retries on a
    /// later poll while the countdown lasts.
    pub async fn confirm(&self) -> bool {
        match self.authority.confirm_ready(&self.device_id, &self.city).await {
            Ok(()) => {
                info!("Readiness confirmed for {}", self.city);
                true
            }
            Err(e) => {
                warn!("Readiness confirmation failed: {}", e);
                false
            }
        }
    }
}
