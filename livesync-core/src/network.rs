//! Network availability
//!
//! Availability is a plain flag owned by a [`NetworkMonitor`]. The host sets
//! it from its own connectivity callbacks, or the monitor runs a
//! [`NetworkProbe`] on a fixed period. The sync loop only reads it to decide
//! whether a poll is worth attempting.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// How often a probe is re-run
pub const NETWORK_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Blocking connectivity check supplied by the host
pub trait NetworkProbe: Send + Sync + 'static {
    fn is_available(&self) -> bool;
}

/// Probe for hosts without connectivity information
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl NetworkProbe for AlwaysOnline {
    fn is_available(&self) -> bool {
        true
    }
}

/// Read side of the availability flag
#[derive(Debug, Clone)]
pub struct NetworkStatus {
    rx: watch::Receiver<bool>,
}

impl NetworkStatus {
    pub fn is_available(&self) -> bool {
        *self.rx.borrow()
    }

    /// Status that never changes
    pub fn fixed(available: bool) -> Self {
        let (_tx, rx) = watch::channel(available);
        Self { rx }
    }
}

/// Write side of the availability flag
#[derive(Debug)]
pub struct NetworkMonitor {
    tx: watch::Sender<bool>,
}

impl NetworkMonitor {
    pub fn new(initially_available: bool) -> (Self, NetworkStatus) {
        let (tx, rx) = watch::channel(initially_available);
        (Self { tx }, NetworkStatus { rx })
    }

    /// Update the flag. Returns whether it changed.
    pub fn set_available(&self, available: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == available {
                false
            } else {
                *current = available;
                true
            }
        });
        if changed {
            info!("Network {}", if available { "available" } else { "unavailable" });
        }
        changed
    }

    pub fn status(&self) -> NetworkStatus {
        NetworkStatus {
            rx: self.tx.subscribe(),
        }
    }

    /// Run `probe` every `period` and feed the result into the flag.
    ///
    /// The task ends once every status reader is gone.
    pub fn spawn_probe<P: NetworkProbe>(self: Arc<Self>, probe: Arc<P>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let probe = probe.clone();
                let available = tokio::task::spawn_blocking(move || probe.is_available())
                    .await
                    .unwrap_or(false);
                self.set_available(available);

                if self.tx.is_closed() {
                    debug!("Network probe stopped");
                    break;
                }
                tokio::time::sleep(period).await;
            }
        })
    }
}
