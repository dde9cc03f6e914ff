//! Background tasks that feed the host callbacks

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::debug;

use crate::sync::StatusReport;

use super::types::{SessionCallback, StatusSnapshot};

pub(crate) type SharedCallback = Arc<RwLock<Option<Arc<dyn SessionCallback>>>>;

/// Push every published status report to the host callback until cancelled
pub(crate) async fn forward_status(
    mut status_rx: watch::Receiver<StatusReport>,
    callback: SharedCallback,
    mut cancel: oneshot::Receiver<()>,
) {
    debug!("Status forwarding started");
    let mut last_error: Option<String> = None;

    loop {
        tokio::select! {
            _ = &mut cancel => break,
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let report = StatusSnapshot::from(&*status_rx.borrow_and_update());
        let new_error = report
            .error_message
            .clone()
            .filter(|e| last_error.as_ref() != Some(e));
        last_error = report.error_message.clone();

        // Clone out of the lock; the host may call back into the session
        let cb = callback.read().clone();
        if let Some(cb) = cb {
            cb.on_status(report);
            if let Some(message) = new_error {
                cb.on_error(message);
            }
        }
    }

    debug!("Status forwarding ended");
}
