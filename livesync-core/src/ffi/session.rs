//! Session implementation for FFI

use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::authority::HttpAuthority;
use crate::config::SyncConfig;
use crate::device_id::DeviceId;
use crate::network::NetworkMonitor;
use crate::player::PlayerEvent;
use crate::sync_loop::{SyncLoop, SyncLoopHandle};

use super::handlers::{forward_status, SharedCallback};
use super::types::*;

static TRACING_INIT: Once = Once::new();

/// Buffered player events before the host starts seeing backpressure
const PLAYER_EVENT_BUFFER: usize = 64;

/// One device's sync session
#[derive(uniffi::Object)]
pub struct Session {
    runtime: Runtime,
    sync: Arc<SyncLoop>,
    network: NetworkMonitor,
    callback: SharedCallback,
    loop_handle: Mutex<Option<SyncLoopHandle>>,
    player_events: Mutex<Option<mpsc::Sender<PlayerEvent>>>,
    /// Handle for cancelling the status forwarding task
    status_cancel: Mutex<Option<oneshot::Sender<()>>>,
}

#[uniffi::export]
impl Session {
    /// Create a session for `config`, driving `player`
    #[uniffi::constructor]
    pub fn new(config: SessionConfig, player: Box<dyn PlayerCallback>) -> Result<Self, CoreError> {
        // Initialize tracing once
        TRACING_INIT.call_once(|| {
            let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "livesync_core=debug,hyper_util=off,reqwest=off,hyper=off",
                )
            });
            let _ = tracing_subscriber::fmt()
                .with_ansi(false) // logcat / Xcode console
                .with_target(false)
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        });

        info!("Initializing livesync session");

        let mut sync_config = SyncConfig::new(&config.server_url, &config.stream_url);
        if let Some(ms) = config.poll_interval_ms {
            sync_config = sync_config.with_poll_interval(Duration::from_millis(ms));
        }

        let device_id = match config.device_id.as_deref() {
            Some(raw) => DeviceId::parse(raw)
                .ok_or_else(|| CoreError::InvalidConfig(format!("invalid device id '{}'", raw)))?,
            None => DeviceId::random(),
        };

        let runtime = Runtime::new().map_err(|e| CoreError::Runtime(e.to_string()))?;
        let authority = Arc::new(HttpAuthority::new(&sync_config)?);
        let (network, network_status) = NetworkMonitor::new(true);
        let sync = SyncLoop::new(
            sync_config,
            device_id,
            authority,
            Arc::new(CallbackPlayer::new(player)),
            network_status,
        )?;

        Ok(Self {
            runtime,
            sync: Arc::new(sync),
            network,
            callback: Arc::new(RwLock::new(None)),
            loop_handle: Mutex::new(None),
            player_events: Mutex::new(None),
            status_cancel: Mutex::new(None),
        })
    }

    /// Set the event callback
    pub fn set_callback(&self, callback: Box<dyn SessionCallback>) {
        *self.callback.write() = Some(Arc::from(callback));
    }

    pub fn device_id(&self) -> String {
        self.sync.device_id().to_string()
    }

    pub fn city(&self) -> String {
        self.sync.city().to_string()
    }

    /// Start polling and following the session
    pub fn start(&self) -> Result<(), CoreError> {
        let mut loop_handle = self.loop_handle.lock();
        if loop_handle.as_ref().map_or(false, |h| !h.is_finished()) {
            return Err(CoreError::AlreadyRunning);
        }

        let _guard = self.runtime.enter();

        let (events_tx, events_rx) = mpsc::channel(PLAYER_EVENT_BUFFER);
        self.sync.spawn_player_events(events_rx);
        *self.player_events.lock() = Some(events_tx);

        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.runtime.spawn(forward_status(
            self.sync.subscribe(),
            Arc::clone(&self.callback),
            cancel_rx,
        ));
        *self.status_cancel.lock() = Some(cancel_tx);

        *loop_handle = Some(self.sync.spawn());
        info!("Session started for {}", self.sync.city());
        Ok(())
    }

    /// Stop the sync loop. The player is left as it is.
    pub fn stop(&self) -> Result<(), CoreError> {
        let handle = self.loop_handle.lock().take();
        let Some(mut handle) = handle else {
            return Err(CoreError::NotRunning);
        };
        handle.stop();

        // Dropping the sender ends the event task
        self.player_events.lock().take();
        if let Some(tx) = self.status_cancel.lock().take() {
            let _ = tx.send(());
        }

        info!("Session stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.loop_handle
            .lock()
            .as_ref()
            .map_or(false, |h| !h.is_finished())
    }

    /// Report connectivity changes from the platform
    pub fn set_network_available(&self, available: bool) {
        self.network.set_available(available);
    }

    /// Report a media engine event
    pub fn on_player_event(&self, event: PlaybackEvent) {
        let sender = self.player_events.lock().clone();
        match sender {
            Some(tx) => {
                if let Err(e) = tx.try_send(PlayerEvent::from(event)) {
                    warn!("Dropping player event: {}", e);
                }
            }
            None => debug!("Player event while stopped: {:?}", event),
        }
    }

    /// Ask the server to schedule a new start. Returns whether it accepted.
    pub fn manual_restart(&self) -> bool {
        self.runtime.block_on(self.sync.manual_restart())
    }

    /// Dismiss the current error
    pub fn clear_error(&self) {
        self.sync.clear_error();
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot::from(&self.sync.report())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(mut handle) = self.loop_handle.lock().take() {
            handle.stop();
        }
        if let Some(tx) = self.status_cancel.lock().take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SilentPlayer;

    impl PlayerCallback for SilentPlayer {
        fn play(&self) {}
        fn pause(&self) {}
        fn seek_to(&self, _position_ms: u64) {}
        fn set_speed(&self, _speed: f32) {}
        fn current_position_ms(&self) -> u64 {
            0
        }
        fn load(&self, _url: String) -> bool {
            true
        }
    }

    fn config(stream_url: &str) -> SessionConfig {
        SessionConfig {
            server_url: "http://127.0.0.1:9".to_string(),
            stream_url: stream_url.to_string(),
            device_id: Some("tv-lobby-1".to_string()),
            poll_interval_ms: None,
        }
    }

    #[test]
    fn test_session_identity() {
        let session = Session::new(
            config("http://127.0.0.1:8096/kurgan/stream.m3u8"),
            Box::new(SilentPlayer),
        )
        .unwrap();
        assert_eq!(session.device_id(), "tv-lobby-1");
        assert_eq!(session.city(), "kurgan");
        assert!(!session.is_running());
        assert!(matches!(session.stop(), Err(CoreError::NotRunning)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Session::new(config("http://127.0.0.1:8096/stream.m3u8"), Box::new(SilentPlayer));
        assert!(matches!(result, Err(CoreError::InvalidConfig(_))));

        let mut bad_id = config("http://127.0.0.1:8096/ekat/stream.m3u8");
        bad_id.device_id = Some("no spaces allowed".to_string());
        assert!(matches!(
            Session::new(bad_id, Box::new(SilentPlayer)),
            Err(CoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_start_stop() {
        let session = Session::new(
            config("http://127.0.0.1:8096/ekat/stream.m3u8"),
            Box::new(SilentPlayer),
        )
        .unwrap();

        session.start().unwrap();
        assert!(session.is_running());
        assert!(matches!(session.start(), Err(CoreError::AlreadyRunning)));

        session.on_player_event(PlaybackEvent::Buffering);
        session.set_network_available(false);
        assert!(!session.manual_restart());
        assert!(!session.status().network_available);

        session.stop().unwrap();
        assert!(matches!(session.stop(), Err(CoreError::NotRunning)));
    }
}
