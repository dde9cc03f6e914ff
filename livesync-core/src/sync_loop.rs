//! The device sync loop
//!
//! One loop per device: poll the coordination server, fold the snapshot into
//! the device state, drive the player for the current phase, sleep, repeat.
//! Poll failures never end the loop; they only change the status and the
//! retry delay.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::authority::Authority;
use crate::backoff::Backoff;
use crate::clock::{ClockOffset, LocalClock};
use crate::config::SyncConfig;
use crate::device_id::DeviceId;
use crate::drift::{apply_speed, Correction, DriftCorrector, SPEED_NORMAL};
use crate::error::{ErrorKind, SyncError};
use crate::network::NetworkStatus;
use crate::player::{PlaybackControl, PlayerEvent};
use crate::readiness::ReadinessConfirmer;
use crate::sync::{
    DeviceState, Notice, RemoteCommand, SessionPhase, StatusReport, SyncSnapshot, SyncStatus,
};

/// During a countdown, a position further than this from zero is rewound
const COUNTDOWN_REWIND_TOLERANCE_MS: u64 = 50;

/// Start waits shorter than this are skipped
const START_WAIT_THRESHOLD_MS: i64 = 10;

/// Delay before rebuilding the source after a network-related player error
const PLAYER_NETWORK_ERROR_DELAY: Duration = Duration::from_secs(3);

/// Delay before rebuilding the source after any other player error
const PLAYER_ERROR_DELAY: Duration = Duration::from_secs(2);

/// How long a successful restart request stays on screen
const RESTART_NOTICE_TTL: Duration = Duration::from_secs(3);

/// Control loop keeping one device in step with the session
pub struct SyncLoop {
    config: SyncConfig,
    device_id: DeviceId,
    city: String,
    authority: Arc<dyn Authority>,
    player: Arc<dyn PlaybackControl>,
    readiness: ReadinessConfirmer,
    network: NetworkStatus,
    clock: LocalClock,
    state: Mutex<DeviceState>,
    drift: Mutex<DriftCorrector>,
    /// At most one request to the server in flight (polls and restarts)
    poll_lock: tokio::sync::Mutex<()>,
    status_tx: watch::Sender<StatusReport>,
}

/// Running sync loop task
pub struct SyncLoopHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SyncLoopHandle {
    /// Ask the loop to exit at its next suspension point
    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop and wait for it to exit
    pub async fn join(mut self) {
        self.stop();
        if let Err(e) = self.task.await {
            warn!("Sync loop task failed: {}", e);
        }
    }
}

impl SyncLoop {
    pub fn new(
        config: SyncConfig,
        device_id: DeviceId,
        authority: Arc<dyn Authority>,
        player: Arc<dyn PlaybackControl>,
        network: NetworkStatus,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let city = config.city()?;

        let readiness = ReadinessConfirmer::new(authority.clone(), device_id.clone(), city.clone());
        let backoff = Backoff::new(config.backoff_floor, config.backoff_ceiling);
        let (status_tx, _) = watch::channel(StatusReport {
            network_available: network.is_available(),
            ..StatusReport::default()
        });

        info!("Sync loop for device {} in {}", device_id, city);

        Ok(Self {
            config,
            device_id,
            city,
            authority,
            player,
            readiness,
            network,
            clock: LocalClock::new(),
            state: Mutex::new(DeviceState::new(backoff)),
            drift: Mutex::new(DriftCorrector::new()),
            poll_lock: tokio::sync::Mutex::new(()),
            status_tx,
        })
    }

    /// Replace the local clock (simulations and tests)
    pub fn with_clock(mut self, clock: LocalClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    /// Watch status reports as they are published
    pub fn subscribe(&self) -> watch::Receiver<StatusReport> {
        self.status_tx.subscribe()
    }

    /// Current status, computed fresh
    pub fn report(&self) -> StatusReport {
        let last_drift = self.drift.lock().last_drift_ms();
        let state = self.state.lock();
        state.report(Instant::now(), self.network.is_available(), last_drift)
    }

    /// Run the loop on the current tokio runtime
    pub fn spawn(self: &Arc<Self>) -> SyncLoopHandle {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.run(cancel_rx).await });
        SyncLoopHandle {
            cancel: Some(cancel_tx),
            task,
        }
    }

    /// Run until `cancel` fires or its sender is dropped
    pub async fn run(&self, mut cancel: oneshot::Receiver<()>) {
        info!("Starting sync loop against {}", self.config.sync_url);
        self.reload_stream();
        self.publish();

        loop {
            let delay = tokio::select! {
                _ = &mut cancel => break,
                delay = self.tick() => delay,
            };

            tokio::select! {
                _ = &mut cancel => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Sync loop stopped");
    }

    /// One loop iteration. Returns how long to sleep before the next one.
    pub async fn tick(&self) -> Duration {
        if !self.network.is_available() {
            {
                let mut state = self.state.lock();
                if !state.source_stale {
                    info!("Network unavailable, holding polls");
                }
                state.source_stale = true;
                state.status = SyncStatus::WaitingForNetwork;
            }
            self.publish();
            return self.config.offline_interval;
        }

        let stale = std::mem::take(&mut self.state.lock().source_stale);
        if stale {
            info!("Network is back, rebuilding media source");
            self.reload_stream();
        }

        match self.poll().await {
            Ok((snapshot, local_ms)) => {
                self.state.lock().record_success();
                self.apply(&snapshot, local_ms).await;
                self.config.poll_interval
            }
            Err(e) => self.record_failure(e),
        }
    }

    /// Position report, request and parse, under the single-poll lock.
    /// Returns the snapshot and the local time it arrived at.
    async fn poll(&self) -> Result<(SyncSnapshot, i64), SyncError> {
        let _guard = self.poll_lock.lock().await;
        let position_ms = self.player.current_position_ms();
        let snapshot = self
            .authority
            .poll(&self.device_id, position_ms, &self.city)
            .await?;
        Ok((snapshot, self.clock.now_ms()))
    }

    fn record_failure(&self, err: SyncError) -> Duration {
        let delay = {
            let mut state = self.state.lock();
            let delay = state.record_failure();
            let attempt = state.failure_count;

            state.status = match err.kind() {
                ErrorKind::Connect => SyncStatus::ServerUnreachable { attempt },
                ErrorKind::Timeout => SyncStatus::Timeout { attempt },
                _ => SyncStatus::SyncFailed {
                    message: err.to_string(),
                    attempt,
                },
            };
            state.error_message = Some(format!("{} (attempt #{})", err, attempt));

            warn!("Poll failed (attempt #{}): {}, retrying in {:?}", attempt, err, delay);
            delay
        };
        self.publish();
        delay
    }

    /// Fold a snapshot into the device state and act on it
    pub async fn apply(&self, snapshot: &SyncSnapshot, local_ms: i64) {
        if !snapshot.applies_to(&self.city) {
            debug!(
                "Ignoring {} snapshot for session {}",
                snapshot.phase, snapshot.session_id
            );
            self.state.lock().status = SyncStatus::WaitingForSession {
                city: self.city.clone(),
            };
            self.publish();
            return;
        }

        let offset = ClockOffset::measure(snapshot.server_time_ms, local_ms);
        debug!("Clock offset {}", offset);
        let anchored = {
            let mut state = self.state.lock();
            state.observe(snapshot, offset);
            state.drift_anchor.is_some()
        };
        if !anchored {
            self.drift.lock().reset();
        }

        if let Some(tag) = snapshot.remote_command.as_deref() {
            match snapshot.command() {
                Some(command) => self.apply_remote_command(command),
                None => warn!("Ignoring unknown remote command '{}'", tag),
            }
        }

        match snapshot.phase {
            SessionPhase::Countdown => self.enter_countdown(snapshot, offset).await,
            SessionPhase::Start => self.enter_start(snapshot, offset).await,
            SessionPhase::Playing => self.enter_playing(snapshot),
            SessionPhase::Idle => self.enter_idle(),
            SessionPhase::Unknown => {
                warn!("Unknown session phase '{}'", snapshot.phase_tag);
                self.state.lock().status = SyncStatus::UnknownPhase {
                    tag: snapshot.phase_tag.clone(),
                };
            }
        }

        self.publish();
    }

    fn apply_remote_command(&self, command: RemoteCommand) {
        info!("Remote command: {:?}", command);
        match command {
            RemoteCommand::Reload => {
                self.reload_stream();
            }
            RemoteCommand::Restart => {
                self.state.lock().restart();
                self.drift.lock().reset();
                self.player.seek_to(0);
                self.player.pause();
                apply_speed(self.player.as_ref(), SPEED_NORMAL);
            }
            RemoteCommand::Pause => self.player.pause(),
            RemoteCommand::Play => self.player.play(),
        }
    }

    async fn enter_countdown(&self, snapshot: &SyncSnapshot, offset: ClockOffset) {
        self.player.pause();
        if self.player.current_position_ms() > COUNTDOWN_REWIND_TOLERANCE_MS {
            self.player.seek_to(0);
        }

        let confirmed = self.state.lock().has_confirmed_readiness;
        if !confirmed && self.readiness.confirm().await {
            self.state.lock().has_confirmed_readiness = true;
        }

        let remaining_ms = snapshot
            .start_at_ms
            .map(|at| offset.until(at, self.clock.now_ms()).max(0))
            .unwrap_or(0);

        self.state.lock().status = SyncStatus::Countdown {
            remaining_ms,
            confirmed: snapshot.confirmed_devices,
            required: snapshot.required_devices,
        };
    }

    async fn enter_start(&self, snapshot: &SyncSnapshot, offset: ClockOffset) {
        if let Some(start_at) = snapshot.start_at_ms {
            let wait_ms = offset.until(start_at, self.clock.now_ms());
            if wait_ms > START_WAIT_THRESHOLD_MS {
                debug!("Waiting {}ms for scheduled start", wait_ms);
                tokio::time::sleep(Duration::from_millis(wait_ms as u64)).await;
            }
        }

        let first_entry = {
            let mut state = self.state.lock();
            let first = !state.has_started;
            state.has_started = true;
            state.status = if first {
                SyncStatus::Starting
            } else {
                SyncStatus::Playing {
                    is_master: state.is_master,
                }
            };
            first
        };

        if first_entry {
            info!("Session start: playing from zero");
            self.player.seek_to(0);
        }
        self.player.play();
        apply_speed(self.player.as_ref(), SPEED_NORMAL);
    }

    fn enter_playing(&self, snapshot: &SyncSnapshot) {
        self.player.play();
        apply_speed(self.player.as_ref(), SPEED_NORMAL);

        let mut state = self.state.lock();
        state.has_started = true;
        state.status = SyncStatus::Playing {
            is_master: snapshot.is_master,
        };
    }

    fn enter_idle(&self) {
        self.player.play();

        let mut state = self.state.lock();
        state.has_started = false;
        state.status = SyncStatus::Ready;
    }

    /// React to a state change reported by the media engine
    pub async fn handle_player_event(&self, event: PlayerEvent) {
        match event {
            PlayerEvent::Ready => {
                if self.state.lock().error_message.take().is_some() {
                    debug!("Player ready, clearing error");
                    self.publish();
                }
            }
            PlayerEvent::Buffering => debug!("Player buffering"),
            PlayerEvent::Ended => info!("Player reached end of stream"),
            PlayerEvent::Error {
                code,
                message,
                network_related,
            } => {
                warn!("Player error {}: {}", code, message);
                let (text, delay) = if network_related {
                    (
                        format!("Network error: stream unreachable ({})", message),
                        PLAYER_NETWORK_ERROR_DELAY,
                    )
                } else {
                    (format!("Playback error {}: {}", code, message), PLAYER_ERROR_DELAY)
                };
                self.state.lock().error_message = Some(text);
                self.publish();

                tokio::time::sleep(delay).await;
                self.reload_stream();
                self.publish();
            }
            PlayerEvent::Position { position_ms } => {
                if self.correct_drift(position_ms).is_some() {
                    self.publish();
                }
            }
        }
    }

    /// Forward player events from `events` until the sender goes away
    pub fn spawn_player_events(self: &Arc<Self>, mut events: mpsc::Receiver<PlayerEvent>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                this.handle_player_event(event).await;
            }
            debug!("Player event stream closed");
        })
    }

    /// Compare a reported position with the session timeline and correct.
    /// Does nothing unless the session is playing.
    pub fn correct_drift(&self, position_ms: u64) -> Option<Correction> {
        let (anchor, offset) = {
            let state = self.state.lock();
            (state.drift_anchor?, state.clock_offset)
        };

        let server_now_ms = offset.to_server_time(self.clock.now_ms());
        let desired_ms = anchor.expected_position_ms(server_now_ms);
        let drift_ms = desired_ms.saturating_sub(position_ms as i64);

        Some(self.drift.lock().apply(self.player.as_ref(), drift_ms))
    }

    /// Rebuild the media source from the stream URL
    pub fn reload_stream(&self) -> bool {
        match self.player.load(&self.config.stream_url) {
            Ok(()) => {
                debug!("Media source loaded from {}", self.config.stream_url);
                self.state.lock().error_message = None;
                true
            }
            Err(e) => {
                warn!("Reload stream failed: {}", e);
                self.state.lock().error_message = Some(format!("Stream reload failed: {}", e));
                false
            }
        }
    }

    /// Ask the server to schedule a new start for this city
    pub async fn manual_restart(self: &Arc<Self>) -> bool {
        if !self.network.is_available() {
            self.set_notice("No network for restart request".to_string(), None);
            return false;
        }

        let result = {
            let _guard = self.poll_lock.lock().await;
            self.authority.request_restart(&self.city).await
        };

        match result {
            Ok(()) => {
                info!("Restart requested for {}", self.city);
                self.set_notice(
                    format!("Restart requested for {}", self.city),
                    Some(Instant::now() + RESTART_NOTICE_TTL),
                );
                self.publish_after(RESTART_NOTICE_TTL);
                true
            }
            Err(e) => {
                warn!("Restart request failed: {}", e);
                self.set_notice(format!("Restart failed: {}", e), None);
                false
            }
        }
    }

    /// Dismiss the current error and start counting failures afresh
    pub fn clear_error(&self) {
        {
            let mut state = self.state.lock();
            state.error_message = None;
            state.failure_count = 0;
        }
        self.publish();
    }

    fn set_notice(&self, text: String, expires_at: Option<Instant>) {
        self.state.lock().notice = Some(Notice { text, expires_at });
        self.publish();
    }

    /// Republish once `delay` has passed, so expired notices drop out
    fn publish_after(self: &Arc<Self>, delay: Duration) {
        let this = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(this) = this.upgrade() {
                this.publish();
            }
        });
    }

    fn publish(&self) {
        let report = self.report();
        self.status_tx.send_if_modified(move |current| {
            if *current == report {
                return false;
            }
            *current = report;
            true
        });
    }
}
