//! Simulated media player
//!
//! A virtual playhead that honours play/pause/seek/speed the way a real
//! engine would, and reports its position back to the sync core.

use livesync_core::{PlaybackControl, PlayerEvent, SyncError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug)]
struct Playhead {
    /// Position at `since`
    base_ms: f64,
    since: Instant,
    playing: bool,
    speed: f32,
    source: Option<String>,
}

impl Playhead {
    fn position_ms(&self, now: Instant) -> f64 {
        if self.playing {
            let elapsed = now.saturating_duration_since(self.since).as_secs_f64() * 1000.0;
            self.base_ms + elapsed * f64::from(self.speed)
        } else {
            self.base_ms
        }
    }

    /// Fold elapsed play time into the base before changing rate or state
    fn rebase(&mut self, now: Instant) {
        self.base_ms = self.position_ms(now);
        self.since = now;
    }
}

/// Counters shown in the shutdown summary
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerStats {
    pub seeks: u32,
    pub loads: u32,
    pub speed_changes: u32,
}

pub struct SimulatedPlayer {
    playhead: Mutex<Playhead>,
    stats: Mutex<PlayerStats>,
    events: mpsc::Sender<PlayerEvent>,
}

impl SimulatedPlayer {
    pub fn new(events: mpsc::Sender<PlayerEvent>) -> Self {
        Self {
            playhead: Mutex::new(Playhead {
                base_ms: 0.0,
                since: Instant::now(),
                playing: false,
                speed: 1.0,
                source: None,
            }),
            stats: Mutex::new(PlayerStats::default()),
            events,
        }
    }

    pub fn stats(&self) -> PlayerStats {
        *self.stats.lock()
    }

    pub fn is_playing(&self) -> bool {
        self.playhead.lock().playing
    }

    pub fn speed(&self) -> f32 {
        self.playhead.lock().speed
    }

    fn emit(&self, event: PlayerEvent) {
        if let Err(e) = self.events.try_send(event) {
            debug!("Player event dropped: {}", e);
        }
    }

    /// Report the playhead every `period` while a source is loaded
    pub fn spawn_position_reports(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if this.events.is_closed() {
                    break;
                }

                let report = {
                    let head = this.playhead.lock();
                    (head.playing && head.source.is_some())
                        .then(|| head.position_ms(Instant::now()) as u64)
                };
                if let Some(position_ms) = report {
                    this.emit(PlayerEvent::Position { position_ms });
                }
            }
        })
    }
}

impl PlaybackControl for SimulatedPlayer {
    fn play(&self) {
        let mut head = self.playhead.lock();
        if !head.playing {
            head.rebase(Instant::now());
            head.playing = true;
        }
    }

    fn pause(&self) {
        let mut head = self.playhead.lock();
        if head.playing {
            head.rebase(Instant::now());
            head.playing = false;
        }
    }

    fn seek_to(&self, position_ms: u64) {
        {
            let mut head = self.playhead.lock();
            head.base_ms = position_ms as f64;
            head.since = Instant::now();
        }
        self.stats.lock().seeks += 1;
        debug!("Seek to {}ms", position_ms);
    }

    fn set_speed(&self, speed: f32) {
        let mut head = self.playhead.lock();
        if head.speed != speed {
            head.rebase(Instant::now());
            head.speed = speed;
            self.stats.lock().speed_changes += 1;
        }
    }

    fn current_position_ms(&self) -> u64 {
        self.playhead.lock().position_ms(Instant::now()).max(0.0) as u64
    }

    fn load(&self, url: &str) -> Result<(), SyncError> {
        if url.trim().is_empty() {
            return Err(SyncError::Playback("empty stream URL".to_string()));
        }
        {
            let mut head = self.playhead.lock();
            head.source = Some(url.to_string());
            head.base_ms = 0.0;
            head.since = Instant::now();
            head.playing = true;
        }
        self.stats.lock().loads += 1;
        info!("Loaded {}", url);
        self.emit(PlayerEvent::Ready);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> (Arc<SimulatedPlayer>, mpsc::Receiver<PlayerEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (Arc::new(SimulatedPlayer::new(tx)), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_playhead_follows_rate_and_pause() {
        let (player, _rx) = player();
        player.play();
        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert_eq!(player.current_position_ms(), 1_000);

        player.set_speed(1.5);
        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert_eq!(player.current_position_ms(), 2_500);

        player.pause();
        tokio::time::advance(Duration::from_millis(5_000)).await;
        assert_eq!(player.current_position_ms(), 2_500);

        player.seek_to(0);
        assert_eq!(player.current_position_ms(), 0);
        assert_eq!(player.stats().seeks, 1);
        assert_eq!(player.stats().speed_changes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_restarts_and_reports_ready() {
        let (player, mut rx) = player();
        player.seek_to(9_000);

        player.load("http://h:8096/ekat/stream.m3u8").unwrap();
        assert_eq!(player.current_position_ms(), 0);
        assert!(player.is_playing());
        assert_eq!(rx.recv().await, Some(PlayerEvent::Ready));

        assert!(player.load(" ").is_err());
        assert_eq!(player.stats().loads, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_reports_only_with_source() {
        let (player, mut rx) = player();
        player.play();
        let task = player.spawn_position_reports(Duration::from_millis(500));

        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert!(rx.try_recv().is_err());

        player.load("http://h:8096/ekat/stream.m3u8").unwrap();
        assert_eq!(rx.recv().await, Some(PlayerEvent::Ready));
        assert!(matches!(rx.recv().await, Some(PlayerEvent::Position { .. })));

        task.abort();
    }
}
