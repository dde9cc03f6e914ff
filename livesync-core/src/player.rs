//! Playback-control capability
//!
//! The media engine itself (buffering, decoding, HLS) lives in the host. The
//! sync core only needs these few controls plus a stream of state events.

use crate::error::SyncError;

/// Controls exposed by the host's media engine
pub trait PlaybackControl: Send + Sync {
    /// Enable playback
    fn play(&self);

    /// Disable playback, keeping the current position
    fn pause(&self);

    /// Jump to a position in milliseconds
    fn seek_to(&self, position_ms: u64);

    /// Set the playback rate (1.0 = normal)
    fn set_speed(&self, speed: f32);

    /// Current playback position in milliseconds
    fn current_position_ms(&self) -> u64;

    /// Tear down the current media source and prepare a fresh one from `url`
    fn load(&self, url: &str) -> Result<(), SyncError>;
}

/// State changes reported by the media engine
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Enough media buffered to play
    Ready,
    Buffering,
    Ended,
    /// The engine failed; `network_related` selects the longer recovery delay
    Error {
        code: i32,
        message: String,
        network_related: bool,
    },
    /// Periodic position report, used for drift correction
    Position { position_ms: u64 },
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum PlayerCall {
        Play,
        Pause,
        SeekTo(u64),
        SetSpeed(f32),
        Load(String),
    }

    /// Player double that records every call
    #[derive(Default)]
    pub(crate) struct RecordingPlayer {
        calls: Mutex<Vec<PlayerCall>>,
        position_ms: AtomicU64,
        fail_load: AtomicBool,
    }

    impl RecordingPlayer {
        pub(crate) fn at_position(position_ms: u64) -> Self {
            let player = Self::default();
            player.position_ms.store(position_ms, Ordering::SeqCst);
            player
        }

        pub(crate) fn set_position(&self, position_ms: u64) {
            self.position_ms.store(position_ms, Ordering::SeqCst);
        }

        pub(crate) fn fail_next_loads(&self, fail: bool) {
            self.fail_load.store(fail, Ordering::SeqCst);
        }

        pub(crate) fn take_calls(&self) -> Vec<PlayerCall> {
            std::mem::take(&mut *self.calls.lock())
        }
    }

    impl PlaybackControl for RecordingPlayer {
        fn play(&self) {
            self.calls.lock().push(PlayerCall::Play);
        }

        fn pause(&self) {
            self.calls.lock().push(PlayerCall::Pause);
        }

        fn seek_to(&self, position_ms: u64) {
            self.position_ms.store(position_ms, Ordering::SeqCst);
            self.calls.lock().push(PlayerCall::SeekTo(position_ms));
        }

        fn set_speed(&self, speed: f32) {
            self.calls.lock().push(PlayerCall::SetSpeed(speed));
        }

        fn current_position_ms(&self) -> u64 {
            self.position_ms.load(Ordering::SeqCst)
        }

        fn load(&self, url: &str) -> Result<(), SyncError> {
            self.calls.lock().push(PlayerCall::Load(url.to_string()));
            if self.fail_load.load(Ordering::SeqCst) {
                return Err(SyncError::Playback("source rejected".to_string()));
            }
            Ok(())
        }
    }
}
