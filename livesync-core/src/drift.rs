//! Drift correction for steady-state playback
//!
//! Small drift is closed smoothly by nudging the playback rate; drift too
//! large to close that way is corrected with a direct seek.
//!
//! Drift is `desired - actual`: positive means we are behind the session
//! timeline and need to catch up, negative means we are ahead.

use crate::player::PlaybackControl;

/// Drift within this band is left alone (ms)
pub const DRIFT_SOFT_MS: u64 = 500;

/// Upper edge of the speed-nudge band (ms)
pub const DRIFT_SPEED_MS: u64 = 2000;

/// Drift beyond this is corrected with a seek (ms)
pub const DRIFT_SEEK_MS: u64 = 2000;

pub const SPEED_NORMAL: f32 = 1.0;
pub const SPEED_UP: f32 = 1.03;
pub const SPEED_DOWN: f32 = 0.97;

/// Hard safety bounds for any rate handed to the player
pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 1.5;

/// Action chosen for a drift measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    /// Playback rate to apply (already clamped)
    pub speed: f32,
    /// Position to seek to, if the gap is too large to close by speed
    pub seek_to_ms: Option<u64>,
}

/// Clamp a playback rate into the safe range
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_nan() {
        return SPEED_NORMAL;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

/// Set the player's rate, always through the safety clamp
pub fn apply_speed(player: &dyn PlaybackControl, speed: f32) {
    player.set_speed(clamp_speed(speed));
}

/// Choose the correction for `drift_ms` given the current position
pub fn plan(drift_ms: i64, current_position_ms: u64) -> Correction {
    let magnitude = drift_ms.unsigned_abs();

    if magnitude <= DRIFT_SOFT_MS {
        Correction {
            speed: clamp_speed(SPEED_NORMAL),
            seek_to_ms: None,
        }
    } else if magnitude <= DRIFT_SPEED_MS {
        let speed = if drift_ms > 0 { SPEED_UP } else { SPEED_DOWN };
        Correction {
            speed: clamp_speed(speed),
            seek_to_ms: None,
        }
    } else {
        debug_assert!(magnitude > DRIFT_SEEK_MS);
        let target = (current_position_ms as i64).saturating_add(drift_ms).max(0) as u64;
        Correction {
            speed: clamp_speed(SPEED_NORMAL),
            seek_to_ms: Some(target),
        }
    }
}

/// A correction that was applied, kept for status display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionSample {
    pub drift_ms: i64,
    pub correction: Correction,
}

/// Maximum number of samples to keep in history
const MAX_SAMPLE_HISTORY: usize = 10;

/// Applies drift corrections to a player and remembers recent ones
#[derive(Debug, Default)]
pub struct DriftCorrector {
    history: Vec<CorrectionSample>,
}

impl DriftCorrector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measure-and-act: plan a correction for `drift_ms` and apply it
    pub fn apply(&mut self, player: &dyn PlaybackControl, drift_ms: i64) -> Correction {
        let correction = plan(drift_ms, player.current_position_ms());

        if let Some(target) = correction.seek_to_ms {
            tracing::info!(
                "Drift {:+}ms exceeds {}ms, seeking to {}ms",
                drift_ms,
                DRIFT_SEEK_MS,
                target
            );
            player.seek_to(target);
        } else if correction.speed != SPEED_NORMAL {
            tracing::debug!("Drift {:+}ms, nudging speed to {}", drift_ms, correction.speed);
        }
        apply_speed(player, correction.speed);

        self.history.push(CorrectionSample { drift_ms, correction });
        if self.history.len() > MAX_SAMPLE_HISTORY {
            self.history.remove(0);
        }

        correction
    }

    pub fn last_drift_ms(&self) -> Option<i64> {
        self.history.last().map(|s| s.drift_ms)
    }

    /// Forget past corrections once there is no timeline to follow
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::testing::{PlayerCall, RecordingPlayer};

    #[test]
    fn test_soft_band_keeps_normal_speed() {
        for drift in [-500, -120, 0, 1, 499, 500] {
            let c = plan(drift, 10_000);
            assert_eq!(c.speed, 1.0, "drift {}", drift);
            assert_eq!(c.seek_to_ms, None);
        }
    }

    #[test]
    fn test_speed_band_follows_sign() {
        for drift in [501, 1200, 2000] {
            let c = plan(drift, 10_000);
            assert_eq!(c.speed, SPEED_UP, "behind by {}", drift);
            assert_eq!(c.seek_to_ms, None);
        }
        for drift in [-501, -1200, -2000] {
            let c = plan(drift, 10_000);
            assert_eq!(c.speed, SPEED_DOWN, "ahead by {}", drift);
            assert_eq!(c.seek_to_ms, None);
        }
    }

    #[test]
    fn test_seek_band_moves_by_exact_drift() {
        let c = plan(2001, 10_000);
        assert_eq!(c.seek_to_ms, Some(12_001));
        assert_eq!(c.speed, 1.0);

        let c = plan(-4_500, 10_000);
        assert_eq!(c.seek_to_ms, Some(5_500));
        assert_eq!(c.speed, 1.0);
    }

    #[test]
    fn test_seek_target_clamped_at_zero() {
        let c = plan(-9_000, 3_000);
        assert_eq!(c.seek_to_ms, Some(0));
    }

    #[test]
    fn test_speed_clamp_bounds() {
        assert_eq!(clamp_speed(3.0), MAX_SPEED);
        assert_eq!(clamp_speed(0.1), MIN_SPEED);
        assert_eq!(clamp_speed(-2.0), MIN_SPEED);
        assert_eq!(clamp_speed(f32::NAN), SPEED_NORMAL);
        assert_eq!(clamp_speed(1.03), 1.03);

        for speed in [0.0_f32, 0.5, 0.97, 1.0, 1.2, 1.5, 9.0] {
            let once = clamp_speed(speed);
            assert_eq!(clamp_speed(once), once);
            assert!((MIN_SPEED..=MAX_SPEED).contains(&once));
        }
    }

    #[test]
    fn test_apply_speed_never_exceeds_bounds() {
        let player = RecordingPlayer::default();
        apply_speed(&player, 4.0);
        apply_speed(&player, 0.01);
        assert_eq!(
            player.take_calls(),
            vec![PlayerCall::SetSpeed(MAX_SPEED), PlayerCall::SetSpeed(MIN_SPEED)]
        );
    }

    #[test]
    fn test_corrector_applies_seek_then_normal_speed() {
        let player = RecordingPlayer::at_position(20_000);
        let mut corrector = DriftCorrector::new();

        corrector.apply(&player, 3_000);

        assert_eq!(
            player.take_calls(),
            vec![PlayerCall::SeekTo(23_000), PlayerCall::SetSpeed(1.0)]
        );
        assert_eq!(corrector.last_drift_ms(), Some(3_000));
    }

    #[test]
    fn test_corrector_nudge_has_no_seek() {
        let player = RecordingPlayer::at_position(20_000);
        let mut corrector = DriftCorrector::new();

        corrector.apply(&player, -800);

        assert_eq!(player.take_calls(), vec![PlayerCall::SetSpeed(SPEED_DOWN)]);
    }

    #[test]
    fn test_history_is_bounded() {
        let player = RecordingPlayer::at_position(0);
        let mut corrector = DriftCorrector::new();
        for i in 0..25 {
            corrector.apply(&player, i);
        }
        assert_eq!(corrector.history.len(), MAX_SAMPLE_HISTORY);
        assert_eq!(corrector.last_drift_ms(), Some(24));

        corrector.reset();
        assert!(corrector.history.is_empty());
        assert_eq!(corrector.last_drift_ms(), None);
    }
}
