//! livesync - Core Library
//!
//! Keeps many independent players of one live stream in near lock-step by
//! following a coordination server's session timeline: countdown, readiness
//! handshake, scheduled start, and drift correction while playing.

pub mod authority;
pub mod backoff;
pub mod clock;
pub mod config;
pub mod device_id;
pub mod drift;
pub mod error;
pub mod ffi;
pub mod network;
pub mod player;
pub mod readiness;
pub mod sync;
pub mod sync_loop;

// Re-exports for convenience
pub use authority::{Authority, HttpAuthority};
pub use config::SyncConfig;
pub use device_id::DeviceId;
pub use error::SyncError;
pub use network::{NetworkMonitor, NetworkProbe, NetworkStatus};
pub use player::{PlaybackControl, PlayerEvent};
pub use sync::{SessionPhase, StatusReport, SyncStatus};
pub use sync_loop::{SyncLoop, SyncLoopHandle};

// Setup uniffi scaffolding
uniffi::setup_scaffolding!();
