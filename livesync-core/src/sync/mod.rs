//! Sync Engine
//!
//! Session phases, device runtime state and the status shown to the user.

mod protocol;
mod state;
mod status;

pub use protocol::*;
pub use state::*;
pub use status::*;
