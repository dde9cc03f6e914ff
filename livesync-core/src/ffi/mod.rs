//! FFI surface for native hosts
//!
//! Android and iOS apps drive a [`Session`] through uniffi bindings and
//! supply their media player as a callback.

mod handlers;
mod session;
mod types;

pub use session::*;
pub use types::*;
