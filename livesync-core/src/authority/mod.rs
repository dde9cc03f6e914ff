//! Coordination Server API
//!
//! The server owns the session timeline; devices poll it and follow.

mod client;
mod types;

pub use client::{Authority, HttpAuthority};
pub use types::*;
