//! Quay Protocol
//!
//! Defines the command/event types for communication between host and worker.
//! This crate is the source of truth for all messages crossing that boundary.

mod commands;
mod events;
mod payload;
mod types;

pub use commands::*;
pub use events::*;
pub use payload::*;
pub use types::*;

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;
