//! Quay Engine Core
//!
//! This crate provides:
//! - The session controller state machine
//! - Payload resolution and file mounting
//! - Host/worker channel transport
//! - The worker run loop

mod controller;
mod resolver;
mod transport;
mod worker;

pub use controller::*;
pub use resolver::*;
pub use transport::*;
pub use worker::*;
