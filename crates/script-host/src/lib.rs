//! Quay Script Host
//!
//! The seam between the worker core and the embedded script engine: the
//! engine and handle traits the session controller drives, the engine's
//! private filesystem, and a QuickJS-backed reference engine.
//!
//! Scripts are resumable. `start` produces a handle bound to one session,
//! and each `resume` advances the script with host-supplied input until it
//! yields the next event or completes.

mod fs;
mod quickjs;

pub use fs::*;
pub use quickjs::*;

use async_trait::async_trait;
use quay_protocol::{ScriptEvent, SessionId};
use thiserror::Error;

/// Errors raised while bootstrapping the runtime or starting a session
#[derive(Debug, Error)]
pub enum EngineInitError {
    #[error("runtime bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("failed to start session: {0}")]
    Start(String),
}

/// Errors raised by a resumption
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script error: {0}")]
    Evaluation(String),

    #[error("script yielded a value that is not plain data: {0}")]
    BadYield(String),

    #[error("script session already completed")]
    Completed,
}

/// Outcome of advancing a script by one step
#[derive(Debug, Clone)]
pub enum Resumption {
    /// The script yielded an event and is waiting for the next input
    Yielded(ScriptEvent),

    /// The script ran to completion
    Completed,
}

/// A resumable script session.
///
/// Owned exclusively by the session controller; resumed one step at a time,
/// never concurrently.
pub trait ScriptHandle: Send + std::fmt::Debug {
    fn resume(&mut self, input: Option<serde_json::Value>) -> Result<Resumption, ScriptError>;
}

/// The embedded script engine consumed by the worker core
#[async_trait]
pub trait ScriptEngine: Send + Sync {
    /// Boot the runtime and load script dependencies
    async fn initialise(&self) -> Result<(), EngineInitError>;

    /// Start a session, returning a resumable handle
    fn start(&self, session_id: &SessionId) -> Result<Box<dyn ScriptHandle>, EngineInitError>;
}

/// Configuration for the reference engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum engine memory usage in bytes
    pub memory_limit: usize,

    /// Sources evaluated before the main script, in order
    pub preludes: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_limit: 64 * 1024 * 1024, // 64 MB
            preludes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.memory_limit, 64 * 1024 * 1024);
        assert!(config.preludes.is_empty());
    }
}
