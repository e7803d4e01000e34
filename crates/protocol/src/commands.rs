//! Worker commands (host → worker)

use serde::{Deserialize, Serialize};

use crate::{CommandId, Response, SessionId};

/// Envelope for all commands with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub id: CommandId,
    pub command: WorkerCommand,
}

impl CommandEnvelope {
    #[must_use]
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            id: CommandId::new(),
            command,
        }
    }
}

/// All commands the host can send to the worker.
///
/// Consumed in arrival order; the worker never reorders or batches them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerCommand {
    /// Boot the script runtime and load its dependencies
    Initialise,

    /// Start a session and run the script until its first yield
    FirstRunCycle { session_id: SessionId },

    /// Resolve the response payload and resume the script with it
    NextRunCycle { response: Response },
}
