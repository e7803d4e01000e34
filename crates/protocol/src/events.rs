//! Worker events (worker → host)

use serde::{Deserialize, Serialize};

use crate::{CommandId, EventId};

/// Value yielded by the script engine, forwarded to the host verbatim.
///
/// Always a plain structural value (records, arrays, literals); nothing in
/// it refers back into the engine.
pub type ScriptEvent = serde_json::Value;

/// Envelope for all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    /// The command this event is responding to
    pub command_id: Option<CommandId>,
    pub event: WorkerEvent,
}

impl EventEnvelope {
    #[must_use]
    pub fn new(event: WorkerEvent, command_id: Option<CommandId>) -> Self {
        Self {
            id: EventId::new(),
            command_id,
            event,
        }
    }

    #[must_use]
    pub fn response(event: WorkerEvent, command_id: CommandId) -> Self {
        Self::new(event, Some(command_id))
    }
}

/// All events the worker can emit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent {
    /// Runtime bootstrap finished; the worker accepts run-cycle commands
    InitialiseDone,

    /// The script yielded this event, or an error page if the resumption
    /// failed
    RunCycleDone { script_event: ScriptEvent },
}

/// Build the page-render event emitted when a resumption fails.
///
/// Delivered through the normal `RunCycleDone` channel; the host does not
/// distinguish it from an ordinary yield.
#[must_use]
pub fn error_page(stacktrace: &str) -> ScriptEvent {
    serde_json::json!({
        "type": "ui_render",
        "page": {
            "type": "error",
            "stacktrace": stacktrace,
        }
    })
}
