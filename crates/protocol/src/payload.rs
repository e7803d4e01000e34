//! Payloads exchanged between host and script engine

use serde::{Deserialize, Serialize};

/// A host file handed to the worker for binding into the engine filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBlob {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl FileBlob {
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Host reply to a previously yielded script event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub payload: Payload,
}

/// Tagged value carried by a host response.
///
/// Matched exhaustively at resolution time; tags outside this set are
/// rejected when the message is decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// A host file; resolved by binding it into the engine filesystem and
    /// rewriting to the mounted path
    File { file: FileBlob },

    /// A plain string, passed to the engine unchanged
    Text { value: String },

    /// Any other literal value, passed to the engine unchanged
    Json { value: serde_json::Value },
}
