//! Transport layer for command/event communication
//!
//! In-memory channels between the host and the worker. Commands are consumed
//! in arrival order; the single worker-side receiver is what serializes
//! command handling.

use quay_protocol::{CommandEnvelope, EventEnvelope};
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel disconnected")]
    Disconnected,
}

/// Create a connected transport pair.
///
/// Returns (host_side, worker_side) handles.
#[must_use]
pub fn transport() -> (HostHandle, WorkerTransport) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let host = HostHandle {
        command_tx,
        event_rx,
    };
    let worker = WorkerTransport {
        command_rx,
        event_tx,
    };
    (host, worker)
}

/// Host-side transport handle
pub struct HostHandle {
    command_tx: mpsc::UnboundedSender<CommandEnvelope>,
    event_rx: mpsc::UnboundedReceiver<EventEnvelope>,
}

impl HostHandle {
    pub fn send(&self, command: CommandEnvelope) -> Result<(), TransportError> {
        self.command_tx
            .send(command)
            .map_err(|_| TransportError::Disconnected)
    }

    /// Receive the next event; `None` once the worker is gone
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.event_rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Option<EventEnvelope>, TransportError> {
        match self.event_rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(TransportError::Disconnected),
        }
    }
}

/// Worker-side transport handle
pub struct WorkerTransport {
    command_rx: mpsc::UnboundedReceiver<CommandEnvelope>,
    event_tx: mpsc::UnboundedSender<EventEnvelope>,
}

impl WorkerTransport {
    /// Receive the next command; `None` once the host is gone
    pub async fn recv(&mut self) -> Option<CommandEnvelope> {
        self.command_rx.recv().await
    }

    pub fn send(&self, event: EventEnvelope) -> Result<(), TransportError> {
        self.event_tx
            .send(event)
            .map_err(|_| TransportError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_protocol::{EventEnvelope, WorkerCommand, WorkerEvent};

    #[tokio::test]
    async fn roundtrip_command_event() {
        let (mut host, mut worker) = transport();

        let command = CommandEnvelope::new(WorkerCommand::Initialise);
        let command_id = command.id;
        host.send(command).unwrap();

        let received = worker.recv().await.unwrap();
        assert_eq!(received.id, command_id);

        worker
            .send(EventEnvelope::response(
                WorkerEvent::InitialiseDone,
                command_id,
            ))
            .unwrap();

        let received = host.recv().await.unwrap();
        assert_eq!(received.command_id, Some(command_id));
    }

    #[tokio::test]
    async fn dropped_worker_disconnects_host() {
        let (host, worker) = transport();
        drop(worker);
        assert!(matches!(
            host.send(CommandEnvelope::new(WorkerCommand::Initialise)),
            Err(TransportError::Disconnected)
        ));
    }
}
