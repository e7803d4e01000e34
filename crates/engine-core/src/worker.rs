//! Worker run loop

use std::sync::Arc;

use quay_protocol::{CommandEnvelope, EventEnvelope};
use quay_script_host::{EngineFs, ScriptEngine};
use thiserror::Error;

use crate::{transport, Controller, FatalError, HostHandle, PayloadResolver, TransportError, WorkerTransport};

/// Errors that stop the worker
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The worker: drains host commands in order and posts back events
pub struct Worker {
    transport: WorkerTransport,
    controller: Controller,
}

impl Worker {
    #[must_use]
    pub fn new(transport: WorkerTransport, controller: Controller) -> Self {
        Self {
            transport,
            controller,
        }
    }

    /// Process commands until the host side goes away.
    ///
    /// A bootstrap failure is fatal: the loop stops and the error is
    /// returned to whoever joins the worker.
    pub async fn run(mut self) -> Result<(), WorkerError> {
        while let Some(envelope) = self.transport.recv().await {
            self.dispatch(envelope).await?;
        }
        Ok(())
    }

    /// Handle one decoded command, posting its response event if any
    pub async fn dispatch(&mut self, envelope: CommandEnvelope) -> Result<(), WorkerError> {
        let command_id = envelope.id;
        if let Some(event) = self.controller.handle_command(envelope).await? {
            self.transport
                .send(EventEnvelope::response(event, command_id))?;
        }
        Ok(())
    }

    /// Handle one raw host message.
    ///
    /// Messages that do not decode as a command envelope are logged and
    /// dropped; the host gets no reply to them.
    pub async fn dispatch_raw(&mut self, text: &str) -> Result<(), WorkerError> {
        match serde_json::from_str::<CommandEnvelope>(text) {
            Ok(envelope) => self.dispatch(envelope).await,
            Err(err) => {
                tracing::warn!(error = %err, "dropping unrecognized host message");
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn controller(&self) -> &Controller {
        &self.controller
    }
}

/// Build a connected worker and spawn its run loop.
///
/// Returns the host handle and the join handle carrying any fatal error.
pub fn spawn_worker(
    engine: Arc<dyn ScriptEngine>,
    fs: Arc<dyn EngineFs>,
) -> (
    HostHandle,
    tokio::task::JoinHandle<Result<(), WorkerError>>,
) {
    let (host, worker_transport) = transport();
    let controller = Controller::new(engine, PayloadResolver::new(fs));
    let worker = Worker::new(worker_transport, controller);
    (host, tokio::spawn(worker.run()))
}
