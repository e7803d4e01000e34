//! Session controller state machine
//!
//! Owns the script session and processes each host command to completion
//! before the next is accepted. Every accepted run-cycle command produces
//! exactly one event back to the host; failed resumptions are converted to
//! an error page and delivered through the same channel as a normal yield.

use std::sync::Arc;

use quay_protocol::{error_page, CommandEnvelope, Response, SessionId, WorkerCommand, WorkerEvent};
use quay_script_host::{EngineInitError, Resumption, ScriptEngine, ScriptHandle};
use thiserror::Error;

use crate::PayloadResolver;

/// Fatal controller failures; everything else surfaces as an error-page
/// event
#[derive(Debug, Error)]
pub enum FatalError {
    #[error(transparent)]
    Bootstrap(EngineInitError),
}

/// Controller lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialised,
    Initialising,
    Ready,
    Running,
    AwaitingResponse,
    Terminated,
}

/// One run of the script engine, bound to a host-assigned id
struct Session {
    id: SessionId,
    handle: Option<Box<dyn ScriptHandle>>,
}

/// Worker-side state machine driving the script engine
pub struct Controller {
    state: ControllerState,
    engine: Arc<dyn ScriptEngine>,
    resolver: PayloadResolver,
    session: Option<Session>,
}

impl Controller {
    #[must_use]
    pub fn new(engine: Arc<dyn ScriptEngine>, resolver: PayloadResolver) -> Self {
        Self {
            state: ControllerState::Uninitialised,
            engine,
            resolver,
            session: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Process one command to completion.
    ///
    /// Returns the event to post back to the host: exactly one for an
    /// accepted command, `None` for a command dropped as out of order.
    pub async fn handle_command(
        &mut self,
        envelope: CommandEnvelope,
    ) -> Result<Option<WorkerEvent>, FatalError> {
        match envelope.command {
            WorkerCommand::Initialise => self.initialise().await,
            WorkerCommand::FirstRunCycle { session_id } => self.first_run_cycle(session_id).await,
            WorkerCommand::NextRunCycle { response } => self.next_run_cycle(response).await,
        }
    }

    async fn initialise(&mut self) -> Result<Option<WorkerEvent>, FatalError> {
        if self.state != ControllerState::Uninitialised {
            tracing::warn!(state = ?self.state, "dropping initialise outside Uninitialised");
            return Ok(None);
        }

        self.state = ControllerState::Initialising;
        tracing::info!("bootstrapping script runtime");

        match self.engine.initialise().await {
            Ok(()) => {
                self.state = ControllerState::Ready;
                Ok(Some(WorkerEvent::InitialiseDone))
            }
            Err(err) => {
                self.state = ControllerState::Terminated;
                Err(FatalError::Bootstrap(err))
            }
        }
    }

    async fn first_run_cycle(
        &mut self,
        session_id: SessionId,
    ) -> Result<Option<WorkerEvent>, FatalError> {
        if self.state != ControllerState::Ready {
            tracing::warn!(state = ?self.state, %session_id, "dropping first_run_cycle outside Ready");
            return Ok(None);
        }

        self.state = ControllerState::Running;
        match self.engine.start(&session_id) {
            Ok(handle) => {
                tracing::info!(%session_id, "session started");
                self.session = Some(Session {
                    id: session_id,
                    handle: Some(handle),
                });
                Ok(Some(self.run_cycle(None).await))
            }
            Err(err) => {
                // Reported like a failed resumption so the host still gets a
                // reply; the controller stays Ready for another attempt.
                tracing::warn!(%session_id, error = %err, "session start failed");
                self.state = ControllerState::Ready;
                Ok(Some(WorkerEvent::RunCycleDone {
                    script_event: error_page(&err.to_string()),
                }))
            }
        }
    }

    async fn next_run_cycle(
        &mut self,
        response: Response,
    ) -> Result<Option<WorkerEvent>, FatalError> {
        if self.state != ControllerState::AwaitingResponse || self.session.is_none() {
            tracing::warn!(state = ?self.state, "dropping next_run_cycle outside AwaitingResponse");
            return Ok(None);
        }

        self.state = ControllerState::Running;
        let input = match self.resolver.resolve(response) {
            Ok(input) => input,
            Err(err) => {
                // A resolution failure is reported as a resumption failure
                // on this cycle.
                tracing::warn!(error = %err, "payload resolution failed");
                self.state = ControllerState::AwaitingResponse;
                return Ok(Some(WorkerEvent::RunCycleDone {
                    script_event: error_page(&err.to_string()),
                }));
            }
        };
        Ok(Some(self.run_cycle(Some(input)).await))
    }

    /// Advance the script one step and convert the outcome into the event
    /// posted to the host.
    async fn run_cycle(&mut self, input: Option<serde_json::Value>) -> WorkerEvent {
        let Some(session) = self.session.as_mut() else {
            // Callers guarantee a session; kept as a caught failure rather
            // than a panic path.
            self.state = ControllerState::AwaitingResponse;
            return WorkerEvent::RunCycleDone {
                script_event: error_page("no active session"),
            };
        };
        let session_id = session.id.clone();
        tracing::debug!(%session_id, has_input = input.is_some(), "run cycle");

        let Some(mut handle) = session.handle.take() else {
            self.state = ControllerState::AwaitingResponse;
            return WorkerEvent::RunCycleDone {
                script_event: error_page("resumption already in flight"),
            };
        };

        // Resumptions run on the blocking pool and are awaited to
        // completion, so there is never more than one in flight.
        let joined = tokio::task::spawn_blocking(move || {
            let outcome = handle.resume(input);
            (handle, outcome)
        })
        .await;

        let script_event = match joined {
            Ok((handle, outcome)) => {
                if let Some(session) = self.session.as_mut() {
                    session.handle = Some(handle);
                }
                match outcome {
                    Ok(Resumption::Yielded(event)) => event,
                    Ok(Resumption::Completed) => {
                        // Generator exhaustion: there is no event to forward,
                        // so the host gets an error page.
                        tracing::info!(%session_id, "session completed");
                        error_page("script session completed")
                    }
                    Err(err) => {
                        tracing::warn!(%session_id, error = %err, "resumption failed");
                        error_page(&err.to_string())
                    }
                }
            }
            Err(join_err) => {
                tracing::error!(%session_id, error = %join_err, "resumption task failed");
                error_page(&join_err.to_string())
            }
        };

        self.state = ControllerState::AwaitingResponse;
        WorkerEvent::RunCycleDone { script_event }
    }
}
