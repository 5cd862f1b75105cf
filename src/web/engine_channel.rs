//! Defines the communication channel messages between the web server and the engine task.

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::engine::{Engine, EngineError, Profile, RunState, StatusReport};

/// Represents a request sent from a web handler to the engine task.
#[derive(Debug)]
pub enum EngineRequest {
    /// Discover and open both power supplies.
    Connect {
        respond_to: oneshot::Sender<Result<(), EngineError>>,
    },
    /// Start a run over the given profiles.
    StartRun {
        profiles: Vec<Profile>,
        respond_to: oneshot::Sender<Result<Uuid, EngineError>>,
    },
    /// Abort the active run.
    AbortRun {
        respond_to: oneshot::Sender<Result<(), EngineError>>,
    },
    /// Live readings plus the run snapshot.
    GetStatus {
        respond_to: oneshot::Sender<Result<StatusReport, EngineError>>,
    },
    /// Only the run snapshot; never touches hardware.
    GetRunState {
        respond_to: oneshot::Sender<RunState>,
    },
}

/// Serves requests until every sender is dropped.
///
/// Requests that touch hardware or the network run on their own task so a
/// slow sensor never holds up a start or abort.
pub async fn serve_engine_requests(engine: Engine, mut requests: mpsc::Receiver<EngineRequest>) {
    while let Some(request) = requests.recv().await {
        match request {
            EngineRequest::Connect { respond_to } => {
                let engine = engine.clone();
                tokio::spawn(async move {
                    let _ = respond_to.send(engine.connect().await);
                });
            }
            EngineRequest::StartRun { profiles, respond_to } => {
                let _ = respond_to.send(engine.start_run(profiles).await);
            }
            EngineRequest::AbortRun { respond_to } => {
                let engine = engine.clone();
                tokio::spawn(async move {
                    let _ = respond_to.send(engine.abort_run().await);
                });
            }
            EngineRequest::GetStatus { respond_to } => {
                let engine = engine.clone();
                tokio::spawn(async move {
                    let _ = respond_to.send(engine.status().await);
                });
            }
            EngineRequest::GetRunState { respond_to } => {
                let _ = respond_to.send(engine.run_state().await);
            }
        }
    }
    tracing::debug!("Engine request channel closed");
}

/// Spawns the engine task and returns the sender handlers use.
pub fn spawn_engine_task(engine: Engine, capacity: usize) -> mpsc::Sender<EngineRequest> {
    let (engine_tx, engine_rx) = mpsc::channel(capacity);
    tokio::spawn(serve_engine_requests(engine, engine_rx));
    engine_tx
}
