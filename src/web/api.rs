//! Defines the Axum API routes and handlers.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::sync::mpsc::Sender;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::engine::EngineError;
use crate::web::engine_channel::EngineRequest;
use crate::web::models::{ErrorResponse, StartRunRequest, StartRunResponse, StatusResponse};

pub type AppState = Sender<EngineRequest>;

/// Helper to create a JSON error response with a message and status code
fn json_error(message: &str, kind: &str, status: StatusCode) -> Response {
    let body = ErrorResponse {
        error: message.to_string(),
        kind: kind.to_string(),
    };
    (status, Json(body)).into_response()
}

fn internal_error() -> Response {
    json_error("Engine unavailable", "internal", StatusCode::INTERNAL_SERVER_ERROR)
}

/// Maps an engine error to its HTTP status.
pub fn status_for(error: &EngineError) -> StatusCode {
    match error {
        EngineError::AlreadyRunning | EngineError::NotRunning => StatusCode::CONFLICT,
        EngineError::EmptyProfileList | EngineError::InvalidProfile(_) => StatusCode::BAD_REQUEST,
        EngineError::NotConnected => StatusCode::PRECONDITION_FAILED,
        EngineError::SensorUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::ActuatorFault(_) => StatusCode::BAD_GATEWAY,
    }
}

fn engine_error(error: &EngineError) -> Response {
    json_error(&error.to_string(), error.kind(), status_for(error))
}

/// Sends a request built around a fresh oneshot and waits for the answer.
async fn ask<T>(engine_tx: &AppState, build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest) -> Option<T> {
    let (resp_tx, resp_rx) = oneshot::channel();
    if engine_tx.send(build(resp_tx)).await.is_err() {
        return None;
    }
    resp_rx.await.ok()
}

/// Creates the Axum router with all the API endpoints.
pub fn create_router(engine_tx: AppState) -> Router {
    Router::new()
        .route("/api/v1/connect", post(connect_handler))
        .route("/api/v1/runs", post(start_run_handler))
        .route("/api/v1/runs/abort", post(abort_run_handler))
        .route("/api/v1/runs/current", get(run_state_handler))
        .route("/api/v1/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(engine_tx)
}

/// Same routes, reachable from a browser front-end on another origin.
pub fn create_router_with_cors(engine_tx: AppState) -> Router {
    create_router(engine_tx).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

/// POST /api/v1/connect
async fn connect_handler(State(engine_tx): State<AppState>) -> Response {
    match ask(&engine_tx, |respond_to| EngineRequest::Connect { respond_to }).await {
        Some(Ok(())) => (
            StatusCode::OK,
            Json(serde_json::json!({ "message": "Connected to power supplies" })),
        )
            .into_response(),
        Some(Err(e)) => engine_error(&e),
        None => internal_error(),
    }
}

/// POST /api/v1/runs
async fn start_run_handler(State(engine_tx): State<AppState>, Json(payload): Json<StartRunRequest>) -> Response {
    let profiles = payload.profiles;
    match ask(&engine_tx, |respond_to| EngineRequest::StartRun { profiles, respond_to }).await {
        Some(Ok(run_id)) => (StatusCode::OK, Json(StartRunResponse { accepted: true, run_id })).into_response(),
        Some(Err(e)) => engine_error(&e),
        None => internal_error(),
    }
}

/// POST /api/v1/runs/abort
async fn abort_run_handler(State(engine_tx): State<AppState>) -> Response {
    match ask(&engine_tx, |respond_to| EngineRequest::AbortRun { respond_to }).await {
        Some(Ok(())) => (StatusCode::OK, Json(serde_json::json!({ "result": "ok" }))).into_response(),
        Some(Err(e)) => engine_error(&e),
        None => internal_error(),
    }
}

/// GET /api/v1/runs/current
async fn run_state_handler(State(engine_tx): State<AppState>) -> Response {
    match ask(&engine_tx, |respond_to| EngineRequest::GetRunState { respond_to }).await {
        Some(state) => (StatusCode::OK, Json(state)).into_response(),
        None => internal_error(),
    }
}

/// GET /api/v1/status
async fn status_handler(State(engine_tx): State<AppState>) -> Response {
    match ask(&engine_tx, |respond_to| EngineRequest::GetStatus { respond_to }).await {
        Some(Ok(report)) => (StatusCode::OK, Json(StatusResponse::from(report))).into_response(),
        Some(Err(e)) => engine_error(&e),
        None => internal_error(),
    }
}
