//! Contains the data models for API requests and responses.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{Profile, RunState, StatusReport};

/// Represents a request to start a run.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StartRunRequest {
    pub profiles: Vec<Profile>,
}

/// Represents the response to an accepted start request.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StartRunResponse {
    pub accepted: bool,
    pub run_id: Uuid,
}

/// Represents the response for the /api/v1/status endpoint.
#[derive(Serialize, Debug, Clone)]
pub struct StatusResponse {
    pub temperature: f64,
    /// Temperature supply output voltage, V. Null when not connected.
    pub voltage: Option<f64>,
    /// Temperature supply output current, mA. Null when not connected.
    pub current: Option<f64>,
    /// Auxiliary sensor block, passed through as received.
    pub sensor2: serde_json::Value,
    pub run: RunState,
}

impl From<StatusReport> for StatusResponse {
    fn from(report: StatusReport) -> Self {
        Self {
            temperature: report.temperature,
            voltage: report.voltage,
            current: report.current,
            sensor2: report.auxiliary,
            run: report.run,
        }
    }
}

/// Represents a structured error payload.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}
