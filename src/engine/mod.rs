//! Profile execution engine.
//!
//! [`Engine`] is the single owner of the process-wide state: the connected
//! actuators, the run status snapshot, the single-flight guard and the handle
//! of the background worker. The control surface only talks to it through its
//! methods; the worker is the only writer of [`RunState`] while a run is
//! active.

pub mod profile;
pub mod runner;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::ControlConfig;
use crate::hardware::{ActuatorConnector, ActuatorError, ActuatorPair};
use crate::sensor::{SensorError, SensorSource};

pub use profile::Profile;
use runner::ProfileRunner;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a run is already in progress")]
    AlreadyRunning,
    #[error("no profiles provided")]
    EmptyProfileList,
    #[error("invalid profile: {0}")]
    InvalidProfile(String),
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(#[from] SensorError),
    #[error("actuator fault: {0}")]
    ActuatorFault(#[from] ActuatorError),
    #[error("power supplies are not connected")]
    NotConnected,
    #[error("no run is in progress")]
    NotRunning,
}

impl EngineError {
    /// Stable machine-readable name for error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::AlreadyRunning => "already_running",
            EngineError::EmptyProfileList => "empty_profile_list",
            EngineError::InvalidProfile(_) => "invalid_profile",
            EngineError::SensorUnavailable(_) => "sensor_unavailable",
            EngineError::ActuatorFault(_) => "actuator_fault",
            EngineError::NotConnected => "not_connected",
            EngineError::NotRunning => "not_running",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Point-in-time view of the current (or last) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub status: RunStatus,
    pub run_id: Option<Uuid>,
    pub active_target_temperature: Option<f64>,
    pub profile_index: Option<usize>,
    pub profile_count: usize,
    /// In-tolerance time accumulated for the active profile.
    pub seconds_at_target: f64,
    pub last_temperature: Option<f64>,
    pub sensor_failures: u64,
    pub actuator_faults: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl RunState {
    pub fn idle() -> Self {
        Self {
            status: RunStatus::Idle,
            run_id: None,
            active_target_temperature: None,
            profile_index: None,
            profile_count: 0,
            seconds_at_target: 0.0,
            last_temperature: None,
            sensor_failures: 0,
            actuator_faults: 0,
            started_at: None,
            finished_at: None,
            last_error: None,
        }
    }

    fn running(run_id: Uuid, profile_count: usize) -> Self {
        Self {
            status: RunStatus::Running,
            run_id: Some(run_id),
            profile_count,
            started_at: Some(Utc::now()),
            ..Self::idle()
        }
    }

    fn finish(&mut self, status: RunStatus, error: Option<String>) {
        self.status = status;
        self.active_target_temperature = None;
        self.finished_at = Some(Utc::now());
        self.last_error = error;
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Answer to the status query: live sensor values, temperature supply
/// read-back (absent when not connected) and the run snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub temperature: f64,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub auxiliary: serde_json::Value,
    pub run: RunState,
}

struct RunSlot {
    abort_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

struct EngineInner {
    control: ControlConfig,
    sensor: Arc<dyn SensorSource>,
    connector: Arc<dyn ActuatorConnector>,
    actuators: RwLock<Option<ActuatorPair>>,
    state: Arc<RwLock<RunState>>,
    running: Arc<AtomicBool>,
    active_tx: Arc<watch::Sender<bool>>,
    worker: Mutex<Option<RunSlot>>,
}

/// Cloneable handle to the engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(control: ControlConfig, sensor: Arc<dyn SensorSource>, connector: Arc<dyn ActuatorConnector>) -> Self {
        let (active_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(EngineInner {
                control,
                sensor,
                connector,
                actuators: RwLock::new(None),
                state: Arc::new(RwLock::new(RunState::idle())),
                running: Arc::new(AtomicBool::new(false)),
                active_tx: Arc::new(active_tx),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Discovers both actuators and keeps their handles. Calling it again
    /// re-acquires them; refused while a run holds the current handles.
    ///
    /// Holds the worker slot for the whole discovery so a start cannot slip
    /// in between the check and the swap.
    pub async fn connect(&self) -> Result<(), EngineError> {
        let _slot = self.inner.worker.lock().await;
        if self.inner.running.load(Ordering::Acquire) {
            return Err(EngineError::AlreadyRunning);
        }
        let pair = self.inner.connector.connect().await?;
        *self.inner.actuators.write().await = Some(pair);
        tracing::info!("Connected to power supplies");
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.actuators.read().await.is_some()
    }

    /// Starts a run in the background and returns its id without waiting.
    ///
    /// An active run wins over every other rejection, then the payload is
    /// checked, then the connection.
    pub async fn start_run(&self, profiles: Vec<Profile>) -> Result<Uuid, EngineError> {
        let mut slot = self.inner.worker.lock().await;
        if self.inner.running.load(Ordering::Acquire) {
            tracing::warn!("Rejected start: a run is already in progress");
            return Err(EngineError::AlreadyRunning);
        }
        if profiles.is_empty() {
            return Err(EngineError::EmptyProfileList);
        }
        profile::validate_profiles(&profiles).map_err(EngineError::InvalidProfile)?;
        let actuators = self
            .inner
            .actuators
            .read()
            .await
            .clone()
            .ok_or(EngineError::NotConnected)?;

        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::AlreadyRunning);
        }

        let run_id = Uuid::new_v4();
        *self.inner.state.write().await = RunState::running(run_id, profiles.len());
        self.inner.active_tx.send_replace(true);

        let (abort_tx, abort_rx) = broadcast::channel(1);
        let runner = ProfileRunner::new(
            self.inner.control.clone(),
            self.inner.sensor.clone(),
            actuators,
            self.inner.state.clone(),
            abort_rx,
        );
        let running = self.inner.running.clone();
        let active_tx = self.inner.active_tx.clone();
        tracing::info!("Starting run {} with {} profile(s)", run_id, profiles.len());
        let handle = tokio::spawn(async move {
            runner.execute(profiles).await;
            running.store(false, Ordering::Release);
            active_tx.send_replace(false);
        });
        *slot = Some(RunSlot { abort_tx, handle });
        Ok(run_id)
    }

    /// Stops the active run, waits for its actuator cleanup, and leaves the engine idle.
    pub async fn abort_run(&self) -> Result<(), EngineError> {
        let mut slot = self.inner.worker.lock().await;
        // The worker publishes its terminal status before clearing the flag.
        if !self.inner.running.load(Ordering::Acquire) || !self.inner.state.read().await.is_running() {
            return Err(EngineError::NotRunning);
        }
        let run = slot.take().ok_or(EngineError::NotRunning)?;
        tracing::info!("Aborting run");
        let _ = run.abort_tx.send(());
        if let Err(e) = run.handle.await {
            tracing::error!("Run worker ended abnormally: {}", e);
        }
        Ok(())
    }

    pub async fn run_state(&self) -> RunState {
        self.inner.state.read().await.clone()
    }

    /// Polls the sensor and, when connected, reads back the temperature supply.
    pub async fn status(&self) -> Result<StatusReport, EngineError> {
        let reading = self.inner.sensor.fetch_temperature().await?;
        let actuators = self.inner.actuators.read().await.clone();
        let (voltage, current) = match actuators {
            Some(pair) => {
                let supply = &pair.temperature;
                let (current, voltage) = tokio::join!(
                    supply.device.read_output_current(supply.channel),
                    supply.device.read_output_voltage(supply.channel)
                );
                (Some(voltage?), Some(current?))
            }
            None => (None, None),
        };
        Ok(StatusReport {
            temperature: reading.temperature,
            voltage,
            current,
            auxiliary: reading.auxiliary,
            run: self.run_state().await,
        })
    }

    /// Resolves once no run is active.
    pub async fn wait(&self) {
        let mut active_rx = self.inner.active_tx.subscribe();
        let _ = active_rx.wait_for(|active| !*active).await;
    }

    /// Best-effort stop: aborts any run, then switches both supplies off
    /// whether or not a run was active.
    pub async fn shutdown(&self) {
        match self.abort_run().await {
            Ok(()) | Err(EngineError::NotRunning) => {}
            Err(e) => tracing::warn!("Abort during shutdown failed: {}", e),
        }
        let actuators = self.inner.actuators.read().await.clone();
        if let Some(pair) = actuators {
            tracing::info!("Disabling power supplies");
            pair.disable_all().await;
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("control", &self.inner.control)
            .field("running", &self.inner.running.load(Ordering::Relaxed))
            .finish()
    }
}
