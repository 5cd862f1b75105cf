// src/engine/runner.rs - Background worker executing one run
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tokio::time::{Instant, sleep_until};

use super::{EngineError, Profile, RunState, RunStatus};
use crate::config::ControlConfig;
use crate::control::{PidController, light_current_ma};
use crate::hardware::ActuatorPair;
use crate::sensor::SensorSource;

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Aborted,
}

/// Owns everything a single run touches. The PID history lives here, so it
/// starts fresh with every run and carries across that run's profiles.
pub struct ProfileRunner {
    control: ControlConfig,
    sensor: Arc<dyn SensorSource>,
    actuators: ActuatorPair,
    state: Arc<RwLock<RunState>>,
    abort_rx: broadcast::Receiver<()>,
    pid: PidController,
}

impl ProfileRunner {
    pub fn new(
        control: ControlConfig,
        sensor: Arc<dyn SensorSource>,
        actuators: ActuatorPair,
        state: Arc<RwLock<RunState>>,
        abort_rx: broadcast::Receiver<()>,
    ) -> Self {
        let pid = PidController::from_config(&control);
        Self {
            control,
            sensor,
            actuators,
            state,
            abort_rx,
            pid,
        }
    }

    /// Runs the profiles, then disables both actuators and publishes the
    /// terminal status. Errors and panics inside the run end as `Failed`;
    /// the cleanup runs on every path.
    pub async fn execute(mut self, profiles: Vec<Profile>) {
        let outcome = AssertUnwindSafe(self.run(&profiles)).catch_unwind().await;

        self.actuators.disable_all().await;

        let mut state = self.state.write().await;
        match outcome {
            Ok(Ok(RunOutcome::Completed)) => {
                tracing::info!("All profiles processed");
                state.finish(RunStatus::Completed, None);
            }
            Ok(Ok(RunOutcome::Aborted)) => {
                tracing::info!("Run aborted");
                state.finish(RunStatus::Idle, None);
            }
            Ok(Err(e)) => {
                tracing::error!("Run failed: {}", e);
                state.finish(RunStatus::Failed, Some(e.to_string()));
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!("Run worker panicked: {}", message);
                state.finish(RunStatus::Failed, Some(format!("internal error: {}", message)));
            }
        }
    }

    pub async fn run(&mut self, profiles: &[Profile]) -> Result<RunOutcome, EngineError> {
        let (temperature, light) = tokio::join!(
            self.actuators.temperature.device.enable(),
            self.actuators.light.device.enable()
        );
        temperature?;
        light?;
        tracing::info!("Power supplies enabled");

        for (index, profile) in profiles.iter().enumerate() {
            if self.run_profile(index, profile).await? == Flow::Aborted {
                return Ok(RunOutcome::Aborted);
            }
        }
        Ok(RunOutcome::Completed)
    }

    async fn run_profile(&mut self, index: usize, profile: &Profile) -> Result<Flow, EngineError> {
        tracing::info!(
            "Profile {}: target {:.1}°C, dwell {} s, light {:.0}%",
            index,
            profile.target_temperature,
            profile.dwell_seconds,
            profile.light_intensity_percent
        );
        {
            let mut state = self.state.write().await;
            state.active_target_temperature = Some(profile.target_temperature);
            state.profile_index = Some(index);
            state.seconds_at_target = 0.0;
        }

        let cycle = self.control.cycle();
        let dwell = Duration::from_secs(profile.dwell_seconds);
        let light_ma = light_current_ma(profile.light_intensity_percent, self.control.max_current_ma);
        // Cumulative: cycles outside tolerance pause the count, they never reset it.
        let mut time_at_target = Duration::ZERO;

        while time_at_target < dwell {
            let cycle_start = Instant::now();

            let polled = tokio::select! {
                biased;
                _ = self.abort_rx.recv() => return Ok(Flow::Aborted),
                polled = self.sensor.fetch_temperature() => polled,
            };
            let reading = match polled {
                Ok(reading) => reading,
                Err(e) => {
                    tracing::warn!("Error fetching temperature: {}", e);
                    self.state.write().await.sensor_failures += 1;
                    if self.pause_until(Instant::now() + self.control.backoff()).await {
                        return Ok(Flow::Aborted);
                    }
                    continue;
                }
            };

            let temperature_ma = self.pid.compute(profile.target_temperature, reading.temperature);
            tracing::debug!(
                "Measured {:.2}°C, target {:.2}°C -> heater {} mA, light {} mA",
                reading.temperature,
                profile.target_temperature,
                temperature_ma,
                light_ma
            );
            let faults = self.apply_outputs(temperature_ma, light_ma).await;

            if (reading.temperature - profile.target_temperature).abs() <= self.control.tolerance {
                time_at_target += cycle;
            }

            {
                let mut state = self.state.write().await;
                state.last_temperature = Some(reading.temperature);
                state.seconds_at_target = time_at_target.as_secs_f64();
                state.actuator_faults += faults;
            }

            if self.pause_until(cycle_start + cycle).await {
                return Ok(Flow::Aborted);
            }
        }

        tracing::info!(
            "Profile {} complete: {:.1}°C for {} s",
            index,
            profile.target_temperature,
            profile.dwell_seconds
        );
        Ok(Flow::Continue)
    }

    /// Writes both outputs concurrently and returns how many writes failed.
    async fn apply_outputs(&self, temperature_ma: u32, light_ma: u32) -> u64 {
        let temperature = &self.actuators.temperature;
        let light = &self.actuators.light;
        let (temperature_result, light_result) = tokio::join!(
            temperature.device.set_output_current(temperature.channel, temperature_ma),
            light.device.set_output_current(light.channel, light_ma)
        );

        let mut faults = 0;
        if let Err(e) = temperature_result {
            tracing::warn!("Error with temperature supply: {}", e);
            faults += 1;
        }
        if let Err(e) = light_result {
            tracing::warn!("Error with light supply: {}", e);
            faults += 1;
        }
        faults
    }

    /// Sleeps until `deadline`; returns true if the run was aborted meanwhile.
    async fn pause_until(&mut self, deadline: Instant) -> bool {
        tokio::select! {
            biased;
            _ = self.abort_rx.recv() => true,
            _ = sleep_until(deadline) => false,
        }
    }
}
