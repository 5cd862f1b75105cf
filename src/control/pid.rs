// src/control/pid.rs
use crate::config::ControlConfig;

/// PID gains. Terms are per control cycle, not per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 2.0,
            ki: 0.1,
            kd: 0.11,
        }
    }
}

/// Error history carried between cycles of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidState {
    pub previous_error: f64,
    pub integral: f64,
}

/// Discrete PID mapping a temperature error to a supply current in milliamps.
///
/// The integral and derivative are not scaled by elapsed time; the gains
/// assume the fixed [`CONTROL_CYCLE`](crate::config::CONTROL_CYCLE) cadence.
#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    max_output_ma: u32,
    state: PidState,
}

impl PidController {
    pub fn new(gains: PidGains, max_output_ma: u32) -> Self {
        Self {
            gains,
            max_output_ma,
            state: PidState::default(),
        }
    }

    pub fn from_config(config: &ControlConfig) -> Self {
        Self::new(
            PidGains {
                kp: config.kp,
                ki: config.ki,
                kd: config.kd,
            },
            config.max_current_ma,
        )
    }

    /// Runs one control step and returns the clamped output current.
    pub fn compute(&mut self, setpoint: f64, measured: f64) -> u32 {
        let (output, next) = compute(&self.gains, self.max_output_ma, setpoint, measured, self.state);
        self.state = next;
        output
    }

    pub fn state(&self) -> PidState {
        self.state
    }
}

/// Pure form of one PID step: `(output_ma, next_state)`.
///
/// The raw output is truncated towards zero and clamped to `[0, max_output_ma]`.
pub fn compute(gains: &PidGains, max_output_ma: u32, setpoint: f64, measured: f64, state: PidState) -> (u32, PidState) {
    let error = setpoint - measured;
    let integral = state.integral + error;
    let derivative = error - state.previous_error;

    let raw = gains.kp * error + gains.ki * integral + gains.kd * derivative;
    // NaN casts to 0
    let output = raw.trunc().clamp(0.0, max_output_ma as f64) as u32;

    (
        output,
        PidState {
            previous_error: error,
            integral,
        },
    )
}
