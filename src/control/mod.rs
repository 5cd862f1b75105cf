//! Output computations for the two actuators: closed-loop PID for the
//! temperature supply and an open-loop linear map for the light supply.

pub mod pid;

pub use pid::{PidController, PidGains, PidState};

/// Light supply current for an intensity percentage, clamped to `[0, max_current_ma]`.
pub fn light_current_ma(intensity_percent: f64, max_current_ma: u32) -> u32 {
    let raw = intensity_percent / 100.0 * max_current_ma as f64;
    // NaN casts to 0
    raw.clamp(0.0, max_current_ma as f64) as u32
}
