//! # Host Configuration
//!
//! Every section and field has a default, so an empty file (or no file at all)
//! yields a usable configuration pointing at local hardware.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:5001"
//!
//! [sensor]
//! endpoint = "http://192.168.19.116:5000/temperature"
//! timeout_ms = 5000
//!
//! [control]
//! kp = 2.0
//! ki = 0.1
//! kd = 0.11
//!
//! [actuators.temperature]
//! serial = "/dev/ttyACM0"
//!
//! [actuators.light]
//! serial = "/dev/ttyACM1"
//! ```

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Nominal control cadence. The PID terms are not scaled by elapsed time, so
/// the gains are only meaningful at this cadence.
pub const CONTROL_CYCLE: Duration = Duration::from_secs(1);

/// Wait before retrying after a failed sensor poll.
pub const SENSOR_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound on a single sensor request.
pub const SENSOR_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the server, sensor source, control loop and actuators.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub actuators: ActuatorsConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.control.validate()?;
        if self.sensor.timeout_ms == 0 {
            return Err(ConfigError::Invalid("sensor.timeout_ms must be positive".to_string()));
        }
        if self.sensor.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("sensor.endpoint must not be empty".to_string()));
        }
        for (name, actuator) in [("temperature", &self.actuators.temperature), ("light", &self.actuators.light)] {
            if actuator.response_timeout_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "actuators.{}.response_timeout_ms must be positive",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// HTTP control surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_true")]
    pub cors_allow_any: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_allow_any: true,
        }
    }
}

/// Remote temperature sensor source.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SensorConfig {
    #[serde(default = "default_sensor_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_sensor_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_temperature_key")]
    pub temperature_key: String,
    #[serde(default = "default_auxiliary_key")]
    pub auxiliary_key: String,
}

impl SensorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_sensor_endpoint(),
            timeout_ms: default_sensor_timeout_ms(),
            temperature_key: default_temperature_key(),
            auxiliary_key: default_auxiliary_key(),
        }
    }
}

/// Control law gains and loop timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlConfig {
    #[serde(default = "default_kp")]
    pub kp: f64,
    #[serde(default = "default_ki")]
    pub ki: f64,
    #[serde(default = "default_kd")]
    pub kd: f64,
    /// Output ceiling shared by both actuators, in milliamps.
    #[serde(default = "default_max_current_ma")]
    pub max_current_ma: u32,
    /// Allowed |measured - target| for a cycle to count towards dwell.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_cycle_ms")]
    pub cycle_ms: u64,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl ControlConfig {
    pub fn cycle(&self) -> Duration {
        Duration::from_millis(self.cycle_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_ms == 0 {
            return Err(ConfigError::Invalid("control.cycle_ms must be positive".to_string()));
        }
        if self.backoff_ms == 0 {
            return Err(ConfigError::Invalid("control.backoff_ms must be positive".to_string()));
        }
        if self.max_current_ma == 0 {
            return Err(ConfigError::Invalid("control.max_current_ma must be positive".to_string()));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(ConfigError::Invalid("control.tolerance must be a non-negative number".to_string()));
        }
        for (name, gain) in [("kp", self.kp), ("ki", self.ki), ("kd", self.kd)] {
            if !(gain.is_finite() && gain >= 0.0) {
                return Err(ConfigError::Invalid(format!("control.{} must be a non-negative number", name)));
            }
        }
        Ok(())
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            kp: default_kp(),
            ki: default_ki(),
            kd: default_kd(),
            max_current_ma: default_max_current_ma(),
            tolerance: default_tolerance(),
            cycle_ms: default_cycle_ms(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ActuatorsConfig {
    #[serde(default)]
    pub temperature: PowerSupplyConfig,
    #[serde(default)]
    pub light: PowerSupplyConfig,
}

/// One serial bench power supply.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PowerSupplyConfig {
    #[serde(default)]
    pub serial: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_channel")]
    pub channel: u8,
    #[serde(default = "default_command_delay_ms")]
    pub command_delay_ms: u64,
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl Default for PowerSupplyConfig {
    fn default() -> Self {
        Self {
            serial: "".to_string(),
            baud: default_baud(),
            channel: default_channel(),
            command_delay_ms: default_command_delay_ms(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

/// Thermal model used by `--simulate`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(default = "default_ambient")]
    pub ambient: f64,
    /// Heating rate per milliamp of supply current, °C/s.
    #[serde(default = "default_heat_per_ma")]
    pub heat_per_ma: f64,
    /// Fraction of the difference to ambient lost per second.
    #[serde(default = "default_loss_rate")]
    pub loss_rate: f64,
    /// Peak-to-peak sensor noise, °C.
    #[serde(default)]
    pub noise: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ambient: default_ambient(),
            heat_per_ma: default_heat_per_ma(),
            loss_rate: default_loss_rate(),
            noise: 0.0,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5001".to_string()
}
fn default_true() -> bool {
    true
}
fn default_sensor_endpoint() -> String {
    "http://127.0.0.1:5000/temperature".to_string()
}
fn default_sensor_timeout_ms() -> u64 {
    SENSOR_TIMEOUT.as_millis() as u64
}
fn default_temperature_key() -> String {
    "sensor1".to_string()
}
fn default_auxiliary_key() -> String {
    "sensor2".to_string()
}
fn default_kp() -> f64 {
    2.0
}
fn default_ki() -> f64 {
    0.1
}
fn default_kd() -> f64 {
    0.11
}
fn default_max_current_ma() -> u32 {
    2000
}
fn default_tolerance() -> f64 {
    0.5
}
fn default_cycle_ms() -> u64 {
    CONTROL_CYCLE.as_millis() as u64
}
fn default_backoff_ms() -> u64 {
    SENSOR_BACKOFF.as_millis() as u64
}
fn default_baud() -> u32 {
    9600
}
fn default_channel() -> u8 {
    1
}
fn default_command_delay_ms() -> u64 {
    50
}
fn default_response_timeout_ms() -> u64 {
    300
}
fn default_ambient() -> f64 {
    22.0
}
fn default_heat_per_ma() -> f64 {
    0.003
}
fn default_loss_rate() -> f64 {
    0.02
}

/// Loads the configuration from a TOML file.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(config) => {
                config.validate()?;
                Ok(config)
            }
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}
