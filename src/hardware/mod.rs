// src/hardware/mod.rs - Actuator capability interface and connectors
pub mod serial;
pub mod tenma;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use serial::{SerialLink, SerialTransport};
pub use tenma::{TenmaConnector, TenmaPowerSupply};

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("command '{0}' timed out")]
    Timeout(String),
    #[error("invalid response to '{command}': {response:?}")]
    InvalidResponse { command: String, response: String },
    #[error("requested {requested} mA exceeds the {max} mA limit")]
    OutOfRange { requested: u32, max: u32 },
    #[error("device discovery failed on '{port}': {reason}")]
    Discovery { port: String, reason: String },
    #[error("{0}")]
    Other(String),
}

/// A current-controlled output device.
///
/// Every operation may fail independently; callers decide whether a fault is
/// fatal. `enable`/`disable` must be idempotent.
#[async_trait]
pub trait Actuator: Send + Sync + 'static {
    async fn enable(&self) -> Result<(), ActuatorError>;
    async fn disable(&self) -> Result<(), ActuatorError>;
    async fn set_output_current(&self, channel: u8, milliamps: u32) -> Result<(), ActuatorError>;
    async fn read_output_current(&self, channel: u8) -> Result<f64, ActuatorError>;
    async fn read_output_voltage(&self, channel: u8) -> Result<f64, ActuatorError>;
}

/// A connected actuator together with the output channel it drives.
#[derive(Clone)]
pub struct ChannelActuator {
    pub device: Arc<dyn Actuator>,
    pub channel: u8,
}

impl ChannelActuator {
    pub fn new(device: Arc<dyn Actuator>, channel: u8) -> Self {
        Self { device, channel }
    }
}

impl std::fmt::Debug for ChannelActuator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelActuator").field("channel", &self.channel).finish()
    }
}

/// The two independent outputs driven by a run.
#[derive(Debug, Clone)]
pub struct ActuatorPair {
    pub temperature: ChannelActuator,
    pub light: ChannelActuator,
}

impl ActuatorPair {
    /// Disables both outputs concurrently; a fault on one does not skip the other.
    pub async fn disable_all(&self) {
        let (temperature, light) = tokio::join!(self.temperature.device.disable(), self.light.device.disable());
        if let Err(e) = temperature {
            tracing::error!("Failed to disable temperature supply: {}", e);
        }
        if let Err(e) = light {
            tracing::error!("Failed to disable light supply: {}", e);
        }
    }
}

/// Discovers and opens both actuators.
#[async_trait]
pub trait ActuatorConnector: Send + Sync + 'static {
    async fn connect(&self) -> Result<ActuatorPair, ActuatorError>;
}
