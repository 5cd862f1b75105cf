//! In-process bench simulator.
//!
//! A lumped thermal mass heated by the temperature supply's output current and
//! cooling towards ambient, plus a light supply that only records its setpoint.
//! The simulated sensor steps the model by the wall-clock time since its last
//! poll, so the engine runs unchanged against it.

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::SimulationConfig;
use crate::hardware::{Actuator, ActuatorConnector, ActuatorError, ActuatorPair, ChannelActuator};
use crate::sensor::{Reading, SensorError, SensorSource};

#[derive(Debug, Clone)]
pub struct PlantState {
    pub temperature: f64,
    pub heater_current_ma: f64,
    pub heater_on: bool,
    pub light_current_ma: f64,
    pub light_on: bool,
    last_update: Option<Instant>,
}

impl PlantState {
    pub fn new(ambient: f64) -> Self {
        Self {
            temperature: ambient,
            heater_current_ma: 0.0,
            heater_on: false,
            light_current_ma: 0.0,
            light_on: false,
            last_update: None,
        }
    }

    /// Advances the thermal model by `dt` seconds.
    ///
    /// Closed-form solution of `dT/dt = gain - k (T - ambient)`; exact for
    /// any `dt`, so long gaps between polls settle at equilibrium.
    pub fn update(&mut self, dt: f64, config: &SimulationConfig) {
        if dt <= 0.0 {
            return;
        }
        let gain = if self.heater_on {
            self.heater_current_ma * config.heat_per_ma
        } else {
            0.0
        };
        let k = config.loss_rate;
        if k <= 0.0 {
            self.temperature += gain * dt;
            return;
        }
        let decay = (-k * dt).exp();
        let equilibrium = config.ambient + gain / k;
        self.temperature = equilibrium + (self.temperature - equilibrium) * decay;
    }

    fn supply_voltage(current_ma: f64, on: bool) -> f64 {
        // 6 ohm load
        if on { current_ma / 1000.0 * 6.0 } else { 0.0 }
    }
}

/// Shared simulated bench: one thermal plant, two supplies, one sensor.
#[derive(Debug, Clone)]
pub struct SimulatedBench {
    config: SimulationConfig,
    plant: Arc<Mutex<PlantState>>,
}

impl SimulatedBench {
    pub fn new(config: SimulationConfig) -> Self {
        let plant = Arc::new(Mutex::new(PlantState::new(config.ambient)));
        Self { config, plant }
    }

    pub fn snapshot(&self) -> PlantState {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PlantState> {
        // The plant holds plain numbers; a poisoned lock still has usable state.
        self.plant.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn step(&self) -> PlantState {
        let mut plant = self.lock();
        let now = Instant::now();
        if let Some(last) = plant.last_update {
            let dt = (now - last).as_secs_f64();
            plant.update(dt, &self.config);
        }
        plant.last_update = Some(now);
        plant.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupplyRole {
    Heater,
    Light,
}

/// A simulated supply bound to one role on the bench.
#[derive(Debug, Clone)]
pub struct SimulatedSupply {
    bench: SimulatedBench,
    role: SupplyRole,
}

#[async_trait]
impl Actuator for SimulatedSupply {
    async fn enable(&self) -> Result<(), ActuatorError> {
        self.bench.step();
        let mut plant = self.bench.lock();
        match self.role {
            SupplyRole::Heater => plant.heater_on = true,
            SupplyRole::Light => plant.light_on = true,
        }
        Ok(())
    }

    async fn disable(&self) -> Result<(), ActuatorError> {
        self.bench.step();
        let mut plant = self.bench.lock();
        match self.role {
            SupplyRole::Heater => plant.heater_on = false,
            SupplyRole::Light => plant.light_on = false,
        }
        Ok(())
    }

    async fn set_output_current(&self, _channel: u8, milliamps: u32) -> Result<(), ActuatorError> {
        self.bench.step();
        let mut plant = self.bench.lock();
        match self.role {
            SupplyRole::Heater => plant.heater_current_ma = milliamps as f64,
            SupplyRole::Light => plant.light_current_ma = milliamps as f64,
        }
        Ok(())
    }

    async fn read_output_current(&self, _channel: u8) -> Result<f64, ActuatorError> {
        let plant = self.bench.lock();
        Ok(match self.role {
            SupplyRole::Heater if plant.heater_on => plant.heater_current_ma,
            SupplyRole::Light if plant.light_on => plant.light_current_ma,
            _ => 0.0,
        })
    }

    async fn read_output_voltage(&self, _channel: u8) -> Result<f64, ActuatorError> {
        let plant = self.bench.lock();
        Ok(match self.role {
            SupplyRole::Heater => PlantState::supply_voltage(plant.heater_current_ma, plant.heater_on),
            SupplyRole::Light => PlantState::supply_voltage(plant.light_current_ma, plant.light_on),
        })
    }
}

#[async_trait]
impl ActuatorConnector for SimulatedBench {
    async fn connect(&self) -> Result<ActuatorPair, ActuatorError> {
        tracing::info!("Connecting to simulated power supplies");
        let heater = SimulatedSupply {
            bench: self.clone(),
            role: SupplyRole::Heater,
        };
        let light = SimulatedSupply {
            bench: self.clone(),
            role: SupplyRole::Light,
        };
        Ok(ActuatorPair {
            temperature: ChannelActuator::new(Arc::new(heater), 1),
            light: ChannelActuator::new(Arc::new(light), 1),
        })
    }
}

#[async_trait]
impl SensorSource for SimulatedBench {
    async fn fetch_temperature(&self) -> Result<Reading, SensorError> {
        let plant = self.step();
        let noise = if self.config.noise > 0.0 {
            self.config.noise * (rand::random::<f64>() - 0.5)
        } else {
            0.0
        };
        Ok(Reading {
            temperature: plant.temperature + noise,
            auxiliary: json!({
                "light_current_ma": plant.light_current_ma,
                "light_on": plant.light_on,
            }),
        })
    }
}
