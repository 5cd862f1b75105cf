// Shared test doubles for engine and web integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use photherm_rs::config::ControlConfig;
use photherm_rs::engine::Engine;
use photherm_rs::hardware::{Actuator, ActuatorConnector, ActuatorError, ActuatorPair, ChannelActuator};
use photherm_rs::sensor::{Reading, SensorError, SensorSource};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorEvent {
    Enable,
    Disable,
    SetCurrent(u8, u32),
}

/// Records every command; individual operations can be made to fail.
#[derive(Default)]
pub struct RecordingActuator {
    events: Mutex<Vec<ActuatorEvent>>,
    pub fail_enable: AtomicBool,
    pub fail_set_current: AtomicBool,
    pub readback_current_ma: Mutex<f64>,
    pub readback_voltage: Mutex<f64>,
}

impl RecordingActuator {
    pub fn events(&self) -> Vec<ActuatorEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &ActuatorEvent) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn currents(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ActuatorEvent::SetCurrent(_, ma) => Some(ma),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: ActuatorEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Actuator for RecordingActuator {
    async fn enable(&self) -> Result<(), ActuatorError> {
        self.record(ActuatorEvent::Enable);
        if self.fail_enable.load(Ordering::SeqCst) {
            return Err(ActuatorError::Other("enable refused".to_string()));
        }
        Ok(())
    }

    async fn disable(&self) -> Result<(), ActuatorError> {
        self.record(ActuatorEvent::Disable);
        Ok(())
    }

    async fn set_output_current(&self, channel: u8, milliamps: u32) -> Result<(), ActuatorError> {
        self.record(ActuatorEvent::SetCurrent(channel, milliamps));
        if self.fail_set_current.load(Ordering::SeqCst) {
            return Err(ActuatorError::Timeout(format!("ISET{}", channel)));
        }
        Ok(())
    }

    async fn read_output_current(&self, _channel: u8) -> Result<f64, ActuatorError> {
        Ok(*self.readback_current_ma.lock().unwrap())
    }

    async fn read_output_voltage(&self, _channel: u8) -> Result<f64, ActuatorError> {
        Ok(*self.readback_voltage.lock().unwrap())
    }
}

/// Hands out a fresh pair of recording actuators on every connect and
/// remembers the latest one.
pub struct MockConnector {
    temperature: Mutex<Arc<RecordingActuator>>,
    light: Mutex<Arc<RecordingActuator>>,
    pub fail: AtomicBool,
    pub delay: Mutex<Duration>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            temperature: Mutex::new(Arc::new(RecordingActuator::default())),
            light: Mutex::new(Arc::new(RecordingActuator::default())),
            fail: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn temperature(&self) -> Arc<RecordingActuator> {
        self.temperature.lock().unwrap().clone()
    }

    pub fn light(&self) -> Arc<RecordingActuator> {
        self.light.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActuatorConnector for MockConnector {
    async fn connect(&self) -> Result<ActuatorPair, ActuatorError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ActuatorError::Discovery {
                port: "/dev/null".to_string(),
                reason: "no device".to_string(),
            });
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let temperature = Arc::new(RecordingActuator::default());
        let light = Arc::new(RecordingActuator::default());
        *self.temperature.lock().unwrap() = temperature.clone();
        *self.light.lock().unwrap() = light.clone();
        Ok(ActuatorPair {
            temperature: ChannelActuator::new(temperature, 1),
            light: ChannelActuator::new(light, 1),
        })
    }
}

/// Plays back a script of readings, then repeats `fallback` forever.
pub struct ScriptedSensor {
    script: Mutex<VecDeque<Option<f64>>>,
    fallback: Mutex<Option<f64>>,
    polls: Mutex<usize>,
}

impl ScriptedSensor {
    /// `None` entries fail with `SensorError::Status(503)`.
    pub fn new(script: Vec<Option<f64>>, fallback: Option<f64>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Mutex::new(fallback),
            polls: Mutex::new(0),
        }
    }

    pub fn constant(temperature: f64) -> Self {
        Self::new(Vec::new(), Some(temperature))
    }

    pub fn polls(&self) -> usize {
        *self.polls.lock().unwrap()
    }

    pub fn set_fallback(&self, value: Option<f64>) {
        *self.fallback.lock().unwrap() = value;
    }
}

#[async_trait]
impl SensorSource for ScriptedSensor {
    async fn fetch_temperature(&self) -> Result<Reading, SensorError> {
        *self.polls.lock().unwrap() += 1;
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(*self.fallback.lock().unwrap());
        match next {
            Some(temperature) => Ok(Reading {
                temperature,
                auxiliary: json!({ "humidity": 40.0 }),
            }),
            None => Err(SensorError::Status(503)),
        }
    }
}

/// Reads a steady temperature but panics on one chosen poll.
pub struct PanickingSensor {
    temperature: f64,
    panic_on_poll: usize,
    polls: AtomicUsize,
}

impl PanickingSensor {
    pub fn new(temperature: f64, panic_on_poll: usize) -> Self {
        Self {
            temperature,
            panic_on_poll,
            polls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SensorSource for PanickingSensor {
    async fn fetch_temperature(&self) -> Result<Reading, SensorError> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if poll == self.panic_on_poll {
            panic!("sensor driver crashed");
        }
        Ok(Reading {
            temperature: self.temperature,
            auxiliary: json!({}),
        })
    }
}

pub struct Harness {
    pub engine: Engine,
    pub sensor: Arc<ScriptedSensor>,
    pub connector: Arc<MockConnector>,
}

impl Harness {
    pub fn temperature(&self) -> Arc<RecordingActuator> {
        self.connector.temperature()
    }

    pub fn light(&self) -> Arc<RecordingActuator> {
        self.connector.light()
    }
}

pub fn harness(sensor: ScriptedSensor) -> Harness {
    let sensor = Arc::new(sensor);
    let connector = Arc::new(MockConnector::new());
    let engine = Engine::new(ControlConfig::default(), sensor.clone(), connector.clone());
    Harness {
        engine,
        sensor,
        connector,
    }
}

pub async fn connected_harness(sensor: ScriptedSensor) -> Harness {
    let harness = harness(sensor);
    harness.engine.connect().await.unwrap();
    harness
}
