//! Photherm host: runs multi-stage temperature/light conditioning profiles on
//! two serial bench power supplies, with closed-loop feedback from a remote
//! temperature sensor.

pub mod config;
pub mod control;
pub mod engine;
pub mod hardware;
pub mod sensor;
pub mod sim;
pub mod web;

pub use config::Config;
pub use engine::{Engine, EngineError, Profile, RunState, RunStatus};
