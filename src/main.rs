// src/main.rs - Host entry point
use clap::Parser;
use std::sync::Arc;

use photherm_rs::config::{self, Config};
use photherm_rs::engine::Engine;
use photherm_rs::hardware::{ActuatorConnector, TenmaConnector};
use photherm_rs::sensor::{HttpSensorSource, SensorSource};
use photherm_rs::sim::SimulatedBench;
use photherm_rs::web;

#[derive(Debug, Parser)]
#[command(name = "photherm-host", version, about = "Temperature/light profile runner for serial bench supplies")]
struct Cli {
    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Override the listen address from the configuration
    #[arg(short, long)]
    bind: Option<String>,

    /// Run against the in-process thermal simulator instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    tracing::info!("Starting Photherm host");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            config::load_config(path).map_err(|e| {
                tracing::error!("Failed to load config from '{}': {}", path, e);
                tracing::error!("Please ensure the configuration file exists and is properly formatted");
                Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
            })?
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            Config::default()
        }
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    tracing::info!(
        "Control: Kp={} Ki={} Kd={}, cycle {} ms, limit {} mA",
        config.control.kp,
        config.control.ki,
        config.control.kd,
        config.control.cycle_ms,
        config.control.max_current_ma
    );

    let (sensor, connector) = if cli.simulate {
        tracing::info!("Simulation mode: no hardware will be touched");
        let bench = Arc::new(SimulatedBench::new(config.simulation.clone()));
        let sensor: Arc<dyn SensorSource> = bench.clone();
        let connector: Arc<dyn ActuatorConnector> = bench;
        (sensor, connector)
    } else {
        let http_sensor = HttpSensorSource::new(&config.sensor)?;
        tracing::info!("Sensor endpoint: {}", http_sensor.endpoint());
        let sensor: Arc<dyn SensorSource> = Arc::new(http_sensor);
        let connector: Arc<dyn ActuatorConnector> =
            Arc::new(TenmaConnector::new(config.actuators.clone(), config.control.max_current_ma));
        (sensor, connector)
    };

    let engine = Engine::new(config.control.clone(), sensor, connector);
    if cli.simulate {
        engine.connect().await?;
    }

    // Set up a channel for communication between Axum handlers and the engine task.
    let engine_tx = web::engine_channel::spawn_engine_task(engine.clone(), 16);

    let app = if config.server.cors_allow_any {
        web::api::create_router_with_cors(engine_tx)
    } else {
        web::api::create_router(engine_tx)
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("Shutting down...");
    engine.shutdown().await;
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
