// src/hardware/serial.rs - Command/response serial link
use async_trait::async_trait;
use serial2_tokio::SerialPort;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};

use super::ActuatorError;
use crate::config::PowerSupplyConfig;

/// Line-less command/response transport. Devices on it answer with a bare
/// string and no terminator, so a response ends when the line goes quiet.
#[async_trait]
pub trait SerialTransport: Send + Sync + 'static {
    /// Sends a command that produces no reply.
    async fn send(&self, command: &str) -> Result<(), ActuatorError>;
    /// Sends a command and collects the reply.
    async fn query(&self, command: &str) -> Result<String, ActuatorError>;
}

/// Serial connection statistics
#[derive(Debug, Clone, Default)]
pub struct SerialStats {
    pub commands_sent: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub timeouts: u64,
}

struct LinkInner {
    port: SerialPort,
    last_command: Option<Instant>,
    stats: SerialStats,
}

/// A serial port with one outstanding command at a time.
pub struct SerialLink {
    port_name: String,
    inner: Mutex<LinkInner>,
    command_delay: Duration,
    response_timeout: Duration,
    quiet_gap: Duration,
}

impl SerialLink {
    pub fn open(config: &PowerSupplyConfig) -> Result<Self, ActuatorError> {
        if config.serial.is_empty() {
            return Err(ActuatorError::Discovery {
                port: config.serial.clone(),
                reason: "no serial port configured".to_string(),
            });
        }
        tracing::info!("Opening {} at {} baud", config.serial, config.baud);
        let port = SerialPort::open(&config.serial, config.baud).map_err(|e| ActuatorError::Discovery {
            port: config.serial.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            port_name: config.serial.clone(),
            inner: Mutex::new(LinkInner {
                port,
                last_command: None,
                stats: SerialStats::default(),
            }),
            command_delay: Duration::from_millis(config.command_delay_ms),
            response_timeout: Duration::from_millis(config.response_timeout_ms),
            quiet_gap: Duration::from_millis(50),
        })
    }

    async fn write_command(&self, inner: &mut LinkInner, command: &str) -> Result<(), ActuatorError> {
        // The supplies drop commands that arrive back-to-back.
        if let Some(last) = inner.last_command {
            let ready_at = last + self.command_delay;
            if Instant::now() < ready_at {
                sleep(ready_at - Instant::now()).await;
            }
        }

        tracing::debug!("Serial TX [{}]: {}", self.port_name, command);
        let bytes = command.as_bytes();
        let mut written = 0;
        while written < bytes.len() {
            match timeout(self.response_timeout, inner.port.write(&bytes[written..])).await {
                Ok(Ok(0)) => {
                    return Err(ActuatorError::Io(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "serial port accepted no bytes",
                    )));
                }
                Ok(Ok(n)) => written += n,
                Ok(Err(e)) => return Err(ActuatorError::Io(e)),
                Err(_) => {
                    inner.stats.timeouts += 1;
                    return Err(ActuatorError::Timeout(command.to_string()));
                }
            }
        }
        inner.last_command = Some(Instant::now());
        inner.stats.commands_sent += 1;
        inner.stats.bytes_sent += bytes.len() as u64;
        Ok(())
    }
}

#[async_trait]
impl SerialTransport for SerialLink {
    async fn send(&self, command: &str) -> Result<(), ActuatorError> {
        let mut inner = self.inner.lock().await;
        self.write_command(&mut inner, command).await
    }

    async fn query(&self, command: &str) -> Result<String, ActuatorError> {
        let mut inner = self.inner.lock().await;
        self.write_command(&mut inner, command).await?;

        let mut response = Vec::new();
        let mut buf = [0u8; 64];
        // First byte may take up to the full response timeout, then read until quiet.
        let mut wait = self.response_timeout;
        loop {
            match timeout(wait, inner.port.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    response.extend_from_slice(&buf[..n]);
                    wait = self.quiet_gap;
                }
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Ok(Err(e)) => return Err(ActuatorError::Io(e)),
                Err(_) => break,
            }
        }
        inner.last_command = Some(Instant::now());

        if response.is_empty() {
            inner.stats.timeouts += 1;
            return Err(ActuatorError::Timeout(command.to_string()));
        }
        inner.stats.bytes_received += response.len() as u64;
        let text = String::from_utf8_lossy(&response).trim().to_string();
        tracing::debug!("Serial RX [{}]: {}", self.port_name, text);
        Ok(text)
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        let stats = &self.inner.get_mut().stats;
        tracing::info!(
            "Closing {}: {} commands, {} bytes out, {} bytes in, {} timeouts",
            self.port_name,
            stats.commands_sent,
            stats.bytes_sent,
            stats.bytes_received,
            stats.timeouts
        );
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("port_name", &self.port_name)
            .field("command_delay", &self.command_delay)
            .field("response_timeout", &self.response_timeout)
            .finish()
    }
}
