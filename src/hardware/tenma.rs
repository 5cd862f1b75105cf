//! TENMA 72-series programmable bench supply driver.
//!
//! The supplies speak a terse ASCII protocol with no line terminators:
//!
//! | command          | meaning                          | reply     |
//! |------------------|----------------------------------|-----------|
//! | `*IDN?`          | identify                         | `TENMA 72-2540 V2.1` |
//! | `ISET1:1.250`    | set channel 1 current limit (A)  | none      |
//! | `IOUT1?`         | measured output current (A)      | `1.249`   |
//! | `VOUT1?`         | measured output voltage (V)      | `12.03`   |
//! | `OUT1` / `OUT0`  | output on / off                  | none      |

use async_trait::async_trait;
use std::sync::Arc;

use super::serial::{SerialLink, SerialTransport};
use super::{Actuator, ActuatorConnector, ActuatorError, ActuatorPair, ChannelActuator};
use crate::config::{ActuatorsConfig, PowerSupplyConfig};

pub fn identify_command() -> &'static str {
    "*IDN?"
}

pub fn output_command(enabled: bool) -> &'static str {
    if enabled { "OUT1" } else { "OUT0" }
}

/// `ISET<ch>:<amps>` with milliamp resolution.
pub fn set_current_command(channel: u8, milliamps: u32) -> String {
    format!("ISET{}:{}.{:03}", channel, milliamps / 1000, milliamps % 1000)
}

pub fn read_current_command(channel: u8) -> String {
    format!("IOUT{}?", channel)
}

pub fn read_voltage_command(channel: u8) -> String {
    format!("VOUT{}?", channel)
}

/// Parses a numeric reply, tolerating trailing padding or unit letters.
pub fn parse_numeric(command: &str, response: &str) -> Result<f64, ActuatorError> {
    let numeric: String = response
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    numeric.parse::<f64>().map_err(|_| ActuatorError::InvalidResponse {
        command: command.to_string(),
        response: response.to_string(),
    })
}

/// One supply behind a command/response transport.
pub struct TenmaPowerSupply<T: SerialTransport = SerialLink> {
    transport: T,
    identity: String,
    max_current_ma: u32,
}

impl<T: SerialTransport> TenmaPowerSupply<T> {
    /// Identifies the device on `transport`; an empty identity means nothing answered.
    pub async fn discover(transport: T, port: &str, max_current_ma: u32) -> Result<Self, ActuatorError> {
        let identity = transport.query(identify_command()).await.map_err(|e| ActuatorError::Discovery {
            port: port.to_string(),
            reason: e.to_string(),
        })?;
        if identity.trim().is_empty() {
            return Err(ActuatorError::Discovery {
                port: port.to_string(),
                reason: "device returned an empty identity".to_string(),
            });
        }
        tracing::info!("Found power supply on {}: {}", port, identity);
        Ok(Self {
            transport,
            identity,
            max_current_ma,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

#[async_trait]
impl<T: SerialTransport> Actuator for TenmaPowerSupply<T> {
    async fn enable(&self) -> Result<(), ActuatorError> {
        self.transport.send(output_command(true)).await
    }

    async fn disable(&self) -> Result<(), ActuatorError> {
        self.transport.send(output_command(false)).await
    }

    async fn set_output_current(&self, channel: u8, milliamps: u32) -> Result<(), ActuatorError> {
        if milliamps > self.max_current_ma {
            return Err(ActuatorError::OutOfRange {
                requested: milliamps,
                max: self.max_current_ma,
            });
        }
        self.transport.send(&set_current_command(channel, milliamps)).await
    }

    async fn read_output_current(&self, channel: u8) -> Result<f64, ActuatorError> {
        let command = read_current_command(channel);
        let response = self.transport.query(&command).await?;
        Ok(parse_numeric(&command, &response)? * 1000.0)
    }

    async fn read_output_voltage(&self, channel: u8) -> Result<f64, ActuatorError> {
        let command = read_voltage_command(channel);
        let response = self.transport.query(&command).await?;
        parse_numeric(&command, &response)
    }
}

/// Opens the temperature and light supplies from their configured ports.
#[derive(Debug, Clone)]
pub struct TenmaConnector {
    config: ActuatorsConfig,
    max_current_ma: u32,
}

impl TenmaConnector {
    pub fn new(config: ActuatorsConfig, max_current_ma: u32) -> Self {
        Self { config, max_current_ma }
    }

    async fn open(&self, config: &PowerSupplyConfig) -> Result<ChannelActuator, ActuatorError> {
        let link = SerialLink::open(config)?;
        let supply = TenmaPowerSupply::discover(link, &config.serial, self.max_current_ma).await?;
        Ok(ChannelActuator::new(Arc::new(supply), config.channel))
    }
}

#[async_trait]
impl ActuatorConnector for TenmaConnector {
    async fn connect(&self) -> Result<ActuatorPair, ActuatorError> {
        tracing::info!(
            "Connecting to power supplies on {} and {}",
            self.config.temperature.serial,
            self.config.light.serial
        );
        let temperature = self.open(&self.config.temperature).await?;
        let light = self.open(&self.config.light).await?;
        Ok(ActuatorPair { temperature, light })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeLink {
        sent: Mutex<Vec<String>>,
        reply: Mutex<String>,
    }

    impl FakeLink {
        fn replying(reply: &str) -> Self {
            let link = Self::default();
            *link.reply.lock().unwrap() = reply.to_string();
            link
        }
    }

    #[async_trait]
    impl SerialTransport for FakeLink {
        async fn send(&self, command: &str) -> Result<(), ActuatorError> {
            self.sent.lock().unwrap().push(command.to_string());
            Ok(())
        }

        async fn query(&self, command: &str) -> Result<String, ActuatorError> {
            self.sent.lock().unwrap().push(command.to_string());
            Ok(self.reply.lock().unwrap().clone())
        }
    }

    #[test]
    fn test_set_current_formatting() {
        assert_eq!(set_current_command(1, 0), "ISET1:0.000");
        assert_eq!(set_current_command(1, 1000), "ISET1:1.000");
        assert_eq!(set_current_command(2, 1234), "ISET2:1.234");
        assert_eq!(set_current_command(1, 45), "ISET1:0.045");
    }

    #[test]
    fn test_query_formatting() {
        assert_eq!(read_current_command(1), "IOUT1?");
        assert_eq!(read_voltage_command(2), "VOUT2?");
        assert_eq!(output_command(true), "OUT1");
        assert_eq!(output_command(false), "OUT0");
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric("VOUT1?", "12.03").unwrap(), 12.03);
        assert_eq!(parse_numeric("IOUT1?", " 1.249\0").unwrap(), 1.249);
        assert_eq!(parse_numeric("VOUT1?", "05.00V").unwrap(), 5.0);
        assert!(matches!(
            parse_numeric("IOUT1?", "ERR"),
            Err(ActuatorError::InvalidResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_discover_and_drive() {
        let supply = TenmaPowerSupply::discover(FakeLink::replying("TENMA 72-2540 V2.1"), "/dev/fake", 2000)
            .await
            .unwrap();
        assert_eq!(supply.identity(), "TENMA 72-2540 V2.1");

        supply.enable().await.unwrap();
        supply.set_output_current(1, 1500).await.unwrap();
        supply.disable().await.unwrap();

        let sent = supply.transport.sent.lock().unwrap().clone();
        assert_eq!(sent, vec!["*IDN?", "OUT1", "ISET1:1.500", "OUT0"]);
    }

    #[tokio::test]
    async fn test_discover_rejects_silent_device() {
        let result = TenmaPowerSupply::discover(FakeLink::replying("   "), "/dev/fake", 2000).await;
        assert!(matches!(result, Err(ActuatorError::Discovery { .. })));
    }

    #[tokio::test]
    async fn test_out_of_range_current_is_not_sent() {
        let supply = TenmaPowerSupply::discover(FakeLink::replying("TENMA"), "/dev/fake", 2000)
            .await
            .unwrap();
        let err = supply.set_output_current(1, 2500).await.unwrap_err();
        assert!(matches!(err, ActuatorError::OutOfRange { requested: 2500, max: 2000 }));
        assert_eq!(supply.transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_readback_units() {
        let supply = TenmaPowerSupply::discover(FakeLink::replying("1.250"), "/dev/fake", 2000)
            .await
            .unwrap();
        assert_eq!(supply.read_output_current(1).await.unwrap(), 1250.0);
        assert_eq!(supply.read_output_voltage(1).await.unwrap(), 1.25);
    }
}
