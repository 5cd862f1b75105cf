//! Remote temperature sensor source.
//!
//! The sensor node answers `GET <endpoint>` with a JSON document such as
//! `{"sensor1": {"temperature": 36.8}, "sensor2": {...}}`. Only the
//! temperature is interpreted; the auxiliary block is passed through to the
//! status query untouched.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::SensorConfig;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor request failed: {0}")]
    Transport(String),
    #[error("sensor returned HTTP {0}")]
    Status(u16),
    #[error("temperature not found in sensor response")]
    MissingTemperature,
    #[error("invalid sensor payload: {0}")]
    Decode(String),
}

/// One poll of the sensor source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub temperature: f64,
    pub auxiliary: Value,
}

#[async_trait]
pub trait SensorSource: Send + Sync + 'static {
    async fn fetch_temperature(&self) -> Result<Reading, SensorError>;
}

/// Pulls `<temperature_key>.temperature` and `<auxiliary_key>` out of a payload.
pub fn parse_reading(payload: &Value, temperature_key: &str, auxiliary_key: &str) -> Result<Reading, SensorError> {
    if !payload.is_object() {
        return Err(SensorError::Decode("expected a JSON object".to_string()));
    }
    let temperature = payload
        .get(temperature_key)
        .and_then(|sensor| sensor.get("temperature"))
        .and_then(Value::as_f64)
        .ok_or(SensorError::MissingTemperature)?;
    let auxiliary = payload
        .get(auxiliary_key)
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));
    Ok(Reading {
        temperature,
        auxiliary,
    })
}

/// Sensor source backed by an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpSensorSource {
    client: reqwest::Client,
    endpoint: String,
    temperature_key: String,
    auxiliary_key: String,
}

impl HttpSensorSource {
    pub fn new(config: &SensorConfig) -> Result<Self, SensorError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SensorError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            temperature_key: config.temperature_key.clone(),
            auxiliary_key: config.auxiliary_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SensorSource for HttpSensorSource {
    async fn fetch_temperature(&self) -> Result<Reading, SensorError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| SensorError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SensorError::Status(response.status().as_u16()));
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|e| SensorError::Decode(e.to_string()))?;
        let reading = parse_reading(&payload, &self.temperature_key, &self.auxiliary_key)?;
        tracing::trace!("Sensor reading: {:.2}°C", reading.temperature);
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_reading_with_auxiliary() {
        let payload = json!({
            "sensor1": { "temperature": 36.75 },
            "sensor2": { "humidity": 41.0, "lux": 1200 }
        });
        let reading = parse_reading(&payload, "sensor1", "sensor2").unwrap();
        assert_eq!(reading.temperature, 36.75);
        assert_eq!(reading.auxiliary["lux"], 1200);
    }

    #[test]
    fn test_parse_reading_without_auxiliary() {
        let payload = json!({ "sensor1": { "temperature": 20 } });
        let reading = parse_reading(&payload, "sensor1", "sensor2").unwrap();
        assert_eq!(reading.temperature, 20.0);
        assert_eq!(reading.auxiliary, json!({}));
    }

    #[test]
    fn test_parse_reading_missing_temperature() {
        let payload = json!({ "sensor1": { "temp": 20.0 } });
        let err = parse_reading(&payload, "sensor1", "sensor2").unwrap_err();
        assert!(matches!(err, SensorError::MissingTemperature));

        let payload = json!({ "sensor1": { "temperature": null } });
        let err = parse_reading(&payload, "sensor1", "sensor2").unwrap_err();
        assert!(matches!(err, SensorError::MissingTemperature));
    }

    #[test]
    fn test_parse_reading_rejects_non_object() {
        let err = parse_reading(&json!([1, 2, 3]), "sensor1", "sensor2").unwrap_err();
        assert!(matches!(err, SensorError::Decode(_)));
    }

    #[test]
    fn test_custom_keys() {
        let payload = json!({ "probe": { "temperature": 5.5 }, "extra": "x" });
        let reading = parse_reading(&payload, "probe", "extra").unwrap();
        assert_eq!(reading.temperature, 5.5);
        assert_eq!(reading.auxiliary, json!("x"));
    }
}
