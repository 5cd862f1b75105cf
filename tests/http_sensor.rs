//! HTTP sensor source against a mock sensor node.

use photherm_rs::config::SensorConfig;
use photherm_rs::sensor::{HttpSensorSource, SensorError, SensorSource};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source_for(server: &MockServer, timeout_ms: u64) -> HttpSensorSource {
    let config = SensorConfig {
        endpoint: format!("{}/data", server.uri()),
        timeout_ms,
        ..SensorConfig::default()
    };
    HttpSensorSource::new(&config).unwrap()
}

#[tokio::test]
async fn test_fetch_temperature() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sensor1": { "temperature": 36.9 },
            "sensor2": { "humidity": 55.0 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reading = source_for(&server, 1000).fetch_temperature().await.unwrap();
    assert_eq!(reading.temperature, 36.9);
    assert_eq!(reading.auxiliary["humidity"], 55.0);
}

#[tokio::test]
async fn test_server_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = source_for(&server, 1000).fetch_temperature().await.unwrap_err();
    assert!(matches!(err, SensorError::Status(500)), "{:?}", err);
}

#[tokio::test]
async fn test_missing_temperature() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sensor2": {} })))
        .mount(&server)
        .await;

    let err = source_for(&server, 1000).fetch_temperature().await.unwrap_err();
    assert!(matches!(err, SensorError::MissingTemperature), "{:?}", err);
}

#[tokio::test]
async fn test_non_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = source_for(&server, 1000).fetch_temperature().await.unwrap_err();
    assert!(matches!(err, SensorError::Decode(_)), "{:?}", err);
}

#[tokio::test]
async fn test_slow_sensor_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "sensor1": { "temperature": 20.0 } }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let err = source_for(&server, 100).fetch_temperature().await.unwrap_err();
    assert!(matches!(err, SensorError::Transport(_)), "{:?}", err);
}

#[tokio::test]
async fn test_unreachable_endpoint() {
    let config = SensorConfig {
        endpoint: "http://127.0.0.1:9/data".to_string(),
        timeout_ms: 500,
        ..SensorConfig::default()
    };
    let err = HttpSensorSource::new(&config).unwrap().fetch_temperature().await.unwrap_err();
    assert!(matches!(err, SensorError::Transport(_)), "{:?}", err);
}
