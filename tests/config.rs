use envlink::config::{Config, ConfigError, Timings};
use envlink::error::Error;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

#[test]
fn test_defaults() {
    let config = Config::from_json(r#"{"wifi_ssid":"greenhouse","broker_addr":"192.168.1.10"}"#).unwrap();
    assert_eq!(config.wifi_psk.as_str(), "");
    assert_eq!(config.broker_port, 1883);
    assert_eq!(config.client_id.as_str(), "envlink");
    assert_eq!(config.keep_alive_seconds, 60);
    assert_eq!(config.max_retry_count, 3);
    assert_eq!(config.sensor_read_interval(), Duration::from_secs(10));
    assert_eq!(
        config.broker(),
        Ok(SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 10), 1883))
    );
}

#[test]
fn test_every_field() {
    let config = Config::from_json(
        r#"{
            "wifi_ssid": "greenhouse",
            "wifi_psk": "hunter22",
            "broker_addr": "10.0.0.2",
            "broker_port": 8883,
            "client_id": "station-7",
            "keep_alive_seconds": 30,
            "max_retry_count": 0,
            "sensor_read_interval_seconds": 2
        }"#,
    )
    .unwrap();
    assert_eq!(config.client_id.as_str(), "station-7");
    assert_eq!(config.max_retry_count, 0);
    assert_eq!(config.service_tick(), Duration::from_secs(15));
    assert_eq!(
        config.broker(),
        Ok(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 8883))
    );
}

#[test]
fn test_rejections() {
    let cases = [
        (r#"{"broker_addr":"10.0.0.2"}"#, ConfigError::Parse),
        (r#"{"wifi_ssid":"","broker_addr":"10.0.0.2"}"#, ConfigError::MissingSsid),
        (r#"{"wifi_ssid":"a","broker_addr":"broker.lan"}"#, ConfigError::InvalidBrokerAddress),
        (r#"{"wifi_ssid":"a","broker_addr":"10.0.0.256"}"#, ConfigError::InvalidBrokerAddress),
        (r#"{"wifi_ssid":"a","broker_addr":"10.0.0.2","client_id":""}"#, ConfigError::InvalidClientId),
        (
            r#"{"wifi_ssid":"a","broker_addr":"10.0.0.2","client_id":"a-client-id-of-24-bytes!"}"#,
            ConfigError::Parse,
        ),
        (
            r#"{"wifi_ssid":"a","broker_addr":"10.0.0.2","sensor_read_interval_seconds":0}"#,
            ConfigError::InvalidInterval,
        ),
        ("not json", ConfigError::Parse),
    ];
    for (json, expected) in cases {
        assert_eq!(Config::from_json(json), Err(expected), "{}", json);
    }
}

#[test]
fn test_configuration_errors_are_fatal() {
    let error: Error = ConfigError::MissingSsid.into();
    assert_eq!(error, Error::Configuration(ConfigError::MissingSsid));
    assert!(!error.is_transient());
}

#[test]
fn test_default_timings() {
    let timings = Timings::default();
    assert_eq!(timings.sensor_readiness_poll, Duration::from_secs(5));
    assert_eq!(timings.sensor_failure_cooldown, Duration::from_secs(60));
    assert_eq!(timings.connect_retry_backoff, Duration::from_secs(5));
    assert_eq!(timings.broker_unreachable_cooldown, Duration::from_secs(30));
    assert_eq!(timings.connack_timeout, Duration::from_secs(5));
}
