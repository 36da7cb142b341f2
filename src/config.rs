//! Device configuration.
//!
//! The configuration is a small JSON document parsed without allocation:
//!
//! ```rust
//! use envlink::config::Config;
//!
//! let config = Config::from_json(
//!     r#"{"wifi_ssid":"greenhouse","wifi_psk":"hunter22","broker_addr":"192.168.1.10"}"#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.broker_port, 1883);
//! assert_eq!(config.max_retry_count, 3);
//! ```

use core::net::{Ipv4Addr, SocketAddrV4};
use core::str::FromStr;
use core::time::Duration;
use heapless::String;
use serde::Deserialize;

/// Longest client identifier MQTT 3.1.1 brokers must accept.
pub const MAX_CLIENT_ID_LEN: usize = 23;

/// Errors raised while loading or validating the configuration.
///
/// All of them are fatal: the session activity is never started with an
/// invalid configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The document is not valid JSON or a field overflows its buffer.
    Parse,
    /// `broker_addr` is not a dotted IPv4 address.
    InvalidBrokerAddress,
    /// `client_id` is empty or longer than 23 bytes.
    InvalidClientId,
    /// `wifi_ssid` is empty.
    MissingSsid,
    /// `sensor_read_interval_seconds` is zero.
    InvalidInterval,
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConfigError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ConfigError::Parse => defmt::write!(f, "Parse"),
            ConfigError::InvalidBrokerAddress => defmt::write!(f, "InvalidBrokerAddress"),
            ConfigError::InvalidClientId => defmt::write!(f, "InvalidClientId"),
            ConfigError::MissingSsid => defmt::write!(f, "MissingSsid"),
            ConfigError::InvalidInterval => defmt::write!(f, "InvalidInterval"),
        }
    }
}

fn default_broker_port() -> u16 {
    1883
}

fn default_client_id() -> String<MAX_CLIENT_ID_LEN> {
    let mut id = String::new();
    // Seven bytes always fit.
    let _ = id.push_str("envlink");
    id
}

fn default_keep_alive() -> u16 {
    60
}

fn default_max_retry_count() -> u32 {
    3
}

fn default_read_interval() -> u32 {
    10
}

/// Runtime configuration for the three activities.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Network name the radio joins.
    pub wifi_ssid: String<32>,
    /// Pre-shared key for `wifi_ssid`.
    #[serde(default)]
    pub wifi_psk: String<64>,
    /// Broker IPv4 address in dotted notation.
    pub broker_addr: String<15>,
    /// Broker TCP port.
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,
    /// MQTT client identifier.
    #[serde(default = "default_client_id")]
    pub client_id: String<MAX_CLIENT_ID_LEN>,
    /// MQTT keep-alive interval; 0 disables keep-alive pings.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u16,
    /// Connect attempts per cycle before the broker is declared
    /// unreachable; 0 retries without bound.
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,
    /// Sensor sampling period.
    #[serde(default = "default_read_interval")]
    pub sensor_read_interval_seconds: u32,
}

impl Config {
    /// Parses and validates a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let (config, _): (Config, usize) =
            serde_json_core::from_str(json).map_err(|_| ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field that cannot be enforced by the type alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wifi_ssid.is_empty() {
            return Err(ConfigError::MissingSsid);
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::InvalidClientId);
        }
        if self.sensor_read_interval_seconds == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        self.broker().map(|_| ())
    }

    /// The broker socket address.
    pub fn broker(&self) -> Result<SocketAddrV4, ConfigError> {
        let ip = Ipv4Addr::from_str(&self.broker_addr)
            .map_err(|_| ConfigError::InvalidBrokerAddress)?;
        Ok(SocketAddrV4::new(ip, self.broker_port))
    }

    /// Period between two sensor reads.
    pub fn sensor_read_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.sensor_read_interval_seconds))
    }

    /// How long the session activity waits on the bus before servicing the
    /// broker connection: half the keep-alive interval, at least one second.
    pub fn service_tick(&self) -> Duration {
        match self.keep_alive_seconds {
            0 => Duration::from_secs(30),
            secs => Duration::from_millis(u64::from(secs) * 500).max(Duration::from_secs(1)),
        }
    }
}

/// Fixed timers of the activities.
///
/// The defaults are what the device ships with; tests shrink them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Poll interval while waiting for the sensor to become ready.
    pub sensor_readiness_poll: Duration,
    /// Pause after a failed sensor read or decode.
    pub sensor_failure_cooldown: Duration,
    /// Pause between two connect attempts of one cycle.
    pub connect_retry_backoff: Duration,
    /// Pause after a cycle exhausted its attempts.
    pub broker_unreachable_cooldown: Duration,
    /// How long a connect attempt waits for the broker's acknowledgment.
    pub connack_timeout: Duration,
    /// How long the link activity waits for a radio event per iteration.
    pub link_idle_tick: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            sensor_readiness_poll: Duration::from_secs(5),
            sensor_failure_cooldown: Duration::from_secs(60),
            connect_retry_backoff: Duration::from_secs(5),
            broker_unreachable_cooldown: Duration::from_secs(30),
            connack_timeout: Duration::from_secs(5),
            link_idle_tick: Duration::from_secs(1),
        }
    }
}

/// Converts a duration to whole milliseconds for [`embedded_hal::delay::DelayNs`].
pub(crate) fn millis_u32(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}
