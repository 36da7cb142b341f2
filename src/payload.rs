//! Broker wire format for sensor readings.
//!
//! Each reading becomes three independent messages, one per fixed topic. A
//! payload is a plain ASCII decimal with exactly three fractional digits: no
//! units, no envelope.
//!
//! ```rust
//! use envlink::payload::format_milli;
//!
//! assert_eq!(format_milli(23456).as_str(), "23.456");
//! assert_eq!(format_milli(-5).as_str(), "-0.005");
//! ```

use crate::messages::Reading;
use core::fmt::Write;
use heapless::String;

/// Topic carrying the temperature in degrees Celsius.
pub const TOPIC_TEMPERATURE: &str = "sensors/temperature";
/// Topic carrying the relative humidity in percent.
pub const TOPIC_HUMIDITY: &str = "sensors/humidity";
/// Topic carrying the pressure in kPa.
pub const TOPIC_PRESSURE: &str = "sensors/pressure";

/// Capacity of a single rendered payload.
///
/// Large enough for `i64::MIN` with a sign, a point and three fractional
/// digits.
pub const PAYLOAD_CAPACITY: usize = 32;

/// A rendered payload.
pub type Payload = String<PAYLOAD_CAPACITY>;

/// Renders a value scaled by 1000 as a decimal with three fractional digits.
///
/// Values in `(-1, 0)` keep their sign on the integer part, so -5 renders as
/// `-0.005`.
pub fn format_milli(value: i64) -> Payload {
    let int = value / 1000;
    let frac = (value % 1000).unsigned_abs();
    let mut out = Payload::new();
    // Cannot overflow: the widest i64 rendering is 24 bytes.
    let _ = if value < 0 && int == 0 {
        write!(out, "-0.{:03}", frac)
    } else {
        write!(out, "{}.{:03}", int, frac)
    };
    out
}

/// The three payloads rendered from one reading, paired with their topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingPayloads {
    /// Temperature in degrees Celsius.
    pub temperature: Payload,
    /// Relative humidity in percent.
    pub humidity: Payload,
    /// Pressure in kPa.
    pub pressure: Payload,
}

impl ReadingPayloads {
    /// Renders every channel of `reading`.
    pub fn render(reading: &Reading) -> Self {
        Self {
            temperature: format_milli(i64::from(reading.temperature_millidegc)),
            humidity: format_milli(i64::from(reading.humidity_millipercent)),
            pressure: format_milli(i64::from(reading.pressure_pa)),
        }
    }

    /// `(topic, payload)` pairs in publish order.
    pub fn topics(&self) -> [(&'static str, &str); 3] {
        [
            (TOPIC_TEMPERATURE, self.temperature.as_str()),
            (TOPIC_HUMIDITY, self.humidity.as_str()),
            (TOPIC_PRESSURE, self.pressure.as_str()),
        ]
    }
}
