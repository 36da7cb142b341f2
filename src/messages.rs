//! Messages carried on the bus.
//!
//! Both types are small `Copy` values: the bus hands every subscriber its own
//! copy, so no activity ever holds a reference into another activity's state.

use heapless::String;
use serde::Serialize;

/// Network attachment state as seen by the link activity.
///
/// `connected` is only `true` once the interface holds a transport address;
/// radio association alone does not count.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkState {
    /// Whether the device currently has a usable network attachment.
    pub connected: bool,
}

impl LinkState {
    /// Link is attached and addressed.
    pub const UP: Self = Self { connected: true };
    /// Link is down.
    pub const DOWN: Self = Self { connected: false };
}

/// One environmental sample in fixed-point units.
///
/// Produced once per successful sensor read and never merged with other
/// readings.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reading {
    /// Monotonic uptime at which the sample was taken, in milliseconds.
    pub timestamp_ms: i64,
    /// Ambient temperature in milli-degrees Celsius.
    pub temperature_millidegc: i32,
    /// Relative humidity in milli-percent (55.5 % = 55500).
    pub humidity_millipercent: u32,
    /// Barometric pressure in Pa (rendered as kPa on the wire).
    pub pressure_pa: u32,
}

/// Upper bound for a plausible relative humidity, in milli-percent.
pub const MAX_HUMIDITY_MILLIPERCENT: u32 = 100_000;

/// Fits a [`Reading`] rendered by [`Reading::to_json`] with every field at
/// its widest.
pub type ReadingJson = String<160>;

impl Reading {
    /// Returns `true` if the reading is fit to be published.
    ///
    /// Rejects negative timestamps and humidity above 100 %.
    pub fn is_valid(&self) -> bool {
        self.timestamp_ms >= 0 && self.humidity_millipercent <= MAX_HUMIDITY_MILLIPERCENT
    }

    /// Compact JSON object with the raw fixed-point fields.
    pub fn to_json(&self) -> Result<ReadingJson, serde_json_core::ser::Error> {
        serde_json_core::to_string(self)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LinkState {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "LinkState {{ connected: {} }}", self.connected)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Reading {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Reading {{ t: {}ms, temp: {}mC, hum: {}m%, press: {}Pa }}",
            self.timestamp_ms,
            self.temperature_millidegc,
            self.humidity_millipercent,
            self.pressure_pa
        )
    }
}
