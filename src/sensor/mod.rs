//! Sensor acquisition.
//!
//! A [`Sensor`] driver hands back a raw sample buffer and decodes each
//! channel into a Q31 fixed-point value with a binary shift exponent.
//! [`Sampler`] turns those into a [`Reading`] scaled by 1000; the
//! [`SensorActivity`](activity::SensorActivity) runs it on a fixed period
//! and publishes every reading on the bus.

use crate::messages::Reading;
use crate::time::Clock;
use heapless::Vec;
use log::error;

#[cfg(feature = "std")]
pub mod activity;

#[cfg(feature = "std")]
pub use activity::SensorActivity;

/// Capacity of one raw sample buffer.
pub const RAW_BUFFER_SIZE: usize = 128;

/// Raw bytes of one hardware read.
pub type RawBuffer = Vec<u8, RAW_BUFFER_SIZE>;

/// A decodable sensor channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorChannel {
    /// Ambient temperature, °C.
    Temperature,
    /// Relative humidity, %.
    Humidity,
    /// Barometric pressure, kPa.
    Pressure,
}

/// A decoded channel value: `value / 2^31 * 2^shift` physical units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Q31Sample {
    /// Signed Q31 mantissa.
    pub value: i32,
    /// Binary exponent applied to the mantissa.
    pub shift: i8,
}

impl Q31Sample {
    /// The physical value multiplied by 1000, computed as
    /// `value * 1000 >> (31 - shift)`.
    ///
    /// The shift discards the low bits, so results are truncated, never
    /// rounded. Returns `None` if the result does not fit in an `i64`.
    pub fn scaled_milli(self) -> Option<i64> {
        let scaled = i64::from(self.value) * 1000;
        let shift = 31 - i32::from(self.shift);
        if shift >= 0 {
            Some(scaled >> shift.min(63))
        } else {
            let left = u32::try_from(-shift).ok()?;
            scaled.checked_mul(1i64.checked_shl(left).filter(|f| *f > 0)?)
        }
    }
}

/// A sensor driver.
pub trait Sensor {
    /// Driver error type.
    type Error: core::fmt::Debug;

    /// Whether the device is present and initialised.
    fn is_ready(&mut self) -> bool;

    /// Triggers one hardware read.
    fn read(&mut self) -> Result<RawBuffer, Self::Error>;

    /// Extracts `channel` from a raw buffer.
    fn decode(&self, raw: &RawBuffer, channel: SensorChannel) -> Result<Q31Sample, Self::Error>;
}

/// Errors of one sampling cycle. Always transient: the reading is dropped
/// and the cycle retried after a cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The device is absent or not initialised.
    NotReady,
    /// The hardware read failed.
    Read,
    /// A channel could not be decoded.
    Decode(SensorChannel),
    /// A decoded channel does not fit the reading's field.
    OutOfRange(SensorChannel),
}

#[cfg(feature = "defmt")]
impl defmt::Format for SensorChannel {
    fn format(&self, f: defmt::Formatter) {
        match self {
            SensorChannel::Temperature => defmt::write!(f, "Temperature"),
            SensorChannel::Humidity => defmt::write!(f, "Humidity"),
            SensorChannel::Pressure => defmt::write!(f, "Pressure"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SensorError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            SensorError::NotReady => defmt::write!(f, "NotReady"),
            SensorError::Read => defmt::write!(f, "Read"),
            SensorError::Decode(ch) => defmt::write!(f, "Decode({})", ch),
            SensorError::OutOfRange(ch) => defmt::write!(f, "OutOfRange({})", ch),
        }
    }
}

/// Reads, decodes and timestamps samples.
#[derive(Debug)]
pub struct Sampler<S: Sensor, C: Clock> {
    sensor: S,
    clock: C,
}

impl<S: Sensor, C: Clock> Sampler<S, C> {
    /// Wraps a driver and the clock used for timestamps.
    pub fn new(sensor: S, clock: C) -> Self {
        Self { sensor, clock }
    }

    /// The driver.
    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    /// Whether the driver reports the device ready.
    pub fn is_ready(&mut self) -> bool {
        self.sensor.is_ready()
    }

    /// Takes one reading.
    pub fn sample(&mut self) -> Result<Reading, SensorError> {
        let raw = self.sensor.read().map_err(|e| {
            error!("sensor read failed: {:?}", e);
            SensorError::Read
        })?;
        let timestamp_ms = i64::try_from(self.clock.now_ms()).unwrap_or(i64::MAX);

        let temperature = self.channel(&raw, SensorChannel::Temperature)?;
        let humidity = self.channel(&raw, SensorChannel::Humidity)?;
        let pressure = self.channel(&raw, SensorChannel::Pressure)?;

        Ok(Reading {
            timestamp_ms,
            temperature_millidegc: i32::try_from(temperature)
                .map_err(|_| SensorError::OutOfRange(SensorChannel::Temperature))?,
            humidity_millipercent: u32::try_from(humidity)
                .map_err(|_| SensorError::OutOfRange(SensorChannel::Humidity))?,
            pressure_pa: u32::try_from(pressure)
                .map_err(|_| SensorError::OutOfRange(SensorChannel::Pressure))?,
        })
    }

    fn channel(&self, raw: &RawBuffer, channel: SensorChannel) -> Result<i64, SensorError> {
        let sample = self.sensor.decode(raw, channel).map_err(|e| {
            error!("decoding {:?} failed: {:?}", channel, e);
            SensorError::Decode(channel)
        })?;
        sample
            .scaled_milli()
            .ok_or(SensorError::OutOfRange(channel))
    }
}
