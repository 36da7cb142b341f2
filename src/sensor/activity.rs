//! The sensor activity: sample on a fixed period, publish on the bus.

use super::{Sampler, Sensor, SensorError};
use crate::bus::{Bus, BusError};
use crate::config::{Timings, millis_u32};
use crate::messages::Reading;
use crate::time::Clock;
use core::time::Duration;
use embedded_hal::delay::DelayNs;
use log::{debug, error, info};
use std::sync::Arc;

/// Periodic sampler feeding the [`Reading`] channel.
#[derive(Debug)]
pub struct SensorActivity<S: Sensor, C: Clock, D: DelayNs> {
    sampler: Sampler<S, C>,
    delay: D,
    bus: Arc<Bus>,
    interval: Duration,
    timings: Timings,
}

impl<S: Sensor, C: Clock, D: DelayNs> SensorActivity<S, C, D> {
    /// Creates the activity; nothing runs until [`run`](Self::run) or
    /// [`step`](Self::step).
    pub fn new(
        sampler: Sampler<S, C>,
        delay: D,
        bus: Arc<Bus>,
        interval: Duration,
        timings: Timings,
    ) -> Self {
        Self {
            sampler,
            delay,
            bus,
            interval,
            timings,
        }
    }

    /// The sampler, for inspection.
    pub fn sampler(&self) -> &Sampler<S, C> {
        &self.sampler
    }

    /// Polls the device until it reports ready.
    pub fn wait_until_ready(&mut self) {
        while !self.sampler.is_ready() {
            error!(
                "sensor not ready, retrying in {}s",
                self.timings.sensor_readiness_poll.as_secs()
            );
            self.delay
                .delay_ms(millis_u32(self.timings.sensor_readiness_poll));
        }
        info!(
            "sensor ready, sampling every {}s",
            self.interval.as_secs()
        );
    }

    /// One sampling cycle, including the sleep that follows it.
    ///
    /// A failed cycle publishes nothing and sleeps for the failure cooldown
    /// instead of the sampling period.
    pub fn step(&mut self) -> Result<Reading, SensorError> {
        match self.sampler.sample() {
            Ok(reading) => {
                info!(
                    "reading: {} m°C, {} m%RH, {} Pa",
                    reading.temperature_millidegc,
                    reading.humidity_millipercent,
                    reading.pressure_pa
                );
                self.publish(reading);
                self.delay.delay_ms(millis_u32(self.interval));
                Ok(reading)
            }
            Err(e) => {
                error!(
                    "sampling failed ({:?}), retrying in {}s",
                    e,
                    self.timings.sensor_failure_cooldown.as_secs()
                );
                self.delay
                    .delay_ms(millis_u32(self.timings.sensor_failure_cooldown));
                Err(e)
            }
        }
    }

    fn publish(&self, reading: Reading) {
        match self.bus.publish(reading) {
            Ok(()) => match reading.to_json() {
                Ok(json) => debug!("reading published: {}", json),
                Err(_) => debug!("reading published: {:?}", reading),
            },
            Err(BusError::InvalidMessage) => error!("reading rejected by the bus: {:?}", reading),
            Err(e) => error!("reading channel unavailable ({:?}), reading dropped", e),
        }
    }

    /// Runs for the lifetime of the process.
    pub fn run(mut self) -> ! {
        self.wait_until_ready();
        loop {
            // Failures are logged and cooled down inside `step`.
            let _ = self.step();
        }
    }
}
