//! The session activity: feed bus messages to the [`Session`] and service it.

use super::Session;
use crate::bus::{Bus, Message, Subscriber, WaitError};
use crate::network::transport::Transport;
use crate::time::Clock;
use core::time::Duration;
use embedded_hal::delay::DelayNs;
use std::sync::Arc;

/// Subscribes to both channels and drives the broker session.
#[derive(Debug)]
pub struct SessionActivity<T: Transport, C: Clock, D: DelayNs> {
    session: Session<T, C, D>,
    subscriber: Subscriber,
    bus: Arc<Bus>,
    tick: Duration,
    last_service_ms: Option<u64>,
}

impl<T: Transport, C: Clock, D: DelayNs> SessionActivity<T, C, D> {
    /// Creates the activity. `tick` is the servicing period; messages are
    /// waited for at most that long.
    pub fn new(session: Session<T, C, D>, subscriber: Subscriber, bus: Arc<Bus>, tick: Duration) -> Self {
        Self {
            session,
            subscriber,
            bus,
            tick,
            last_service_ms: None,
        }
    }

    /// The state machine, for inspection.
    pub fn session(&self) -> &Session<T, C, D> {
        &self.session
    }

    /// Handles at most one message, services the session when a tick has
    /// passed, then runs a connect cycle if one is due.
    pub fn step(&mut self) {
        match self.subscriber.wait(self.tick) {
            Ok((_, Message::LinkState(link))) => self.session.on_link_state(link),
            Ok((_, Message::Reading(reading))) => {
                self.session.on_reading(&reading);
            }
            Err(WaitError::Timeout) => {}
        }

        let clock = self.session.clock();
        let due = self
            .last_service_ms
            .is_none_or(|at| u128::from(clock.elapsed_ms(at)) >= self.tick.as_millis());
        if due {
            // Errors are logged and the session torn down inside `service`.
            let _ = self.session.service();
            self.last_service_ms = Some(self.session.clock().now_ms());
        }

        let bus = &self.bus;
        let _ = self.session.maintain(|| bus.link_state().connected);
    }

    /// Runs for the lifetime of the process.
    pub fn run(mut self) -> ! {
        loop {
            self.step();
        }
    }
}
