//! The link activity: turn radio events into [`LinkState`] publishes.

use super::{LinkMonitor, Radio};
use crate::bus::{Bus, BusError};
use crate::messages::LinkState;
use core::time::Duration;
use log::{debug, error, warn};
use std::sync::Arc;

/// Owns the radio and publishes on the [`LinkState`] channel.
#[derive(Debug)]
pub struct LinkActivity<R: Radio> {
    monitor: LinkMonitor<R>,
    bus: Arc<Bus>,
    tick: Duration,
    unpublished: Option<LinkState>,
}

impl<R: Radio> LinkActivity<R> {
    /// Creates the activity; `tick` bounds each wait for a radio event.
    pub fn new(monitor: LinkMonitor<R>, bus: Arc<Bus>, tick: Duration) -> Self {
        Self {
            monitor,
            bus,
            tick,
            unpublished: None,
        }
    }

    /// The state machine, for inspection.
    pub fn monitor(&self) -> &LinkMonitor<R> {
        &self.monitor
    }

    /// Issues the initial connect request.
    pub fn start(&mut self) {
        // A refused request is retried by the next `step`.
        let _ = self.monitor.start();
    }

    /// Handles at most one radio event.
    ///
    /// A transition queued by an earlier `ChannelBusy` is retried on a
    /// quiet tick; a newer transition replaces it.
    pub fn step(&mut self) {
        let transition = self.monitor.next_event(self.tick).and_then(|event| {
            debug!("radio event {:?}", event);
            self.monitor.handle(event)
        });

        match transition {
            Some(state) => {
                if let Some(stale) = self.unpublished.take() {
                    debug!("dropping queued link state connected={}", stale.connected);
                }
                self.publish(state);
            }
            None => {
                if let Some(state) = self.unpublished.take() {
                    self.publish(state);
                }
            }
        }

        // Continuous retries: a disconnect or refused request is followed
        // by a new request right away.
        let _ = self.monitor.ensure_connecting();
    }

    /// A transition that could not be published yet.
    pub fn unpublished(&self) -> Option<LinkState> {
        self.unpublished
    }

    fn publish(&mut self, state: LinkState) {
        match self.bus.publish(state) {
            Ok(()) => {
                debug!("link state published: connected={}", state.connected);
                self.unpublished = None;
            }
            Err(BusError::ChannelBusy) => {
                warn!("link state channel busy, retrying next tick");
                self.unpublished = Some(state);
            }
            Err(e) => error!("link state not published: {:?}", e),
        }
    }

    /// Runs for the lifetime of the process.
    pub fn run(mut self) -> ! {
        self.start();
        loop {
            self.step();
        }
    }
}
