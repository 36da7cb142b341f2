//! Network link monitoring.
//!
//! [`LinkMonitor`] tracks the radio through `Disconnected → Connecting →
//! Attached` and decides which [`LinkState`] transitions to announce. The
//! link is only usable once an address has been assigned; association alone
//! keeps it in `Connecting`. Every disconnect is answered with an immediate
//! reconnect request, without backoff.

use crate::messages::LinkState;
use core::time::Duration;
use heapless::String;
use log::{debug, error, info};

#[cfg(feature = "std")]
pub mod activity;

#[cfg(feature = "std")]
pub use activity::LinkActivity;

/// Discrete events reported by the radio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent {
    /// Link-layer association with the access point completed.
    Associated,
    /// The link layer dropped.
    Disassociated,
    /// The IP layer obtained an address.
    AddressAssigned,
}

/// A radio driver.
///
/// Connect requests complete asynchronously: the outcome arrives later as
/// a [`RadioEvent`]. Drivers that report events through callbacks queue
/// them for [`next_event`](Radio::next_event).
pub trait Radio {
    /// Driver error type.
    type Error: core::fmt::Debug;

    /// Asks the radio to join `ssid`.
    fn connect(&mut self, ssid: &str, credentials: &str) -> Result<(), Self::Error>;

    /// Waits up to `timeout` for the next queued event.
    fn next_event(&mut self, timeout: Duration) -> Option<RadioEvent>;
}

/// Link failures. Always retried by the link activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The radio refused the connect request.
    ConnectRequest,
}

#[cfg(feature = "defmt")]
impl defmt::Format for LinkError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            LinkError::ConnectRequest => defmt::write!(f, "ConnectRequest"),
        }
    }
}

/// Where the radio connection stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    /// No connect request outstanding.
    Disconnected,
    /// Connect requested or associated, no address yet.
    Connecting,
    /// Addressed and usable.
    Attached,
}

/// Network credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Network name.
    pub ssid: String<32>,
    /// Pre-shared key.
    pub psk: String<64>,
}

/// The link state machine around a [`Radio`].
#[derive(Debug)]
pub struct LinkMonitor<R: Radio> {
    radio: R,
    credentials: Credentials,
    phase: LinkPhase,
    connect_requests: u32,
}

impl<R: Radio> LinkMonitor<R> {
    /// Wraps a radio; no request is issued until [`start`](Self::start).
    pub fn new(radio: R, credentials: Credentials) -> Self {
        Self {
            radio,
            credentials,
            phase: LinkPhase::Disconnected,
            connect_requests: 0,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    /// The radio, for inspection.
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Issues the initial connect request.
    pub fn start(&mut self) -> Result<(), LinkError> {
        self.request_connect()
    }

    /// Re-issues a connect request if none is outstanding.
    pub fn ensure_connecting(&mut self) -> Result<(), LinkError> {
        match self.phase {
            LinkPhase::Disconnected => self.request_connect(),
            LinkPhase::Connecting | LinkPhase::Attached => Ok(()),
        }
    }

    /// Waits for the next radio event.
    pub fn next_event(&mut self, timeout: Duration) -> Option<RadioEvent> {
        self.radio.next_event(timeout)
    }

    /// Applies a radio event and returns the transition to announce, if any.
    ///
    /// `LinkState::UP` is returned exactly once per attach. A disconnect
    /// always returns `LinkState::DOWN` and leaves the monitor
    /// `Disconnected`; the caller announces it and then calls
    /// [`ensure_connecting`](Self::ensure_connecting).
    pub fn handle(&mut self, event: RadioEvent) -> Option<LinkState> {
        match event {
            RadioEvent::Associated => {
                info!("radio associated, waiting for an address");
                if self.phase == LinkPhase::Disconnected {
                    self.phase = LinkPhase::Connecting;
                }
                None
            }
            RadioEvent::AddressAssigned => {
                if self.phase == LinkPhase::Attached {
                    debug!("address refreshed while attached");
                    return None;
                }
                info!("address assigned, link up");
                self.phase = LinkPhase::Attached;
                Some(LinkState::UP)
            }
            RadioEvent::Disassociated => {
                info!("radio disconnected");
                self.phase = LinkPhase::Disconnected;
                Some(LinkState::DOWN)
            }
        }
    }

    fn request_connect(&mut self) -> Result<(), LinkError> {
        self.connect_requests += 1;
        info!(
            "connecting to {} (request {})",
            self.credentials.ssid, self.connect_requests
        );
        match self
            .radio
            .connect(&self.credentials.ssid, &self.credentials.psk)
        {
            Ok(()) => {
                self.phase = LinkPhase::Connecting;
                Ok(())
            }
            Err(e) => {
                error!(
                    "connect request to {} failed: {:?} (request {})",
                    self.credentials.ssid, e, self.connect_requests
                );
                self.phase = LinkPhase::Disconnected;
                Err(LinkError::ConnectRequest)
            }
        }
    }
}
