//! Broker transport contract.
//!
//! The session activity owns exactly one [`Transport`] and drives it through
//! open, handshake, service and close. Handles are moved into
//! [`Transport::disconnect`], so once an attempt is abandoned its half-open
//! connection is gone with it.

use super::error::Error;
use core::time::Duration;

/// Control data received from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection acknowledgment. `return_code == 0` means accepted.
    ConnAck {
        /// Broker already held state for this client.
        session_present: bool,
        /// 0 on success, 1..=5 for the protocol's refusal reasons.
        return_code: u8,
    },
    /// Answer to a keep-alive ping.
    PingResp,
    /// Acknowledgment of a QoS 1 publish.
    PubAck(u16),
    /// An application message from a subscription.
    Publish,
    /// Any other packet, identified by its type nibble.
    Other(u8),
}

#[cfg(feature = "defmt")]
impl defmt::Format for TransportEvent {
    fn format(&self, f: defmt::Formatter) {
        match self {
            TransportEvent::ConnAck { return_code, .. } => defmt::write!(f, "ConnAck({})", return_code),
            TransportEvent::PingResp => defmt::write!(f, "PingResp"),
            TransportEvent::PubAck(id) => defmt::write!(f, "PubAck({})", id),
            TransportEvent::Publish => defmt::write!(f, "Publish"),
            TransportEvent::Other(kind) => defmt::write!(f, "Other({})", kind),
        }
    }
}

/// A publish/subscribe broker transport.
pub trait Transport {
    /// An open connection to the broker.
    type Handle;

    /// Opens the transport to `address` (`"a.b.c.d:port"`).
    fn connect(&mut self, address: &str) -> Result<Self::Handle, Error>;

    /// Sends the protocol connect request over an open transport.
    fn send_connect_request(&mut self, handle: &mut Self::Handle) -> Result<(), Error>;

    /// Waits up to `timeout` for one incoming control packet.
    ///
    /// `Ok(None)` means nothing arrived in time.
    fn poll_incoming(
        &mut self,
        handle: &mut Self::Handle,
        timeout: Duration,
    ) -> Result<Option<TransportEvent>, Error>;

    /// Publishes `payload` to `topic` with at-most-once delivery.
    fn publish(&mut self, handle: &mut Self::Handle, topic: &str, payload: &[u8]) -> Result<(), Error>;

    /// Sends a keep-alive ping.
    fn ping(&mut self, handle: &mut Self::Handle) -> Result<(), Error>;

    /// Closes the transport immediately. Never retried and never fails.
    fn disconnect(&mut self, handle: Self::Handle);
}
