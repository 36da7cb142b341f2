//! Network abstraction layer.
//!
//! Byte-stream connections are described by small synchronous traits
//! ([`Read`], [`Write`], [`Close`], [`Poll`]) so the broker transport can run
//! over a hosted TCP socket, an embedded IP stack, or a test double.
//!

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Common error types for network operations
pub mod error;

/// Broker transport contract used by the session activity
pub mod transport;

/// MQTT 3.1.1 implementation of the broker transport
pub mod mqtt;

/// TCP connector over the standard library
#[cfg(feature = "std")]
pub mod tcp;

/// Re-exports of common traits
pub mod prelude {
    pub use super::transport::{Transport, TransportEvent};
    pub use super::{Close, Connect, Connection, Poll, Read, Write};
}

use core::time::Duration;

pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read data from the connection
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the connection
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

/// Readiness polling, the equivalent of a socket `poll()` for input.
pub trait Poll {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Wait up to `timeout` for incoming data.
    ///
    /// Returns `Ok(true)` once a read would not block (this includes a peer
    /// close, which the next read reports as zero bytes) and `Ok(false)` when
    /// the timeout expired. A zero timeout checks without waiting.
    fn poll_readable(&mut self, timeout: Duration) -> Result<bool, Self::Error>;
}

/// A synchronous connection
pub trait Connection: Read + Write + Close + Poll {}

/// A synchronous connector (client)
pub trait Connect {
    /// Associated connection type
    type Connection: Connection;
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Open a connection
    fn connect(&mut self, remote: &str) -> Result<Self::Connection, Self::Error>;
}

/// Writes all of `buf`, looping over short writes.
pub(crate) fn write_all<W: Write>(conn: &mut W, mut buf: &[u8]) -> Result<(), error::Error> {
    while !buf.is_empty() {
        match conn.write(buf) {
            Ok(0) => return Err(error::Error::ConnectionClosed),
            Ok(n) => buf = &buf[n..],
            Err(_) => return Err(error::Error::WriteError),
        }
    }
    Ok(())
}

/// Fills all of `buf`, looping over short reads.
pub(crate) fn read_exact<R: Read>(conn: &mut R, buf: &mut [u8]) -> Result<(), error::Error> {
    let mut total_read = 0;
    while total_read < buf.len() {
        match conn.read(&mut buf[total_read..]) {
            Ok(0) => return Err(error::Error::ConnectionClosed),
            Ok(n) => total_read += n,
            Err(_) => return Err(error::Error::ReadError),
        }
    }
    Ok(())
}
