//! TCP connections over [`std::net::TcpStream`].

use super::error::Error;
use super::{Close, Connect, Connection, Poll, Read, Write};
use core::time::Duration;
use std::io::{ErrorKind, Read as StdRead, Write as StdWrite};
use std::net::{Shutdown, SocketAddr, TcpStream};

/// Opens blocking TCP connections with a bounded connect and I/O timeout.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    /// Upper bound for the TCP handshake and for every read or write.
    pub timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

impl Connect for TcpConnector {
    type Connection = TcpConnection;
    type Error = Error;

    fn connect(&mut self, remote: &str) -> Result<Self::Connection, Self::Error> {
        let addr: SocketAddr = remote.parse().map_err(|_| Error::InvalidAddress)?;
        let stream = TcpStream::connect_timeout(&addr, self.timeout).map_err(|e| match e.kind() {
            ErrorKind::TimedOut => Error::Timeout,
            _ => Error::ConnectionRefused,
        })?;
        stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|_| stream.set_write_timeout(Some(self.timeout)))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(|_| Error::NotOpen)?;
        Ok(TcpConnection {
            stream,
            io_timeout: self.timeout,
        })
    }
}

/// A connected TCP stream.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    io_timeout: Duration,
}

impl Read for TcpConnection {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.stream.read(buf).map_err(|e| match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => Error::Timeout,
            _ => Error::ReadError,
        })
    }
}

impl Write for TcpConnection {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.stream.write(buf).map_err(|_| Error::WriteError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.stream.flush().map_err(|_| Error::WriteError)
    }
}

impl Close for TcpConnection {
    type Error = Error;

    fn close(self) -> Result<(), Self::Error> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            Err(_) => Err(Error::ConnectionClosed),
        }
    }
}

impl Poll for TcpConnection {
    type Error = Error;

    fn poll_readable(&mut self, timeout: Duration) -> Result<bool, Self::Error> {
        let mut byte = [0u8; 1];
        let result = if timeout.is_zero() {
            self.stream.set_nonblocking(true).map_err(|_| Error::NotOpen)?;
            let peeked = self.stream.peek(&mut byte);
            self.stream.set_nonblocking(false).map_err(|_| Error::NotOpen)?;
            peeked
        } else {
            self.stream
                .set_read_timeout(Some(timeout))
                .map_err(|_| Error::NotOpen)?;
            let peeked = self.stream.peek(&mut byte);
            self.stream
                .set_read_timeout(Some(self.io_timeout))
                .map_err(|_| Error::NotOpen)?;
            peeked
        };

        match result {
            // Zero bytes is an orderly shutdown; let the next read report it.
            Ok(_) => Ok(true),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(false),
            Err(_) => Err(Error::ReadError),
        }
    }
}

impl Connection for TcpConnection {}
