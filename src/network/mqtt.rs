//! MQTT 3.1.1 broker transport.
//!
//! Implements [`Transport`] on top of any [`Connect`] connector. Only the
//! packets a telemetry publisher needs are framed: CONNECT, CONNACK, QoS 0
//! PUBLISH, PINGREQ/PINGRESP and DISCONNECT. Every packet is assembled in a
//! fixed 256-byte buffer; anything larger is rejected with
//! [`Error::BufferOverflow`] rather than allocated.
//!
//! ```rust,no_run
//! use envlink::network::mqtt::{MqttTransport, Options};
//! # use envlink::network::{Close, Connect, Connection, Poll, Read, Write};
//! # use core::time::Duration;
//! # struct Socket;
//! # impl Read for Socket { type Error = (); fn read(&mut self, _: &mut [u8]) -> Result<usize, ()> { Ok(0) } }
//! # impl Write for Socket {
//! #     type Error = ();
//! #     fn write(&mut self, b: &[u8]) -> Result<usize, ()> { Ok(b.len()) }
//! #     fn flush(&mut self) -> Result<(), ()> { Ok(()) }
//! # }
//! # impl Close for Socket { type Error = (); fn close(self) -> Result<(), ()> { Ok(()) } }
//! # impl Poll for Socket { type Error = (); fn poll_readable(&mut self, _: Duration) -> Result<bool, ()> { Ok(false) } }
//! # impl Connection for Socket {}
//! # struct Stack;
//! # impl Connect for Stack {
//! #     type Connection = Socket;
//! #     type Error = ();
//! #     fn connect(&mut self, _: &str) -> Result<Socket, ()> { Ok(Socket) }
//! # }
//!
//! let options = Options::new("weather_station", 60).unwrap();
//! let transport = MqttTransport::new(Stack, options);
//! ```

use super::error::Error;
use super::transport::{Transport, TransportEvent};
use super::{Close, Connect, Connection, Poll, Write, read_exact, write_all};
use crate::config::MAX_CLIENT_ID_LEN;
use core::time::Duration;
use heapless::{String, Vec};
use log::{debug, warn};

// MQTT Control Packet types - these are the fixed header packet type values
const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH: u8 = 0x30;
const PUBACK: u8 = 0x40;
const PINGREQ: u8 = 0xC0;
const PINGRESP: u8 = 0xD0;
const DISCONNECT: u8 = 0xE0;

const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4; // MQTT 3.1.1
const CLEAN_SESSION: u8 = 0x02;

/// Size of the per-connection receive buffer and of any outgoing packet.
pub const BUFFER_SIZE: usize = 256;

/// Connection options sent in the CONNECT packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// The client identifier, unique per broker.
    pub client_id: String<MAX_CLIENT_ID_LEN>,
    /// Keep-alive interval announced to the broker; 0 disables it.
    pub keep_alive_seconds: u16,
    /// Discard any previous session state on the broker.
    pub clean_session: bool,
}

impl Options {
    /// Clean-session options; fails if `client_id` exceeds 23 bytes.
    pub fn new(client_id: &str, keep_alive_seconds: u16) -> Result<Self, Error> {
        let mut id = String::new();
        id.push_str(client_id).map_err(|_| Error::BufferOverflow)?;
        Ok(Self {
            client_id: id,
            keep_alive_seconds,
            clean_session: true,
        })
    }
}

/// An open MQTT connection.
#[derive(Debug)]
pub struct MqttConnection<C: Connection> {
    connection: C,
    rx: Vec<u8, BUFFER_SIZE>,
}

impl<C: Connection> MqttConnection<C> {
    /// The underlying byte stream.
    pub fn connection(&self) -> &C {
        &self.connection
    }
}

/// MQTT 3.1.1 [`Transport`] over a [`Connect`] connector.
#[derive(Debug)]
pub struct MqttTransport<K: Connect> {
    connector: K,
    options: Options,
}

impl<K: Connect> MqttTransport<K> {
    /// Creates a transport that opens connections through `connector`.
    pub fn new(connector: K, options: Options) -> Self {
        Self { connector, options }
    }

    /// The connector, for inspection.
    pub fn connector(&self) -> &K {
        &self.connector
    }

    fn send(conn: &mut K::Connection, packet: &[u8]) -> Result<(), Error> {
        write_all(conn, packet)?;
        conn.flush().map_err(|_| Error::WriteError)
    }
}

impl<K: Connect> Transport for MqttTransport<K> {
    type Handle = MqttConnection<K::Connection>;

    fn connect(&mut self, address: &str) -> Result<Self::Handle, Error> {
        let connection = self.connector.connect(address).map_err(|e| {
            warn!("transport open to {} failed: {:?}", address, e);
            Error::ConnectionRefused
        })?;
        Ok(MqttConnection {
            connection,
            rx: Vec::new(),
        })
    }

    fn send_connect_request(&mut self, handle: &mut Self::Handle) -> Result<(), Error> {
        let client_id = self.options.client_id.as_bytes();
        // Variable header (10) + client id length prefix (2) + client id.
        let remaining_len = 10 + 2 + client_id.len();

        let mut packet: Vec<u8, BUFFER_SIZE> = Vec::new();
        packet.push(CONNECT).map_err(|_| Error::BufferOverflow)?;
        encode_remaining_length(&mut packet, remaining_len)?;

        // --- Variable Header ---
        let mut flags = 0;
        if self.options.clean_session {
            flags |= CLEAN_SESSION;
        }
        extend(&mut packet, &(PROTOCOL_NAME.len() as u16).to_be_bytes())?;
        extend(&mut packet, PROTOCOL_NAME)?;
        extend(&mut packet, &[PROTOCOL_LEVEL, flags])?;
        extend(&mut packet, &self.options.keep_alive_seconds.to_be_bytes())?;

        // --- Payload ---
        extend(&mut packet, &(client_id.len() as u16).to_be_bytes())?;
        extend(&mut packet, client_id)?;

        Self::send(&mut handle.connection, &packet)
    }

    fn poll_incoming(
        &mut self,
        handle: &mut Self::Handle,
        timeout: Duration,
    ) -> Result<Option<TransportEvent>, Error> {
        let readable = handle
            .connection
            .poll_readable(timeout)
            .map_err(|_| Error::ReadError)?;
        if !readable {
            return Ok(None);
        }

        let mut header = [0u8; 1];
        read_exact(&mut handle.connection, &mut header)?;
        let remaining_len = decode_remaining_length(&mut handle.connection)?;
        if remaining_len > BUFFER_SIZE {
            return Err(Error::BufferOverflow);
        }

        handle.rx.clear();
        handle
            .rx
            .resize(remaining_len, 0)
            .map_err(|_| Error::BufferOverflow)?;
        read_exact(&mut handle.connection, &mut handle.rx)?;

        let body = &handle.rx;
        let event = match header[0] & 0xF0 {
            CONNACK => {
                if body.len() != 2 {
                    return Err(Error::ProtocolError);
                }
                TransportEvent::ConnAck {
                    session_present: body[0] & 0x01 != 0,
                    return_code: body[1],
                }
            }
            PINGRESP => TransportEvent::PingResp,
            PUBACK => {
                if body.len() != 2 {
                    return Err(Error::ProtocolError);
                }
                TransportEvent::PubAck(u16::from_be_bytes([body[0], body[1]]))
            }
            PUBLISH => TransportEvent::Publish,
            other => TransportEvent::Other(other >> 4),
        };
        Ok(Some(event))
    }

    fn publish(&mut self, handle: &mut Self::Handle, topic: &str, payload: &[u8]) -> Result<(), Error> {
        let topic_bytes = topic.as_bytes();
        let remaining_len = 2 + topic_bytes.len() + payload.len();

        let mut packet: Vec<u8, BUFFER_SIZE> = Vec::new();
        // QoS 0: no flags, no packet identifier.
        packet.push(PUBLISH).map_err(|_| Error::BufferOverflow)?;
        encode_remaining_length(&mut packet, remaining_len)?;

        // --- Variable Header ---
        extend(&mut packet, &(topic_bytes.len() as u16).to_be_bytes())?;
        extend(&mut packet, topic_bytes)?;

        // --- Payload ---
        extend(&mut packet, payload)?;

        Self::send(&mut handle.connection, &packet)
    }

    fn ping(&mut self, handle: &mut Self::Handle) -> Result<(), Error> {
        Self::send(&mut handle.connection, &[PINGREQ, 0])
    }

    fn disconnect(&mut self, mut handle: Self::Handle) {
        if let Err(e) = Self::send(&mut handle.connection, &[DISCONNECT, 0]) {
            debug!("DISCONNECT not sent: {:?}", e);
        }
        if let Err(e) = handle.connection.close() {
            debug!("close failed: {:?}", e);
        }
    }
}

fn extend<const N: usize>(buf: &mut Vec<u8, N>, bytes: &[u8]) -> Result<(), Error> {
    buf.extend_from_slice(bytes).map_err(|_| Error::BufferOverflow)
}

/// Encode the remaining length field for an MQTT packet.
///
/// Each byte carries 7 bits of the length; the high bit flags a
/// continuation. Four bytes cover lengths up to 268,435,455.
fn encode_remaining_length<const N: usize>(buf: &mut Vec<u8, N>, mut len: usize) -> Result<(), Error> {
    if len > 268_435_455 {
        return Err(Error::BufferOverflow);
    }
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.push(byte).map_err(|_| Error::BufferOverflow)?;
        if len == 0 {
            return Ok(());
        }
    }
}

fn decode_remaining_length<C: Connection>(conn: &mut C) -> Result<usize, Error> {
    let mut len = 0usize;
    let mut multiplier = 1usize;
    for _ in 0..4 {
        let mut byte = [0u8; 1];
        read_exact(conn, &mut byte)?;
        len += (byte[0] & 0x7F) as usize * multiplier;
        if byte[0] & 0x80 == 0 {
            return Ok(len);
        }
        multiplier *= 128;
    }
    Err(Error::ProtocolError)
}
