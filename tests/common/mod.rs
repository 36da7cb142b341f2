#![allow(dead_code)]

use embedded_hal::delay::DelayNs;
use envlink::link::{Radio, RadioEvent};
use envlink::network::error::Error;
use envlink::network::transport::{Transport, TransportEvent};
use envlink::network::{Close, Connect, Connection, Poll, Read, Write};
use envlink::sensor::{Q31Sample, RawBuffer, Sensor, SensorChannel};
use envlink::time::Clock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Simulated uptime, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MockClock(Arc<AtomicU64>);

impl MockClock {
    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.0.store(ms, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Records every sleep and advances the clock by it instead of blocking.
#[derive(Debug, Clone, Default)]
pub struct MockDelay {
    clock: MockClock,
    sleeps: Arc<Mutex<Vec<u32>>>,
}

impl MockDelay {
    pub fn new(clock: MockClock) -> Self {
        Self {
            clock,
            sleeps: Arc::default(),
        }
    }

    /// Sleeps taken so far, in milliseconds.
    pub fn sleeps(&self) -> Vec<u32> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.advance(u64::from(ns / 1_000_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.sleeps.lock().unwrap().push(ms);
        self.clock.advance(u64::from(ms));
    }
}

// ---------------------------------------------------------------------------
// Broker transport
// ---------------------------------------------------------------------------

/// Outcome of one scripted connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// The transport cannot be opened.
    Refused,
    /// Opened, but the acknowledgment never arrives.
    NoAck,
    /// Opened and acknowledged with this return code.
    Ack(u8),
    /// Opened, then answered with a packet that is not an acknowledgment.
    Unexpected,
}

#[derive(Debug)]
pub struct TransportState {
    /// Outcomes consumed by successive connect attempts.
    pub script: VecDeque<Attempt>,
    /// Outcome once the script is exhausted.
    pub fallback: Attempt,
    /// Results returned by `poll_incoming` on a live session.
    pub incoming: VecDeque<Result<Option<TransportEvent>, Error>>,
    /// Publishes to this topic fail.
    pub failing_topic: Option<&'static str>,
    pub addresses: Vec<String>,
    pub connects: usize,
    pub opened: usize,
    pub closed: usize,
    pub pings: usize,
    pub published: Vec<(String, String)>,
}

impl TransportState {
    pub fn open_handles(&self) -> usize {
        self.opened - self.closed
    }
}

/// Scripted [`Transport`] whose state stays inspectable after the session
/// takes ownership of it.
#[derive(Debug, Clone)]
pub struct MockTransport(Arc<Mutex<TransportState>>);

#[derive(Debug)]
pub struct MockHandle {
    pending_ack: Option<Attempt>,
}

impl MockTransport {
    pub fn new(fallback: Attempt) -> Self {
        Self(Arc::new(Mutex::new(TransportState {
            script: VecDeque::new(),
            fallback,
            incoming: VecDeque::new(),
            failing_topic: None,
            addresses: Vec::new(),
            connects: 0,
            opened: 0,
            closed: 0,
            pings: 0,
            published: Vec::new(),
        })))
    }

    pub fn scripted(script: &[Attempt], fallback: Attempt) -> Self {
        let transport = Self::new(fallback);
        transport.state().script.extend(script.iter().copied());
        transport
    }

    pub fn state(&self) -> MutexGuard<'_, TransportState> {
        self.0.lock().unwrap()
    }

    /// Published `(topic, payload)` pairs with string literals for easy
    /// comparison.
    pub fn published(&self) -> Vec<(String, String)> {
        self.state().published.clone()
    }
}

impl Transport for MockTransport {
    type Handle = MockHandle;

    fn connect(&mut self, address: &str) -> Result<MockHandle, Error> {
        let mut state = self.state();
        state.connects += 1;
        state.addresses.push(address.to_string());
        let attempt = state.script.pop_front().unwrap_or(state.fallback);
        if attempt == Attempt::Refused {
            return Err(Error::ConnectionRefused);
        }
        state.opened += 1;
        Ok(MockHandle {
            pending_ack: Some(attempt),
        })
    }

    fn send_connect_request(&mut self, _handle: &mut MockHandle) -> Result<(), Error> {
        Ok(())
    }

    fn poll_incoming(
        &mut self,
        handle: &mut MockHandle,
        _timeout: Duration,
    ) -> Result<Option<TransportEvent>, Error> {
        if let Some(attempt) = handle.pending_ack.take() {
            return Ok(match attempt {
                Attempt::Ack(return_code) => Some(TransportEvent::ConnAck {
                    session_present: false,
                    return_code,
                }),
                Attempt::Unexpected => Some(TransportEvent::PingResp),
                Attempt::NoAck | Attempt::Refused => None,
            });
        }
        self.state().incoming.pop_front().unwrap_or(Ok(None))
    }

    fn publish(&mut self, _handle: &mut MockHandle, topic: &str, payload: &[u8]) -> Result<(), Error> {
        let mut state = self.state();
        if state.failing_topic == Some(topic) {
            return Err(Error::WriteError);
        }
        let payload = String::from_utf8(payload.to_vec()).unwrap();
        state.published.push((topic.to_string(), payload));
        Ok(())
    }

    fn ping(&mut self, _handle: &mut MockHandle) -> Result<(), Error> {
        self.state().pings += 1;
        Ok(())
    }

    fn disconnect(&mut self, _handle: MockHandle) {
        self.state().closed += 1;
    }
}

pub fn published(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(topic, payload)| (topic.to_string(), payload.to_string()))
        .collect()
}

// ---------------------------------------------------------------------------
// Byte stream
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Wire {
    /// Bytes the broker sends to the device.
    pub inbound: VecDeque<u8>,
    /// Bytes the device wrote.
    pub outbound: Vec<u8>,
    pub closed: bool,
    pub refuse: bool,
}

/// [`Connect`] over an in-memory [`Wire`].
#[derive(Debug, Clone, Default)]
pub struct MockNetwork(pub Arc<Mutex<Wire>>);

impl MockNetwork {
    pub fn wire(&self) -> MutexGuard<'_, Wire> {
        self.0.lock().unwrap()
    }

    pub fn feed(&self, bytes: &[u8]) {
        self.wire().inbound.extend(bytes.iter().copied());
    }

    pub fn take_outbound(&self) -> Vec<u8> {
        std::mem::take(&mut self.wire().outbound)
    }
}

#[derive(Debug)]
pub struct MockConnection(Arc<Mutex<Wire>>);

impl Read for MockConnection {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut wire = self.0.lock().unwrap();
        if wire.closed {
            return Err(Error::NotOpen);
        }
        let len = buf.len().min(wire.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(wire.inbound.drain(..len)) {
            *slot = byte;
        }
        Ok(len)
    }
}

impl Write for MockConnection {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut wire = self.0.lock().unwrap();
        if wire.closed {
            return Err(Error::NotOpen);
        }
        wire.outbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Close for MockConnection {
    type Error = Error;

    fn close(self) -> Result<(), Self::Error> {
        self.0.lock().unwrap().closed = true;
        Ok(())
    }
}

impl Poll for MockConnection {
    type Error = Error;

    fn poll_readable(&mut self, _timeout: Duration) -> Result<bool, Self::Error> {
        Ok(!self.0.lock().unwrap().inbound.is_empty())
    }
}

impl Connection for MockConnection {}

impl Connect for MockNetwork {
    type Connection = MockConnection;
    type Error = Error;

    fn connect(&mut self, _remote: &str) -> Result<Self::Connection, Self::Error> {
        let mut wire = self.wire();
        if wire.refuse {
            return Err(Error::ConnectionRefused);
        }
        wire.closed = false;
        Ok(MockConnection(self.0.clone()))
    }
}

// ---------------------------------------------------------------------------
// Radio
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RadioState {
    pub events: VecDeque<RadioEvent>,
    /// Connect requests to refuse before accepting.
    pub refusals: usize,
    pub connect_calls: usize,
    pub last_ssid: String,
}

#[derive(Debug, Clone, Default)]
pub struct MockRadio(Arc<Mutex<RadioState>>);

impl MockRadio {
    pub fn with_events(events: &[RadioEvent]) -> Self {
        let radio = Self::default();
        radio.state().events.extend(events.iter().copied());
        radio
    }

    pub fn state(&self) -> MutexGuard<'_, RadioState> {
        self.0.lock().unwrap()
    }

    pub fn push(&self, event: RadioEvent) {
        self.state().events.push_back(event);
    }
}

impl Radio for MockRadio {
    type Error = ();

    fn connect(&mut self, ssid: &str, _credentials: &str) -> Result<(), ()> {
        let mut state = self.state();
        state.connect_calls += 1;
        state.last_ssid = ssid.to_string();
        if state.refusals > 0 {
            state.refusals -= 1;
            return Err(());
        }
        Ok(())
    }

    fn next_event(&mut self, timeout: Duration) -> Option<RadioEvent> {
        let event = self.state().events.pop_front();
        if event.is_none() {
            // Keep threaded tests from spinning.
            std::thread::sleep(timeout.min(Duration::from_millis(5)));
        }
        event
    }
}

// ---------------------------------------------------------------------------
// Sensor
// ---------------------------------------------------------------------------

/// Q31 encoding of `milli / 1000` with binary exponent `shift`, exact under
/// truncating scaling as long as `31 - shift >= 10`.
pub fn q31(milli: i64, shift: i8) -> Q31Sample {
    let numerator = milli << (31 - i32::from(shift));
    let ceil = numerator.div_euclid(1000) + i64::from(numerator.rem_euclid(1000) != 0);
    Q31Sample {
        value: i32::try_from(ceil).unwrap(),
        shift,
    }
}

/// Temperature, humidity and pressure of one scripted read.
pub type Triple = [Q31Sample; 3];

pub fn triple(temperature: i64, humidity: i64, pressure: i64) -> Triple {
    [q31(temperature, 8), q31(humidity, 7), q31(pressure, 7)]
}

#[derive(Debug, Default)]
pub struct SensorState {
    /// `is_ready` calls answered `false` before the device comes up.
    pub not_ready_polls: usize,
    pub reads: VecDeque<Result<Triple, ()>>,
    /// Returned once `reads` is empty; `None` fails the read.
    pub fallback: Option<Triple>,
    /// Decoding this channel fails.
    pub broken_channel: Option<SensorChannel>,
    pub read_calls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MockSensor(Arc<Mutex<SensorState>>);

impl MockSensor {
    pub fn steady(samples: Triple) -> Self {
        let sensor = Self::default();
        sensor.state().fallback = Some(samples);
        sensor
    }

    pub fn state(&self) -> MutexGuard<'_, SensorState> {
        self.0.lock().unwrap()
    }
}

fn channel_index(channel: SensorChannel) -> usize {
    match channel {
        SensorChannel::Temperature => 0,
        SensorChannel::Humidity => 1,
        SensorChannel::Pressure => 2,
    }
}

impl Sensor for MockSensor {
    type Error = ();

    fn is_ready(&mut self) -> bool {
        let mut state = self.state();
        if state.not_ready_polls > 0 {
            state.not_ready_polls -= 1;
            return false;
        }
        true
    }

    fn read(&mut self) -> Result<RawBuffer, ()> {
        let mut state = self.state();
        state.read_calls += 1;
        let samples = match state.reads.pop_front() {
            Some(read) => read?,
            None => state.fallback.ok_or(())?,
        };
        let mut raw = RawBuffer::new();
        for sample in samples {
            raw.extend_from_slice(&sample.value.to_be_bytes()).map_err(|_| ())?;
            raw.push(sample.shift as u8).map_err(|_| ())?;
        }
        Ok(raw)
    }

    fn decode(&self, raw: &RawBuffer, channel: SensorChannel) -> Result<Q31Sample, ()> {
        if self.state().broken_channel == Some(channel) {
            return Err(());
        }
        let start = channel_index(channel) * 5;
        let bytes = raw.get(start..start + 5).ok_or(())?;
        Ok(Q31Sample {
            value: i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            shift: bytes[4] as i8,
        })
    }
}
