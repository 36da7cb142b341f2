//! Broker session state machine.
//!
//! [`Session`] owns the broker transport and is the only thing that ever
//! touches it. It moves between four states:
//!
//! - `Idle`: no link state observed yet.
//! - `AwaitingLink`: link down, or the last connect cycle gave up.
//! - `Connecting`: a connect cycle is running.
//! - `Connected`: the broker acknowledged the session.
//!
//! A connect cycle makes up to `max_retry_count` attempts (0 = unbounded).
//! Each attempt opens the transport, sends the connect request and waits
//! for the acknowledgment; any failure closes the transport before the next
//! attempt, `connect_retry_backoff` later. A cycle that runs out of attempts
//! reports [`BrokerError::BrokerUnreachable`] and sleeps for
//! `broker_unreachable_cooldown` before another cycle may start.
//!
//! Link loss and servicing errors force-close the transport at once.

use crate::config::{Config, ConfigError, Timings, millis_u32};
use crate::messages::{LinkState, Reading};
use crate::network::error::Error as NetError;
use crate::network::transport::{Transport, TransportEvent};
use crate::payload::ReadingPayloads;
use crate::time::Clock;
use core::fmt::{self, Write as _};
use core::net::SocketAddrV4;
use core::time::Duration;
use embedded_hal::delay::DelayNs;
use heapless::String;
use log::{debug, error, info, warn};

#[cfg(feature = "std")]
pub mod activity;

#[cfg(feature = "std")]
pub use activity::SessionActivity;

/// Most control packets drained from the transport per servicing pass.
const MAX_DRAIN_PER_SERVICE: usize = 8;

/// Where the broker session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No link state observed yet.
    Idle,
    /// Waiting for the link, or cooling down after an unreachable broker.
    AwaitingLink,
    /// A connect cycle is in progress.
    Connecting,
    /// A live, acknowledged broker session exists.
    Connected,
}

/// Broker-side failures. All are transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerError {
    /// The transport could not be opened.
    Open(NetError),
    /// Sending the connect request or reading the answer failed.
    Handshake(NetError),
    /// No acknowledgment arrived in time.
    AckTimeout,
    /// The broker refused the session with this return code.
    Rejected(u8),
    /// The broker answered the connect request with something else.
    UnexpectedPacket,
    /// A whole connect cycle failed.
    BrokerUnreachable {
        /// Attempts made in the cycle.
        attempts: u32,
    },
    /// The link went down while a connect cycle was running.
    LinkLost,
    /// Servicing a live session failed.
    Service(NetError),
}

#[cfg(feature = "defmt")]
impl defmt::Format for BrokerError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            BrokerError::Open(e) => defmt::write!(f, "Open({})", e),
            BrokerError::Handshake(e) => defmt::write!(f, "Handshake({})", e),
            BrokerError::AckTimeout => defmt::write!(f, "AckTimeout"),
            BrokerError::Rejected(code) => defmt::write!(f, "Rejected({})", code),
            BrokerError::UnexpectedPacket => defmt::write!(f, "UnexpectedPacket"),
            BrokerError::BrokerUnreachable { attempts } => {
                defmt::write!(f, "BrokerUnreachable({})", attempts)
            }
            BrokerError::LinkLost => defmt::write!(f, "LinkLost"),
            BrokerError::Service(e) => defmt::write!(f, "Service({})", e),
        }
    }
}

/// Connect and retry timers of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per connect cycle; 0 retries without bound.
    pub max_retry_count: u32,
    /// Pause between two attempts of a cycle.
    pub retry_backoff: Duration,
    /// Pause after a cycle gave up.
    pub unreachable_cooldown: Duration,
    /// How long an attempt waits for the acknowledgment.
    pub connack_timeout: Duration,
}

impl RetryPolicy {
    /// The policy described by the configuration and timers.
    pub fn new(config: &Config, timings: &Timings) -> Self {
        Self {
            max_retry_count: config.max_retry_count,
            retry_backoff: timings.connect_retry_backoff,
            unreachable_cooldown: timings.broker_unreachable_cooldown,
            connack_timeout: timings.connack_timeout,
        }
    }

    fn exhausted(&self, failures: u32) -> bool {
        self.max_retry_count != 0 && failures >= self.max_retry_count
    }
}

/// The broker connection as owned by the session.
pub struct BrokerSession<H> {
    handle: Option<H>,
    retry_count: u32,
    last_attempt_ms: Option<u64>,
}

impl<H> fmt::Debug for BrokerSession<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerSession")
            .field("connected", &self.handle.is_some())
            .field("retry_count", &self.retry_count)
            .field("last_attempt_ms", &self.last_attempt_ms)
            .finish()
    }
}

impl<H> BrokerSession<H> {
    fn new() -> Self {
        Self {
            handle: None,
            retry_count: 0,
            last_attempt_ms: None,
        }
    }

    /// A live transport exists.
    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Failed attempts in the current connect cycle.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Clock time of the most recent connect attempt.
    pub fn last_attempt_ms(&self) -> Option<u64> {
        self.last_attempt_ms
    }
}

/// Broker address as `"a.b.c.d:port"`.
pub type BrokerAddress = String<21>;

/// The broker session state machine.
pub struct Session<T: Transport, C: Clock, D: DelayNs> {
    transport: T,
    clock: C,
    delay: D,
    broker: BrokerAddress,
    policy: RetryPolicy,
    keep_alive: Option<Duration>,
    state: SessionState,
    link_up: bool,
    broker_session: BrokerSession<T::Handle>,
    last_tx_ms: u64,
    ping_sent_ms: Option<u64>,
    last_reading_ms: Option<i64>,
}

impl<T: Transport, C: Clock, D: DelayNs> fmt::Debug for Session<T, C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("broker", &self.broker)
            .field("state", &self.state)
            .field("link_up", &self.link_up)
            .field("broker_session", &self.broker_session)
            .finish_non_exhaustive()
    }
}

impl<T: Transport, C: Clock, D: DelayNs> Session<T, C, D> {
    /// Creates a disconnected session.
    pub fn new(
        transport: T,
        clock: C,
        delay: D,
        broker: SocketAddrV4,
        policy: RetryPolicy,
        keep_alive_seconds: u16,
    ) -> Self {
        let mut address = BrokerAddress::new();
        // "255.255.255.255:65535" is exactly 21 bytes.
        let _ = write!(address, "{}", broker);
        Self {
            transport,
            clock,
            delay,
            broker: address,
            policy,
            keep_alive: (keep_alive_seconds > 0)
                .then(|| Duration::from_secs(u64::from(keep_alive_seconds))),
            state: SessionState::Idle,
            link_up: false,
            broker_session: BrokerSession::new(),
            last_tx_ms: 0,
            ping_sent_ms: None,
            last_reading_ms: None,
        }
    }

    /// Builds a session from a validated configuration.
    pub fn from_config(
        transport: T,
        clock: C,
        delay: D,
        config: &Config,
        timings: &Timings,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            transport,
            clock,
            delay,
            config.broker()?,
            RetryPolicy::new(config, timings),
            config.keep_alive_seconds,
        ))
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Last observed link state.
    pub fn link_up(&self) -> bool {
        self.link_up
    }

    /// The broker connection bookkeeping.
    pub fn broker_session(&self) -> &BrokerSession<T::Handle> {
        &self.broker_session
    }

    /// The broker address.
    pub fn broker(&self) -> &str {
        &self.broker
    }

    /// The transport, for inspection.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The clock timestamps and keep-alive are measured with.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Applies a link transition. Link loss closes a live session at once.
    pub fn on_link_state(&mut self, link: LinkState) {
        self.link_up = link.connected;
        if link.connected {
            debug!("link up");
            return;
        }
        if self.broker_session.is_connected() {
            warn!("link lost, closing broker session");
            self.teardown();
        }
        self.state = SessionState::AwaitingLink;
    }

    /// Forwards a reading to the broker if a session is live.
    ///
    /// Returns how many of the three payloads were published. A failed
    /// publish is logged and leaves the session up.
    pub fn on_reading(&mut self, reading: &Reading) -> usize {
        if self.state != SessionState::Connected {
            warn!("broker session not ready, dropping reading");
            return 0;
        }
        if self
            .last_reading_ms
            .is_some_and(|last| reading.timestamp_ms <= last)
        {
            warn!(
                "reading at {}ms is not newer than the last one, dropped",
                reading.timestamp_ms
            );
            return 0;
        }
        let Some(handle) = self.broker_session.handle.as_mut() else {
            return 0;
        };
        self.last_reading_ms = Some(reading.timestamp_ms);

        let payloads = ReadingPayloads::render(reading);
        let mut published = 0;
        for (topic, payload) in payloads.topics() {
            match self.transport.publish(handle, topic, payload.as_bytes()) {
                Ok(()) => {
                    debug!("{} -> {}", topic, payload);
                    published += 1;
                }
                Err(e) => error!("publish to {} failed: {:?}", topic, e),
            }
        }
        if published > 0 {
            self.last_tx_ms = self.clock.now_ms();
        }
        published
    }

    /// Drains incoming control data and keeps the session alive.
    ///
    /// Any error closes the transport and moves to `AwaitingLink`. A ping
    /// still unanswered a full keep-alive interval after it was sent fails
    /// with `Service(Timeout)`.
    pub fn service(&mut self) -> Result<(), BrokerError> {
        if self.state != SessionState::Connected {
            return Ok(());
        }
        let result = self.drain_and_keep_alive();
        if let Err(e) = result {
            error!("broker session failed: {:?}, dropping connection", e);
            self.teardown();
            self.state = SessionState::AwaitingLink;
        }
        result
    }

    fn drain_and_keep_alive(&mut self) -> Result<(), BrokerError> {
        let Some(handle) = self.broker_session.handle.as_mut() else {
            return Ok(());
        };

        for _ in 0..MAX_DRAIN_PER_SERVICE {
            match self
                .transport
                .poll_incoming(handle, Duration::ZERO)
                .map_err(BrokerError::Service)?
            {
                None => break,
                Some(TransportEvent::PingResp) => {
                    debug!("ping response");
                    self.ping_sent_ms = None;
                }
                Some(event) => debug!("ignoring {:?}", event),
            }
        }

        if let Some(keep_alive) = self.keep_alive {
            // An unanswered ping gets one keep-alive interval.
            if let Some(sent_ms) = self.ping_sent_ms {
                let waited_ms = self.clock.elapsed_ms(sent_ms);
                if u128::from(waited_ms) >= keep_alive.as_millis() {
                    warn!("no ping response after {}ms", waited_ms);
                    return Err(BrokerError::Service(NetError::Timeout));
                }
            }

            let idle_ms = self.clock.elapsed_ms(self.last_tx_ms);
            if u128::from(idle_ms) >= keep_alive.as_millis() {
                self.transport.ping(handle).map_err(BrokerError::Service)?;
                self.last_tx_ms = self.clock.now_ms();
                self.ping_sent_ms = Some(self.last_tx_ms);
                debug!("keep-alive ping sent after {}ms idle", idle_ms);
            }
        }
        Ok(())
    }

    /// Runs a connect cycle if the link is up and no session is live.
    ///
    /// `link_check` is consulted between attempts; when it reports the link
    /// down the cycle is abandoned with [`BrokerError::LinkLost`]. A cycle
    /// that runs out of attempts sleeps for the unreachable cooldown before
    /// returning [`BrokerError::BrokerUnreachable`].
    pub fn maintain(&mut self, link_check: impl FnMut() -> bool) -> Result<(), BrokerError> {
        if !self.link_up || self.broker_session.is_connected() {
            return Ok(());
        }

        info!("connecting to broker {}", self.broker);
        self.state = SessionState::Connecting;
        match self.connect_cycle(link_check) {
            Ok(()) => {
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(BrokerError::LinkLost) => {
                self.state = SessionState::AwaitingLink;
                Err(BrokerError::LinkLost)
            }
            Err(e) => {
                error!(
                    "broker connect failed ({:?}), backing off for {}s",
                    e,
                    self.policy.unreachable_cooldown.as_secs()
                );
                self.state = SessionState::AwaitingLink;
                self.delay
                    .delay_ms(millis_u32(self.policy.unreachable_cooldown));
                Err(e)
            }
        }
    }

    fn connect_cycle(&mut self, mut link_check: impl FnMut() -> bool) -> Result<(), BrokerError> {
        self.broker_session.retry_count = 0;
        loop {
            let failures = self.broker_session.retry_count;
            if self.policy.exhausted(failures) {
                error!("broker unreachable after {} attempt(s)", failures);
                return Err(BrokerError::BrokerUnreachable { attempts: failures });
            }
            if failures > 0 {
                self.delay.delay_ms(millis_u32(self.policy.retry_backoff));
                if !link_check() {
                    warn!("link lost after {} attempt(s), abandoning connect", failures);
                    return Err(BrokerError::LinkLost);
                }
            }

            let attempt = failures + 1;
            self.broker_session.last_attempt_ms = Some(self.clock.now_ms());
            match self.attempt() {
                Ok(handle) => {
                    info!("broker session ready (attempt {})", attempt);
                    self.broker_session.handle = Some(handle);
                    self.broker_session.retry_count = 0;
                    self.last_tx_ms = self.clock.now_ms();
                    self.ping_sent_ms = None;
                    return Ok(());
                }
                Err(e) => {
                    warn!("connect attempt {} failed: {:?}", attempt, e);
                    self.broker_session.retry_count = attempt;
                }
            }
        }
    }

    fn attempt(&mut self) -> Result<T::Handle, BrokerError> {
        let mut handle = self
            .transport
            .connect(&self.broker)
            .map_err(BrokerError::Open)?;
        match self.handshake(&mut handle) {
            Ok(()) => Ok(handle),
            Err(e) => {
                self.transport.disconnect(handle);
                Err(e)
            }
        }
    }

    fn handshake(&mut self, handle: &mut T::Handle) -> Result<(), BrokerError> {
        self.transport
            .send_connect_request(handle)
            .map_err(BrokerError::Handshake)?;
        match self
            .transport
            .poll_incoming(handle, self.policy.connack_timeout)
        {
            Ok(Some(TransportEvent::ConnAck { return_code: 0, .. })) => Ok(()),
            Ok(Some(TransportEvent::ConnAck { return_code, .. })) => {
                Err(BrokerError::Rejected(return_code))
            }
            Ok(Some(_)) => Err(BrokerError::UnexpectedPacket),
            Ok(None) => Err(BrokerError::AckTimeout),
            Err(e) => Err(BrokerError::Handshake(e)),
        }
    }

    fn teardown(&mut self) {
        self.ping_sent_ms = None;
        if let Some(handle) = self.broker_session.handle.take() {
            self.transport.disconnect(handle);
            info!("broker session closed");
        }
    }
}
