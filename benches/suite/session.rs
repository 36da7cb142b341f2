use criterion::Criterion;
use embedded_hal::delay::DelayNs;
use envlink::messages::{LinkState, Reading};
use envlink::network::error::Error;
use envlink::network::transport::{Transport, TransportEvent};
use envlink::session::{RetryPolicy, Session};
use envlink::time::Clock;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

/// Accepts every connect and discards every publish.
struct NullTransport;

impl Transport for NullTransport {
    type Handle = ();

    fn connect(&mut self, _address: &str) -> Result<(), Error> {
        Ok(())
    }

    fn send_connect_request(&mut self, _handle: &mut ()) -> Result<(), Error> {
        Ok(())
    }

    fn poll_incoming(&mut self, _handle: &mut (), _timeout: Duration) -> Result<Option<TransportEvent>, Error> {
        Ok(Some(TransportEvent::ConnAck {
            session_present: false,
            return_code: 0,
        }))
    }

    fn publish(&mut self, _handle: &mut (), _topic: &str, _payload: &[u8]) -> Result<(), Error> {
        Ok(())
    }

    fn ping(&mut self, _handle: &mut ()) -> Result<(), Error> {
        Ok(())
    }

    fn disconnect(&mut self, _handle: ()) {}
}

struct FrozenClock;

impl Clock for FrozenClock {
    fn now_ms(&self) -> u64 {
        0
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

pub fn bench_forward_reading(c: &mut Criterion) {
    let policy = RetryPolicy {
        max_retry_count: 3,
        retry_backoff: Duration::from_secs(5),
        unreachable_cooldown: Duration::from_secs(30),
        connack_timeout: Duration::from_secs(5),
    };
    let mut session = Session::new(
        NullTransport,
        FrozenClock,
        NoDelay,
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, 1883),
        policy,
        60,
    );
    session.on_link_state(LinkState::UP);
    session.maintain(|| true).unwrap();

    let mut reading = Reading {
        timestamp_ms: 0,
        temperature_millidegc: 23_456,
        humidity_millipercent: 55_500,
        pressure_pa: 101_325,
    };
    c.bench_function("forward_reading", |b| {
        b.iter(|| {
            reading.timestamp_ms += 1;
            session.on_reading(&reading)
        })
    });
}
