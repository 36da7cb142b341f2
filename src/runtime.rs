//! Threaded runtime: one bus, three activities.
//!
//! ```rust,no_run
//! use envlink::config::{Config, Timings};
//! use envlink::network::mqtt::{MqttTransport, Options};
//! use envlink::network::tcp::TcpConnector;
//! use envlink::runtime::Runtime;
//! # use envlink::link::{Radio, RadioEvent};
//! # use envlink::sensor::{Q31Sample, RawBuffer, Sensor, SensorChannel};
//! # use core::time::Duration;
//! # struct Wifi;
//! # impl Radio for Wifi {
//! #     type Error = ();
//! #     fn connect(&mut self, _: &str, _: &str) -> Result<(), ()> { Ok(()) }
//! #     fn next_event(&mut self, _: Duration) -> Option<RadioEvent> { None }
//! # }
//! # struct Bme280;
//! # impl Sensor for Bme280 {
//! #     type Error = ();
//! #     fn is_ready(&mut self) -> bool { true }
//! #     fn read(&mut self) -> Result<RawBuffer, ()> { Ok(RawBuffer::new()) }
//! #     fn decode(&self, _: &RawBuffer, _: SensorChannel) -> Result<Q31Sample, ()> { Err(()) }
//! # }
//!
//! let config = Config::from_json(
//!     r#"{"wifi_ssid":"greenhouse","wifi_psk":"hunter22","broker_addr":"192.168.1.10"}"#,
//! )
//! .unwrap();
//! let options = Options::new(&config.client_id, config.keep_alive_seconds).unwrap();
//! let transport = MqttTransport::new(TcpConnector::default(), options);
//!
//! let runtime = Runtime::start(&config, Timings::default(), Wifi, Bme280, transport).unwrap();
//! assert!(!runtime.is_finished());
//! ```

use crate::bus::{Bus, ChannelId};
use crate::config::{Config, Timings};
use crate::error::Error;
use crate::link::{Credentials, LinkActivity, LinkMonitor, Radio};
use crate::network::transport::Transport;
use crate::sensor::{Sampler, Sensor, SensorActivity};
use crate::session::{Session, SessionActivity};
use crate::time::{StdClock, StdDelay};
use log::{error, info};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Handles of the running activities.
#[derive(Debug)]
pub struct Runtime {
    bus: Arc<Bus>,
    threads: [JoinHandle<()>; 3],
}

impl Runtime {
    /// Validates `config` and starts the link, sensor and session
    /// activities on their own threads.
    ///
    /// Nothing is started if the configuration is invalid.
    pub fn start<R, S, T>(
        config: &Config,
        timings: Timings,
        radio: R,
        sensor: S,
        transport: T,
    ) -> Result<Self, Error>
    where
        R: Radio + Send + 'static,
        S: Sensor + Send + 'static,
        T: Transport + Send + 'static,
        T::Handle: Send,
    {
        config.validate().inspect_err(|e| error!("invalid configuration: {:?}", e))?;

        let clock = StdClock::new();
        let bus = Arc::new(Bus::new());
        let subscriber = bus
            .subscribe(&ChannelId::ALL)
            .map_err(|_| Error::Startup)?;

        let session = Session::from_config(transport, clock, StdDelay, config, &timings)?;
        let session = SessionActivity::new(session, subscriber, bus.clone(), config.service_tick());

        let credentials = Credentials {
            ssid: config.wifi_ssid.clone(),
            psk: config.wifi_psk.clone(),
        };
        let link = LinkActivity::new(
            LinkMonitor::new(radio, credentials),
            bus.clone(),
            timings.link_idle_tick,
        );

        let sensor = SensorActivity::new(
            Sampler::new(sensor, clock),
            StdDelay,
            bus.clone(),
            config.sensor_read_interval(),
            timings,
        );

        // The session thread goes first so it sees the first link transition.
        let session = spawn("session", move || session.run())?;
        let link = spawn("link", move || link.run())?;
        let sensor = spawn("sensor", move || sensor.run())?;

        info!("activities started, broker {}:{}", config.broker_addr, config.broker_port);
        Ok(Self {
            bus,
            threads: [link, sensor, session],
        })
    }

    /// The bus shared by the activities.
    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    /// Whether any activity thread has exited, which only happens on panic.
    pub fn is_finished(&self) -> bool {
        self.threads.iter().any(JoinHandle::is_finished)
    }
}

fn spawn<F>(name: &str, activity: F) -> Result<JoinHandle<()>, Error>
where
    F: FnOnce() -> core::convert::Infallible + Send + 'static,
{
    thread::Builder::new()
        .name(name.into())
        .spawn(move || match activity() {})
        .map_err(|e| {
            error!("spawning the {} activity failed: {}", name, e);
            Error::Startup
        })
}
