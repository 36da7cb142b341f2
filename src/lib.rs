//! # envlink - environmental sensor firmware core
//!
//! A connected sensor node samples temperature, humidity and pressure on a
//! fixed period and forwards each reading to an MQTT broker. Three
//! activities cooperate through a typed, latest-value publish/subscribe bus:
//!
//! - the **link** activity watches the radio and publishes [`LinkState`]
//!   transitions, reconnecting immediately whenever the link drops;
//! - the **sensor** activity publishes a [`Reading`] every period;
//! - the **session** activity owns the broker connection, connects when the
//!   link comes up, retries with a fixed backoff, keeps the session alive
//!   and publishes every reading to `sensors/temperature`,
//!   `sensors/humidity` and `sensors/pressure`.
//!
//! Each bus channel retains its latest value. A subscriber that falls behind
//! sees only the most recent message per channel, in publish order across
//! channels.
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! envlink = "0.1.0"
//! ```
//!
//! Drivers plug in through three traits: [`link::Radio`],
//! [`sensor::Sensor`] and [`network::transport::Transport`] (an MQTT 3.1.1
//! implementation over any [`network::Connect`] is provided). With the
//! `std` feature, [`runtime::Runtime`] wires everything up on threads.
//!
//! ## Optional Features
//!
//! - `std`: bus, activities, runtime, TCP connector and std clock (default)
//! - `defmt`: `defmt::Format` implementations for embedded logging
//!
//! [`LinkState`]: messages::LinkState
//! [`Reading`]: messages::Reading

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

/// Messages carried by the bus.
pub mod messages;

/// Broker topics and payload formatting.
pub mod payload;

/// Device configuration and fixed timers.
pub mod config;

/// Crate-wide error taxonomy.
pub mod error;

/// Monotonic time source.
pub mod time;

/// Connection traits, the broker transport contract and its MQTT
/// implementation.
pub mod network;

/// The typed latest-value publish/subscribe bus.
#[cfg(feature = "std")]
pub mod bus;

/// Sensor sampling and scaling.
pub mod sensor;

/// Network link monitoring.
pub mod link;

/// The broker session state machine.
pub mod session;

/// Threaded wiring of the three activities.
#[cfg(feature = "std")]
pub mod runtime;

pub use error::Error;
