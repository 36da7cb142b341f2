//! Typed latest-value publish/subscribe bus.
//!
//! The bus has a fixed set of channels, one per message type. Publishing
//! overwrites the channel's retained value and drops the message into a
//! one-slot mailbox per registered subscriber, then wakes that subscriber.
//! A subscriber that falls behind only ever sees the newest pending message
//! of a channel; pending messages from different channels are handed out
//! oldest first, so cross-channel publish order is preserved.
//!
//! ```rust
//! use core::time::Duration;
//! use envlink::bus::{Bus, ChannelId, Message};
//! use envlink::messages::LinkState;
//!
//! let bus = Bus::new();
//! let subscriber = bus.subscribe(&[ChannelId::LinkState]).unwrap();
//!
//! bus.publish(LinkState::UP).unwrap();
//!
//! let (channel, message) = subscriber.wait(Duration::from_millis(10)).unwrap();
//! assert_eq!(channel, ChannelId::LinkState);
//! assert_eq!(message, Message::LinkState(LinkState::UP));
//! ```

use crate::messages::{LinkState, Reading};
use core::time::Duration;
use heapless::Vec;
use log::trace;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Instant;


/// Number of channels on the bus.
pub const CHANNEL_COUNT: usize = 2;

/// Most subscribers a single channel accepts.
pub const MAX_SUBSCRIBERS: usize = 4;

/// Identifies one of the statically declared channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    /// Carries [`LinkState`].
    LinkState = 0,
    /// Carries [`Reading`].
    Reading = 1,
}

impl ChannelId {
    /// All channels, in index order.
    pub const ALL: [ChannelId; CHANNEL_COUNT] = [ChannelId::LinkState, ChannelId::Reading];

    /// Channel name, for logs.
    pub fn name(self) -> &'static str {
        match self {
            ChannelId::LinkState => "link_state",
            ChannelId::Reading => "reading",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// A message of any channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// From [`ChannelId::LinkState`].
    LinkState(LinkState),
    /// From [`ChannelId::Reading`].
    Reading(Reading),
}

/// A type that has a channel of its own on the bus.
pub trait ChannelMessage: Copy + Default + Send + 'static {
    /// The channel carrying this type.
    const CHANNEL: ChannelId;
    /// Channel-type validation; `false` makes a publish fail with
    /// [`BusError::InvalidMessage`].
    fn validate(&self) -> bool;
    /// Wraps the value into a [`Message`].
    fn into_message(self) -> Message;
    /// Unwraps a [`Message`] of this channel.
    fn from_message(message: Message) -> Option<Self>;
}

impl ChannelMessage for LinkState {
    const CHANNEL: ChannelId = ChannelId::LinkState;

    fn validate(&self) -> bool {
        true
    }

    fn into_message(self) -> Message {
        Message::LinkState(self)
    }

    fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::LinkState(state) => Some(state),
            Message::Reading(_) => None,
        }
    }
}

impl ChannelMessage for Reading {
    const CHANNEL: ChannelId = ChannelId::Reading;

    fn validate(&self) -> bool {
        self.is_valid()
    }

    fn into_message(self) -> Message {
        Message::Reading(self)
    }

    fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Reading(reading) => Some(reading),
            Message::LinkState(_) => None,
        }
    }
}

/// Publish and registration failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// Another dispatch on the channel is in progress; nothing was delivered.
    ChannelBusy,
    /// The payload failed channel-type validation.
    InvalidMessage,
    /// A channel already has [`MAX_SUBSCRIBERS`] subscribers.
    TooManySubscribers,
}

/// Outcome of a wait that produced no message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// No subscribed channel published before the timeout. This is the idle
    /// tick, not a failure.
    Timeout,
}

#[cfg(feature = "defmt")]
impl defmt::Format for BusError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            BusError::ChannelBusy => defmt::write!(f, "ChannelBusy"),
            BusError::InvalidMessage => defmt::write!(f, "InvalidMessage"),
            BusError::TooManySubscribers => defmt::write!(f, "TooManySubscribers"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    sequence: u64,
    message: Message,
}

#[derive(Debug)]
struct Mailbox {
    slots: Mutex<[Option<Pending>; CHANNEL_COUNT]>,
    ready: Condvar,
    active: AtomicBool,
}

impl Mailbox {
    fn deliver(&self, channel: ChannelId, pending: Pending) {
        let mut slots = lock(&self.slots);
        if let Some(superseded) = slots[channel.index()].replace(pending) {
            trace!(
                "{}: message #{} superseded before delivery",
                channel.name(),
                superseded.sequence
            );
        }
        drop(slots);
        self.ready.notify_all();
    }
}

#[derive(Debug)]
struct ChannelState {
    retained: Message,
    observers: Vec<Arc<Mailbox>, MAX_SUBSCRIBERS>,
}

#[derive(Debug)]
struct Channel {
    id: ChannelId,
    state: Mutex<ChannelState>,
}

/// The bus. Shared between activities behind an [`Arc`].
#[derive(Debug)]
pub struct Bus {
    channels: [Channel; CHANNEL_COUNT],
    sequence: AtomicU64,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    /// Creates the bus with every channel holding its initial value
    /// (link down, all-zero reading).
    pub fn new() -> Self {
        let channel = |id: ChannelId, retained: Message| Channel {
            id,
            state: Mutex::new(ChannelState {
                retained,
                observers: Vec::new(),
            }),
        };
        Self {
            channels: [
                channel(ChannelId::LinkState, Message::LinkState(LinkState::DOWN)),
                channel(ChannelId::Reading, Message::Reading(Reading::default())),
            ],
            sequence: AtomicU64::new(0),
        }
    }

    /// Publishes `message` on its channel without blocking.
    ///
    /// On success the retained value is replaced and every subscriber of the
    /// channel has the message pending.
    pub fn publish<M: ChannelMessage>(&self, message: M) -> Result<(), BusError> {
        if !message.validate() {
            return Err(BusError::InvalidMessage);
        }

        let channel = &self.channels[M::CHANNEL.index()];
        let mut state = match channel.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(BusError::ChannelBusy),
        };

        // Taken under the channel lock so sequence order matches publish
        // order within the channel.
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let message = message.into_message();
        state.retained = message;
        state
            .observers
            .retain(|mailbox| mailbox.active.load(Ordering::Acquire));
        for mailbox in state.observers.iter() {
            mailbox.deliver(channel.id, Pending { sequence, message });
        }
        Ok(())
    }

    /// The last value published on `M`'s channel, or its initial value.
    pub fn retained<M: ChannelMessage>(&self) -> M {
        let state = lock(&self.channels[M::CHANNEL.index()].state);
        // A channel only ever retains its own message type.
        M::from_message(state.retained).unwrap_or_default()
    }

    /// Shorthand for the retained [`LinkState`].
    pub fn link_state(&self) -> LinkState {
        self.retained()
    }

    /// Registers a subscriber for `channels`.
    ///
    /// The subscriber only sees messages published after this call.
    pub fn subscribe(&self, channels: &[ChannelId]) -> Result<Subscriber, BusError> {
        let mailbox = Arc::new(Mailbox {
            slots: Mutex::new([None; CHANNEL_COUNT]),
            ready: Condvar::new(),
            active: AtomicBool::new(true),
        });

        for id in channels {
            let mut state = lock(&self.channels[id.index()].state);
            if state.observers.iter().any(|m| Arc::ptr_eq(m, &mailbox)) {
                continue;
            }
            state
                .observers
                .retain(|m| m.active.load(Ordering::Acquire));
            if state.observers.push(Arc::clone(&mailbox)).is_err() {
                // Registrations made so far are pruned lazily.
                mailbox.active.store(false, Ordering::Release);
                return Err(BusError::TooManySubscribers);
            }
        }

        Ok(Subscriber { mailbox })
    }
}

/// A registered subscriber. Dropping it unregisters it.
#[derive(Debug)]
pub struct Subscriber {
    mailbox: Arc<Mailbox>,
}

impl Subscriber {
    /// Blocks until a subscribed channel has a pending message or `timeout`
    /// elapses.
    pub fn wait(&self, timeout: Duration) -> Result<(ChannelId, Message), WaitError> {
        let deadline = Instant::now() + timeout;
        let mut slots = lock(&self.mailbox.slots);
        loop {
            if let Some(next) = take_oldest(&mut slots) {
                return Ok(next);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(WaitError::Timeout);
            }
            let (guard, _) = self
                .mailbox
                .ready
                .wait_timeout(slots, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            slots = guard;
        }
    }

    /// Takes the oldest pending message without blocking.
    pub fn try_next(&self) -> Option<(ChannelId, Message)> {
        take_oldest(&mut lock(&self.mailbox.slots))
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.mailbox.active.store(false, Ordering::Release);
    }
}

fn take_oldest(slots: &mut [Option<Pending>; CHANNEL_COUNT]) -> Option<(ChannelId, Message)> {
    let (index, _) = slots
        .iter()
        .enumerate()
        .filter_map(|(index, slot)| slot.map(|pending| (index, pending.sequence)))
        .min_by_key(|&(_, sequence)| sequence)?;
    let pending = slots[index].take()?;
    Some((ChannelId::ALL[index], pending.message))
}
