//! Monotonic time source.
//!
//! Activities read time through [`Clock`] and sleep through
//! [`embedded_hal::delay::DelayNs`], so the same state machines run on a
//! hosted target and under test with a simulated clock.

/// Monotonic uptime source.
pub trait Clock {
    /// Milliseconds since the clock was started. Never goes backwards.
    fn now_ms(&self) -> u64;

    /// Milliseconds elapsed since `since_ms`, saturating at zero.
    fn elapsed_ms(&self, since_ms: u64) -> u64 {
        self.now_ms().saturating_sub(since_ms)
    }
}

#[cfg(feature = "std")]
pub use self::hosted::{StdClock, StdDelay};

#[cfg(feature = "std")]
mod hosted {
    use super::Clock;
    use embedded_hal::delay::DelayNs;
    use std::time::{Duration, Instant};

    /// [`Clock`] backed by [`Instant`], counting from construction.
    #[derive(Debug, Clone, Copy)]
    pub struct StdClock {
        origin: Instant,
    }

    impl StdClock {
        /// Starts a clock at zero.
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
            }
        }
    }

    impl Default for StdClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for StdClock {
        fn now_ms(&self) -> u64 {
            u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
        }
    }

    /// Blocking delay that parks the calling thread.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct StdDelay;

    impl DelayNs for StdDelay {
        fn delay_ns(&mut self, ns: u32) {
            std::thread::sleep(Duration::from_nanos(u64::from(ns)));
        }

        fn delay_ms(&mut self, ms: u32) {
            std::thread::sleep(Duration::from_millis(u64::from(ms)));
        }
    }
}
