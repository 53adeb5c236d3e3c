//! relaylab Environment Abstraction Layer
//!
//! This crate intercepts the two sources of non-determinism that the
//! transport simulation engine would otherwise pick up from its host:
//!
//! - **Time**: [`VirtualClock`] is a deterministic timer queue. Nothing
//!   in the engine reads a wall clock; all scheduling goes through
//!   `schedule()` / `cancel()`, and time only moves when the owner
//!   pops due timers.
//! - **Randomness**: [`Entropy`] is an injectable chance source.
//!   [`SeededEntropy`] derives every probabilistic outcome (flaky
//!   drops, reconnect success) from a single 64-bit seed, so any run
//!   is reproducible from its seed number.
//!
//! # Example
//!
//! ```
//! use relaylab_env::VirtualClock;
//! use std::time::Duration;
//!
//! let mut clock: VirtualClock<&str> = VirtualClock::new();
//! clock.schedule(Duration::from_millis(100), "tick");
//! let fired = clock.pop_next().unwrap();
//! assert_eq!(fired.event, "tick");
//! assert_eq!(clock.now(), Duration::from_millis(100));
//! ```

mod clock;
mod entropy;

pub use clock::{Fired, TimerId, VirtualClock};
pub use entropy::{Entropy, SeededEntropy};
