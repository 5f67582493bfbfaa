//! Lapse: a hierarchical bit-indexed timer wheel for event-loop timeout
//! management.
//!
//! # Overview
//!
//! The wheel tracks a large population of pending timeouts, each with a fixed
//! `u64` expiry timestamp in a granularity the caller chooses, and reports
//! which have elapsed as the caller advances logical time. It never reads a
//! clock: the caller feeds it a fresh notion of "now" through
//! [`TimerWheel::advance`] and asks how long it may sleep through
//! [`TimerWheel::wait`]. This makes the wheel a natural fit inside an event
//! loop or poll-based multiplexer, and makes every behavior deterministic
//! under test.
//!
//! # Core Guarantees
//!
//! - **O(1) scheduling**: start, stop, and reschedule are constant time
//! - **Amortised O(log delta) expiry**: a record is re-binned at most once
//!   per bit of its original distance from the reference time
//! - **No per-operation allocation**: records live in a slot arena that grows
//!   geometrically and recycles slots through a free list
//! - **Safe by construction**: no `unsafe`; linkage is index-based, and stale
//!   handles are rejected by generation counters
//! - **Deterministic**: time is always a parameter, never an ambient effect
//!
//! # Module Structure
//!
//! - [`wheel`]: The timer wheel engine and its configuration
//! - [`timeout`]: The timeout record and the handle naming a scheduled record
//! - [`clock`]: Optional time sources for callers that want one
//!   ([`WallClock`], [`VirtualClock`])
//! - [`tracing_compat`]: Structured-logging shim (no-op unless the
//!   `tracing-integration` feature is enabled)
//! - `test_utils`: Logging and assertion helpers shared by the test suite
//!   (feature `test-util`)
//!
//! # Example
//!
//! ```
//! use lapse::{TimerWheel, Timeout};
//!
//! let mut wheel: TimerWheel<&'static str> = TimerWheel::new();
//! wheel.start(Timeout::new(5, "five"));
//! wheel.start(Timeout::new(9, "nine"));
//!
//! // Sleep for `wheel.wait()` ticks, then report the new time.
//! assert!(!wheel.advance(4));
//! assert!(wheel.advance(5));
//! assert_eq!(wheel.next_expired().map(Timeout::into_data), Some("five"));
//! assert_eq!(wheel.next_expired(), None);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

mod bits;
mod list;

pub mod clock;
#[cfg(feature = "test-util")]
pub mod test_utils;
pub mod timeout;
pub mod tracing_compat;
pub mod wheel;

pub use clock::{TimeSource, VirtualClock, WallClock};
pub use timeout::{Timeout, TimeoutHandle};
pub use wheel::{TimerWheel, WheelConfig, BIN_COUNT, MAX_WAIT};
