//! Time sources for callers that want one.
//!
//! The wheel itself never reads a clock — `now` is always a parameter. This
//! module is the thin collaborator that produces those parameters:
//! [`WallClock`] for production loops, [`VirtualClock`] for deterministic
//! tests. Both count ticks in whatever granularity the caller picked for the
//! wheel (the wall clock defaults to milliseconds).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of the caller's notion of "now", in wheel ticks.
pub trait TimeSource: Send + Sync {
    /// Returns the current time in ticks.
    fn now(&self) -> u64;
}

/// Error returned for a wall clock configured with an unusable tick unit.
#[derive(Debug, Clone, thiserror::Error)]
#[error("clock tick {tick:?} must be a positive duration")]
pub struct InvalidTick {
    /// The rejected tick unit.
    pub tick: Duration,
}

/// Monotonic wall-clock time source.
///
/// Counts ticks of a fixed unit since the clock was created, using
/// `std::time::Instant`. Tick zero is the moment of construction, which
/// pairs with a wheel whose reference time starts at zero.
#[derive(Debug)]
pub struct WallClock {
    epoch: Instant,
    tick_nanos: u64,
}

impl WallClock {
    /// Creates a wall clock counting milliseconds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            tick_nanos: 1_000_000,
        }
    }

    /// Creates a wall clock counting ticks of `tick`.
    pub fn with_tick(tick: Duration) -> Result<Self, InvalidTick> {
        if tick.is_zero() {
            return Err(InvalidTick { tick });
        }
        Ok(Self {
            epoch: Instant::now(),
            tick_nanos: tick.as_nanos().min(u128::from(u64::MAX)) as u64,
        })
    }

    /// Returns the tick unit.
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_nanos(self.tick_nanos)
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClock {
    fn now(&self) -> u64 {
        let elapsed = self.epoch.elapsed().as_nanos();
        (elapsed / u128::from(self.tick_nanos)).min(u128::from(u64::MAX)) as u64
    }
}

/// Virtual time source for deterministic tests.
///
/// Time only moves when told to, so time-dependent behavior can be driven
/// tick by tick.
///
/// # Example
///
/// ```
/// use lapse::{TimeSource, VirtualClock};
///
/// let clock = VirtualClock::new();
/// assert_eq!(clock.now(), 0);
///
/// clock.advance(25);
/// assert_eq!(clock.now(), 25);
/// ```
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: AtomicU64,
}

impl VirtualClock {
    /// Creates a virtual clock at tick zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: AtomicU64::new(0),
        }
    }

    /// Creates a virtual clock at the given tick.
    #[must_use]
    pub fn starting_at(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    /// Advances time by `ticks`.
    pub fn advance(&self, ticks: u64) {
        self.now.fetch_add(ticks, Ordering::Release);
    }

    /// Advances time to an absolute tick, never moving backward.
    pub fn advance_to(&self, target: u64) {
        self.now.fetch_max(target, Ordering::AcqRel);
    }

    /// Sets the current tick outright.
    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::Release);
    }
}

impl TimeSource for VirtualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}
