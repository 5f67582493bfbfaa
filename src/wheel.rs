//! Hierarchical bit-indexed timer wheel.
//!
//! The wheel keeps pending records in 64 bins, one per bit of the expiry
//! word. A record with expiry `when` lives in bin `order(when ^ last)`,
//! where `last` is the wheel's reference time and `order` is the index of
//! the most significant set bit. The invariant this buys: a bin can only
//! matter when the corresponding bit of `last` flips, which happens at the
//! next multiple of that bin's power of two — so the next useful wakeup
//! falls out of a scan for the lowest occupied bin.
//!
//! Advancing from `last` to `now` expires bin 0 wholesale (its records are
//! due exactly at `last + 1`), bulk-expires every bin whose whole span now
//! lies in the past, and restages the boundary bins whose records may or may
//! not have elapsed. Restaged records are re-binned one by one against the
//! new reference time. A record is restaged at most once per bit of its
//! original distance, giving amortised O(log delta) expiry per record;
//! start, stop, and reschedule are O(1).
//!
//! # Ordering
//!
//! Records that expire together surface FIFO within a bin and in bin-index
//! order across bins. A caller that advances in step with
//! [`TimerWheel::wait`] observes expiry-timestamp order; a caller that jumps
//! farther observes insertion order within each jumped bin.
//!
//! # Performance Characteristics
//!
//! - Start: O(1) — one `order` and one list push
//! - Stop / touch: O(1) — index-addressed unlink, generation-checked
//! - Advance: O(restaged records + newly expired records + 64); the newly
//!   expired are touched once here and once more when the caller drains them
//! - Wait: O(64) — scan for the lowest occupied bin
//! - Space: one arena slot per pending record, recycled through a free list

use crate::bits::order;
use crate::list::{bin, Arena, EXPIRED, PROCESSING};
use crate::timeout::{Timeout, TimeoutHandle};
use crate::tracing_compat::{debug, trace};
use core::fmt;

/// Number of bins, one per bit of the expiry word.
pub const BIN_COUNT: usize = crate::list::BIN_COUNT;

/// Default value [`TimerWheel::wait`] returns when no bin holds a record.
pub const MAX_WAIT: u64 = u64::MAX;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a [`TimerWheel`].
#[derive(Debug, Clone)]
pub struct WheelConfig {
    /// Record slots to preallocate before the first growth.
    ///
    /// Default: 0.
    pub initial_capacity: usize,

    /// Value [`TimerWheel::wait`] returns when no bin holds a record.
    ///
    /// Default: [`MAX_WAIT`].
    pub max_wait: u64,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            max_wait: MAX_WAIT,
        }
    }
}

impl WheelConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of record slots to preallocate.
    #[must_use]
    pub fn initial_capacity(mut self, records: usize) -> Self {
        self.initial_capacity = records;
        self
    }

    /// Sets the empty-wheel wait sentinel.
    #[must_use]
    pub fn max_wait(mut self, max_wait: u64) -> Self {
        self.max_wait = max_wait;
        self
    }
}

// =============================================================================
// The wheel
// =============================================================================

/// Hierarchical timer wheel over caller-supplied logical time.
///
/// The wheel never reads a clock. Feed it time with [`advance`], ask how
/// long to sleep with [`wait`], and drain due records with
/// [`next_expired`].
///
/// Dropping the wheel drops every record it still holds. When the payloads
/// matter, tear down with [`drain_all`] and drain the queue first.
///
/// [`advance`]: TimerWheel::advance
/// [`wait`]: TimerWheel::wait
/// [`next_expired`]: TimerWheel::next_expired
/// [`drain_all`]: TimerWheel::drain_all
pub struct TimerWheel<T> {
    last: u64,
    arena: Arena<T>,
    config: WheelConfig,
}

impl<T> Default for TimerWheel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerWheel<T> {
    /// Creates a wheel with its reference time at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(0, WheelConfig::default())
    }

    /// Creates a wheel with its reference time at `now`.
    #[must_use]
    pub fn new_at(now: u64) -> Self {
        Self::with_config(now, WheelConfig::default())
    }

    /// Creates a wheel with custom configuration.
    #[must_use]
    pub fn with_config(now: u64, config: WheelConfig) -> Self {
        Self {
            last: now,
            arena: Arena::with_capacity(config.initial_capacity),
            config,
        }
    }

    /// Returns the wheel configuration.
    #[must_use]
    pub fn config(&self) -> &WheelConfig {
        &self.config
    }

    /// Returns the wheel's reference time: the `now` of the latest
    /// [`advance`](TimerWheel::advance), never decreasing.
    #[must_use]
    pub fn last(&self) -> u64 {
        self.last
    }

    /// Returns the configured empty-wheel wait sentinel.
    #[must_use]
    pub fn max_wait(&self) -> u64 {
        self.config.max_wait
    }

    /// Returns the number of pending records — scheduled in a bin or staged
    /// for review — excluding the expired queue. O(1).
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.pending_len()
    }

    /// Returns true if no records are pending. The expired queue may still
    /// hold records; see [`has_expired`](TimerWheel::has_expired).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.pending_len() == 0
    }

    /// Returns true if expired records are waiting to be drained.
    #[must_use]
    pub fn has_expired(&self) -> bool {
        !self.arena.list_is_empty(EXPIRED)
    }

    /// Returns the number of records in the expired queue. O(1).
    #[must_use]
    pub fn expired_len(&self) -> usize {
        self.arena.expired_len()
    }

    /// Counts the records in bin `index`; zero for an out-of-range index.
    /// O(bin length); diagnostics only.
    #[must_use]
    pub fn bin_len(&self, index: usize) -> usize {
        if index >= BIN_COUNT {
            return 0;
        }
        self.arena.list_len(bin(index as u32))
    }

    // -------------------------------------------------------------------------
    // Scheduling
    // -------------------------------------------------------------------------

    /// Schedules a record.
    ///
    /// A record whose expiry is at or before the reference time goes
    /// straight to the expired queue; everything else lands in the bin
    /// indexed by the highest bit at which its expiry differs from the
    /// reference time. O(1).
    pub fn start(&mut self, timeout: Timeout<T>) -> TimeoutHandle {
        let when = timeout.when();
        let (index, generation) = self.arena.insert(timeout);
        self.route(index, when);
        trace!(when, last = self.last, "timeout started");
        TimeoutHandle::new(index, generation)
    }

    /// Schedules a record to fire anywhere in `(min, max]`, placed to
    /// minimise the number of times the wheel handles it internally.
    ///
    /// The chosen expiry is `max` with every bit below the first
    /// `min`/`max` divergence cleared — the latest timestamp in the window
    /// that is born in the bin it would otherwise only reach after
    /// bubbling down. Degenerate windows (`min >= max`) fall back to a
    /// plain `start` at `max`.
    pub fn start_range(&mut self, min: u64, max: u64, data: T) -> TimeoutHandle {
        let when = if min < max {
            max & !((1u64 << order(max ^ min)) - 1)
        } else {
            max
        };
        self.start(Timeout::new(when, data))
    }

    /// Cancels a scheduled record, returning it if the handle was live.
    ///
    /// Stale handles (already stopped, already drained, or recycled) are a
    /// no-op returning `None`. O(1).
    pub fn stop(&mut self, handle: TimeoutHandle) -> Option<Timeout<T>> {
        if !self.arena.contains(handle.index(), handle.generation()) {
            return None;
        }
        self.arena.unlink(handle.index());
        let timeout = self.arena.remove(handle.index());
        trace!(when = timeout.when(), "timeout stopped");
        Some(timeout)
    }

    /// Reschedules a record to expire at `when`, wherever it currently is.
    ///
    /// Equivalent to stopping the record, updating its expiry, and
    /// starting it again, except the handle stays valid. Returns false on
    /// a stale handle. O(1).
    pub fn touch(&mut self, handle: TimeoutHandle, when: u64) -> bool {
        if !self.arena.contains(handle.index(), handle.generation()) {
            return false;
        }
        let node = handle.index();
        self.arena.unlink(node);
        self.arena.set_when(node, when);
        self.route(node, when);
        trace!(when, last = self.last, "timeout touched");
        true
    }

    fn route(&mut self, node: u32, when: u64) {
        if when <= self.last {
            self.arena.mark_expired(node);
            self.arena.push_back(EXPIRED, node);
        } else {
            self.arena.clear_expired(node);
            self.arena.push_back(bin(order(when ^ self.last)), node);
        }
    }

    // -------------------------------------------------------------------------
    // Time advancement
    // -------------------------------------------------------------------------

    /// Advances the reference time to `now`, moving every elapsed record to
    /// the expired queue. Returns true if the expired queue is non-empty
    /// afterwards.
    ///
    /// `now` at or before the reference time is a no-op (the return value
    /// still reports the expired queue). If a bounded drain started by
    /// [`advance_partial`](TimerWheel::advance_partial) is still in
    /// progress, its staged records are conservatively expired rather than
    /// re-binned under the new reference time.
    pub fn advance(&mut self, now: u64) -> bool {
        if now <= self.last {
            return self.has_expired();
        }
        trace!(last = self.last, now, "advancing");
        self.arena.expire_list(PROCESSING);
        self.expire_and_stage(now);
        while let Some(node) = self.arena.pop_front(PROCESSING) {
            let when = self.arena.when(node);
            self.route(node, when);
        }
        self.has_expired()
    }

    /// Advances the reference time by `delta`, saturating at `u64::MAX`.
    pub fn advance_by(&mut self, delta: u64) -> bool {
        self.advance(self.last.saturating_add(delta))
    }

    /// Advances like [`advance`](TimerWheel::advance) but re-bins at most
    /// `max_ops` staged records, bounding the pause a large jump can cause.
    ///
    /// Returns true while staged records remain; call again (with the same
    /// or a later `now`) to continue. A call with `now` at or before the
    /// reference time continues the drain without expiring anything new.
    /// Do not let significant time pass between iterations: records stay
    /// invisible to [`wait`](TimerWheel::wait) while staged.
    pub fn advance_partial(&mut self, now: u64, max_ops: usize) -> bool {
        if now > self.last {
            trace!(last = self.last, now, max_ops, "advancing (bounded)");
            self.expire_and_stage(now);
        }
        let mut ops = 0;
        while ops < max_ops {
            let Some(node) = self.arena.pop_front(PROCESSING) else {
                break;
            };
            let when = self.arena.when(node);
            self.route(node, when);
            ops += 1;
        }
        !self.arena.list_is_empty(PROCESSING)
    }

    /// Expires the bins wholly in the past and stages the boundary bins for
    /// review, then adopts `now` as the reference time.
    fn expire_and_stage(&mut self, now: u64) {
        debug_assert!(now > self.last);

        // Bin 0 holds records due exactly at `last + 1`; any forward step
        // expires them.
        self.arena.expire_list(bin(0));

        // Bins below order(elapsed) span strictly less than the elapsed
        // time, so their records are past due no matter their offsets.
        let elapsed = now - self.last;
        let bulk_end = order(elapsed);
        let mut index = 1;
        while index < bulk_end {
            self.arena.expire_list(bin(index));
            index += 1;
        }

        // Bins up to order(now ^ last) see that bit of the reference time
        // flip, so their records need fresh placement; beyond it, bin
        // assignments are unchanged.
        let review_end = order(now ^ self.last);
        while index <= review_end {
            self.arena.splice_append(PROCESSING, bin(index));
            index += 1;
        }

        self.last = now;
    }

    // -------------------------------------------------------------------------
    // Draining
    // -------------------------------------------------------------------------

    /// Moves every record — binned or staged — to the expired queue,
    /// regardless of expiry.
    ///
    /// Used to tear a wheel down without losing payloads: follow with
    /// [`next_expired`](TimerWheel::next_expired) until empty.
    pub fn drain_all(&mut self) {
        for index in 0..BIN_COUNT as u32 {
            self.arena.expire_list(bin(index));
        }
        self.arena.expire_list(PROCESSING);
        debug!(expired = self.expired_len(), "drained all pending timeouts");
    }

    /// Pops the next expired record, FIFO. The record detaches from the
    /// wheel; its handle goes stale.
    pub fn next_expired(&mut self) -> Option<Timeout<T>> {
        let node = self.arena.pop_front(EXPIRED)?;
        Some(self.arena.remove(node))
    }

    // -------------------------------------------------------------------------
    // Wakeup computation
    // -------------------------------------------------------------------------

    /// Returns how long the caller may sleep from the reference time before
    /// any bin could need attention, or the configured sentinel when every
    /// bin is empty.
    ///
    /// Bin `index` can only fire when bit `index` of the reference time
    /// flips, i.e. at the next multiple of `2^index` — so the answer is the
    /// distance to that boundary for the lowest occupied bin, capped at the
    /// configured maximum. The expired queue is not considered; drain it
    /// first. No record expires earlier than the returned wait.
    #[must_use]
    pub fn wait(&self) -> u64 {
        for index in 0..BIN_COUNT as u32 {
            if !self.arena.list_is_empty(bin(index)) {
                let mask = (1u64 << index) - 1;
                return ((mask - (self.last & mask)) + 1).min(self.config.max_wait);
            }
        }
        self.config.max_wait
    }

    /// Like [`wait`](TimerWheel::wait), measured from `now` instead of the
    /// reference time: the bin-derived wait minus the drift `now - last`,
    /// clamped to zero. For callers whose clock has moved past the
    /// reference time without an intervening advance.
    #[must_use]
    pub fn wait_with(&self, now: u64) -> u64 {
        let drift = now.saturating_sub(self.last);
        let wait = self.wait();
        if drift < wait {
            wait - drift
        } else {
            0
        }
    }

    // -------------------------------------------------------------------------
    // Test support
    // -------------------------------------------------------------------------

    /// Asserts every structural and placement invariant. O(records);
    /// intended for tests.
    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        self.arena.assert_consistent();
        for index in 0..BIN_COUNT as u32 {
            for node in self.arena.iter_list(bin(index)) {
                let when = self.arena.when(node);
                assert!(
                    when > self.last,
                    "bin {index} holds an elapsed record: when={when} last={}",
                    self.last
                );
                assert_eq!(
                    order(when ^ self.last),
                    index,
                    "record misplaced: when={when} last={}",
                    self.last
                );
            }
        }
    }
}

impl<T> fmt::Debug for TimerWheel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let occupied: Vec<usize> = (0..BIN_COUNT).filter(|&i| self.bin_len(i) > 0).collect();
        f.debug_struct("TimerWheel")
            .field("last", &self.last)
            .field("len", &self.len())
            .field("expired", &self.expired_len())
            .field("occupied_bins", &occupied)
            .finish_non_exhaustive()
    }
}
