//! End-to-end scenarios for the timer wheel.
//!
//! Each test drives a freshly constructed wheel through a complete
//! caller-visible story: schedule, sleep by `wait`, advance, drain. The
//! sweeps at the bottom exercise every expiry in `0x001..=0x0FF` from
//! varying start offsets, which together cover every bubble-down path
//! through the low eight bins.

use lapse::{Timeout, TimerWheel, WheelConfig, MAX_WAIT};

fn init_test(name: &str) {
    lapse::test_utils::init_test_logging();
    lapse::test_phase!(name);
}

fn drain(wheel: &mut TimerWheel<u64>) -> Vec<u64> {
    let mut out = Vec::new();
    while let Some(timeout) = wheel.next_expired() {
        out.push(timeout.into_data());
    }
    out
}

#[test]
fn empty_wheel_end_to_end() {
    init_test("empty_wheel_end_to_end");
    let mut wheel: TimerWheel<u64> = TimerWheel::new();

    assert_eq!(wheel.wait(), MAX_WAIT);
    assert!(wheel.next_expired().is_none());
    assert!(!wheel.advance(1));
    assert!(wheel.next_expired().is_none());

    wheel.drain_all();
    assert!(wheel.next_expired().is_none());
    lapse::test_complete!("empty_wheel_end_to_end");
}

#[test]
fn single_near_future_timeout() {
    init_test("single_near_future_timeout");
    let mut wheel: TimerWheel<u64> = TimerWheel::new();
    wheel.start(Timeout::new(5, 5));

    // order(5 ^ 0) == 2, so the first useful wakeup is the bit-2 boundary.
    lapse::assert_with_log!(wheel.wait() == 4, "first wakeup", 4, wheel.wait());

    assert!(!wheel.advance(4));
    lapse::assert_with_log!(wheel.bin_len(0) == 1, "re-binned to 0", 1, wheel.bin_len(0));
    lapse::assert_with_log!(wheel.wait() == 1, "one tick left", 1, wheel.wait());

    assert!(wheel.advance(5));
    assert_eq!(drain(&mut wheel), vec![5]);
    assert!(wheel.next_expired().is_none());
    lapse::test_complete!("single_near_future_timeout");
}

#[test]
fn wait_sequence_through_bubble_down() {
    init_test("wait_sequence_through_bubble_down");
    let mut wheel: TimerWheel<u64> = TimerWheel::new();
    wheel.start(Timeout::new(0x0F, 0x0F));

    let mut now = 0;
    for expected_wait in [8_u64, 4, 2] {
        let wait = wheel.wait();
        lapse::assert_with_log!(wait == expected_wait, "wait step", expected_wait, wait);
        now += wait;
        assert!(!wheel.advance(now));
        assert!(wheel.next_expired().is_none());
    }

    let wait = wheel.wait();
    lapse::assert_with_log!(wait == 1, "final wait", 1, wait);
    now += wait;
    assert!(wheel.advance(now));
    assert_eq!(drain(&mut wheel), vec![0x0F]);
    assert_eq!(wheel.wait(), MAX_WAIT);
    lapse::test_complete!("wait_sequence_through_bubble_down");
}

#[test]
fn wait_with_accounts_for_clock_drift() {
    init_test("wait_with_accounts_for_clock_drift");
    let mut wheel: TimerWheel<u64> = TimerWheel::new();
    wheel.start(Timeout::new(4, 4));
    wheel.advance(1);

    assert_eq!(wheel.wait_with(2), 2);
    assert_eq!(wheel.wait_with(4), 0);
    lapse::test_complete!("wait_with_accounts_for_clock_drift");
}

#[test]
fn fifo_order_within_bulk_expiry() {
    init_test("fifo_order_within_bulk_expiry");
    let mut wheel: TimerWheel<u64> = TimerWheel::new();
    wheel.start(Timeout::new(20, 1));
    wheel.start(Timeout::new(20, 2));

    wheel.drain_all();
    assert_eq!(drain(&mut wheel), vec![1, 2]);

    // Same pair again, expired by a jump instead of an explicit drain.
    wheel.start(Timeout::new(40, 1));
    wheel.start(Timeout::new(40, 2));
    assert!(wheel.advance(64));
    assert_eq!(drain(&mut wheel), vec![1, 2]);
    lapse::test_complete!("fifo_order_within_bulk_expiry");
}

#[test]
fn stop_cancels_before_expiry() {
    init_test("stop_cancels_before_expiry");
    let mut wheel: TimerWheel<u64> = TimerWheel::new();
    let handle = wheel.start(Timeout::new(20, 20));
    assert!(wheel.stop(handle).is_some());

    assert!(!wheel.advance(30));
    assert!(wheel.next_expired().is_none());
    lapse::test_complete!("stop_cancels_before_expiry");
}

#[test]
fn start_then_stop_is_identity() {
    init_test("start_then_stop_is_identity");
    let mut wheel: TimerWheel<u64> = TimerWheel::new();
    wheel.advance(9);

    let handle = wheel.start(Timeout::new(500, 500));
    let record = wheel.stop(handle).expect("live handle");
    assert_eq!(record.when(), 500);

    // Engine state is back to where it was.
    assert_eq!(wheel.last(), 9);
    assert_eq!(wheel.len(), 0);
    assert_eq!(wheel.wait(), MAX_WAIT);
    assert!(!wheel.advance(1_000));
    assert!(wheel.next_expired().is_none());
    wheel.assert_invariants();
    lapse::test_complete!("start_then_stop_is_identity");
}

#[test]
fn touch_matches_stop_set_start() {
    init_test("touch_matches_stop_set_start");
    let mut touched: TimerWheel<u64> = TimerWheel::new();
    let mut restarted: TimerWheel<u64> = TimerWheel::new();

    let handle = touched.start(Timeout::new(5, 1));
    let other = restarted.start(Timeout::new(5, 1));

    assert!(!touched.advance(4));
    assert!(!restarted.advance(4));

    assert!(touched.touch(handle, 6));
    let mut record = restarted.stop(other).expect("live handle");
    record.set_when(6);
    restarted.start(record);

    for now in [5_u64, 6] {
        let a = touched.advance(now);
        let b = restarted.advance(now);
        assert_eq!(a, b, "divergence at now={now}");
    }
    assert_eq!(drain(&mut touched), drain(&mut restarted));
    lapse::test_complete!("touch_matches_stop_set_start");
}

#[test]
fn split_advance_matches_single_advance() {
    init_test("split_advance_matches_single_advance");
    let whens: Vec<u64> = vec![3, 8, 21, 22, 64, 65, 100, 129, 255, 256, 300];

    let mut split: TimerWheel<u64> = TimerWheel::new();
    let mut single: TimerWheel<u64> = TimerWheel::new();
    for &when in &whens {
        split.start(Timeout::new(when, when));
        single.start(Timeout::new(when, when));
    }

    split.advance(100);
    let mut split_fired = drain(&mut split);
    split.advance(300);
    split_fired.extend(drain(&mut split));

    single.advance(300);
    let single_fired = drain(&mut single);

    let mut lhs = split_fired.clone();
    let mut rhs = single_fired.clone();
    lhs.sort_unstable();
    rhs.sort_unstable();
    assert_eq!(lhs, rhs);
    assert!(lhs.iter().all(|&when| when <= 300));
    assert_eq!(split.len(), single.len());
    lapse::test_complete!("split_advance_matches_single_advance");
}

#[test]
fn bounded_drain_converges_to_full_advance() {
    init_test("bounded_drain_converges_to_full_advance");
    let whens: Vec<u64> = (0..48).map(|i| 512 + i * 7).collect();

    let mut bounded: TimerWheel<u64> = TimerWheel::new();
    let mut full: TimerWheel<u64> = TimerWheel::new();
    for &when in &whens {
        bounded.start(Timeout::new(when, when));
        full.start(Timeout::new(when, when));
    }

    for now in [600_u64, 700, 800, 901] {
        while bounded.advance_partial(now, 3) {}
        full.advance(now);

        let mut lhs = drain(&mut bounded);
        let mut rhs = drain(&mut full);
        lhs.sort_unstable();
        rhs.sort_unstable();
        assert_eq!(lhs, rhs, "divergence at now={now}");
        bounded.assert_invariants();
    }
    assert_eq!(bounded.len(), full.len());
    lapse::test_complete!("bounded_drain_converges_to_full_advance");
}

#[test]
fn schedule_beyond_the_wait_cap() {
    init_test("schedule_beyond_the_wait_cap");
    let cap = 1_u64 << 16;
    let config = WheelConfig::new().max_wait(cap);
    let mut wheel: TimerWheel<u64> = TimerWheel::with_config(0, config);

    wheel.start(Timeout::new(cap + 1, 1));
    lapse::assert_with_log!(wheel.wait() == cap, "wait capped", cap, wheel.wait());

    // Sleeping by `wait` repeatedly still converges on the expiry.
    let mut now = 0;
    let mut fired = false;
    for _ in 0..32 {
        now += wheel.wait();
        if wheel.advance(now) {
            fired = true;
            break;
        }
    }
    assert!(fired, "never converged on the expiry");
    assert_eq!(drain(&mut wheel), vec![1]);
    lapse::test_complete!("schedule_beyond_the_wait_cap");
}

#[test]
fn drain_all_visits_every_started_record() {
    init_test("drain_all_visits_every_started_record");
    let mut wheel: TimerWheel<u64> = TimerWheel::new();
    wheel.advance(100);

    let mut expected: Vec<u64> = Vec::new();
    for when in [5_u64, 100, 101, 4_096, u64::MAX] {
        wheel.start(Timeout::new(when, when));
        expected.push(when);
    }
    let stopped = wheel.start(Timeout::new(9_999, 9_999));
    wheel.stop(stopped);

    wheel.drain_all();
    let mut fired = drain(&mut wheel);
    fired.sort_unstable();
    expected.sort_unstable();
    assert_eq!(fired, expected);
    assert!(wheel.is_empty());
    lapse::test_complete!("drain_all_visits_every_started_record");
}

// =============================================================================
// Ordered expiry sweeps
// =============================================================================

/// Drives a wheel holding densely spaced expiries with `wait`-sized steps
/// until it goes quiet, collecting expired payloads in arrival order. With
/// one expiry per tick, every step must be a single tick and must fire.
fn run_dense_sweep(wheel: &mut TimerWheel<u64>, mut now: u64) -> Vec<u64> {
    let mut fired = Vec::new();
    loop {
        let wait = wheel.wait();
        if wait == MAX_WAIT {
            break;
        }
        assert_eq!(wait, 1, "evenly spaced expiries should always be one apart");
        now += wait;
        assert!(wheel.advance(now));
        fired.extend(drain(wheel));
    }
    fired
}

#[test]
fn dense_expiries_fire_in_order_when_added_in_order() {
    init_test("dense_expiries_fire_in_order_when_added_in_order");
    let mut wheel: TimerWheel<u64> = TimerWheel::new();
    for when in 0x001..=0x0FF_u64 {
        wheel.start(Timeout::new(when, when));
    }

    let fired = run_dense_sweep(&mut wheel, 0);
    let expected: Vec<u64> = (0x001..=0x0FF).collect();
    assert_eq!(fired, expected);
    lapse::test_complete!("dense_expiries_fire_in_order_when_added_in_order");
}

#[test]
fn dense_expiries_fire_in_order_when_added_in_reverse() {
    init_test("dense_expiries_fire_in_order_when_added_in_reverse");
    let mut wheel: TimerWheel<u64> = TimerWheel::new();
    for when in (0x001..=0x0FF_u64).rev() {
        wheel.start(Timeout::new(when, when));
    }

    let fired = run_dense_sweep(&mut wheel, 0);
    let expected: Vec<u64> = (0x001..=0x0FF).collect();
    assert_eq!(fired, expected);
    lapse::test_complete!("dense_expiries_fire_in_order_when_added_in_reverse");
}

#[test]
fn dense_expiries_fire_in_order_from_any_start_offset() {
    init_test("dense_expiries_fire_in_order_from_any_start_offset");
    for seed in 0x001..=0x0FF_u64 {
        let mut wheel: TimerWheel<u64> = TimerWheel::new();
        wheel.advance(seed);

        for when in (0x001..=0x0FF_u64).rev() {
            wheel.start(Timeout::new(when + seed, when + seed));
        }

        let fired = run_dense_sweep(&mut wheel, seed);
        let expected: Vec<u64> = (0x001..=0x0FF).map(|when| when + seed).collect();
        assert_eq!(fired, expected, "divergence at seed={seed}");
    }
    lapse::test_complete!("dense_expiries_fire_in_order_from_any_start_offset");
}

#[test]
fn interleaved_stop_touch_under_sweep() {
    init_test("interleaved_stop_touch_under_sweep");
    let mut wheel: TimerWheel<u64> = TimerWheel::new();

    let handles: Vec<_> = (1..=64_u64)
        .map(|when| wheel.start(Timeout::new(when, when)))
        .collect();

    // Cancel every fourth record and push every eighth out past the sweep.
    for (i, &handle) in handles.iter().enumerate() {
        if i % 8 == 7 {
            assert!(wheel.touch(handle, 1_000));
        } else if i % 4 == 3 {
            assert!(wheel.stop(handle).is_some());
        }
    }
    wheel.assert_invariants();

    // Sweep by `wait`-sized steps; gaps from the cancellations make some
    // steps longer than a tick and some advances fire nothing.
    let mut fired = Vec::new();
    let mut now: u64 = 0;
    while now < 100 {
        now = now.saturating_add(wheel.wait());
        if now >= 100 {
            break;
        }
        wheel.advance(now);
        fired.extend(drain(&mut wheel));
    }
    let expected: Vec<u64> = (1..=64_u64)
        .filter(|when| when % 4 != 0)
        .collect();
    assert_eq!(fired, expected);

    // The touched records are still pending, now at 1_000.
    assert_eq!(wheel.len(), 8);
    assert!(wheel.advance(1_000));
    let mut late = drain(&mut wheel);
    late.sort_unstable();
    let expected_late: Vec<u64> = (1..=64_u64).filter(|when| when % 8 == 0).collect();
    assert_eq!(late, expected_late);
    lapse::test_complete!("interleaved_stop_touch_under_sweep");
}
