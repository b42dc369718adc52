//! Property tests for the sliding window and summaries.

use std::time::Duration;

use proptest::prelude::*;

use shunt::{ManualClock, Recorder, SlidingWindow, Summary};

proptest! {
    /// Whatever mix of outcomes is recorded within one window span, the
    /// summary reports exactly that mix.
    #[test]
    fn summary_counts_what_was_recorded(
        successes in 0u64..500,
        failures in 0u64..500,
    ) {
        let clock = ManualClock::new();
        let window = SlidingWindow::with_clock(clock, 4, Duration::from_secs(60)).unwrap();
        for _ in 0..successes {
            window.record_success();
        }
        for _ in 0..failures {
            window.record_failure();
        }
        let summary = window.summary();
        prop_assert_eq!(summary.successes, successes);
        prop_assert_eq!(summary.total, successes + failures);
    }

    /// After more than a full span of idle time, nothing survives.
    #[test]
    fn everything_ages_out_after_a_full_span(
        successes in 1u64..200,
        slots in 1usize..8,
        idle_extra_secs in 1u64..1_000,
    ) {
        let clock = ManualClock::new();
        let slot = Duration::from_secs(30);
        let window = SlidingWindow::with_clock(clock.clone(), slots, slot).unwrap();
        for _ in 0..successes {
            window.record_success();
        }
        prop_assert!(window.summary().total > 0);

        let span = slot * slots as u32;
        clock.advance(span + span + Duration::from_secs(idle_extra_secs));
        prop_assert_eq!(window.summary(), Summary::EMPTY);
    }

    /// Merging is order-insensitive and `EMPTY` is its identity.
    #[test]
    fn merge_laws(
        a_succ in 0u64..1_000, a_total in 0u64..1_000,
        b_succ in 0u64..1_000, b_total in 0u64..1_000,
    ) {
        let a = Summary { successes: a_succ, total: a_total };
        let b = Summary { successes: b_succ, total: b_total };
        prop_assert_eq!(a.merge(b), b.merge(a));
        prop_assert_eq!(a.merge(Summary::EMPTY), a);
    }

    /// A ratio, when defined, is always within the unit interval.
    #[test]
    fn ratio_stays_in_unit_interval(total in 1u64..10_000, successes in 0u64..10_000) {
        let s = Summary { successes: successes.min(total), total };
        let ratio = s.success_ratio().unwrap();
        prop_assert!((0.0..=1.0).contains(&ratio));
    }
}

#[test]
fn data_straddling_slots_survives_until_its_slot_is_reused() {
    let clock = ManualClock::new();
    let window = SlidingWindow::with_clock(clock.clone(), 2, Duration::from_secs(10)).unwrap();

    window.record_success();
    clock.advance(Duration::from_secs(10));
    window.record_failure();
    // Both slots live: everything is visible.
    assert_eq!(
        window.summary(),
        Summary {
            successes: 1,
            total: 2
        }
    );

    // One more rotation reuses the first slot and drops its success.
    clock.advance(Duration::from_secs(10));
    assert_eq!(
        window.summary(),
        Summary {
            successes: 0,
            total: 1
        }
    );
}
