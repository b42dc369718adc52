//! Time-bucketed outcome tracking.
//!
//! [`SlidingWindow`] is the feedback store behind [`FallbackRouter`]: a fixed
//! ring of ratio slots, each covering one slot duration, rotated lazily
//! before every read or write.  Rotation is CAS-based so the hot increment
//! path never takes a global lock; losing a rotation race only means a slot
//! is reset slightly late or an increment lands just before a reset.  Those
//! approximations are intentional; do not tighten them.
//!
//! [`FallbackRouter`]: crate::FallbackRouter

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use crate::{ConfigError, Recorder, Summary};

/// Source of the current time, as elapsed duration since the clock's own
/// epoch.
///
/// Routing only ever compares instants from the same clock, so the epoch is
/// arbitrary.  Implementors must be cheap: the tracker consults the clock on
/// every record and read.
pub trait Clock: Send + Sync {
    /// Time elapsed since this clock's epoch.
    fn now(&self) -> Duration;
}

/// Wall-clock time, measured from the UNIX epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    }
}

/// A manually driven clock for tests and simulations.
///
/// Clones share the same underlying instant, so a simulation can keep one
/// handle to advance time while a [`SlidingWindow`] owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// A manual clock starting at its epoch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the clock to `at` past its epoch.
    pub fn set(&self, at: Duration) {
        self.nanos.store(at.as_nanos() as u64, Ordering::Release);
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(by.as_nanos() as u64, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}

/// One time bucket's running success/total counters.
///
/// Increments run under the read side of the gate so any number of writers
/// can bump the counters concurrently; `reset` takes the write side so it is
/// exclusive against increments.  Slots live for the tracker's lifetime and
/// are reset in place on rotation, never reallocated.
#[derive(Debug, Default)]
struct RatioSlot {
    successes: AtomicU64,
    total: AtomicU64,
    gate: RwLock<()>,
}

impl RatioSlot {
    fn record_success(&self) {
        let _shared = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        // Not atomic as a pair: total goes first so a concurrent reader never
        // sees a success without its call.
        self.total.fetch_add(1, Ordering::AcqRel);
        self.successes.fetch_add(1, Ordering::AcqRel);
    }

    fn record_failure(&self) {
        let _shared = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        self.total.fetch_add(1, Ordering::AcqRel);
    }

    fn summary(&self) -> Summary {
        let _shared = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        Summary {
            successes: self.successes.load(Ordering::Acquire),
            total: self.total.load(Ordering::Acquire),
        }
    }

    fn reset(&self) {
        let _exclusive = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        self.successes.store(0, Ordering::Release);
        self.total.store(0, Ordering::Release);
    }
}

/// A concurrency-safe [`Recorder`] that ages out old data.
///
/// Owns `slots` buckets of `slot_duration` each; the full window spans
/// `slots × slot_duration`.  An atomic write cursor names the active bucket
/// and an atomic deadline (`next_roll`) names the instant the active bucket
/// expires.  Every record and read first runs rotation:
///
/// 1. If the tracker has been untouched for longer than the whole window, one
///    caller wins a CAS on the deadline and resets every slot (bulk
///    eviction).
/// 2. Otherwise the deadline is advanced one slot duration at a time via CAS;
///    each winner advances the cursor and zeroes the newly active slot.
///
/// Multiple threads may record and read concurrently without external
/// locking.
#[derive(Debug)]
pub struct SlidingWindow<C: Clock = SystemClock> {
    slots: Vec<RatioSlot>,
    slot_nanos: u64,
    span_nanos: u64,
    cursor: AtomicU64,
    next_roll: AtomicU64,
    clock: C,
}

impl SlidingWindow<SystemClock> {
    /// A window of `slots` buckets of `slot_duration` each over the system
    /// clock.
    ///
    /// Fails with [`ConfigError::ZeroSlots`] when `slots == 0`.  A zero
    /// `slot_duration` is legal: every touch then rotates, which degenerates
    /// to remembering only the increments racing the current call.
    pub fn new(slots: usize, slot_duration: Duration) -> Result<Self, ConfigError> {
        Self::with_clock(SystemClock, slots, slot_duration)
    }
}

impl<C: Clock> SlidingWindow<C> {
    /// A window over a caller-supplied clock.
    pub fn with_clock(clock: C, slots: usize, slot_duration: Duration) -> Result<Self, ConfigError> {
        if slots == 0 {
            return Err(ConfigError::ZeroSlots);
        }
        let slot_nanos = slot_duration.as_nanos() as u64;
        let now = clock.now().as_nanos() as u64;
        let ring = (0..slots).map(|_| RatioSlot::default()).collect();
        Ok(Self {
            slots: ring,
            slot_nanos,
            span_nanos: slot_nanos.saturating_mul(slots as u64),
            cursor: AtomicU64::new(0),
            next_roll: AtomicU64::new(now.saturating_add(slot_nanos)),
            clock,
        })
    }

    /// Number of buckets in the ring.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Duration covered by one bucket.
    pub fn slot_duration(&self) -> Duration {
        Duration::from_nanos(self.slot_nanos)
    }

    /// Duration covered by the whole window.
    pub fn span(&self) -> Duration {
        Duration::from_nanos(self.span_nanos)
    }

    fn active_slot(&self) -> &RatioSlot {
        let cursor = self.cursor.load(Ordering::Acquire);
        &self.slots[(cursor % self.slots.len() as u64) as usize]
    }

    /// Bring the ring up to date with the clock.  Runs before every record
    /// and read.
    fn rotate(&self) {
        let now = self.clock.now().as_nanos() as u64;
        let mut next_roll = self.next_roll.load(Ordering::Acquire);

        if now > next_roll.saturating_add(self.span_nanos) {
            // Untouched for longer than the whole window.  Exactly one caller
            // wins the CAS and evicts everything in bulk; losers are done.
            if self
                .next_roll
                .compare_exchange(
                    next_roll,
                    now.saturating_add(self.slot_nanos),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                tracing::debug!(
                    idle_nanos = now - next_roll,
                    "window idle past full span; bulk-resetting all slots"
                );
                for slot in &self.slots {
                    slot.reset();
                }
            }
            return;
        }

        loop {
            if (self.clock.now().as_nanos() as u64) < next_roll {
                return;
            }
            let new_next_roll = next_roll.saturating_add(self.slot_nanos);
            match self.next_roll.compare_exchange(
                next_roll,
                new_next_roll,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    // We own this roll: advance the cursor and zero the slot
                    // that just became active.  An increment racing in between
                    // may be dropped by the reset; accepted.
                    let advanced = self.cursor.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
                    self.slots[(advanced % self.slots.len() as u64) as usize].reset();
                    return;
                }
                // Another caller rolled first; retry against the value it
                // installed.
                Err(current) => next_roll = current,
            }
        }
    }
}

impl<C: Clock> Recorder for SlidingWindow<C> {
    fn record_success(&self) {
        self.rotate();
        self.active_slot().record_success();
    }

    fn record_failure(&self) {
        self.rotate();
        self.active_slot().record_failure();
    }

    fn summary(&self) -> Summary {
        self.rotate();
        self.slots
            .iter()
            .fold(Summary::EMPTY, |acc, slot| acc.merge(slot.summary()))
    }
}
