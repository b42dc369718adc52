//! `shunt`: canary routing primitives for running two (or more) implementations
//! of the same operation set side by side.
//!
//! You have an old implementation you trust and a new one you want to roll out.
//! `shunt` gives you three ways to split traffic between them:
//!
//! - [`WeightedRoundRobin`]: stateless weighted-random selection over any number
//!   of implementations.  "Send 1% of calls to the new code."
//! - [`WeightedSharded`]: deterministic weighted selection keyed by a shard key
//!   extracted from the call (by default its first argument).  The same key
//!   always lands on the same implementation, so per-entity behavior is sticky.
//!   "These users get the new code, those users keep the old."
//! - [`FallbackRouter`]: an epsilon-greedy circuit breaker between exactly two
//!   implementations.  Traffic concentrates on the new implementation while its
//!   recent success ratio is high and sheds from it automatically once it starts
//!   failing — rollback without operator intervention.
//!
//! Feedback for the fallback router comes from a [`SlidingWindow`]: a
//! time-bucketed success/failure tracker with lock-free rotation that ages out
//! old data, so a past incident cannot starve a now-healthy implementation
//! forever.
//!
//! **Goals:**
//! - **Zero coordination for readers**: weight tables and configurations are
//!   immutable once built; the sliding window is the only shared mutable state
//!   and synchronizes itself.
//! - **Deterministic where it matters**: sharded selection is a pure function
//!   of `(seed, key)`; randomized routers are seedable for reproducible tests.
//! - **Failures pass through**: a failure from a routed implementation is
//!   recorded as feedback and returned to the caller unchanged — never wrapped,
//!   masked, or retried.
//!
//! **Non-goals:**
//! - No persistence of routing state across restarts.
//! - No cross-process coordination of routing decisions.
//! - No runtime reconfiguration: replacing a policy means building a new router.
//! - No call timeouts; those belong to the caller.
//!
//! # Quick start
//!
//! ```rust
//! use shunt::{FallbackConfig, FallbackRouter};
//!
//! // Two implementations of "parse": the battle-tested one and the rewrite.
//! type Parse = fn(&str) -> Result<i64, std::num::ParseIntError>;
//! let old_parse: Parse = |s| s.parse();
//! let new_parse: Parse = |s| s.trim().parse();
//!
//! let cfg = FallbackConfig::default().with_seed(42);
//! let mut router = FallbackRouter::new(cfg, old_parse, new_parse).unwrap();
//!
//! let n = router.call(|parse| parse("7")).unwrap();
//! assert_eq!(n, 7);
//! ```

use std::sync::Arc;

mod window;
pub use window::*;

mod weighted;
pub use weighted::*;

mod round_robin;
pub use round_robin::*;

mod stable_hash;
pub use stable_hash::*;

mod sharded;
pub use sharded::*;

mod fallback;
pub use fallback::*;

mod dispatch;
pub use dispatch::*;

pub mod sim;

/// Errors raised while building a router or tracker.
///
/// Every constructor validates its inputs up front; a router is never built in
/// an invalid state.  Nothing here can occur after construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A weighted implementation was registered with weight zero.
    #[error("weight must be strictly positive")]
    ZeroWeight,
    /// A weighted router was built with no implementations.
    #[error("at least one weighted implementation is required")]
    Empty,
    /// Exploration probability outside `[0, 1]`.
    #[error("epsilon must be in [0, 1], got {0}")]
    EpsilonOutOfRange(f64),
    /// A sliding window was configured with zero slots.
    #[error("slot count must be strictly positive")]
    ZeroSlots,
    /// A sharded router was built over an operation set containing an
    /// operation with no arguments — there would be nothing to shard on.
    #[error("operation `{0}` takes no arguments and cannot be sharded")]
    ZeroArgOperation(String),
    /// A simulated implementation was given an error ratio outside `[0, 1]`.
    #[error("error ratio must be in [0, 1], got {0}")]
    ErrorRatioOutOfRange(f64),
    /// A duration parameter was given a negative number of seconds.
    #[error("duration must be non-negative, got {0} s")]
    NegativeDuration(f64),
}

/// An immutable snapshot of recorded outcomes: how many calls were seen and
/// how many of them succeeded.
///
/// `Summary` is a pure value — every read produces a fresh copy, and merging
/// two summaries produces a third without touching either input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Summary {
    /// Number of successful calls.  Never exceeds `total` in summaries
    /// produced by a [`Recorder`].
    pub successes: u64,
    /// Number of calls observed.
    pub total: u64,
}

impl Summary {
    /// The summary with no observations.  Identity element of [`merge`].
    ///
    /// [`merge`]: Summary::merge
    pub const EMPTY: Summary = Summary {
        successes: 0,
        total: 0,
    };

    /// Combine two summaries.  Associative and commutative.
    #[must_use]
    pub fn merge(self, other: Summary) -> Summary {
        Summary {
            successes: self.successes + other.successes,
            total: self.total + other.total,
        }
    }

    /// Fraction of observed calls that succeeded, or `None` when nothing has
    /// been observed yet.
    ///
    /// The `None` case is how callers distinguish "no data" from "all
    /// failures"; the two demand very different routing decisions.
    #[must_use]
    pub fn success_ratio(self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.successes as f64 / self.total as f64)
        }
    }
}

/// Capability to record call outcomes and read them back as a [`Summary`].
///
/// Methods take `&self`: implementors use interior mutability so a recorder
/// can be shared across threads without external locking.
///
/// The increment discipline is deliberate: a success bumps `total` first and
/// `successes` second, so a concurrent reader never computes a ratio against
/// a total that excludes a pending success.  The cost is a brief moment where
/// a success is half-registered; readers tolerate that.
pub trait Recorder {
    /// Record one successful call.
    fn record_success(&self);
    /// Record one failed call.
    fn record_failure(&self);
    /// Snapshot the outcomes recorded so far.
    fn summary(&self) -> Summary;
}

impl<R: Recorder + ?Sized> Recorder for Arc<R> {
    fn record_success(&self) {
        (**self).record_success();
    }

    fn record_failure(&self) {
        (**self).record_failure();
    }

    fn summary(&self) -> Summary {
        (**self).summary()
    }
}

/// A [`Recorder`] that remembers nothing and always reports `{0, 0}`.
///
/// Bound to implementations that must never influence routing — the old lane
/// of a [`FallbackRouter`] uses this so only the new implementation
/// accumulates feedback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {
    fn record_success(&self) {}

    fn record_failure(&self) {}

    fn summary(&self) -> Summary {
        Summary::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_commutative_and_has_identity() {
        let a = Summary {
            successes: 3,
            total: 5,
        };
        let b = Summary {
            successes: 1,
            total: 9,
        };
        assert_eq!(a.merge(b), b.merge(a));
        assert_eq!(Summary::EMPTY.merge(a), a);
        assert_eq!(a.merge(Summary::EMPTY), a);
    }

    #[test]
    fn merge_is_associative() {
        let a = Summary {
            successes: 1,
            total: 2,
        };
        let b = Summary {
            successes: 0,
            total: 4,
        };
        let c = Summary {
            successes: 7,
            total: 7,
        };
        assert_eq!(a.merge(b).merge(c), a.merge(b.merge(c)));
    }

    #[test]
    fn success_ratio_is_undefined_without_data() {
        assert_eq!(Summary::EMPTY.success_ratio(), None);
        let s = Summary {
            successes: 1,
            total: 4,
        };
        assert_eq!(s.success_ratio(), Some(0.25));
    }

    #[test]
    fn noop_recorder_reports_nothing() {
        let r = NoopRecorder;
        r.record_success();
        r.record_failure();
        assert_eq!(r.summary(), Summary::EMPTY);
    }
}
