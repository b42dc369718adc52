//! Epsilon-greedy circuit breaking between an old and a new implementation.
//!
//! The fallback router is how a new implementation earns traffic: every call
//! it survives raises its recent success ratio, and the probability of being
//! chosen tracks that ratio directly.  Failures pull the ratio — and its
//! traffic — down within one window span, with no operator in the loop.  A
//! small exploration probability keeps a trickle of traffic flowing to both
//! sides so a recovered implementation can be rediscovered instead of being
//! starved forever by its own history.
//!
//! Only the **new** implementation accumulates feedback; the old lane is
//! paired with a [`NoopRecorder`] and is assumed good.  The router is a
//! traffic regulator, not a judge of the old code.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{
    ArmId, Call, CallOutcome, ConfigError, DelegateSelector, NoopRecorder, Recorder,
    SlidingWindow,
};

/// Which of the two implementations a decision landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Lane {
    /// The trusted, incumbent implementation.
    Old,
    /// The implementation being rolled out.
    New,
}

/// Immutable configuration for a [`FallbackRouter`].
///
/// "Modifying" a field returns a new value; a built router never observes a
/// configuration change.  Keep one config as a template and derive variants
/// from it freely.
#[derive(Clone)]
pub struct FallbackConfig {
    epsilon: f64,
    seed: Option<u64>,
    slots: usize,
    slot_duration: Duration,
    recorder: Option<Arc<dyn Recorder + Send + Sync>>,
}

impl Default for FallbackConfig {
    /// ε = 0.01 over a 10 × 30 s feedback window, OS-seeded RNG.
    fn default() -> Self {
        Self {
            epsilon: 0.01,
            seed: None,
            slots: 10,
            slot_duration: Duration::from_secs(30),
            recorder: None,
        }
    }
}

impl FallbackConfig {
    /// Set the exploration probability.
    ///
    /// ε is the fraction of calls routed uniformly at random regardless of
    /// accumulated feedback.  Without it the router can get stuck: a new
    /// implementation that failed hard once would never be retried after its
    /// window empties out.  A few percent is typical.
    ///
    /// Fails with [`ConfigError::EpsilonOutOfRange`] outside `[0, 1]`.
    pub fn with_epsilon(self, epsilon: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(ConfigError::EpsilonOutOfRange(epsilon));
        }
        Ok(Self { epsilon, ..self })
    }

    /// Seed the router's RNG for reproducible decision streams.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    /// Shape of the feedback window built for the new lane.
    ///
    /// Ignored when a recorder is injected via [`with_recorder`].
    ///
    /// [`with_recorder`]: FallbackConfig::with_recorder
    pub fn with_window(self, slots: usize, slot_duration: Duration) -> Self {
        Self {
            slots,
            slot_duration,
            ..self
        }
    }

    /// Bind the new lane to a caller-supplied recorder instead of a fresh
    /// [`SlidingWindow`] — how tests and simulations inject a recorder
    /// driven by a manual clock.
    pub fn with_recorder(self, recorder: Arc<dyn Recorder + Send + Sync>) -> Self {
        Self {
            recorder: Some(recorder),
            ..self
        }
    }

    /// The configured exploration probability.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl fmt::Debug for FallbackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackConfig")
            .field("epsilon", &self.epsilon)
            .field("seed", &self.seed)
            .field("slots", &self.slots)
            .field("slot_duration", &self.slot_duration)
            .field("custom_recorder", &self.recorder.is_some())
            .finish()
    }
}

struct LaneState<T> {
    implementation: T,
    recorder: Arc<dyn Recorder + Send + Sync>,
}

/// Epsilon-greedy router between exactly two implementations.
///
/// Per call:
///
/// 1. With probability ε, explore: a uniform coin flip between old and new.
/// 2. Otherwise read the new lane's window.  With no data yet the choice is
///    again a uniform coin flip (cold-start bootstrap).  With data, pick the
///    new lane with probability equal to its recent success ratio.
/// 3. Report the invocation's outcome back via [`report_outcome`] (or let
///    [`call`] do it); the chosen lane's recorder hears it, and only the new
///    lane's recorder remembers.
///
/// Conditioned on not exploring, the probability of picking the new
/// implementation *is* its empirical recent success ratio — a healthy
/// rollout converges toward full traffic at the same pace a failing one
/// converges toward none.
///
/// [`report_outcome`]: FallbackRouter::report_outcome
/// [`call`]: FallbackRouter::call
pub struct FallbackRouter<T> {
    old: LaneState<T>,
    new: LaneState<T>,
    epsilon: f64,
    rng: StdRng,
}

impl<T> FallbackRouter<T> {
    /// Wrap an old and a new implementation under `config`.
    ///
    /// Builds the new lane's [`SlidingWindow`] unless the config injected a
    /// recorder; the old lane always gets a [`NoopRecorder`].
    pub fn new(config: FallbackConfig, old: T, new: T) -> Result<Self, ConfigError> {
        let recorder: Arc<dyn Recorder + Send + Sync> = match config.recorder {
            Some(recorder) => recorder,
            None => Arc::new(SlidingWindow::new(config.slots, config.slot_duration)?),
        };
        tracing::debug!(
            epsilon = config.epsilon,
            seeded = config.seed.is_some(),
            "built fallback router"
        );
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };
        Ok(Self {
            old: LaneState {
                implementation: old,
                recorder: Arc::new(NoopRecorder),
            },
            new: LaneState {
                implementation: new,
                recorder,
            },
            epsilon: config.epsilon,
            rng,
        })
    }

    /// Decide which lane the next call should take.
    pub fn pick_lane(&mut self) -> Lane {
        if self.rng.gen::<f64>() < self.epsilon {
            return self.coin_flip();
        }
        match self.new.recorder.summary().success_ratio() {
            // No data yet: bootstrap exactly like exploration.
            None => self.coin_flip(),
            Some(ratio) => {
                if self.rng.gen::<f64>() < ratio {
                    Lane::New
                } else {
                    Lane::Old
                }
            }
        }
    }

    fn coin_flip(&mut self) -> Lane {
        if self.rng.gen_bool(0.5) {
            Lane::New
        } else {
            Lane::Old
        }
    }

    /// The implementation behind a lane.
    pub fn implementation(&self, lane: Lane) -> &T {
        match lane {
            Lane::Old => &self.old.implementation,
            Lane::New => &self.new.implementation,
        }
    }

    /// Feed an invocation outcome back to the lane that produced it.
    ///
    /// Takes `&self`: recorders synchronize internally.  Named apart from
    /// [`DelegateSelector::report`] so the two never shadow each other on a
    /// router used both ways.
    pub fn report_outcome(&self, lane: Lane, outcome: CallOutcome) {
        let recorder = match lane {
            Lane::Old => &self.old.recorder,
            Lane::New => &self.new.recorder,
        };
        match outcome {
            CallOutcome::Success => recorder.record_success(),
            CallOutcome::Failure => recorder.record_failure(),
        }
    }

    /// Route one call end to end: pick a lane, run `run` against its
    /// implementation, record the outcome, and return `run`'s result
    /// unchanged.
    ///
    /// A failure is recorded as feedback and then handed back exactly as the
    /// implementation produced it — never swallowed or wrapped.
    pub fn call<R, E>(&mut self, run: impl FnOnce(&T) -> Result<R, E>) -> Result<R, E> {
        let lane = self.pick_lane();
        let result = run(FallbackRouter::implementation(self, lane));
        match &result {
            Ok(_) => self.report_outcome(lane, CallOutcome::Success),
            Err(_) => self.report_outcome(lane, CallOutcome::Failure),
        }
        result
    }

    /// Snapshot of the new lane's recent outcomes.
    pub fn new_lane_summary(&self) -> crate::Summary {
        self.new.recorder.summary()
    }

    /// The exploration probability this router was built with.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl Lane {
    fn arm_id(self) -> ArmId {
        match self {
            Lane::Old => ArmId(0),
            Lane::New => ArmId(1),
        }
    }

    fn from_arm_id(id: ArmId) -> Lane {
        if id.0 == 0 {
            Lane::Old
        } else {
            Lane::New
        }
    }
}

/// Gateway integration.  The call is ignored — lane choice depends only on
/// feedback, never on the operation or its arguments.
impl<T, A> DelegateSelector<T, A> for FallbackRouter<T> {
    fn select(&mut self, _call: &Call<'_, A>) -> ArmId {
        self.pick_lane().arm_id()
    }

    fn implementation(&self, id: ArmId) -> &T {
        FallbackRouter::implementation(self, Lane::from_arm_id(id))
    }

    fn report(&mut self, id: ArmId, outcome: CallOutcome) {
        self.report_outcome(Lane::from_arm_id(id), outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Summary;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Recorder with a fixed summary, for steering selection in tests.
    struct FixedRecorder {
        successes: u64,
        total: u64,
        recorded_failures: AtomicU64,
    }

    impl FixedRecorder {
        fn new(successes: u64, total: u64) -> Arc<Self> {
            Arc::new(Self {
                successes,
                total,
                recorded_failures: AtomicU64::new(0),
            })
        }
    }

    impl Recorder for FixedRecorder {
        fn record_success(&self) {}

        fn record_failure(&self) {
            self.recorded_failures.fetch_add(1, Ordering::Relaxed);
        }

        fn summary(&self) -> Summary {
            Summary {
                successes: self.successes,
                total: self.total,
            }
        }
    }

    fn router_with(recorder: Arc<FixedRecorder>, epsilon: f64) -> FallbackRouter<&'static str> {
        let cfg = FallbackConfig::default()
            .with_epsilon(epsilon)
            .unwrap()
            .with_seed(42)
            .with_recorder(recorder);
        FallbackRouter::new(cfg, "old", "new").unwrap()
    }

    #[test]
    fn epsilon_outside_unit_interval_is_rejected() {
        assert_eq!(
            FallbackConfig::default().with_epsilon(1.5).unwrap_err(),
            ConfigError::EpsilonOutOfRange(1.5)
        );
        assert!(FallbackConfig::default().with_epsilon(-0.1).is_err());
        assert!(FallbackConfig::default().with_epsilon(0.0).is_ok());
        assert!(FallbackConfig::default().with_epsilon(1.0).is_ok());
    }

    #[test]
    fn cold_start_with_no_exploration_is_a_coin_flip() {
        let mut router = router_with(FixedRecorder::new(0, 0), 0.0);
        let mut new_picks = 0u32;
        for _ in 0..10_000 {
            if router.pick_lane() == Lane::New {
                new_picks += 1;
            }
        }
        assert!(
            (4_500..=5_500).contains(&new_picks),
            "bootstrap should be uniform, got {new_picks} new of 10000"
        );
    }

    #[test]
    fn perfect_ratio_routes_everything_to_new() {
        let mut router = router_with(FixedRecorder::new(100, 100), 0.0);
        for _ in 0..1_000 {
            assert_eq!(router.pick_lane(), Lane::New);
        }
    }

    #[test]
    fn zero_ratio_routes_everything_to_old() {
        let mut router = router_with(FixedRecorder::new(0, 100), 0.0);
        for _ in 0..1_000 {
            assert_eq!(router.pick_lane(), Lane::Old);
        }
    }

    #[test]
    fn exploration_still_reaches_new_despite_zero_ratio() {
        let mut router = router_with(FixedRecorder::new(0, 100), 0.5);
        let new_picks = (0..10_000)
            .filter(|_| router.pick_lane() == Lane::New)
            .count();
        // Half of calls explore; half of those land on new.
        assert!(
            (2_000..=3_000).contains(&new_picks),
            "expected roughly a quarter, got {new_picks}"
        );
    }

    #[test]
    fn call_returns_the_error_unchanged_and_records_it() {
        let recorder = FixedRecorder::new(100, 100); // force Lane::New
        let mut router = router_with(Arc::clone(&recorder), 0.0);
        let out: Result<(), &str> = router.call(|_| Err("downstream exploded"));
        assert_eq!(out, Err("downstream exploded"));
        assert_eq!(recorder.recorded_failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn gateway_drives_the_router_through_the_selector_trait() {
        use crate::{Call, Gateway};

        let recorder = FixedRecorder::new(100, 100); // force Lane::New
        let mut gw = Gateway::new(router_with(Arc::clone(&recorder), 0.0));
        let call = Call::new("parse", &[7u64]);
        let out: Result<usize, &str> = gw.invoke(&call, |name: &&'static str| Ok(name.len()));
        assert_eq!(out, Ok(3));
        let out: Result<usize, &str> = gw.invoke(&call, |_: &&'static str| Err("boom"));
        assert_eq!(out, Err("boom"));
        assert_eq!(recorder.recorded_failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn old_lane_outcomes_never_influence_feedback() {
        let recorder = FixedRecorder::new(0, 100); // force Lane::Old
        let router = router_with(Arc::clone(&recorder), 0.0);
        router.report_outcome(Lane::Old, CallOutcome::Failure);
        router.report_outcome(Lane::Old, CallOutcome::Failure);
        assert_eq!(recorder.recorded_failures.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn default_window_router_learns_from_reports() {
        let cfg = FallbackConfig::default()
            .with_epsilon(0.0)
            .unwrap()
            .with_seed(7);
        let mut router = FallbackRouter::new(cfg, "old", "new").unwrap();
        for _ in 0..200 {
            router.report_outcome(Lane::New, CallOutcome::Success);
        }
        // Ratio is 1.0 within the window: every pick must be New.
        for _ in 0..100 {
            assert_eq!(router.pick_lane(), Lane::New);
        }
    }
}
