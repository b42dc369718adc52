//! Deterministic simulation of a canary rollout gone wrong.
//!
//! The scenario has two phases.  In phase 1 both implementations are healthy
//! and the fallback router should migrate traffic onto the new one.  At the
//! phase shift the new implementation starts failing at a configured ratio
//! (by default: always), and the router should shed its traffic back to the
//! old implementation within one window span.
//!
//! Everything is driven by a [`ManualClock`] and seeded RNGs, so a given
//! [`SimParams`] always produces the same sample trace.  The `shunt-sim`
//! binary prints [`downsample`]d traces suitable for plotting.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{
    CallOutcome, ConfigError, FallbackConfig, FallbackRouter, ManualClock, SlidingWindow,
};

/// Failure behavior of one simulated implementation.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImplParams {
    /// Probability that a call to this implementation fails.
    pub error_ratio: f64,
}

impl ImplParams {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.error_ratio) {
            return Err(ConfigError::ErrorRatioOutOfRange(self.error_ratio));
        }
        Ok(())
    }
}

/// Failure behavior of both implementations during one phase.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhaseParams {
    pub orig: ImplParams,
    pub new: ImplParams,
}

/// Full description of a simulation run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimParams {
    /// Step index at which phase 2 begins.
    pub phase_shift: u64,
    /// Total number of simulated calls.
    pub steps: u64,
    /// Seed for both the router's RNG and the failure RNG.
    pub seed: u64,
    /// Exploration probability; `None` keeps the router's default.
    pub epsilon: Option<f64>,
    /// Slot count of the feedback window.
    pub slots: usize,
    /// Duration of each window slot.
    pub slot_duration: Duration,
    /// Simulated time between consecutive calls.
    pub duration_per_step: Duration,
    /// Bucket width used by [`downsample`].
    pub output_resolution: Duration,
    pub phase1: PhaseParams,
    pub phase2: PhaseParams,
}

impl Default for SimParams {
    /// One call per second for 1000 seconds over a 6 × 30 s window; the new
    /// implementation is perfect for 500 steps and then fails every call.
    fn default() -> Self {
        Self {
            phase_shift: 500,
            steps: 1000,
            seed: 42,
            epsilon: None,
            slots: 6,
            slot_duration: Duration::from_secs(30),
            duration_per_step: Duration::from_secs(1),
            output_resolution: Duration::from_secs(60),
            phase1: PhaseParams {
                orig: ImplParams { error_ratio: 0.0 },
                new: ImplParams { error_ratio: 0.0 },
            },
            phase2: PhaseParams {
                orig: ImplParams { error_ratio: 0.0 },
                new: ImplParams { error_ratio: 1.0 },
            },
        }
    }
}

impl SimParams {
    /// Check ratio and window parameters before running.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for phase in [&self.phase1, &self.phase2] {
            phase.orig.validate()?;
            phase.new.validate()?;
        }
        if self.slots == 0 {
            return Err(ConfigError::ZeroSlots);
        }
        if let Some(epsilon) = self.epsilon {
            if !(0.0..=1.0).contains(&epsilon) {
                return Err(ConfigError::EpsilonOutOfRange(epsilon));
            }
        }
        Ok(())
    }
}

/// One simulated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// Simulated time of the call, from the start of the run.
    pub at: Duration,
    /// Whether the router picked the new implementation.
    pub new_impl: bool,
    /// Whether the call happened after the phase shift.
    pub phase2: bool,
    /// Whether the call failed.
    pub failed: bool,
}

/// Run one simulation to completion.
///
/// The router's own RNG is seeded with `params.seed`; failures are drawn from
/// an independent RNG so the two decision streams cannot alias each other.
pub fn simulate(params: &SimParams) -> Result<Vec<Sample>, ConfigError> {
    params.validate()?;

    let clock = ManualClock::new();
    let window = SlidingWindow::with_clock(clock.clone(), params.slots, params.slot_duration)?;
    let mut cfg = FallbackConfig::default()
        .with_seed(params.seed)
        .with_recorder(Arc::new(window));
    if let Some(epsilon) = params.epsilon {
        cfg = cfg.with_epsilon(epsilon)?;
    }
    // The implementation under each lane is just "am I the new one".
    let mut router = FallbackRouter::new(cfg, false, true)?;
    let mut failures = StdRng::seed_from_u64(params.seed ^ 0x5353);

    tracing::debug!(
        steps = params.steps,
        phase_shift = params.phase_shift,
        "starting simulation"
    );

    let mut samples = Vec::with_capacity(params.steps as usize);
    for step in 0..params.steps {
        let phase2 = step >= params.phase_shift;
        if step == params.phase_shift {
            tracing::debug!(step, "entering phase 2");
        }
        let phase = if phase2 { &params.phase2 } else { &params.phase1 };

        let lane = router.pick_lane();
        let new_impl = *router.implementation(lane);
        let error_ratio = if new_impl {
            phase.new.error_ratio
        } else {
            phase.orig.error_ratio
        };
        let failed = failures.gen::<f64>() < error_ratio;
        router.report_outcome(
            lane,
            if failed {
                CallOutcome::Failure
            } else {
                CallOutcome::Success
            },
        );

        samples.push(Sample {
            at: params.duration_per_step * step as u32,
            new_impl,
            phase2,
            failed,
        });
        clock.set(params.duration_per_step * (step + 1) as u32);
    }
    Ok(samples)
}

/// Aggregated samples for one output bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DownSample {
    pub old_impl_calls: u64,
    pub new_impl_calls: u64,
    pub old_impl_failures: u64,
    pub new_impl_failures: u64,
    pub phase1_samples: u64,
    pub phase2_samples: u64,
}

impl DownSample {
    fn absorb(&mut self, sample: &Sample) {
        if sample.new_impl {
            self.new_impl_calls += 1;
            self.new_impl_failures += u64::from(sample.failed);
        } else {
            self.old_impl_calls += 1;
            self.old_impl_failures += u64::from(sample.failed);
        }
        if sample.phase2 {
            self.phase2_samples += 1;
        } else {
            self.phase1_samples += 1;
        }
    }
}

/// Bucket samples by `resolution`, keyed by each bucket's start time.
pub fn downsample(samples: &[Sample], resolution: Duration) -> BTreeMap<Duration, DownSample> {
    let resolution_nanos = resolution.as_nanos().max(1);
    let mut buckets: BTreeMap<Duration, DownSample> = BTreeMap::new();
    for sample in samples {
        let index = sample.at.as_nanos() / resolution_nanos;
        let start = Duration::from_nanos((index * resolution_nanos) as u64);
        buckets.entry(start).or_default().absorb(sample);
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_run_is_reproducible() {
        let params = SimParams::default();
        let a = simulate(&params).unwrap();
        let b = simulate(&params).unwrap();
        assert_eq!(a.len(), 1000);
        assert_eq!(a, b);
    }

    #[test]
    fn phase_flag_flips_at_the_shift() {
        let samples = simulate(&SimParams::default()).unwrap();
        assert!(samples[..500].iter().all(|s| !s.phase2));
        assert!(samples[500..].iter().all(|s| s.phase2));
    }

    #[test]
    fn invalid_error_ratio_is_rejected() {
        let mut params = SimParams::default();
        params.phase2.new.error_ratio = 1.5;
        assert_eq!(
            simulate(&params).unwrap_err(),
            ConfigError::ErrorRatioOutOfRange(1.5)
        );
    }

    #[test]
    fn downsample_partitions_without_loss() {
        let params = SimParams::default();
        let samples = simulate(&params).unwrap();
        let buckets = downsample(&samples, params.output_resolution);
        let total: u64 = buckets
            .values()
            .map(|d| d.old_impl_calls + d.new_impl_calls)
            .sum();
        assert_eq!(total, params.steps);
        // 1000 one-second steps at 60 s resolution: buckets 0..=16.
        assert_eq!(buckets.len(), 17);
        assert_eq!(
            buckets.keys().next().copied(),
            Some(Duration::from_secs(0))
        );
    }

    #[test]
    fn failures_only_occur_where_the_phase_allows_them() {
        let samples = simulate(&SimParams::default()).unwrap();
        for s in &samples {
            if s.failed {
                assert!(s.phase2 && s.new_impl, "unexpected failure at {:?}", s.at);
            }
        }
    }
}
