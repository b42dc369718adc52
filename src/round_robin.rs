//! Stateless weighted-random selection.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{ArmId, Call, ConfigError, DelegateSelector, WeightTable, Weighted};

/// Routes each call independently at random, proportional to weight.
///
/// No feedback, no memory between calls beyond the RNG stream: with weights
/// `[1, 99]`, each call has a 1% chance of hitting the first implementation
/// regardless of what happened before.  Useful for dipping a fixed share of
/// traffic into a new implementation.
///
/// `pick` takes `&mut self` because drawing from the RNG advances it; wrap
/// the router in a lock, or give each thread its own seeded instance, when
/// sharing across threads.
#[derive(Debug)]
pub struct WeightedRoundRobin<T> {
    table: WeightTable<T>,
    rng: StdRng,
}

impl<T> WeightedRoundRobin<T> {
    /// Build from an ordered list of weighted implementations, seeding the
    /// RNG from the OS.
    pub fn new(implementations: Vec<Weighted<T>>) -> Result<Self, ConfigError> {
        Self::with_seed(implementations, rand::random())
    }

    /// Build with an explicit RNG seed, for reproducible selection streams.
    pub fn with_seed(implementations: Vec<Weighted<T>>, seed: u64) -> Result<Self, ConfigError> {
        let table = WeightTable::new(implementations)?;
        tracing::debug!(
            implementations = table.len(),
            total_weight = table.total(),
            "built weighted round robin router"
        );
        Ok(Self {
            table,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Pick an implementation: draw a point uniformly from `[0, total)` and
    /// look up the interval containing it.
    pub fn pick(&mut self) -> &T {
        let point = self.rng.gen_range(0..self.table.total());
        self.table.lookup(point)
    }

    /// The underlying cumulative-weight table.
    pub fn table(&self) -> &WeightTable<T> {
        &self.table
    }
}

/// Gateway integration.  The call is ignored — selection is independent of
/// operation and arguments.
impl<T, A> DelegateSelector<T, A> for WeightedRoundRobin<T> {
    fn select(&mut self, _call: &Call<'_, A>) -> ArmId {
        let point = self.rng.gen_range(0..self.table.total());
        ArmId(self.table.index_of(point))
    }

    fn implementation(&self, id: ArmId) -> &T {
        self.table.get(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_returns_a_registered_implementation() {
        let mut router = WeightedRoundRobin::with_seed(
            vec![Weighted::new(1, "a"), Weighted::new(999, "b")],
            42,
        )
        .unwrap();
        for _ in 0..100 {
            let picked = *router.pick();
            assert!(picked == "a" || picked == "b");
        }
    }

    #[test]
    fn same_seed_yields_same_stream() {
        let impls = || vec![Weighted::new(1, 1u8), Weighted::new(1, 2u8)];
        let mut a = WeightedRoundRobin::with_seed(impls(), 7).unwrap();
        let mut b = WeightedRoundRobin::with_seed(impls(), 7).unwrap();
        for _ in 0..200 {
            assert_eq!(a.pick(), b.pick());
        }
    }

    #[test]
    fn zero_weight_fails_construction() {
        let err = WeightedRoundRobin::with_seed(vec![Weighted::new(0, "a")], 1).unwrap_err();
        assert_eq!(err, ConfigError::ZeroWeight);
    }

    #[test]
    fn heavily_weighted_implementation_dominates() {
        let mut router = WeightedRoundRobin::with_seed(
            vec![Weighted::new(1, "light"), Weighted::new(999, "heavy")],
            42,
        )
        .unwrap();
        let heavy = (0..10_000).filter(|_| *router.pick() == "heavy").count();
        assert!(heavy > 9_800, "heavy picked only {heavy} of 10000");
    }
}
