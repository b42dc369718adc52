//! Cumulative-weight indexing shared by the weighted routers.

use crate::ConfigError;

/// One implementation together with its routing weight.
///
/// Weights are relative: `[1, 99]` routes roughly 1% of traffic to the first
/// implementation.  A zero weight is rejected at table construction — it
/// would collapse an interval to nothing and silently shadow a neighbor.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Weighted<T> {
    /// Relative share of traffic.  Must be strictly positive.
    pub weight: u32,
    /// The implementation receiving that share.
    pub implementation: T,
}

impl<T> Weighted<T> {
    /// Pair an implementation with its weight.
    pub fn new(weight: u32, implementation: T) -> Self {
        Self {
            weight,
            implementation,
        }
    }
}

/// Immutable cumulative-weight index over an ordered list of weighted
/// implementations.
///
/// Each implementation owns the half-open interval
/// `[previous cumulative weight, previous + weight)`; [`lookup`] maps a point
/// in `[0, total)` to the owner of the interval containing it.  Built once,
/// then shared read-only by its router for the router's lifetime.
///
/// [`lookup`]: WeightTable::lookup
#[derive(Debug, Clone)]
pub struct WeightTable<T> {
    /// Cumulative upper bounds, strictly increasing.  `bounds[i]` is the
    /// exclusive end of implementation `i`'s interval.
    bounds: Vec<u64>,
    implementations: Vec<T>,
    total: u64,
}

impl<T> WeightTable<T> {
    /// Build the index from an ordered list of weighted implementations.
    ///
    /// Fails with [`ConfigError::Empty`] on an empty list and
    /// [`ConfigError::ZeroWeight`] if any weight is zero.
    pub fn new(implementations: Vec<Weighted<T>>) -> Result<Self, ConfigError> {
        if implementations.is_empty() {
            return Err(ConfigError::Empty);
        }
        let mut bounds = Vec::with_capacity(implementations.len());
        let mut impls = Vec::with_capacity(implementations.len());
        let mut total = 0u64;
        for weighted in implementations {
            if weighted.weight == 0 {
                return Err(ConfigError::ZeroWeight);
            }
            total += u64::from(weighted.weight);
            bounds.push(total);
            impls.push(weighted.implementation);
        }
        Ok(Self {
            bounds,
            implementations: impls,
            total,
        })
    }

    /// Sum of all weights; the exclusive upper end of the point space.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of implementations indexed.
    pub fn len(&self) -> usize {
        self.implementations.len()
    }

    /// Whether the table is empty.  Construction rejects empty input, so this
    /// is always `false`; provided for API completeness.
    pub fn is_empty(&self) -> bool {
        self.implementations.is_empty()
    }

    /// The implementation whose interval contains `point`.
    ///
    /// Returns the first entry whose cumulative upper bound is strictly
    /// greater than `point`.
    ///
    /// # Panics
    ///
    /// If `point >= total()`.  Both routers draw or hash points into
    /// `[0, total)`, so this cannot happen through them.
    pub fn lookup(&self, point: u64) -> &T {
        &self.implementations[self.index_of(point)]
    }

    /// Index of the implementation whose interval contains `point`.
    ///
    /// Same contract as [`lookup`](WeightTable::lookup), as a position —
    /// what the gateway's [`ArmId`](crate::ArmId) carries for the weighted
    /// routers.
    pub fn index_of(&self, point: u64) -> usize {
        self.bounds.partition_point(|&upper| upper <= point)
    }

    /// The implementation at table position `index`.
    ///
    /// # Panics
    ///
    /// If `index >= len()` — arm ids only come from `index_of`, which stays
    /// in range.
    pub fn get(&self, index: usize) -> &T {
        &self.implementations[index]
    }
}
