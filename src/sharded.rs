//! Deterministic weighted sharding.
//!
//! Where [`WeightedRoundRobin`](crate::WeightedRoundRobin) re-rolls the dice
//! on every call, the sharded router is a pure function of `(seed, key)`: the
//! same shard key against an unchanged configuration always lands on the same
//! implementation.  That makes routing sticky per entity — a given user sees
//! the new implementation either always or never — which matters whenever the
//! implementations are observably different or keep per-entity state warm.

use std::hash::Hash;

use crate::stable_hash::{combine_ordered, jump_hash, stable_hash_of};
use crate::{ArmId, Call, ConfigError, DelegateSelector, Operation, WeightTable, Weighted};

/// Deterministic, consistent-hash-based selection over a weight table.
///
/// Selection hashes the shard key with a platform-stable hasher, combines it
/// (order-sensitively) with the router's seed, and maps the result onto
/// `[0, total weight)` with jump consistent hashing before the interval
/// lookup.  Consistent hashing rather than plain modulo keeps remapping churn
/// when weights change proportional to the weight that actually moved.
///
/// Give every router its own seed.  With a shared seed, two experiments
/// keyed on the same user id would segregate the same users — the same
/// cohort would get every new feature and see every crash first.
#[derive(Debug)]
pub struct WeightedSharded<T> {
    table: WeightTable<T>,
    seed: u64,
}

impl<T> WeightedSharded<T> {
    /// Build for the operation set `operations` from an ordered list of
    /// weighted implementations.
    ///
    /// Every operation the router must support needs at least one argument —
    /// the shard key is extracted from the call, and a zero-argument
    /// operation would leave nothing to shard on.  That is a configuration
    /// error, caught here rather than on the first unlucky call.
    pub fn new(
        operations: &[Operation],
        seed: u64,
        implementations: Vec<Weighted<T>>,
    ) -> Result<Self, ConfigError> {
        if let Some(op) = operations.iter().find(|op| op.arity == 0) {
            return Err(ConfigError::ZeroArgOperation(op.name.to_string()));
        }
        let table = WeightTable::new(implementations)?;
        tracing::debug!(
            implementations = table.len(),
            total_weight = table.total(),
            seed,
            "built weighted sharded router"
        );
        Ok(Self { table, seed })
    }

    /// The implementation that `key` shards to.  Pure: no state is read or
    /// written, so `&self` calls from any number of threads are fine.
    pub fn select_by_key<K: Hash + ?Sized>(&self, key: &K) -> &T {
        self.table.lookup(self.bucket_for(key))
    }

    /// Table index that `key` shards to.
    pub fn index_for<K: Hash + ?Sized>(&self, key: &K) -> usize {
        self.table.index_of(self.bucket_for(key))
    }

    /// The underlying cumulative-weight table.
    pub fn table(&self) -> &WeightTable<T> {
        &self.table
    }

    fn bucket_for<K: Hash + ?Sized>(&self, key: &K) -> u64 {
        let combined = combine_ordered(self.seed, stable_hash_of(key));
        jump_hash(combined, self.table.total())
    }
}

/// Extracts the shard key from a call.
pub type KeyExtractor<A> = for<'a> fn(&'a Call<'a, A>) -> &'a A;

/// The default shard-key extractor: the call's first argument.
pub fn first_argument<'a, A>(call: &'a Call<'a, A>) -> &'a A {
    &call.args[0]
}

/// Gateway adapter binding a [`WeightedSharded`] router to a shard-key
/// extractor.
///
/// The extractor defaults to [`first_argument`]; construction of the inner
/// router has already verified that every declared operation carries one.  A
/// call that violates its own declared arity panics on extraction.
#[derive(Debug)]
pub struct ShardedSelector<T, A> {
    router: WeightedSharded<T>,
    extract: KeyExtractor<A>,
}

impl<T, A: Hash> ShardedSelector<T, A> {
    /// Adapt `router`, sharding on each call's first argument.
    pub fn new(router: WeightedSharded<T>) -> Self {
        Self {
            router,
            extract: first_argument,
        }
    }

    /// Adapt `router` with a custom shard-key extractor.
    pub fn with_extractor(router: WeightedSharded<T>, extract: KeyExtractor<A>) -> Self {
        Self { router, extract }
    }

    /// The wrapped router.
    pub fn router(&self) -> &WeightedSharded<T> {
        &self.router
    }
}

impl<T, A: Hash> DelegateSelector<T, A> for ShardedSelector<T, A> {
    fn select(&mut self, call: &Call<'_, A>) -> ArmId {
        ArmId(self.router.index_for((self.extract)(call)))
    }

    fn implementation(&self, id: ArmId) -> &T {
        self.router.table().get(id.0)
    }
}
