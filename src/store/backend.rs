//! Counter store trait abstracting the local and shared backends.

use async_trait::async_trait;

use crate::error::StoreError;

/// Per-identifier outstanding-work counters.
///
/// This trait abstracts over the in-memory [`MemoryStore`](super::MemoryStore)
/// and the shared [`RedisStore`](super::RedisStore) so the limiter works with
/// either. Implementations must make all operations on a given identifier
/// linearizable with respect to each other: two concurrent calls must never
/// lose an update, and [`try_acquire`](CounterStore::try_acquire) must
/// observe and mutate the count as one atomic step.
///
/// A missing identifier is equivalent to a count of 0, and counts never go
/// negative.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current count for `id`, 0 if unknown. Never fails; a shared backend
    /// logs any transport error and reports 0.
    async fn get(&self, id: &str) -> u64;

    /// Atomically check `id` against `limit` and, when below it, increment.
    ///
    /// Returns `true` when the acquisition succeeded. On `false` the count
    /// is left untouched. This is the admission primitive: with limit `L`,
    /// the `L+1`-th concurrent unreleased acquisition always fails.
    async fn try_acquire(&self, id: &str, limit: u64) -> Result<bool, StoreError>;

    /// Increment the count for `id`, creating it at 1 if absent. A shared
    /// backend also refreshes the key's expiry as a leak backstop.
    async fn increase(&self, id: &str) -> Result<(), StoreError>;

    /// Decrement the count for `id`. A resulting count of 0 (or a decrement
    /// of a missing id) removes the identifier entirely.
    async fn decrease(&self, id: &str) -> Result<(), StoreError>;

    /// Unconditionally remove `id`, resetting its count to 0.
    async fn free(&self, id: &str) -> Result<(), StoreError>;

    /// Reset every identifier's count to 0. Used by the cleanup worker.
    async fn free_all(&self) -> Result<(), StoreError>;
}
