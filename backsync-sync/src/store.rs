//! Capability contract of the shared coordination store.
//!
//! The primitives are plain set/hash operations. The three scripts are the
//! indivisible multi-step sequences the coordinator depends on; a backend
//! must execute each of them so that no other caller observes or interleaves
//! with an intermediate state.

use std::time::Duration;

use async_trait::async_trait;

use backsync_core::{ItemKey, KeyLayout, TiePolicy, Timestamp};

use crate::error::StoreResult;

/// Parameters of one atomic claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimRequest {
    /// Maximum number of keys to lease.
    pub limit: usize,
    /// Number of distinct members to sample before filtering.
    pub sample: usize,
    /// Lease stamp written for every claimed key.
    pub now: Timestamp,
    /// Age after which an existing lease stops blocking the claim.
    pub lease_timeout: Duration,
}

#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Insert `member`; `true` if it was not already present.
    async fn set_add(&self, set: &str, member: &ItemKey) -> StoreResult<bool>;

    /// Up to `count` distinct members chosen at random; empty for an empty set.
    async fn set_sample_random(&self, set: &str, count: usize) -> StoreResult<Vec<ItemKey>>;

    async fn set_remove(&self, set: &str, member: &ItemKey) -> StoreResult<()>;

    async fn set_contains(&self, set: &str, member: &ItemKey) -> StoreResult<bool>;

    async fn set_len(&self, set: &str) -> StoreResult<usize>;

    /// One entry per requested field, in request order.
    async fn hash_multi_get(
        &self,
        hash: &str,
        fields: &[ItemKey],
    ) -> StoreResult<Vec<Option<Timestamp>>>;

    async fn hash_multi_set(&self, hash: &str, entries: &[(ItemKey, Timestamp)])
        -> StoreResult<()>;

    async fn hash_delete(&self, hash: &str, field: &ItemKey) -> StoreResult<()>;

    /// Add `item` to the membership set and overwrite its version with `now`.
    ///
    /// Returns `true` if the item was newly added.
    async fn record(&self, layout: &KeyLayout, item: &ItemKey, now: Timestamp)
        -> StoreResult<bool>;

    /// Sample, drop keys with a live lease, rank by version (oldest first),
    /// keep `request.limit` and lease them at `request.now`.
    async fn claim(&self, layout: &KeyLayout, request: ClaimRequest) -> StoreResult<Vec<ItemKey>>;

    /// For each item: retire it (remove membership and version) when its lease
    /// covers its version under `tie`, then clear its lease unconditionally.
    ///
    /// Returns the retired items.
    async fn retire(
        &self,
        layout: &KeyLayout,
        items: &[ItemKey],
        tie: TiePolicy,
    ) -> StoreResult<Vec<ItemKey>>;
}
