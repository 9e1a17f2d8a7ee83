//! In-process [`SyncStore`].
//!
//! All state sits behind one async mutex and every method runs to completion
//! while holding it, so each primitive and each script is atomic with
//! respect to every other caller sharing the same `MemoryStore`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use rand::seq::IteratorRandom;
use tokio::sync::Mutex;

use backsync_core::{ItemKey, KeyLayout, TiePolicy, Timestamp};

use crate::committer::should_retire;
use crate::error::StoreResult;
use crate::selector;
use crate::store::{ClaimRequest, SyncStore};

#[derive(Debug, Default)]
struct MemoryState {
    sets: HashMap<String, HashSet<ItemKey>>,
    hashes: HashMap<String, HashMap<ItemKey, Timestamp>>,
}

impl MemoryState {
    fn sample(&self, set: &str, count: usize) -> Vec<ItemKey> {
        match self.sets.get(set) {
            Some(members) if count > 0 => members
                .iter()
                .cloned()
                .choose_multiple(&mut rand::thread_rng(), count),
            _ => Vec::new(),
        }
    }

    fn hash_get(&self, hash: &str, field: &ItemKey) -> Option<Timestamp> {
        self.hashes.get(hash).and_then(|h| h.get(field)).copied()
    }

    fn hash_set(&mut self, hash: &str, field: ItemKey, value: Timestamp) {
        self.hashes
            .entry(hash.to_string())
            .or_default()
            .insert(field, value);
    }

    fn hash_remove(&mut self, hash: &str, field: &ItemKey) {
        if let Some(h) = self.hashes.get_mut(hash) {
            h.remove(field);
            if h.is_empty() {
                self.hashes.remove(hash);
            }
        }
    }

    fn set_remove(&mut self, set: &str, member: &ItemKey) {
        if let Some(s) = self.sets.get_mut(set) {
            s.remove(member);
            if s.is_empty() {
                self.sets.remove(set);
            }
        }
    }
}

/// Shared-nothing-across-processes store for tests and single-process embedders.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn set_add(&self, set: &str, member: &ItemKey) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.clone()))
    }

    async fn set_sample_random(&self, set: &str, count: usize) -> StoreResult<Vec<ItemKey>> {
        let state = self.state.lock().await;
        Ok(state.sample(set, count))
    }

    async fn set_remove(&self, set: &str, member: &ItemKey) -> StoreResult<()> {
        self.state.lock().await.set_remove(set, member);
        Ok(())
    }

    async fn set_contains(&self, set: &str, member: &ItemKey) -> StoreResult<bool> {
        let state = self.state.lock().await;
        Ok(state.sets.get(set).is_some_and(|s| s.contains(member)))
    }

    async fn set_len(&self, set: &str) -> StoreResult<usize> {
        let state = self.state.lock().await;
        Ok(state.sets.get(set).map_or(0, HashSet::len))
    }

    async fn hash_multi_get(
        &self,
        hash: &str,
        fields: &[ItemKey],
    ) -> StoreResult<Vec<Option<Timestamp>>> {
        let state = self.state.lock().await;
        Ok(fields.iter().map(|f| state.hash_get(hash, f)).collect())
    }

    async fn hash_multi_set(
        &self,
        hash: &str,
        entries: &[(ItemKey, Timestamp)],
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        for (field, value) in entries {
            state.hash_set(hash, field.clone(), *value);
        }
        Ok(())
    }

    async fn hash_delete(&self, hash: &str, field: &ItemKey) -> StoreResult<()> {
        self.state.lock().await.hash_remove(hash, field);
        Ok(())
    }

    async fn record(
        &self,
        layout: &KeyLayout,
        item: &ItemKey,
        now: Timestamp,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let added = state
            .sets
            .entry(layout.membership_set.clone())
            .or_default()
            .insert(item.clone());
        state.hash_set(&layout.version_hash, item.clone(), now);
        Ok(added)
    }

    async fn claim(&self, layout: &KeyLayout, request: ClaimRequest) -> StoreResult<Vec<ItemKey>> {
        let mut state = self.state.lock().await;
        let sampled = state.sample(&layout.membership_set, request.sample);
        if sampled.is_empty() {
            return Ok(sampled);
        }
        let leases: Vec<_> = sampled
            .iter()
            .map(|k| state.hash_get(&layout.lease_hash, k))
            .collect();
        let versions: Vec<_> = sampled
            .iter()
            .map(|k| state.hash_get(&layout.version_hash, k))
            .collect();
        let claimed = selector::rank(
            sampled,
            &leases,
            &versions,
            request.now,
            request.lease_timeout,
            request.limit,
        );
        for key in &claimed {
            state.hash_set(&layout.lease_hash, key.clone(), request.now);
        }
        Ok(claimed)
    }

    async fn retire(
        &self,
        layout: &KeyLayout,
        items: &[ItemKey],
        tie: TiePolicy,
    ) -> StoreResult<Vec<ItemKey>> {
        let mut state = self.state.lock().await;
        let mut retired = Vec::new();
        for item in items {
            let version = state.hash_get(&layout.version_hash, item);
            let lease = state.hash_get(&layout.lease_hash, item);
            if should_retire(lease, version, tie) {
                state.set_remove(&layout.membership_set, item);
                state.hash_remove(&layout.version_hash, item);
                retired.push(item.clone());
            }
            state.hash_remove(&layout.lease_hash, item);
        }
        Ok(retired)
    }
}
