//! The three coordination operations and read-only inspection.
//!
//! - [`Manager::add`] (Recorder) marks an item dirty and stamps its version.
//! - [`Manager::top`] (Selector) leases up to `n` eligible items.
//! - [`Manager::delete`] (Committer) retires items whose lease still covers
//!   their version and clears their leases.
//!
//! Each call reads the clock once and is bounded by the configured deadline.
//! No coordination state is cached between calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backsync_core::{
    BacksyncConfig, ClaimMode, Clock, ItemKey, KeyLayout, SystemClock, TiePolicy, Timestamp,
};

use crate::committer::RetireOutcome;
use crate::error::{StoreError, StoreResult, SyncError};
use crate::selector;
use crate::status::{ItemStatus, LeaseState};
use crate::store::{ClaimRequest, SyncStore};

/// Candidates chosen by the read phase of a best-effort claim, not yet leased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimPlan {
    pub now: Timestamp,
    pub candidates: Vec<ItemKey>,
}

pub struct Manager {
    store: Arc<dyn SyncStore>,
    clock: Arc<dyn Clock>,
    layout: KeyLayout,
    lease_timeout: Duration,
    call_timeout: Duration,
    claim_mode: ClaimMode,
    tie_policy: TiePolicy,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("layout", &self.layout)
            .field("lease_timeout", &self.lease_timeout)
            .field("call_timeout", &self.call_timeout)
            .field("claim_mode", &self.claim_mode)
            .field("tie_policy", &self.tie_policy)
            .finish_non_exhaustive()
    }
}

impl Manager {
    pub fn new(store: Arc<dyn SyncStore>, config: &BacksyncConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            layout: config.layout(),
            lease_timeout: config.lease_timeout(),
            call_timeout: config.call_timeout(),
            claim_mode: config.claim_mode,
            tie_policy: config.tie_policy,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    pub fn claim_mode(&self) -> ClaimMode {
        self.claim_mode
    }

    // -----------------------------------------------------------------------
    // Recorder
    // -----------------------------------------------------------------------

    /// Mark `item` as needing sync and stamp its version with now.
    ///
    /// Re-adding a pending item only refreshes its version. Returns `true`
    /// when the item was not pending before.
    pub async fn add(&self, item: &ItemKey) -> Result<bool, SyncError> {
        let now = self.clock.now();
        let added = self
            .call("add", self.store.record(&self.layout, item, now))
            .await?;
        tracing::debug!(item = %item, version = %now, newly_added = added, "recorded item");
        Ok(added)
    }

    // -----------------------------------------------------------------------
    // Selector
    // -----------------------------------------------------------------------

    /// Lease and return at most `n` eligible items, oldest version first.
    ///
    /// `n == 0` returns nothing without touching the store.
    pub async fn top(&self, n: usize) -> Result<Vec<ItemKey>, SyncError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let claimed = match self.claim_mode {
            ClaimMode::Atomic => {
                let request = ClaimRequest {
                    limit: n,
                    sample: selector::sample_size(n),
                    now: self.clock.now(),
                    lease_timeout: self.lease_timeout,
                };
                self.call("top", self.store.claim(&self.layout, request))
                    .await?
            }
            ClaimMode::BestEffort => {
                self.call("top", async {
                    let plan = self.read_candidates(n).await?;
                    self.write_leases(plan).await
                })
                .await?
            }
        };
        tracing::debug!(
            requested = n,
            claimed = claimed.len(),
            mode = ?self.claim_mode,
            "claimed batch",
        );
        Ok(claimed)
    }

    /// Read phase of a best-effort claim: sample, batch-read leases and
    /// versions, filter and rank. Nothing is written.
    pub async fn plan_claim(&self, n: usize) -> Result<ClaimPlan, SyncError> {
        if n == 0 {
            return Ok(ClaimPlan {
                now: self.clock.now(),
                candidates: Vec::new(),
            });
        }
        self.call("plan_claim", self.read_candidates(n)).await
    }

    /// Write phase of a best-effort claim: lease every planned candidate.
    ///
    /// Does not re-check the leases, so two plans over the same key both win.
    pub async fn commit_claim(&self, plan: ClaimPlan) -> Result<Vec<ItemKey>, SyncError> {
        self.call("commit_claim", self.write_leases(plan)).await
    }

    async fn read_candidates(&self, n: usize) -> StoreResult<ClaimPlan> {
        let now = self.clock.now();
        let sampled = self
            .store
            .set_sample_random(&self.layout.membership_set, selector::sample_size(n))
            .await?;
        if sampled.is_empty() {
            return Ok(ClaimPlan {
                now,
                candidates: sampled,
            });
        }
        let leases = self
            .store
            .hash_multi_get(&self.layout.lease_hash, &sampled)
            .await?;
        let versions = self
            .store
            .hash_multi_get(&self.layout.version_hash, &sampled)
            .await?;
        let candidates = selector::rank(sampled, &leases, &versions, now, self.lease_timeout, n);
        Ok(ClaimPlan { now, candidates })
    }

    async fn write_leases(&self, plan: ClaimPlan) -> StoreResult<Vec<ItemKey>> {
        if plan.candidates.is_empty() {
            return Ok(plan.candidates);
        }
        let entries: Vec<(ItemKey, Timestamp)> = plan
            .candidates
            .iter()
            .map(|key| (key.clone(), plan.now))
            .collect();
        self.store
            .hash_multi_set(&self.layout.lease_hash, &entries)
            .await?;
        Ok(plan.candidates)
    }

    // -----------------------------------------------------------------------
    // Committer
    // -----------------------------------------------------------------------

    /// Retire each item whose lease covers its version; clear every lease.
    ///
    /// An empty batch is a no-op. On error no item may be assumed retired;
    /// retrying the same batch is safe.
    pub async fn delete(&self, items: &[ItemKey]) -> Result<RetireOutcome, SyncError> {
        if items.is_empty() {
            return Ok(RetireOutcome::default());
        }
        let retired = self
            .call(
                "delete",
                self.store.retire(&self.layout, items, self.tie_policy),
            )
            .await?;
        let outcome = RetireOutcome::from_retired(items, retired);
        tracing::debug!(
            requested = items.len(),
            retired = outcome.retired.len(),
            kept = outcome.kept.len(),
            "committed batch",
        );
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Number of items with a pending update.
    pub async fn pending_count(&self) -> Result<usize, SyncError> {
        self.call("pending_count", self.store.set_len(&self.layout.membership_set))
            .await
    }

    /// Snapshot of `item`'s membership, version and lease. Read-only.
    pub async fn inspect(&self, item: &ItemKey) -> Result<ItemStatus, SyncError> {
        let now = self.clock.now();
        self.call("inspect", async {
            let fields = std::slice::from_ref(item);
            let pending = self
                .store
                .set_contains(&self.layout.membership_set, item)
                .await?;
            let version = self
                .store
                .hash_multi_get(&self.layout.version_hash, fields)
                .await?
                .into_iter()
                .next()
                .flatten();
            let lease = self
                .store
                .hash_multi_get(&self.layout.lease_hash, fields)
                .await?
                .into_iter()
                .next()
                .flatten();
            Ok::<_, StoreError>(ItemStatus {
                item: item.clone(),
                pending,
                version,
                lease,
                lease_state: LeaseState::classify(lease, now, self.lease_timeout),
            })
        })
        .await
    }

    async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T, SyncError>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(SyncError::Transport { op, source }),
            Err(_) => Err(SyncError::Timeout {
                op,
                after: self.call_timeout,
            }),
        }
    }
}
