//! Retirement rule for `Delete` and the outcome reported to callers.

use std::collections::HashSet;

use serde::Serialize;

use backsync_core::{ItemKey, TiePolicy, Timestamp};

/// `true` when an item may leave the pending set: both stamps are present
/// and the lease covers the version, i.e. no update was recorded after the
/// claim that produced the lease.
pub fn should_retire(lease: Option<Timestamp>, version: Option<Timestamp>, tie: TiePolicy) -> bool {
    match (lease, version) {
        (Some(lease), Some(version)) => tie.covers(lease.0, version.0),
        _ => false,
    }
}

/// Result of one `Delete` batch. Every requested key lands in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetireOutcome {
    /// Keys removed from the pending set.
    pub retired: Vec<ItemKey>,
    /// Keys that stay pending (updated after their claim, or never claimed).
    pub kept: Vec<ItemKey>,
}

impl RetireOutcome {
    /// Split `requested` into retired and kept, given the keys the store retired.
    pub fn from_retired(requested: &[ItemKey], retired: Vec<ItemKey>) -> Self {
        let retired_set: HashSet<&ItemKey> = retired.iter().collect();
        let mut seen = HashSet::new();
        let kept = requested
            .iter()
            .filter(|key| !retired_set.contains(key) && seen.insert(*key))
            .cloned()
            .collect();
        Self { retired, kept }
    }
}
