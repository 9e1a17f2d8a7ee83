//! Read-only view of one item's coordination state.

use std::time::Duration;

use serde::Serialize;

use backsync_core::{ItemKey, Timestamp};

/// Ownership of an item as seen by `Top` at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LeaseState {
    /// No lease entry.
    Unclaimed,
    /// Leased and still blocking selection.
    Active { age_secs: i64 },
    /// Leased but past the timeout; the next claim may take it over.
    Stale { age_secs: i64 },
}

impl LeaseState {
    pub fn classify(lease: Option<Timestamp>, now: Timestamp, timeout: Duration) -> Self {
        match lease {
            None => LeaseState::Unclaimed,
            Some(at) if at.expired_at(now, timeout) => LeaseState::Stale {
                age_secs: at.age_at(now),
            },
            Some(at) => LeaseState::Active {
                age_secs: at.age_at(now),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemStatus {
    pub item: ItemKey,
    /// Member of the pending set.
    pub pending: bool,
    pub version: Option<Timestamp>,
    pub lease: Option<Timestamp>,
    pub lease_state: LeaseState,
}

impl ItemStatus {
    /// Whether `Top` could hand this item out right now.
    pub fn eligible(&self) -> bool {
        self.pending && !matches!(self.lease_state, LeaseState::Active { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_lease_ages() {
        let timeout = Duration::from_secs(30);
        assert_eq!(
            LeaseState::classify(None, Timestamp(100), timeout),
            LeaseState::Unclaimed
        );
        assert_eq!(
            LeaseState::classify(Some(Timestamp(100)), Timestamp(110), timeout),
            LeaseState::Active { age_secs: 10 }
        );
        assert_eq!(
            LeaseState::classify(Some(Timestamp(100)), Timestamp(140), timeout),
            LeaseState::Stale { age_secs: 40 }
        );
    }

    #[test]
    fn status_serializes_with_tagged_lease_state() {
        let status = ItemStatus {
            item: ItemKey::from("a"),
            pending: true,
            version: Some(Timestamp(100)),
            lease: Some(Timestamp(101)),
            lease_state: LeaseState::Active { age_secs: 1 },
        };
        let json = serde_json::to_value(&status).expect("serialize");
        assert_eq!(json["item"], "a");
        assert_eq!(json["lease_state"]["state"], "active");
        assert_eq!(json["lease_state"]["age_secs"], 1);
        assert!(!ItemStatus {
            lease_state: LeaseState::Active { age_secs: 1 },
            ..status.clone()
        }
        .eligible());
        assert!(ItemStatus {
            lease_state: LeaseState::Stale { age_secs: 31 },
            ..status
        }
        .eligible());
    }
}
