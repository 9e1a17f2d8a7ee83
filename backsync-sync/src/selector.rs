//! Candidate filtering and ranking for `Top`.
//!
//! Selection is approximate: a random sample of `2n` members stands in for a
//! full ordered scan, so the result is "oldest among the sampled", not the
//! globally oldest pending items.

use std::time::Duration;

use backsync_core::{ItemKey, Timestamp};

/// Members sampled for a request of `limit` keys.
pub fn sample_size(limit: usize) -> usize {
    limit.saturating_mul(2)
}

/// `true` when `lease` still marks the key as owned by a worker.
pub fn lease_blocks(lease: Option<Timestamp>, now: Timestamp, timeout: Duration) -> bool {
    matches!(lease, Some(at) if !at.expired_at(now, timeout))
}

/// Filter `sampled` down to unleased or stale keys, order them by version
/// ascending and keep at most `limit`.
///
/// `leases` and `versions` are parallel to `sampled`. A missing version
/// ranks before any present one.
pub fn rank(
    sampled: Vec<ItemKey>,
    leases: &[Option<Timestamp>],
    versions: &[Option<Timestamp>],
    now: Timestamp,
    timeout: Duration,
    limit: usize,
) -> Vec<ItemKey> {
    let mut candidates: Vec<(ItemKey, Option<Timestamp>)> = sampled
        .into_iter()
        .zip(leases.iter().zip(versions))
        .filter(|(_, (lease, _))| !lease_blocks(**lease, now, timeout))
        .map(|(key, (_, version))| (key, *version))
        .collect();
    candidates.sort_by_key(|(_, version)| *version);
    candidates.truncate(limit);
    candidates.into_iter().map(|(key, _)| key).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<ItemKey> {
        names.iter().map(|n| ItemKey::from(*n)).collect()
    }

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[test]
    fn sample_is_twice_the_limit() {
        assert_eq!(sample_size(0), 0);
        assert_eq!(sample_size(5), 10);
        assert_eq!(sample_size(usize::MAX), usize::MAX);
    }

    #[test]
    fn live_lease_blocks_until_strictly_past_timeout() {
        let lease = Some(Timestamp(100));
        assert!(lease_blocks(lease, Timestamp(100), TIMEOUT));
        assert!(lease_blocks(lease, Timestamp(130), TIMEOUT));
        assert!(!lease_blocks(lease, Timestamp(131), TIMEOUT));
        assert!(!lease_blocks(None, Timestamp(100), TIMEOUT));
    }

    #[test]
    fn ranks_oldest_version_first_and_truncates() {
        let ranked = rank(
            keys(&["c", "a", "b"]),
            &[None, None, None],
            &[Some(Timestamp(300)), Some(Timestamp(100)), Some(Timestamp(200))],
            Timestamp(400),
            TIMEOUT,
            2,
        );
        assert_eq!(ranked, keys(&["a", "b"]));
    }

    #[test]
    fn drops_keys_with_live_leases_but_keeps_stale_ones() {
        let ranked = rank(
            keys(&["live", "stale", "free"]),
            &[Some(Timestamp(390)), Some(Timestamp(300)), None],
            &[Some(Timestamp(10)), Some(Timestamp(20)), Some(Timestamp(30))],
            Timestamp(400),
            TIMEOUT,
            10,
        );
        assert_eq!(ranked, keys(&["stale", "free"]));
    }

    #[test]
    fn missing_version_ranks_first() {
        let ranked = rank(
            keys(&["versioned", "bare"]),
            &[None, None],
            &[Some(Timestamp(1)), None],
            Timestamp(400),
            TIMEOUT,
            2,
        );
        assert_eq!(ranked, keys(&["bare", "versioned"]));
    }

    #[test]
    fn empty_sample_ranks_to_nothing() {
        assert!(rank(vec![], &[], &[], Timestamp(0), TIMEOUT, 3).is_empty());
    }
}
