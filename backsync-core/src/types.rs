//! Domain types for the backsync coordinator.
//!
//! Item keys are opaque; no structure is assumed beyond exact-match equality.
//! Timestamps are whole seconds since the Unix epoch, matching the resolution
//! of the versions and leases kept in the shared store.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of one syncable record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(pub String);

impl ItemKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ItemKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for ItemKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Seconds since the Unix epoch.
///
/// Used both as an item's version (time of its last update) and as a lease
/// stamp (time a worker claimed it). Equal values are expected at one-second
/// resolution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.timestamp())
    }

    pub fn as_secs(self) -> i64 {
        self.0
    }

    /// `None` when out of chrono's representable range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.0, 0)
    }

    /// Seconds elapsed from `self` until `now`. Negative when `self` lies in
    /// the future (clock skew between workers).
    pub fn age_at(self, now: Timestamp) -> i64 {
        now.0.saturating_sub(self.0)
    }

    /// `true` once more than `timeout` has elapsed since `self`.
    pub fn expired_at(self, now: Timestamp, timeout: Duration) -> bool {
        let limit = i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX);
        self.age_at(now) > limit
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for Timestamp {
    fn from(secs: i64) -> Self {
        Self(secs)
    }
}

// ---------------------------------------------------------------------------
// Store layout
// ---------------------------------------------------------------------------

/// Identifiers of the three shared structures in the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyLayout {
    /// Set of item keys with a pending update.
    pub membership_set: String,
    /// Hash of item key → version timestamp.
    pub version_hash: String,
    /// Hash of item key → lease timestamp.
    pub lease_hash: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_key_display_and_equality() {
        assert_eq!(ItemKey::from("user:42").to_string(), "user:42");
        assert_eq!(ItemKey::from("a"), ItemKey::from(String::from("a")));
        assert_ne!(ItemKey::from("a"), ItemKey::from("A"));
    }

    #[test]
    fn timestamp_age_and_expiry() {
        let lease = Timestamp(100);
        let timeout = Duration::from_secs(30);
        assert_eq!(lease.age_at(Timestamp(110)), 10);
        assert!(!lease.expired_at(Timestamp(110), timeout));
        assert!(!lease.expired_at(Timestamp(130), timeout));
        assert!(lease.expired_at(Timestamp(131), timeout));
    }

    #[test]
    fn timestamp_in_future_is_not_expired() {
        assert!(!Timestamp(200).expired_at(Timestamp(100), Duration::from_secs(0)));
    }

    #[test]
    fn timestamp_from_datetime_truncates_to_seconds() {
        let at = DateTime::parse_from_rfc3339("2024-01-01T00:00:01.900Z")
            .expect("parse")
            .with_timezone(&Utc);
        assert_eq!(Timestamp::from_datetime(at), Timestamp(1_704_067_201));
    }

    #[test]
    fn item_key_serializes_as_plain_string() {
        let yaml = serde_yaml::to_string(&ItemKey::from("k")).expect("serialize");
        assert_eq!(yaml.trim(), "k");
    }
}
