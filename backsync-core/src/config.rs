//! YAML configuration for coordinators, workers and the CLI.
//!
//! # Storage layout
//!
//! ```text
//! ~/.backsync/
//!   config.yaml   (mode 0600, written by `backsync config init`)
//! ```
//!
//! # API pattern
//!
//! Every filesystem function has two forms:
//! - `fn_at(path: &Path, …)` — explicit path; used in tests with `TempDir`
//! - `fn(…)` — derives the path from `dirs::home_dir()`, delegates to `_at`
//!
//! A missing file is not an error: loading yields [`BacksyncConfig::default`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::KeyLayout;

pub const DEFAULT_MEMBERSHIP_SET: &str = "backsync:pending";
pub const DEFAULT_VERSION_HASH: &str = "backsync:versions";
pub const DEFAULT_LEASE_HASH: &str = "backsync:leases";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// How `Top` turns its read-filter-write sequence into claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClaimMode {
    /// Sample, filter, rank and lease in one store-side script. Concurrent
    /// callers never both win a non-stale lease on the same key.
    #[default]
    Atomic,
    /// Batched reads followed by a separate batched lease write. Two callers
    /// can claim the same key; only safe with an idempotent downstream sync.
    BestEffort,
}

/// Whether a lease stamped in the same second as the item's version still
/// proves that no update arrived after the claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// `lease >= version` retires the item.
    #[default]
    Inclusive,
    /// Only `lease > version` retires; equal seconds keep the item for another pass.
    Strict,
}

impl TiePolicy {
    /// `true` when `lease` covers `version` under this policy.
    pub fn covers(self, lease: i64, version: i64) -> bool {
        match self {
            TiePolicy::Inclusive => lease >= version,
            TiePolicy::Strict => lease > version,
        }
    }
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

/// Settings for the claim → sync → commit worker loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Upper bound passed to `Top` on every iteration.
    pub batch_size: usize,
    /// Pause after an empty claim or a failed store call.
    pub idle_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            idle_interval_ms: 1_000,
        }
    }
}

impl WorkerConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacksyncConfig {
    pub membership_set: String,
    pub version_hash: String,
    pub lease_hash: String,
    /// Age in seconds after which a lease no longer blocks selection.
    pub lease_timeout_secs: u64,
    /// Deadline applied to every store call.
    pub call_timeout_ms: u64,
    pub claim_mode: ClaimMode,
    pub tie_policy: TiePolicy,
    pub redis_url: String,
    pub worker: WorkerConfig,
}

impl Default for BacksyncConfig {
    fn default() -> Self {
        Self {
            membership_set: DEFAULT_MEMBERSHIP_SET.to_string(),
            version_hash: DEFAULT_VERSION_HASH.to_string(),
            lease_hash: DEFAULT_LEASE_HASH.to_string(),
            lease_timeout_secs: 30,
            call_timeout_ms: 5_000,
            claim_mode: ClaimMode::default(),
            tie_policy: TiePolicy::default(),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            worker: WorkerConfig::default(),
        }
    }
}

impl BacksyncConfig {
    pub fn layout(&self) -> KeyLayout {
        KeyLayout {
            membership_set: self.membership_set.clone(),
            version_hash: self.version_hash.clone(),
            lease_hash: self.lease_hash.clone(),
        }
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.lease_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Reject settings the coordinator cannot work with.
    ///
    /// The three structure ids must be non-empty and pairwise distinct,
    /// otherwise versions and leases would overwrite each other.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ids = [
            ("membership_set", &self.membership_set),
            ("version_hash", &self.version_hash),
            ("lease_hash", &self.lease_hash),
        ];
        for (field, id) in ids {
            if id.trim().is_empty() {
                return Err(ConfigError::invalid(field, "must not be empty"));
            }
        }
        for (i, &(field, id)) in ids.iter().enumerate() {
            if let Some((other, _)) = ids[..i].iter().find(|(_, prior)| *prior == id) {
                return Err(ConfigError::invalid(
                    field,
                    format!("collides with `{other}` ({id})"),
                ));
            }
        }
        if self.lease_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "lease_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "call_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.worker.batch_size == 0 {
            return Err(ConfigError::invalid(
                "worker.batch_size",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.backsync/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".backsync").join("config.yaml")
}

/// `<home>/.backsync/config.yaml` (convenience — uses `dirs::home_dir()`).
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_path_at(&home()?))
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load and validate the config at `path`.
///
/// Returns defaults if the file is absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML,
/// `ConfigError::Invalid` if a field fails [`BacksyncConfig::validate`].
pub fn load_at(path: &Path) -> Result<BacksyncConfig, ConfigError> {
    if !path.exists() {
        return Ok(BacksyncConfig::default());
    }
    let contents = std::fs::read_to_string(path)?;
    let config: BacksyncConfig = serde_yaml::from_str(&contents).map_err(|e| {
        ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        }
    })?;
    config.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<BacksyncConfig, ConfigError> {
    load_at(&config_path()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Render `config` in the on-disk format.
pub fn to_yaml(config: &BacksyncConfig) -> Result<String, ConfigError> {
    Ok(serde_yaml::to_string(config)?)
}

/// Atomically write `config` to `path`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(path: &Path, config: &BacksyncConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
            set_dir_permissions(dir)?;
        }
    }
    let tmp_path = path.with_extension("yaml.tmp");
    let yaml = to_yaml(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// 4. Init
// ---------------------------------------------------------------------------

/// Write a default config to `path` unless one already exists.
///
/// Idempotent: an existing file is loaded and returned unchanged.
pub fn init_at(path: &Path) -> Result<BacksyncConfig, ConfigError> {
    if path.exists() {
        return load_at(path);
    }
    let config = BacksyncConfig::default();
    save_at(path, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init() -> Result<BacksyncConfig, ConfigError> {
    init_at(&config_path()?)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_path_is_correct() {
        let home = TempDir::new().expect("tempdir");
        assert!(config_path_at(home.path()).ends_with(".backsync/config.yaml"));
    }

    #[test]
    fn defaults_are_valid() {
        BacksyncConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn missing_file_loads_defaults() {
        let home = TempDir::new().expect("tempdir");
        let config = load_at(&config_path_at(home.path())).expect("load");
        assert_eq!(config, BacksyncConfig::default());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let home = TempDir::new().expect("tempdir");
        let path = home.path().join("partial.yaml");
        std::fs::write(&path, "lease_timeout_secs: 90\nworker:\n  batch_size: 7\n")
            .expect("write");
        let config = load_at(&path).expect("load");
        assert_eq!(config.lease_timeout(), Duration::from_secs(90));
        assert_eq!(config.worker.batch_size, 7);
        assert_eq!(config.worker.idle_interval_ms, 1_000);
        assert_eq!(config.membership_set, DEFAULT_MEMBERSHIP_SET);
    }

    #[test]
    fn layout_mirrors_ids() {
        let config = BacksyncConfig::default();
        let layout = config.layout();
        assert_eq!(layout.membership_set, "backsync:pending");
        assert_eq!(layout.version_hash, "backsync:versions");
        assert_eq!(layout.lease_hash, "backsync:leases");
    }

    #[test]
    fn tie_policy_covers() {
        assert!(TiePolicy::Inclusive.covers(101, 100));
        assert!(TiePolicy::Inclusive.covers(100, 100));
        assert!(!TiePolicy::Inclusive.covers(99, 100));
        assert!(TiePolicy::Strict.covers(101, 100));
        assert!(!TiePolicy::Strict.covers(100, 100));
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(ConfigError::HomeNotFound.to_string().contains("home directory"));
    }
}
