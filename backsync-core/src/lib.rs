//! backsync core library — domain types, clock, configuration, errors.
//!
//! Public API surface:
//! - [`types`] — newtypes for item keys, timestamps and the store key layout
//! - [`clock`] — wall-clock abstraction used to stamp versions and leases
//! - [`config`] — load / save / validate [`BacksyncConfig`]
//! - [`error`] — [`ConfigError`]

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BacksyncConfig, ClaimMode, TiePolicy, WorkerConfig};
pub use error::ConfigError;
pub use types::{ItemKey, KeyLayout, Timestamp};
