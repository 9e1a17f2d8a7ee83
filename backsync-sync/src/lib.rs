//! # backsync-sync
//!
//! Lease-based claim / commit protocol over a shared store.
//!
//! Build a [`Manager`] over any [`SyncStore`] ([`MemoryStore`] in-process,
//! [`RedisStore`] across processes), then call [`Manager::add`] from
//! producers and [`Manager::top`] / [`Manager::delete`] from workers.

pub mod committer;
pub mod error;
pub mod manager;
pub mod memory;
pub mod redis_store;
pub mod selector;
pub mod status;
pub mod store;

pub use committer::RetireOutcome;
pub use error::{StoreError, StoreResult, SyncError};
pub use manager::{ClaimPlan, Manager};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use status::{ItemStatus, LeaseState};
pub use store::{ClaimRequest, SyncStore};
