//! File-backed job queue.
//!
//! This crate provides:
//! - Per-session storage layout (`queue/`, `completed/`, `failed/`)
//! - Discovery in modification-time order across sessions
//! - Claims by atomic rename, safe across worker processes
//! - Atomic record rewrites and terminal finalization
//! - Status lookup and an enqueue helper for collaborators
//! - Lease expiry: requeue or fail jobs whose worker died

pub mod error;
pub mod layout;
pub mod lease;
pub mod queue;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use layout::StorageLayout;
pub use lease::{LeaseReaper, ReapReport, LEASE_EXPIRED_CODE};
pub use queue::{ClaimedJob, FileQueue, JobLocation, JobLookup, QueueConfig, QueueEntry};
