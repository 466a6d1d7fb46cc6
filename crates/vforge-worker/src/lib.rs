//! Queue worker.
//!
//! This crate provides:
//! - Worker configuration from the environment
//! - The per-tick job executor (claim, resolve, run, finalize)
//! - Progress and heartbeat rewrites of in-flight records
//! - A scheduler with an injectable clock and graceful stop
//! - Structured job logging and Prometheus metrics

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod scheduler;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobExecutor, TickOutcome};
pub use logging::JobLogger;
pub use scheduler::{
    Clock, IntervalClock, ManualClock, ManualTicker, Scheduler, SchedulerHandle, TickTask,
};
