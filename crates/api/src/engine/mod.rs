//! Job execution engine.
//!
//! [`JobOrchestrator`] is the front door: it accepts audio, records a
//! `PENDING` job and pushes its id onto a bounded queue. A single
//! [`dispatcher`] task drains the queue, one worker slot at a time, and hands
//! each job to an [`executor`] task that downloads, separates and uploads.

pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod orchestrator;

use std::time::Duration;

use serde::Serialize;
use stemsvc_db::models::job::JobCounts;

pub use error::EngineError;
pub use orchestrator::{JobOrchestrator, SubmitAudio, SubmitFromKey};

/// Tuning knobs for background execution.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Compute threads one separation may use (default: `1`).
    pub thread_budget: usize,
    /// Separations allowed to run at once (default: number of CPU cores).
    pub max_concurrent_jobs: usize,
    /// Jobs that may wait for a slot before submissions are refused
    /// (default: `64`).
    pub queue_capacity: usize,
    /// Wall-clock limit per job, download to upload (default: 600 s).
    pub job_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_budget: 1,
            max_concurrent_jobs: default_concurrency(),
            queue_capacity: 64,
            job_timeout: Duration::from_secs(600),
        }
    }
}

/// Number of CPU cores, or 1 if it cannot be determined.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// Point-in-time view of engine load.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Jobs waiting in the queue.
    pub queue_depth: usize,
    pub queue_capacity: usize,
    /// Worker slots currently held by a job.
    pub in_flight: usize,
    pub max_concurrent_jobs: usize,
    pub thread_budget: usize,
    /// Retained jobs per state.
    pub jobs: JobCounts,
}
