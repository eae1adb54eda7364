//! Background job dispatcher.
//!
//! A single long-lived task that pairs queued job ids with free worker
//! slots. A slot is acquired *before* a job is taken off the queue, so jobs
//! that cannot run yet stay in the bounded queue and a full queue pushes
//! back on submitters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stemsvc_core::types::JobId;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use super::executor::JobRunner;

/// A worker slot held by one job. Counted as in flight until dropped.
///
/// The idle dispatcher also holds a semaphore permit while it waits for the
/// next job, so the semaphore alone over-reports load.
pub struct WorkerSlot {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerSlot {
    fn new(permit: OwnedSemaphorePermit, in_flight: Arc<AtomicUsize>) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        Self {
            _permit: permit,
            in_flight,
        }
    }
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct JobDispatcher {
    queue: mpsc::Receiver<JobId>,
    slots: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    runner: Arc<JobRunner>,
}

impl JobDispatcher {
    pub fn new(
        queue: mpsc::Receiver<JobId>,
        slots: Arc<Semaphore>,
        in_flight: Arc<AtomicUsize>,
        runner: Arc<JobRunner>,
    ) -> Self {
        Self {
            queue,
            slots,
            in_flight,
            runner,
        }
    }

    /// Run the dispatch loop until `cancel` fires or every sender is gone.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            slots = self.slots.available_permits(),
            "Job dispatcher started",
        );

        loop {
            let slot = tokio::select! {
                _ = cancel.cancelled() => break,
                slot = Arc::clone(&self.slots).acquire_owned() => match slot {
                    Ok(slot) => slot,
                    Err(_) => break,
                },
            };

            let job_id = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.queue.recv() => match next {
                    Some(job_id) => job_id,
                    None => break,
                },
            };

            tracing::debug!(
                job_id = %job_id,
                free_slots = self.slots.available_permits(),
                "Dispatching job",
            );
            let slot = WorkerSlot::new(slot, Arc::clone(&self.in_flight));
            let runner = Arc::clone(&self.runner);
            tokio::spawn(async move {
                runner.run(job_id, slot).await;
            });
        }

        tracing::info!("Job dispatcher shutting down");
    }
}
