//! Runs one job from `RUNNING` to a terminal state.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use stemsvc_core::job_state::JobState;
use stemsvc_core::types::JobId;
use stemsvc_db::models::job::{Job, JobTransition};
use stemsvc_db::JobRegistry;
use stemsvc_separation::{SeparationError, SeparationWorker};
use stemsvc_storage::keys::stem_hint;
use stemsvc_storage::{StorageError, StorageGateway};
use tokio::task::JoinHandle;
use tokio::time::timeout_at;

use super::dispatcher::WorkerSlot;

/// Stem name -> storage key.
type Outputs = BTreeMap<String, String>;

/// A separation running on the blocking pool, returning its slot with the result.
type Computation = JoinHandle<(Result<BTreeMap<String, Vec<u8>>, JobFailure>, WorkerSlot)>;

/// What keeps a finished job's worker slot busy.
enum SlotHold {
    Slot(WorkerSlot),
    /// Timed out; the computation frees the slot when it returns.
    Computation(Computation),
    Released,
}

impl SlotHold {
    fn release(self) {
        match self {
            SlotHold::Slot(slot) => drop(slot),
            // Detaches the task; its result and slot are dropped when it returns.
            SlotHold::Computation(handle) => drop(handle),
            SlotHold::Released => {}
        }
    }
}

/// Why a job ended up `FAILED`. The display string is stored on the job.
#[derive(Debug, thiserror::Error)]
pub enum JobFailure {
    #[error("failed to download input {key}: {source}")]
    Input { key: String, source: StorageError },

    #[error(transparent)]
    Separation(#[from] SeparationError),

    #[error("failed to upload stem {stem}: {source}")]
    Upload { stem: String, source: StorageError },

    #[error("job timed out after {0:?}")]
    Timeout(Duration),

    #[error("separation task panicked")]
    Panicked,

    #[error("separation task was aborted")]
    Aborted,
}

/// Executes jobs handed over by the dispatcher. Shared by every job task.
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    storage: StorageGateway,
    worker: SeparationWorker,
    thread_budget: usize,
    timeout: Duration,
}

impl JobRunner {
    pub fn new(
        registry: Arc<JobRegistry>,
        storage: StorageGateway,
        worker: SeparationWorker,
        thread_budget: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            storage,
            worker,
            thread_budget,
            timeout,
        }
    }

    /// Start job `job_id` and record its outcome.
    ///
    /// Jobs that are no longer `PENDING` (cancelled while queued) are skipped.
    /// Never returns an error: every failure becomes the job's `FAILED` state.
    pub async fn run(&self, job_id: JobId, slot: WorkerSlot) {
        let job = match self
            .registry
            .transition_from(job_id, JobState::Pending, JobTransition::Start)
            .await
        {
            Ok(job) => job,
            Err(e) => {
                tracing::info!(
                    job_id = %job_id,
                    reason = %e,
                    "Skipping job that is no longer pending"
                );
                return;
            }
        };

        let started = Instant::now();
        tracing::info!(job_id = %job_id, input_ref = %job.input_ref, "Job started");

        let (outcome, hold) = self.execute(&job, slot).await;

        let transition = match outcome {
            Ok(outputs) => JobTransition::Complete(outputs),
            Err(failure) => {
                tracing::warn!(job_id = %job_id, error = %failure, "Job failed");
                JobTransition::Fail(failure.to_string())
            }
        };

        match self.registry.transition(job_id, transition).await {
            Ok(job) => tracing::info!(
                job_id = %job_id,
                state = %job.state,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Job finished",
            ),
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to record job outcome")
            }
        }

        // Only after the outcome is recorded, so RUNNING jobs never outnumber slots.
        hold.release();
    }

    /// Download, separate, upload under one deadline. Returns stem name ->
    /// storage key, plus whatever still holds the job's worker slot.
    async fn execute(
        &self,
        job: &Job,
        slot: WorkerSlot,
    ) -> (Result<Outputs, JobFailure>, SlotHold) {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let timed_out = || JobFailure::Timeout(self.timeout);

        let input = match timeout_at(deadline, self.storage.get(&job.input_ref)).await {
            Ok(Ok(input)) => input,
            Ok(Err(source)) => {
                let failure = JobFailure::Input {
                    key: job.input_ref.clone(),
                    source,
                };
                return (Err(failure), SlotHold::Slot(slot));
            }
            Err(_) => return (Err(timed_out()), SlotHold::Slot(slot)),
        };

        // The slot moves into the blocking task and comes back with its
        // result, so a computation that outlives the deadline keeps it.
        let worker = self.worker.clone();
        let thread_budget = self.thread_budget;
        let mut computation: Computation = tokio::task::spawn_blocking(move || {
            let run = AssertUnwindSafe(|| worker.separate(input, thread_budget));
            let separated = match panic::catch_unwind(run) {
                Ok(result) => result.map_err(JobFailure::from),
                Err(_) => Err(JobFailure::Panicked),
            };
            (separated, slot)
        });

        let (separated, slot) = match timeout_at(deadline, &mut computation).await {
            Ok(Ok(done)) => done,
            Ok(Err(e)) if e.is_panic() => return (Err(JobFailure::Panicked), SlotHold::Released),
            Ok(Err(_)) => return (Err(JobFailure::Aborted), SlotHold::Released),
            Err(_) => return (Err(timed_out()), SlotHold::Computation(computation)),
        };
        let stems = match separated {
            Ok(stems) => stems,
            Err(failure) => return (Err(failure), SlotHold::Slot(slot)),
        };

        let outcome = match timeout_at(deadline, self.upload(job, stems)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(timed_out()),
        };
        (outcome, SlotHold::Slot(slot))
    }

    async fn upload(
        &self,
        job: &Job,
        stems: BTreeMap<String, Vec<u8>>,
    ) -> Result<Outputs, JobFailure> {
        let job_key = job.id.to_string();
        let uploads = stems.into_iter().map(|(name, bytes)| {
            let hint = stem_hint(&job_key, &name);
            async move {
                match self.storage.put(&hint, bytes).await {
                    Ok(key) => Ok((name, key)),
                    Err(source) => Err(JobFailure::Upload { stem: name, source }),
                }
            }
        });

        // All or nothing: outputs are only recorded if every upload succeeded.
        let outputs = futures::future::try_join_all(uploads).await?;
        Ok(outputs.into_iter().collect())
    }
}
