//! Public face of the engine: submit, inspect, cancel and resubmit jobs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stemsvc_core::error::CoreError;
use stemsvc_core::job_state::JobState;
use stemsvc_core::types::JobId;
use stemsvc_db::models::job::{Job, JobListQuery, JobTransition, NewJob};
use stemsvc_db::JobRegistry;
use stemsvc_separation::SeparationWorker;
use stemsvc_storage::keys::source_hint;
use stemsvc_storage::StorageGateway;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::dispatcher::JobDispatcher;
use super::executor::JobRunner;
use super::{EngineConfig, EngineError, EngineStats};

/// Error recorded on jobs cancelled before they started.
pub const CANCELLED_ERROR: &str = "cancelled";

/// Audio uploaded by the caller.
#[derive(Debug, Default)]
pub struct SubmitAudio {
    pub bytes: Vec<u8>,
    /// Client file name, used only to make the storage key readable.
    pub file_name: Option<String>,
    pub user_id: Option<String>,
    pub external_id: Option<String>,
}

/// Audio that is already in the object store.
#[derive(Debug, Default)]
pub struct SubmitFromKey {
    pub source_key: String,
    pub user_id: Option<String>,
    pub external_id: Option<String>,
}

/// Owns the job queue and the dispatcher task.
///
/// Separation never runs on the caller's task: every submit returns as soon
/// as the job is recorded and queued.
pub struct JobOrchestrator {
    registry: Arc<JobRegistry>,
    storage: StorageGateway,
    worker: SeparationWorker,
    config: EngineConfig,
    queue: mpsc::Sender<JobId>,
    in_flight: Arc<AtomicUsize>,
    cancel: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl JobOrchestrator {
    /// Create the queue and spawn the dispatcher. Must be called inside a
    /// Tokio runtime.
    pub fn start(
        registry: Arc<JobRegistry>,
        storage: StorageGateway,
        worker: SeparationWorker,
        mut config: EngineConfig,
    ) -> Arc<Self> {
        config.queue_capacity = config.queue_capacity.max(1);
        config.max_concurrent_jobs = config.max_concurrent_jobs.max(1);

        let (queue, receiver) = mpsc::channel(config.queue_capacity);
        let slots = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let runner = Arc::new(JobRunner::new(
            Arc::clone(&registry),
            storage.clone(),
            worker.clone(),
            config.thread_budget,
            config.job_timeout,
        ));
        let dispatcher = JobDispatcher::new(receiver, slots, Arc::clone(&in_flight), runner);
        let handle = tokio::spawn(dispatcher.run(cancel.clone()));

        tracing::info!(
            model = worker.model_name(),
            model_version = worker.model_version(),
            storage = storage.backend_name(),
            thread_budget = config.thread_budget,
            max_concurrent_jobs = config.max_concurrent_jobs,
            queue_capacity = config.queue_capacity,
            job_timeout_secs = config.job_timeout.as_secs(),
            "Job orchestrator started",
        );

        Arc::new(Self {
            registry,
            storage,
            worker,
            config,
            queue,
            in_flight,
            cancel,
            dispatcher: Mutex::new(Some(handle)),
        })
    }

    /// Upload `request.bytes`, record a `PENDING` job and queue it.
    ///
    /// Queue space is reserved before the upload, so a full queue fails with
    /// `Overload` without touching storage, and a reserved slot cannot be
    /// lost to a concurrent submit. If the upload fails no job is created.
    pub async fn submit(&self, request: SubmitAudio) -> Result<JobId, EngineError> {
        if request.bytes.is_empty() {
            return Err(CoreError::Validation("Audio input must not be empty".into()).into());
        }

        let permit = self.reserve()?;
        let size = request.bytes.len();
        let input_ref = self
            .storage
            .put(&source_hint(request.file_name.as_deref()), request.bytes)
            .await?;

        let job = self
            .registry
            .create(NewJob {
                input_ref,
                user_id: request.user_id,
                external_id: request.external_id,
                retry_of: None,
            })
            .await?;
        permit.send(job.id);

        tracing::info!(job_id = %job.id, input_ref = %job.input_ref, size, "Job submitted");
        Ok(job.id)
    }

    /// Queue a job for audio already stored under `request.source_key`.
    ///
    /// The key is not checked here; a missing object fails the job.
    pub async fn submit_from_key(&self, request: SubmitFromKey) -> Result<JobId, EngineError> {
        let source_key = request.source_key.trim();
        if source_key.is_empty() {
            return Err(CoreError::Validation("Source key must not be empty".into()).into());
        }

        let permit = self.reserve()?;
        let job = self
            .registry
            .create(NewJob {
                input_ref: source_key.to_string(),
                user_id: request.user_id,
                external_id: request.external_id,
                retry_of: None,
            })
            .await?;
        permit.send(job.id);

        tracing::info!(
            job_id = %job.id,
            input_ref = %job.input_ref,
            "Job submitted from storage key"
        );
        Ok(job.id)
    }

    /// Queue a fresh job for the input of failed job `id`.
    pub async fn resubmit(&self, id: JobId) -> Result<JobId, EngineError> {
        let previous = self.registry.get(id).await?;
        if previous.state != JobState::Failed {
            return Err(CoreError::InvalidState(format!(
                "Job {id} is {}, only FAILED jobs can be retried",
                previous.state
            ))
            .into());
        }

        let permit = self.reserve()?;
        let job = self
            .registry
            .create(NewJob {
                input_ref: previous.input_ref,
                user_id: previous.user_id,
                external_id: previous.external_id,
                retry_of: Some(id),
            })
            .await?;
        permit.send(job.id);

        tracing::info!(job_id = %job.id, retry_of = %id, "Job resubmitted");
        Ok(job.id)
    }

    /// Fail a job that has not started yet. The dispatcher skips it when its
    /// turn comes.
    pub async fn cancel(&self, id: JobId) -> Result<Job, EngineError> {
        let job = self
            .registry
            .transition_from(id, JobState::Pending, JobTransition::Fail(CANCELLED_ERROR.into()))
            .await?;
        tracing::info!(job_id = %id, "Job cancelled");
        Ok(job)
    }

    pub async fn status(&self, id: JobId) -> Result<Job, EngineError> {
        Ok(self.registry.get(id).await?)
    }

    /// Download one stem of a finished job.
    pub async fn fetch(&self, id: JobId, stem: &str) -> Result<Vec<u8>, EngineError> {
        let job = self.registry.get(id).await?;
        if job.state != JobState::Done {
            return Err(CoreError::InvalidState(format!(
                "Job {id} is {}, stems are available once it is DONE",
                job.state
            ))
            .into());
        }

        let key = job.output_refs.get(stem).ok_or_else(|| CoreError::NotFound {
            entity: "Stem",
            id: stem.to_string(),
        })?;
        Ok(self.storage.get(key).await?)
    }

    pub async fn list(&self, query: &JobListQuery) -> Vec<Job> {
        self.registry.list(query).await
    }

    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            queue_depth: self.queue_depth(),
            queue_capacity: self.config.queue_capacity,
            in_flight: self.in_flight(),
            max_concurrent_jobs: self.config.max_concurrent_jobs,
            thread_budget: self.config.thread_budget,
            jobs: self.registry.counts().await,
        }
    }

    /// Jobs queued (or being queued) but not yet picked up.
    pub fn queue_depth(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }

    /// Worker slots in use, including computations that outlived their
    /// job's timeout.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stem names every finished job exposes.
    pub fn stem_names(&self) -> Vec<String> {
        self.worker.stem_names()
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Stop the dispatcher. Jobs still queued stay `PENDING`; jobs already
    /// running are left to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.dispatcher.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Job dispatcher task failed");
            }
        }
        tracing::info!(queued = self.queue_depth(), "Job orchestrator shut down");
    }

    fn reserve(&self) -> Result<mpsc::Permit<'_, JobId>, CoreError> {
        self.queue.try_reserve().map_err(|e| match e {
            TrySendError::Full(()) => {
                tracing::warn!(
                    queue_capacity = self.config.queue_capacity,
                    "Job queue full, rejecting submission"
                );
                CoreError::Overload(format!(
                    "Job queue is full ({} waiting), retry later",
                    self.config.queue_capacity
                ))
            }
            TrySendError::Closed(()) => {
                CoreError::Internal("Job dispatcher is not running".into())
            }
        })
    }
}
