//! In-memory job table guarded by a single `RwLock`.
//!
//! Every mutation happens under the write lock, so concurrent readers observe
//! a job either before or after a transition, never halfway through one.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use stemsvc_core::error::CoreError;
use stemsvc_core::job_state::JobState;
use stemsvc_core::types::{new_job_id, JobId, Timestamp};
use stemsvc_events::{EventBus, JobEvent};
use tokio::sync::RwLock;

use crate::models::job::{Job, JobCounts, JobListQuery, JobTransition, NewJob};

/// Maximum page size for job listing.
const MAX_LIMIT: usize = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: usize = 50;

/// Owns every known job record.
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
    events: Option<Arc<EventBus>>,
}

impl JobRegistry {
    /// Create an empty registry that publishes no events.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            events: None,
        }
    }

    /// Create an empty registry that publishes a [`JobEvent`] on every
    /// creation and transition.
    pub fn with_events(events: Arc<EventBus>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            events: Some(events),
        }
    }

    /// Insert a new `PENDING` job and return it.
    pub async fn create(&self, input: NewJob) -> Result<Job, CoreError> {
        if input.input_ref.trim().is_empty() {
            return Err(CoreError::Validation(
                "Job input_ref must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let job = Job {
            id: new_job_id(),
            state: JobState::Pending,
            input_ref: input.input_ref,
            output_refs: Default::default(),
            error: None,
            user_id: input.user_id,
            external_id: input.external_id,
            retry_of: input.retry_of,
            created_at: now,
            updated_at: now,
        };

        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id, job.clone());
        self.publish(JobEvent::new(job.id, JobState::Pending));
        drop(jobs);

        tracing::debug!(job_id = %job.id, input_ref = %job.input_ref, "Job created");
        Ok(job)
    }

    /// Atomically apply `transition` to job `id`.
    ///
    /// Fails with `InvalidTransition` when the move is not a forward step of
    /// the lifecycle, when completing with no outputs, or when failing with
    /// an empty message. The stored record is untouched on failure.
    pub async fn transition(&self, id: JobId, transition: JobTransition) -> Result<Job, CoreError> {
        self.apply(id, None, transition).await
    }

    /// Like [`transition`](Self::transition), but only if the job is
    /// currently in `expected`. Fails with `InvalidState` otherwise.
    pub async fn transition_from(
        &self,
        id: JobId,
        expected: JobState,
        transition: JobTransition,
    ) -> Result<Job, CoreError> {
        self.apply(id, Some(expected), transition).await
    }

    async fn apply(
        &self,
        id: JobId,
        expected: Option<JobState>,
        transition: JobTransition,
    ) -> Result<Job, CoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| CoreError::job_not_found(id))?;

        if let Some(expected) = expected {
            if job.state != expected {
                return Err(CoreError::InvalidState(format!(
                    "Job {id} is {}, expected {expected}",
                    job.state
                )));
            }
        }

        let from = job.state;
        let to = transition.target();
        let invalid = || CoreError::InvalidTransition { id, from, to };

        if !from.can_transition_to(to) {
            return Err(invalid());
        }

        let mut event = JobEvent::new(id, to);
        match transition {
            JobTransition::Start => {}
            JobTransition::Complete(outputs) => {
                if outputs.is_empty() {
                    return Err(invalid());
                }
                job.output_refs = outputs;
            }
            JobTransition::Fail(error) => {
                if error.trim().is_empty() {
                    return Err(invalid());
                }
                event = event.with_error(error.clone());
                job.error = Some(error);
            }
        }
        job.state = to;
        job.updated_at = Utc::now();

        let snapshot = job.clone();
        // Published under the lock so per-job event order matches transition order.
        self.publish(event);
        drop(jobs);

        tracing::debug!(job_id = %id, %from, %to, "Job transitioned");
        Ok(snapshot)
    }

    /// Fetch a snapshot of job `id`.
    pub async fn get(&self, id: JobId) -> Result<Job, CoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::job_not_found(id))
    }

    /// List jobs newest first, optionally filtered by state.
    pub async fn list(&self, query: &JobListQuery) -> Vec<Job> {
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = query.offset.unwrap_or(0);

        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| query.state.map_or(true, |s| j.state == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        jobs.into_iter().skip(offset).take(limit).collect()
    }

    /// Count jobs per state.
    pub async fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for job in self.jobs.read().await.values() {
            counts.add(job.state);
        }
        counts
    }

    /// Total number of retained jobs.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Remove terminal jobs last updated before `cutoff`.
    ///
    /// Pending and running jobs are never evicted. Returns the number of
    /// records removed.
    pub async fn evict_terminal_before(&self, cutoff: Timestamp) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.state.is_terminal() && job.updated_at < cutoff));
        before - jobs.len()
    }

    fn publish(&self, event: JobEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
