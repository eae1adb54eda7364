//! Job entity model and DTOs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stemsvc_core::job_state::JobState;
use stemsvc_core::types::{JobId, Timestamp};

/// One separation request and its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    /// Storage key of the source audio. Set at creation, never changed.
    pub input_ref: String,
    /// Stem name -> storage key. Non-empty only when `DONE`.
    pub output_refs: BTreeMap<String, String>,
    /// Failure description. Present only when `FAILED`.
    pub error: Option<String>,
    /// Caller-supplied owner, informational only.
    pub user_id: Option<String>,
    /// Caller-supplied correlation id, informational only.
    pub external_id: Option<String>,
    /// Failed job this one was resubmitted from.
    pub retry_of: Option<JobId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Names of the stored stems, sorted.
    pub fn output_stems(&self) -> Vec<String> {
        self.output_refs.keys().cloned().collect()
    }
}

/// Input for [`JobRegistry::create`](crate::JobRegistry::create).
#[derive(Debug, Clone, Default)]
pub struct NewJob {
    pub input_ref: String,
    pub user_id: Option<String>,
    pub external_id: Option<String>,
    pub retry_of: Option<JobId>,
}

impl NewJob {
    pub fn new(input_ref: impl Into<String>) -> Self {
        Self {
            input_ref: input_ref.into(),
            ..Default::default()
        }
    }
}

/// A requested state change together with the fields it populates.
#[derive(Debug, Clone)]
pub enum JobTransition {
    /// `PENDING -> RUNNING`.
    Start,
    /// `RUNNING -> DONE` with every stem's storage key.
    Complete(BTreeMap<String, String>),
    /// `PENDING|RUNNING -> FAILED` with a description.
    Fail(String),
}

impl JobTransition {
    /// State the job ends up in.
    pub fn target(&self) -> JobState {
        match self {
            Self::Start => JobState::Running,
            Self::Complete(_) => JobState::Done,
            Self::Fail(_) => JobState::Failed,
        }
    }
}

/// Query parameters for listing jobs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by state (e.g. `FAILED`).
    pub state: Option<JobState>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<usize>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<usize>,
}

/// Number of jobs in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub pending: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

impl JobCounts {
    pub(crate) fn add(&mut self, state: JobState) {
        match state {
            JobState::Pending => self.pending += 1,
            JobState::Running => self.running += 1,
            JobState::Done => self.done += 1,
            JobState::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.running + self.done + self.failed
    }
}
