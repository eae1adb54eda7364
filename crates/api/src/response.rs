//! Response payload types for API handlers.

use serde::Serialize;
use stemsvc_core::job_state::JobState;
use stemsvc_core::types::{JobId, Timestamp};
use stemsvc_db::models::job::Job;

/// Body of a `202 Accepted` submission.
#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: JobId,
}

/// Public view of a job. Storage keys are not exposed; stems are fetched
/// through the API by name.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub state: JobState,
    /// Stem names available for download. Empty unless `DONE`.
    pub output_stems: Vec<String>,
    pub error: Option<String>,
    pub user_id: Option<String>,
    pub external_id: Option<String>,
    pub retry_of: Option<JobId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            state: job.state,
            output_stems: job.output_stems(),
            error: job.error,
            user_id: job.user_id,
            external_id: job.external_id,
            retry_of: job.retry_of,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Acknowledgement for `POST /process`.
#[derive(Debug, Serialize)]
pub struct ProcessAccepted {
    pub ok: bool,
    pub status: &'static str,
    pub job_id: JobId,
    /// Echo of the caller's `jobId`, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}
