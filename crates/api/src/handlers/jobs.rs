//! Handlers for the `/jobs` resource.
//!
//! Submissions return as soon as the job is queued; clients poll
//! `GET /jobs/{id}` and download stems once the job is `DONE`.

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use stemsvc_core::error::CoreError;
use stemsvc_core::types::JobId;
use stemsvc_db::models::job::JobListQuery;

use crate::engine::SubmitAudio;
use crate::error::{AppError, AppResult};
use crate::response::{JobAccepted, JobStatusResponse};
use crate::state::AppState;

/// Optional header carrying the client's file name on raw uploads.
pub const FILE_NAME_HEADER: &str = "x-file-name";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const EXTERNAL_ID_HEADER: &str = "x-external-id";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a path id. Anything that is not a UUID cannot name a job.
fn parse_job_id(raw: &str) -> AppResult<JobId> {
    raw.parse().map_err(|_| {
        AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: raw.to_string(),
        })
    })
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

fn body_error(status: StatusCode, message: String) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(message)
    } else {
        AppError::BadRequest(message)
    }
}

/// Read a `multipart/form-data` submission: a `file` part plus optional
/// `user_id` and `external_id` text parts. Unknown parts are ignored.
async fn read_multipart(mut multipart: Multipart) -> AppResult<SubmitAudio> {
    let mut submission = SubmitAudio::default();
    let mut has_file = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| body_error(e.status(), e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                submission.file_name = field.file_name().map(str::to_string);
                submission.bytes = field
                    .bytes()
                    .await
                    .map_err(|e| body_error(e.status(), e.body_text()))?
                    .to_vec();
                has_file = true;
            }
            "user_id" | "external_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| body_error(e.status(), e.body_text()))?;
                let value = Some(text.trim().to_string()).filter(|v| !v.is_empty());
                if name == "user_id" {
                    submission.user_id = value;
                } else {
                    submission.external_id = value;
                }
            }
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    if !has_file {
        return Err(AppError::BadRequest(
            "Multipart body must contain a 'file' field".into(),
        ));
    }
    Ok(submission)
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Accepts either the raw audio as the request body (with optional
/// `x-file-name`, `x-user-id` and `x-external-id` headers) or a multipart
/// form. Returns 202 with the new job id.
pub async fn submit_job(
    State(state): State<AppState>,
    request: Request,
) -> AppResult<impl IntoResponse> {
    let submission = if is_multipart(request.headers()) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        read_multipart(multipart).await?
    } else {
        let headers = request.headers().clone();
        let bytes = Bytes::from_request(request, &state)
            .await
            .map_err(|e| body_error(e.status(), e.body_text()))?;
        SubmitAudio {
            bytes: bytes.to_vec(),
            file_name: header_value(&headers, FILE_NAME_HEADER),
            user_id: header_value(&headers, USER_ID_HEADER),
            external_id: header_value(&headers, EXTERNAL_ID_HEADER),
        }
    };

    if submission.bytes.is_empty() {
        return Err(AppError::BadRequest("Request contains no audio".into()));
    }

    let job_id = state.orchestrator.submit(submission).await?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}

// ---------------------------------------------------------------------------
// List / Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// Newest first. Supports optional `state`, `limit` and `offset` query
/// parameters.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs: Vec<JobStatusResponse> = state
        .orchestrator
        .list(&params)
        .await
        .into_iter()
        .map(JobStatusResponse::from)
        .collect();
    Ok(Json(jobs))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job = state.orchestrator.status(parse_job_id(&id)?).await?;
    Ok(Json(JobStatusResponse::from(job)))
}

/// GET /api/v1/jobs/{id}/stems/{name}
///
/// Streams one stem as `audio/wav`. 409 until the job is `DONE`.
pub async fn get_stem(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let job_id = parse_job_id(&id)?;
    let bytes = state.orchestrator.fetch(job_id, &name).await?;

    Ok((
        [
            (CONTENT_TYPE, "audio/wav".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{job_id}-{name}.wav\""),
            ),
        ],
        bytes,
    ))
}

// ---------------------------------------------------------------------------
// Cancel / Retry
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// Only `PENDING` jobs can be cancelled; returns 409 otherwise.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.orchestrator.cancel(parse_job_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/jobs/{id}/retry
///
/// Queues a new job with the same input as a `FAILED` job.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job_id = state.orchestrator.resubmit(parse_job_id(&id)?).await?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// GET /api/v1/stats
pub async fn get_stats(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.stats().await))
}
