//! Storage-key submission endpoint.
//!
//! Accepts the payload shape used by upload pipelines that put the audio in
//! the bucket themselves and only hand over its key.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::engine::SubmitFromKey;
use crate::error::AppResult;
use crate::response::ProcessAccepted;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub user_id: Option<String>,
    /// Caller's own id for the job, stored as `external_id`.
    pub job_id: Option<String>,
    pub source_key: String,
}

/// POST /process
pub async fn process(
    State(state): State<AppState>,
    Json(input): Json<ProcessRequest>,
) -> AppResult<impl IntoResponse> {
    let job_id = state
        .orchestrator
        .submit_from_key(SubmitFromKey {
            source_key: input.source_key,
            user_id: input.user_id,
            external_id: input.job_id.clone(),
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ProcessAccepted {
            ok: true,
            status: "ACCEPTED",
            job_id,
            external_id: input.job_id,
        }),
    ))
}
