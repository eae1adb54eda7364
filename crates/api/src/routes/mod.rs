pub mod health;
pub mod jobs;
pub mod process;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs                          list, submit
/// /jobs/{id}                     status
/// /jobs/{id}/stems/{name}        download one stem
/// /jobs/{id}/cancel              cancel a pending job (POST)
/// /jobs/{id}/retry               resubmit a failed job (POST)
///
/// /stats                         queue and slot usage, jobs per state
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .route("/stats", get(handlers::jobs::get_stats))
}
