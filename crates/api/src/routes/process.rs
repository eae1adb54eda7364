use axum::routing::post;
use axum::Router;

use crate::handlers::process;
use crate::state::AppState;

/// Mount `POST /process` (root level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/process", post(process::process))
}
