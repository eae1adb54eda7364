//! Request handlers.
//!
//! Handlers delegate to the [`JobOrchestrator`](crate::engine::JobOrchestrator)
//! held in [`AppState`](crate::state::AppState) and map errors via
//! [`AppError`](crate::error::AppError).

pub mod jobs;
pub mod process;
