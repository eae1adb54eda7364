use std::sync::Arc;

use stemsvc_events::EventBus;

use crate::engine::JobOrchestrator;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Job engine: queue, dispatcher and registry.
    pub orchestrator: Arc<JobOrchestrator>,
    /// Job lifecycle events, also published by the registry.
    pub events: Arc<EventBus>,
}
