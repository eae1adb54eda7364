//! Integration tests for queueing, worker slots, timeouts and cancellation.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use futures::future::join_all;
use common::{
    body_json, get, post_bytes, post_empty, submit, GatedModel, PanickingModel,
    SlowModel,
};
use stemsvc_core::job_state::JobState;

fn one_slot_config(queue_capacity: usize) -> stemsvc_api::config::ServerConfig {
    let mut config = common::test_config();
    config.engine.max_concurrent_jobs = 1;
    config.engine.queue_capacity = queue_capacity;
    config
}

// ---------------------------------------------------------------------------
// Test: a full queue refuses work with 503 and uploads nothing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_queue_returns_503_without_uploading() {
    let (model, gate) = GatedModel::new();
    let app = common::build_test_app_with(one_slot_config(1), model);
    let mut events = app.events();

    // First job occupies the only slot.
    let running = submit(&app.router, common::short_wav()).await;
    events.wait_for(running, JobState::Running).await;

    // Second job fills the queue.
    let queued = submit(&app.router, common::short_wav()).await;
    assert_eq!(app.orchestrator().queue_depth(), 1);

    let response = post_bytes(&app.router, "/api/v1/jobs", common::short_wav(), &[]).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "OVERLOADED");
    assert_eq!(app.store.len().await, 2);
    assert_eq!(app.orchestrator().registry().len().await, 2);

    let health = body_json(get(&app.router, "/health").await).await;
    assert_eq!(health["queue_depth"], 1);
    assert_eq!(health["in_flight"], 1);

    gate.0.open();
    events.wait_for(running, JobState::Done).await;
    events.wait_for(queued, JobState::Done).await;
    assert_eq!(app.orchestrator().in_flight(), 0);
}

// ---------------------------------------------------------------------------
// Test: queued jobs wait for a slot; never more than max_concurrent_jobs run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queued_job_stays_pending_until_a_slot_frees() {
    let (model, gate) = GatedModel::new();
    let app = common::build_test_app_with(one_slot_config(4), model);
    let mut events = app.events();

    let first = submit(&app.router, common::short_wav()).await;
    events.wait_for(first, JobState::Running).await;
    let second = submit(&app.router, common::short_wav()).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let second_job = app.orchestrator().status(second).await.unwrap();
    assert_eq!(second_job.state, JobState::Pending);
    assert_eq!(app.orchestrator().stats().await.jobs.running, 1);

    gate.0.open();
    let states = events.wait_for(second, JobState::Done).await;
    assert_eq!(
        states,
        vec![JobState::Pending, JobState::Running, JobState::Done]
    );
}

// ---------------------------------------------------------------------------
// Test: a burst of concurrent submissions all finish within the slot ceiling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_submissions_all_finish_within_slot_limit() {
    let mut config = common::test_config();
    config.engine.max_concurrent_jobs = 2;
    config.engine.queue_capacity = 16;
    let app = common::build_test_app_with(config, Arc::new(SlowModel(Duration::from_millis(20))));
    let mut events = app.events();

    let submissions = (0..8).map(|_| submit(&app.router, common::short_wav()));
    let ids = join_all(submissions).await;
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 8);

    for &id in &ids {
        let states = events.wait_for(id, JobState::Done).await;
        assert_eq!(states.last(), Some(&JobState::Done));
    }
    assert_eq!(app.orchestrator().registry().len().await, 8);
    for &id in &ids {
        let job = app.orchestrator().status(id).await.unwrap();
        assert_eq!(job.state, JobState::Done);
    }

    // Replay the event stream and track how many jobs were RUNNING at once.
    let mut running = 0usize;
    let mut peak = 0usize;
    for event in events.seen() {
        match event.state {
            JobState::Running => running += 1,
            JobState::Done | JobState::Failed => running -= 1,
            JobState::Pending => {}
        }
        peak = peak.max(running);
    }
    assert_eq!(running, 0);
    assert!(peak <= 2, "{peak} jobs ran at once");
    assert_eq!(app.orchestrator().in_flight(), 0);
}

// ---------------------------------------------------------------------------
// Test: reading a terminal job twice returns the same record
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_of_finished_job_is_stable() {
    let app = common::build_test_app();
    let mut events = app.events();

    let job_id = submit(&app.router, common::short_wav()).await;
    events.wait_for(job_id, JobState::Done).await;

    let first = app.orchestrator().status(job_id).await.unwrap();
    let second = app.orchestrator().status(job_id).await.unwrap();
    assert_eq!(first, second);

    let uri = format!("/api/v1/jobs/{job_id}");
    let first = body_json(get(&app.router, &uri).await).await;
    let second = body_json(get(&app.router, &uri).await).await;
    assert_eq!(first, second);
    assert_eq!(first["state"], "DONE");
}

// ---------------------------------------------------------------------------
// Test: cancel only works while PENDING, and cancelled jobs never start
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_pending_job_and_reject_cancel_of_running_job() {
    let (model, gate) = GatedModel::new();
    let app = common::build_test_app_with(one_slot_config(4), model);
    let mut events = app.events();

    let running = submit(&app.router, common::short_wav()).await;
    events.wait_for(running, JobState::Running).await;
    let pending = submit(&app.router, common::short_wav()).await;

    let response = post_empty(&app.router, &format!("/api/v1/jobs/{pending}/cancel")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = post_empty(&app.router, &format!("/api/v1/jobs/{running}/cancel")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    gate.0.open();
    events.wait_for(running, JobState::Done).await;
    // Let the dispatcher reach the cancelled job.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let job = app.orchestrator().status(pending).await.unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.error.as_deref(), Some("cancelled"));
    assert_eq!(app.orchestrator().stats().await.jobs.running, 0);
}

// ---------------------------------------------------------------------------
// Test: retry only works for FAILED jobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retry_creates_linked_job_for_failed_job_only() {
    let app = common::build_test_app();
    let mut events = app.events();

    let failed = submit(&app.router, b"garbage".to_vec()).await;
    events.wait_for(failed, JobState::Failed).await;

    let response = post_empty(&app.router, &format!("/api/v1/jobs/{failed}/retry")).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let retried = common::job_id_of(response).await;
    assert_ne!(retried, failed);

    events.wait_for(retried, JobState::Failed).await;
    let json = body_json(get(&app.router, &format!("/api/v1/jobs/{retried}")).await).await;
    assert_eq!(json["retry_of"], failed.to_string());

    let ok = submit(&app.router, common::short_wav()).await;
    events.wait_for(ok, JobState::Done).await;
    let response = post_empty(&app.router, &format!("/api/v1/jobs/{ok}/retry")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// Test: a job past its deadline fails, but its computation keeps the slot
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timed_out_job_fails_and_holds_slot_until_compute_returns() {
    let mut config = one_slot_config(4);
    config.engine.job_timeout = Duration::from_millis(100);
    let app = common::build_test_app_with(config, Arc::new(SlowModel(Duration::from_millis(600))));
    let mut events = app.events();

    let job_id = submit(&app.router, common::short_wav()).await;
    events.wait_for(job_id, JobState::Failed).await;

    let job = app.orchestrator().status(job_id).await.unwrap();
    assert!(job.error.unwrap().contains("timed out"));
    assert_eq!(app.orchestrator().in_flight(), 1);

    // The abandoned computation finishes and frees the slot.
    for _ in 0..200 {
        if app.orchestrator().in_flight() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(app.orchestrator().in_flight(), 0);
    // The late result never changes the recorded outcome.
    assert_eq!(
        app.orchestrator().status(job_id).await.unwrap().state,
        JobState::Failed
    );
}

// ---------------------------------------------------------------------------
// Test: a panicking model fails the job and the engine keeps going
// ---------------------------------------------------------------------------

#[tokio::test]
async fn panicking_model_fails_job_and_frees_slot() {
    let app = common::build_test_app_with(one_slot_config(4), Arc::new(PanickingModel));
    let mut events = app.events();

    let first = submit(&app.router, common::short_wav()).await;
    let second = submit(&app.router, common::short_wav()).await;
    events.wait_for(first, JobState::Failed).await;
    events.wait_for(second, JobState::Failed).await;

    let job = app.orchestrator().status(first).await.unwrap();
    assert!(job.error.unwrap().contains("panicked"));
}
