//! Integration tests for `POST /process`, the storage-key submission path.

mod common;

use axum::http::StatusCode;
use common::{body_json, post_json};
use serde_json::json;
use stemsvc_core::job_state::JobState;
use stemsvc_storage::ObjectStore;

#[tokio::test]
async fn process_accepts_stored_audio_and_runs_it() {
    let app = common::build_test_app();
    let mut events = app.events();
    app.store
        .put_object("source/user-1/track.wav", common::short_wav())
        .await
        .unwrap();

    let response = post_json(
        &app.router,
        "/process",
        json!({ "userId": "user-1", "jobId": "ext-77", "sourceKey": "source/user-1/track.wav" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["status"], "ACCEPTED");
    assert_eq!(json["external_id"], "ext-77");
    let job_id = json["job_id"].as_str().unwrap().parse().unwrap();

    events.wait_for(job_id, JobState::Done).await;
    let job = app.orchestrator().status(job_id).await.unwrap();
    assert_eq!(job.input_ref, "source/user-1/track.wav");
    assert_eq!(job.user_id.as_deref(), Some("user-1"));
    assert_eq!(job.external_id.as_deref(), Some("ext-77"));
    assert_eq!(job.output_refs.len(), 4);
}

#[tokio::test]
async fn process_with_missing_object_fails_the_job() {
    let app = common::build_test_app();
    let mut events = app.events();

    let payload = json!({ "sourceKey": "source/ghost.wav" });
    let response = post_json(&app.router, "/process", payload).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let job_id = body_json(response).await["job_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();

    events.wait_for(job_id, JobState::Failed).await;
    let job = app.orchestrator().status(job_id).await.unwrap();
    assert!(job.error.unwrap().contains("source/ghost.wav"));
}

#[tokio::test]
async fn process_rejects_blank_source_key() {
    let app = common::build_test_app();

    let response = post_json(&app.router, "/process", json!({ "sourceKey": "   " })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    assert!(app.orchestrator().registry().is_empty().await);
}

#[tokio::test]
async fn process_requires_source_key_field() {
    let app = common::build_test_app();

    let response = post_json(&app.router, "/process", json!({ "userId": "u" })).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
