#![allow(dead_code)]

use std::io::Cursor;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use stemsvc_api::config::{RetentionConfig, ServerConfig, StorageBackend, StorageSettings};
use stemsvc_api::engine::{EngineConfig, JobOrchestrator};
use stemsvc_api::router::build_app_router;
use stemsvc_api::state::AppState;
use stemsvc_core::job_state::JobState;
use stemsvc_core::types::JobId;
use stemsvc_db::JobRegistry;
use stemsvc_events::{EventBus, JobEvent};
use stemsvc_separation::model::Stem;
use stemsvc_separation::{
    AudioBuffer, BandSplitModel, SeparationError, SeparationModel, SeparationWorker,
};
use stemsvc_storage::{MemoryObjectStore, RetryConfig, StorageGateway};
use tokio::sync::broadcast;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults: in-memory storage, fast
/// storage retries and two worker slots.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_upload_bytes: 16 * 1024 * 1024,
        engine: EngineConfig {
            thread_budget: 1,
            max_concurrent_jobs: 2,
            queue_capacity: 8,
            job_timeout: Duration::from_secs(30),
        },
        storage: StorageSettings {
            backend: StorageBackend::Memory,
            retry: RetryConfig {
                max_attempts: 2,
                initial_delay: Duration::from_millis(1),
                ..RetryConfig::default()
            },
        },
        retention: RetentionConfig::default(),
    }
}

/// Everything a test needs to drive and inspect the service.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryObjectStore>,
}

impl TestApp {
    /// Start recording job events. Call before submitting.
    pub fn events(&self) -> EventLog {
        EventLog::new(self.state.events.subscribe())
    }

    pub fn orchestrator(&self) -> &Arc<JobOrchestrator> {
        &self.state.orchestrator
    }
}

/// Build the full application with the built-in band-split model.
pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config(), Arc::new(BandSplitModel::new()))
}

/// Build the full application the same way `main.rs` does, with the given
/// config and separation model. Must be called inside a Tokio runtime.
pub fn build_test_app_with(config: ServerConfig, model: Arc<dyn SeparationModel>) -> TestApp {
    let store = Arc::new(MemoryObjectStore::new());
    let storage = StorageGateway::new(
        Arc::clone(&store) as Arc<dyn stemsvc_storage::ObjectStore>,
        config.storage.retry.clone(),
    );

    let events = Arc::new(EventBus::default());
    let registry = Arc::new(JobRegistry::with_events(Arc::clone(&events)));
    let orchestrator = JobOrchestrator::start(
        registry,
        storage,
        SeparationWorker::new(model),
        config.engine.clone(),
    );

    let state = AppState {
        orchestrator,
        events,
    };
    let router = build_app_router(state.clone(), &config);

    TestApp {
        router,
        state,
        store,
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A silent 16-bit PCM WAV clip.
pub fn silent_wav(seconds: u32, sample_rate: u32, channels: u16) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
    for _ in 0..seconds * sample_rate * channels as u32 {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
    cursor.into_inner()
}

/// Short mono clip, cheap to separate.
pub fn short_wav() -> Vec<u8> {
    silent_wav(1, 8_000, 1)
}

/// Blocks `separate` until opened. Dropping the handle opens it so a failing
/// test cannot leave blocking threads parked.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cond.wait(open).unwrap();
        }
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }
}

pub struct GateHandle(pub Arc<Gate>);

impl Drop for GateHandle {
    fn drop(&mut self) {
        self.0.open();
    }
}

/// Single-stem model that waits on a [`Gate`] before returning the input.
pub struct GatedModel {
    pub gate: Arc<Gate>,
}

impl GatedModel {
    pub fn new() -> (Arc<Self>, GateHandle) {
        let gate = Arc::new(Gate::default());
        (
            Arc::new(Self {
                gate: Arc::clone(&gate),
            }),
            GateHandle(gate),
        )
    }
}

impl SeparationModel for GatedModel {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn version(&self) -> &'static str {
        "0"
    }

    fn stem_names(&self) -> &[&'static str] {
        &["mix"]
    }

    fn separate(&self, audio: &AudioBuffer) -> Result<Vec<Stem>, SeparationError> {
        self.gate.wait();
        Ok(vec![Stem {
            name: "mix",
            channels: audio.channels.clone(),
        }])
    }
}

/// Single-stem model that sleeps for a fixed time.
pub struct SlowModel(pub Duration);

impl SeparationModel for SlowModel {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn version(&self) -> &'static str {
        "0"
    }

    fn stem_names(&self) -> &[&'static str] {
        &["mix"]
    }

    fn separate(&self, audio: &AudioBuffer) -> Result<Vec<Stem>, SeparationError> {
        std::thread::sleep(self.0);
        Ok(vec![Stem {
            name: "mix",
            channels: audio.channels.clone(),
        }])
    }
}

/// Model that always panics.
pub struct PanickingModel;

impl SeparationModel for PanickingModel {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn version(&self) -> &'static str {
        "0"
    }

    fn stem_names(&self) -> &[&'static str] {
        &["mix"]
    }

    fn separate(&self, _audio: &AudioBuffer) -> Result<Vec<Stem>, SeparationError> {
        panic!("model exploded");
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Records every job event so waiting on one job never loses another's.
pub struct EventLog {
    events: broadcast::Receiver<JobEvent>,
    seen: Vec<JobEvent>,
}

impl EventLog {
    pub fn new(events: broadcast::Receiver<JobEvent>) -> Self {
        Self {
            events,
            seen: Vec::new(),
        }
    }

    /// Every event observed so far, in publication order.
    pub fn seen(&self) -> &[JobEvent] {
        &self.seen
    }

    /// States job `job_id` has been observed in, in publication order.
    pub fn states_of(&self, job_id: JobId) -> Vec<JobState> {
        self.seen
            .iter()
            .filter(|e| e.job_id == job_id)
            .map(|e| e.state)
            .collect()
    }

    /// Wait until job `job_id` reaches `target` or any terminal state and
    /// return its states so far. Panics after 30 seconds.
    pub async fn wait_for(&mut self, job_id: JobId, target: JobState) -> Vec<JobState> {
        let reached = |seen: &[JobEvent]| {
            seen.iter().any(|e| {
                e.job_id == job_id && (e.state == target || e.state.is_terminal())
            })
        };

        let finished = tokio::time::timeout(Duration::from_secs(30), async {
            while !reached(&self.seen) {
                match self.events.recv().await {
                    Ok(event) => self.seen.push(event),
                    Err(e) => panic!("event stream failed: {e}"),
                }
            }
        })
        .await;
        assert!(finished.is_ok(), "job {job_id} never reached {target}");
        self.states_of(job_id)
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub async fn get(app: &Router, uri: &str) -> Response {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_empty(app: &Router, uri: &str) -> Response {
    let request = Request::post(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_bytes(
    app: &Router,
    uri: &str,
    bytes: Vec<u8>,
    headers: &[(&str, &str)],
) -> Response {
    let mut builder = Request::post(uri).header("content-type", "application/octet-stream");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::from(bytes)).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Submit `bytes` as a raw upload, assert 202 and return the job id.
pub async fn submit(app: &Router, bytes: Vec<u8>) -> JobId {
    let response = post_bytes(app, "/api/v1/jobs", bytes, &[]).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    job_id_of(response).await
}

pub async fn job_id_of(response: Response) -> JobId {
    body_json(response).await["job_id"]
        .as_str()
        .expect("job_id missing")
        .parse()
        .unwrap()
}
