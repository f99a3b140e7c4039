//! End-to-end HTTP scenarios driven straight through the axum router,
//! mirroring the walkthroughs in SPEC_FULL.md §8.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use dispatch_server::coordinator::Coordinator;
use dispatch_server::model::{Engine, Job, JobStatus};
use dispatch_server::persist::AsyncPersist;
use dispatch_server::repository::{MemoryRepository, Repository};
use dispatch_server::scheduler::SchedulerConfig;
use dispatch_server::server::build_app;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app_with_key(api_key: Option<&str>) -> (axum::Router, Arc<dyn Repository>) {
    let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let coordinator = Arc::new(Coordinator::new(
        repo.clone(),
        Arc::new(AsyncPersist::mock()),
        SchedulerConfig::default(),
    ));
    (build_app(coordinator, api_key.map(str::to_string)), repo)
}

async fn send(app: &axum::Router, method: &str, uri: &str, api_key: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("X-API-Key", key);
    }
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };
    let request = builder.body(body).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn happy_path() {
    let (app, _repo) = app_with_key(None);

    let (status, job) = send(
        &app,
        "POST",
        "/jobs/",
        None,
        Some(json!({"source_url": "http://x/v.mp4", "target_codec": "h264"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["status"], "pending");
    let job_id = job["job_id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "POST",
        "/engines/heartbeat",
        None,
        Some(json!({"engine_id": "e1", "status": "idle", "benchmark_time": 100})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, assigned) = send(
        &app,
        "POST",
        "/assign_job/",
        None,
        Some(json!({"engine_id": "e1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assigned["job_id"], job_id);
    assert_eq!(assigned["status"], "assigned");
    assert_eq!(assigned["assigned_engine"], "e1");

    let (status, _) = send(
        &app,
        "POST",
        &format!("/jobs/{job_id}/complete"),
        None,
        Some(json!({"output_url": "http://x/o.mp4"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, fetched) = send(&app, "GET", &format!("/jobs/{job_id}"), None, None).await;
    assert_eq!(fetched["status"], "completed");

    let (_, engines) = send(&app, "GET", "/engines/", None, None).await;
    assert_eq!(engines[0]["status"], "idle");
}

#[tokio::test]
async fn retry_then_permanent() {
    let (app, _repo) = app_with_key(None);

    let (_, job) = send(
        &app,
        "POST",
        "/jobs/",
        None,
        Some(json!({"source_url": "http://x/v.mp4", "target_codec": "h264", "max_retries": 1})),
    )
    .await;
    let job_id = job["job_id"].as_str().unwrap().to_string();

    send(&app, "POST", "/engines/heartbeat", None, Some(json!({"engine_id": "e1", "benchmark_time": 100}))).await;
    send(&app, "POST", "/engines/heartbeat", None, Some(json!({"engine_id": "e2", "benchmark_time": 200}))).await;

    let (_, assigned) = send(&app, "POST", "/assign_job/", None, None).await;
    assert_eq!(assigned["assigned_engine"], "e1");

    let (_, failed) = send(&app, "POST", &format!("/jobs/{job_id}/fail"), None, Some(json!({"error_message": "boom"}))).await;
    assert_eq!(failed["status"], "pending");
    assert_eq!(failed["retries"], 1);

    let (_, assigned_again) = send(&app, "POST", "/assign_job/", None, None).await;
    assert_eq!(assigned_again["assigned_engine"], "e1");

    let (_, failed_again) = send(&app, "POST", &format!("/jobs/{job_id}/fail"), None, Some(json!({"error_message": "boom again"}))).await;
    assert_eq!(failed_again["status"], "failed_permanently");
    assert_eq!(failed_again["retries"], 1);
}

#[tokio::test]
async fn size_aware_selection() {
    let (app, _repo) = app_with_key(None);

    send(&app, "POST", "/engines/heartbeat", None, Some(json!({"engine_id": "e1", "benchmark_time": 100}))).await;
    send(&app, "POST", "/engines/heartbeat", None, Some(json!({"engine_id": "e2", "benchmark_time": 200}))).await;

    send(&app, "POST", "/jobs/", None, Some(json!({"source_url": "u", "target_codec": "c", "job_size": 10}))).await;
    let (_, small) = send(&app, "POST", "/assign_job/", None, None).await;
    assert_eq!(small["assigned_engine"], "e2");

    send(&app, "POST", "/jobs/", None, Some(json!({"source_url": "u", "target_codec": "c", "job_size": 75}))).await;
    let (_, medium) = send(&app, "POST", "/assign_job/", None, None).await;
    assert_eq!(medium["assigned_engine"], "e1");
}

#[tokio::test]
async fn reaper_stale_engine_requeues_its_job() {
    let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let coordinator = Arc::new(Coordinator::new(repo.clone(), Arc::new(AsyncPersist::mock()), SchedulerConfig::default()));

    let job: Job = coordinator
        .submit_job("http://x/v.mp4".into(), "h264".into(), None, None, None)
        .await
        .unwrap();
    coordinator
        .heartbeat_engine(
            dispatch_server::ids::EngineId::new("e1"),
            true,
            Some(100.0),
            None,
            Some(1000.0),
            None,
            Default::default(),
        )
        .await
        .unwrap();
    coordinator.assign_job(None).await.unwrap().unwrap();

    let mut stale: Engine = repo.get_engine(&dispatch_server::ids::EngineId::new("e1")).await.unwrap().unwrap();
    stale.last_heartbeat = chrono::Utc::now() - chrono::Duration::minutes(10);
    repo.save_engine(&stale).await.unwrap();

    let removed = coordinator.reap_stale_engines(chrono::Duration::minutes(5)).await.unwrap();
    assert_eq!(removed, 1);

    let reverted = coordinator.get_job(job.job_id).await.unwrap();
    assert_eq!(reverted.status, JobStatus::Pending);
    assert!(reverted.assigned_engine.is_none());
    assert_eq!(reverted.retries, 1);
    assert!(repo.get_engine(&dispatch_server::ids::EngineId::new("e1")).await.unwrap().is_none());
}

#[tokio::test]
async fn auth_gates_every_protected_route() {
    let (app, _repo) = app_with_key(Some("k"));

    let (status, body) = send(&app, "GET", "/jobs/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.is_null());

    let (status, _) = send(&app, "GET", "/jobs/", Some("wrong"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/jobs/", Some("k"), None).await;
    assert_eq!(status, StatusCode::OK);

    // The health check stays public.
    let (status, _) = send(&app, "GET", "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn api_v1_mirrors_status_codes_and_error_envelope() {
    let (app, _repo) = app_with_key(Some("k"));

    // Unauthenticated request to the v1 surface gets the structured envelope,
    // not the legacy plain-text body.
    let (status, body) = send(&app, "GET", "/api/v1/jobs", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"]["code"].is_string());

    let (status, job) = send(
        &app,
        "POST",
        "/api/v1/jobs",
        Some("k"),
        Some(json!({"source_url": "http://x/v.mp4", "target_codec": "h264"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["data"]["status"], "pending");

    // Nothing assignable yet: v1 assign must 204 like the legacy surface.
    let (status, body) = send(&app, "POST", "/api/v1/assign_job", Some("k"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());

    send(
        &app,
        "POST",
        "/api/v1/engines/heartbeat",
        Some("k"),
        Some(json!({"engine_id": "e1", "benchmark_time": 100})),
    )
    .await;

    let (status, assigned) = send(&app, "POST", "/api/v1/assign_job", Some("k"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assigned["data"]["assigned_engine"], "e1");
}

#[tokio::test]
async fn persistence_round_trip_through_snapshot_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let persist = AsyncPersist::new(Some(path.clone()));
    let coordinator = Coordinator::new(repo.clone(), Arc::new(persist), SchedulerConfig::default());

    coordinator.submit_job("http://x/a.mp4".into(), "h264".into(), None, None, None).await.unwrap();
    coordinator.submit_job("http://x/b.mp4".into(), "h264".into(), None, None, None).await.unwrap();
    coordinator
        .heartbeat_engine(dispatch_server::ids::EngineId::new("e1"), true, Some(50.0), None, Some(10.0), None, Default::default())
        .await
        .unwrap();

    let persist = AsyncPersist::new(Some(path.clone()));
    persist.flush(&repo).await.unwrap();

    let loaded = AsyncPersist::load(&path).await;
    assert_eq!(loaded.jobs.len(), 2);
    assert_eq!(loaded.engines.len(), 1);

    let fresh_repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    fresh_repo.restore(loaded).await.unwrap();
    let fresh_coordinator = Coordinator::new(fresh_repo, Arc::new(AsyncPersist::mock()), SchedulerConfig::default());
    assert_eq!(fresh_coordinator.list_jobs().await.unwrap().len(), 2);
    assert_eq!(fresh_coordinator.list_engines().await.unwrap().len(), 1);
}
