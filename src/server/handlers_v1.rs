//! Structured `/api/v1/...` mirror surface: every success is wrapped in
//! `{"data": ...}`, every error in `{"error": {"code", "message"}}` via
//! `ApiV1Error`. Delegates to the same `Coordinator` calls as the legacy
//! surface — only the envelope differs.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::ApiV1Error;
use crate::ids::EngineId;
use crate::server::dto::*;
use crate::server::handlers::parse_job_id;
use crate::server::AppState;
use crate::state_machine::JobPatch;

type ApiResult<T> = Result<T, ApiV1Error>;

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { data })
}

pub async fn submit_job(
    State(state): State<AppState>,
    Json(body): Json<SubmitJobRequest>,
) -> ApiResult<impl IntoResponse> {
    let job = state
        .coordinator
        .submit_job(body.source_url, body.target_codec, body.job_size, body.max_retries, body.priority)
        .await
        .map_err(ApiV1Error)?;
    Ok((StatusCode::CREATED, ok(job)))
}

pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let jobs = state.coordinator.list_jobs().await.map_err(ApiV1Error)?;
    Ok(ok(jobs))
}

pub async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let job_id = parse_job_id(&id).map_err(ApiV1Error)?;
    let job = state.coordinator.get_job(job_id).await.map_err(ApiV1Error)?;
    Ok(ok(job))
}

pub async fn complete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CompleteRequest>,
) -> ApiResult<impl IntoResponse> {
    let job_id = parse_job_id(&id).map_err(ApiV1Error)?;
    let job = state
        .coordinator
        .complete_job(job_id, body.output_url)
        .await
        .map_err(ApiV1Error)?;
    Ok(ok(job))
}

pub async fn fail_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<FailRequest>,
) -> ApiResult<impl IntoResponse> {
    let job_id = parse_job_id(&id).map_err(ApiV1Error)?;
    let job = state
        .coordinator
        .fail_job(job_id, body.error_message)
        .await
        .map_err(ApiV1Error)?;
    Ok(ok(job))
}

pub async fn retry_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let job_id = parse_job_id(&id).map_err(ApiV1Error)?;
    let job = state.coordinator.retry_job(job_id).await.map_err(ApiV1Error)?;
    Ok(ok(job))
}

pub async fn cancel_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let job_id = parse_job_id(&id).map_err(ApiV1Error)?;
    let job = state.coordinator.cancel_job(job_id).await.map_err(ApiV1Error)?;
    Ok(ok(job))
}

pub async fn progress_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ProgressRequest>,
) -> ApiResult<impl IntoResponse> {
    let job_id = parse_job_id(&id).map_err(ApiV1Error)?;
    let job = state
        .coordinator
        .update_progress(job_id, body.progress, body.message)
        .await
        .map_err(ApiV1Error)?;
    Ok(ok(job))
}

pub async fn patch_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<JobPatch>,
) -> ApiResult<impl IntoResponse> {
    let job_id = parse_job_id(&id).map_err(ApiV1Error)?;
    let job = state.coordinator.patch_job(job_id, body).await.map_err(ApiV1Error)?;
    Ok(ok(job))
}

pub async fn list_engines(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let engines = state.coordinator.list_engines().await.map_err(ApiV1Error)?;
    Ok(ok(engines))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Json(body): Json<HeartbeatRequest>,
) -> ApiResult<impl IntoResponse> {
    let engine = state
        .coordinator
        .heartbeat_engine(
            EngineId::new(body.engine_id),
            true,
            body.benchmark_time,
            body.streaming_support,
            body.storage_capacity_gb,
            body.hostname,
            body.capabilities,
        )
        .await
        .map_err(ApiV1Error)?;
    Ok(ok(engine))
}

pub async fn benchmark_result(
    State(state): State<AppState>,
    Json(body): Json<BenchmarkResultRequest>,
) -> ApiResult<impl IntoResponse> {
    let engine = state
        .coordinator
        .record_benchmark(EngineId::new(body.engine_id), body.benchmark_time)
        .await
        .map_err(ApiV1Error)?;
    Ok(ok(engine))
}

pub async fn deregister_engine(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let removed = state
        .coordinator
        .deregister_engine(&EngineId::new(id.clone()))
        .await
        .map_err(ApiV1Error)?;
    if removed {
        Ok(StatusCode::OK)
    } else {
        Err(ApiV1Error(crate::error::AppError::not_found(format!(
            "engine {id} not found"
        ))))
    }
}

pub async fn assign_job(
    State(state): State<AppState>,
    body: Option<Json<AssignRequest>>,
) -> ApiResult<axum::response::Response> {
    let engine_id = body.and_then(|Json(b)| b.engine_id).map(EngineId::new);
    let assigned = state.coordinator.assign_job(engine_id).await.map_err(ApiV1Error)?;
    match assigned {
        Some(job) => Ok((StatusCode::OK, ok(job)).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}
