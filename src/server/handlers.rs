//! Legacy endpoint surface: bare JSON success bodies, plain-text error
//! bodies (via `AppError`'s own `IntoResponse`).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::ids::{EngineId, JobId};
use crate::model::{Engine, Job};
use crate::server::dto::*;
use crate::server::AppState;
use crate::state_machine::JobPatch;

pub fn parse_job_id(raw: &str) -> AppResult<JobId> {
    JobId::parse(raw).map_err(|_| AppError::not_found(format!("job {raw} not found")))
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn submit_job(
    State(state): State<AppState>,
    Json(body): Json<SubmitJobRequest>,
) -> AppResult<(StatusCode, Json<Job>)> {
    let job = state
        .coordinator
        .submit_job(body.source_url, body.target_codec, body.job_size, body.max_retries, body.priority)
        .await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn list_jobs(State(state): State<AppState>) -> AppResult<Json<Vec<Job>>> {
    Ok(Json(state.coordinator.list_jobs().await?))
}

pub async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Job>> {
    let job = state.coordinator.get_job(parse_job_id(&id)?).await?;
    Ok(Json(job))
}

pub async fn complete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CompleteRequest>,
) -> AppResult<Json<Job>> {
    let job = state
        .coordinator
        .complete_job(parse_job_id(&id)?, body.output_url)
        .await?;
    Ok(Json(job))
}

pub async fn fail_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<FailRequest>,
) -> AppResult<Json<Job>> {
    let job = state
        .coordinator
        .fail_job(parse_job_id(&id)?, body.error_message)
        .await?;
    Ok(Json(job))
}

pub async fn retry_job(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Job>> {
    let job = state.coordinator.retry_job(parse_job_id(&id)?).await?;
    Ok(Json(job))
}

pub async fn cancel_job(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Job>> {
    let job = state.coordinator.cancel_job(parse_job_id(&id)?).await?;
    Ok(Json(job))
}

pub async fn progress_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ProgressRequest>,
) -> AppResult<Json<Job>> {
    let job = state
        .coordinator
        .update_progress(parse_job_id(&id)?, body.progress, body.message)
        .await?;
    Ok(Json(job))
}

pub async fn patch_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<JobPatch>,
) -> AppResult<Json<Job>> {
    let job = state.coordinator.patch_job(parse_job_id(&id)?, body).await?;
    Ok(Json(job))
}

pub async fn list_engines(State(state): State<AppState>) -> AppResult<Json<Vec<Engine>>> {
    Ok(Json(state.coordinator.list_engines().await?))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Json(body): Json<HeartbeatRequest>,
) -> AppResult<Json<Engine>> {
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
        .await?;
    Ok(Json(engine))
}

pub async fn benchmark_result(
    State(state): State<AppState>,
    Json(body): Json<BenchmarkResultRequest>,
) -> AppResult<Json<Engine>> {
    let engine = state
        .coordinator
        .record_benchmark(EngineId::new(body.engine_id), body.benchmark_time)
        .await?;
    Ok(Json(engine))
}

pub async fn deregister_engine(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let removed = state.coordinator.deregister_engine(&EngineId::new(id.clone())).await?;
    if removed {
        Ok(StatusCode::OK)
    } else {
        Err(AppError::not_found(format!("engine {id} not found")))
    }
}

pub async fn assign_job(
    State(state): State<AppState>,
    body: Option<Json<AssignRequest>>,
) -> AppResult<axum::response::Response> {
    let engine_id = body.and_then(|Json(b)| b.engine_id).map(EngineId::new);
    match state.coordinator.assign_job(engine_id).await? {
        Some(job) => Ok((StatusCode::OK, Json(job)).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}
