//! Router assembly. Two route groups share one `AppState`: the legacy
//! surface at the bare paths and the structured mirror under `/api/v1`.
//! Each has its own API-key middleware so its failures render through
//! the matching error envelope; only `/` is public.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::{require_api_key, require_api_key_v1};
use crate::coordinator::Coordinator;
use crate::server::{handlers, handlers_v1, AppState};

pub fn build_app(coordinator: Arc<Coordinator>, api_key: Option<String>) -> Router {
    let state = AppState { coordinator, api_key };

    let legacy = Router::new()
        .route("/jobs/", post(handlers::submit_job).get(handlers::list_jobs))
        .route("/jobs/:id", get(handlers::get_job).patch(handlers::patch_job).delete(handlers::cancel_job))
        .route("/jobs/:id/complete", post(handlers::complete_job))
        .route("/jobs/:id/fail", post(handlers::fail_job))
        .route("/jobs/:id/retry", post(handlers::retry_job))
        .route("/jobs/:id/progress", post(handlers::progress_job))
        .route("/engines/", get(handlers::list_engines))
        .route("/engines/heartbeat", post(handlers::heartbeat))
        .route("/engines/benchmark_result", post(handlers::benchmark_result))
        .route("/engines/:id", delete(handlers::deregister_engine))
        .route("/assign_job/", post(handlers::assign_job));

    let v1 = Router::new()
        .route("/jobs", post(handlers_v1::submit_job).get(handlers_v1::list_jobs))
        .route(
            "/jobs/:id",
            get(handlers_v1::get_job).patch(handlers_v1::patch_job).delete(handlers_v1::cancel_job),
        )
        .route("/jobs/:id/complete", post(handlers_v1::complete_job))
        .route("/jobs/:id/fail", post(handlers_v1::fail_job))
        .route("/jobs/:id/retry", post(handlers_v1::retry_job))
        .route("/jobs/:id/progress", post(handlers_v1::progress_job))
        .route("/engines", get(handlers_v1::list_engines))
        .route("/engines/heartbeat", post(handlers_v1::heartbeat))
        .route("/engines/benchmark_result", post(handlers_v1::benchmark_result))
        .route("/engines/:id", delete(handlers_v1::deregister_engine))
        .route("/assign_job", post(handlers_v1::assign_job));

    let legacy = legacy.route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));
    let v1 = v1.route_layer(middleware::from_fn_with_state(state.clone(), require_api_key_v1));

    Router::new()
        .route("/", get(handlers::health))
        .merge(legacy)
        .nest("/api/v1", v1)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
