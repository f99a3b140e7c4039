//! Wire-format request bodies. Responses are the domain `Job`/`Engine`
//! structs directly (they already derive `Serialize`) — no separate view
//! type, since every field in the data model is meant to be visible.

use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub source_url: String,
    pub target_codec: String,
    pub job_size: Option<f64>,
    pub max_retries: Option<i64>,
    pub priority: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub output_url: String,
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    pub error_message: String,
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub progress: i64,
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HeartbeatRequest {
    pub engine_id: String,
    /// Accepted but not authoritative — engine status is owned by the
    /// scheduler and state machine, never by the heartbeat body itself
    /// (the registry's idle/busy discipline, SPEC_FULL.md §4.4).
    pub status: Option<String>,
    pub hostname: Option<String>,
    pub benchmark_time: Option<f64>,
    pub streaming_support: Option<bool>,
    pub storage_capacity_gb: Option<f64>,
    #[serde(flatten)]
    pub capabilities: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct BenchmarkResultRequest {
    pub engine_id: String,
    pub benchmark_time: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignRequest {
    pub engine_id: Option<String>,
}
