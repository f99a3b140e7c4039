use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::{EngineId, JobId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Idle,
    Busy,
}

/// A worker process that heartbeats to the server and executes assigned jobs.
///
/// Capability strings (`encoders`, `decoders`, `hwaccels`, `cpu_temperature`,
/// and anything else the engine chooses to report) are opaque to the server
/// and carried in `capabilities` without interpretation.
#[derive(Debug, Clone, Serialize, Deserialize, typed_builder::TypedBuilder)]
pub struct Engine {
    pub engine_id: EngineId,
    #[builder(default, setter(strip_option, into))]
    pub hostname: Option<String>,
    #[builder(default = EngineStatus::Idle)]
    pub status: EngineStatus,
    #[builder(default, setter(strip_option))]
    pub benchmark_time: Option<f64>,
    #[builder(default, setter(strip_option))]
    pub streaming_support: Option<bool>,
    #[builder(default = 0.0)]
    pub storage_capacity_gb: f64,
    #[builder(default = Utc::now())]
    pub last_heartbeat: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub current_job_id: Option<JobId>,
    #[builder(default)]
    pub capabilities: HashMap<String, serde_json::Value>,
}

impl Engine {
    pub fn is_idle(&self) -> bool {
        matches!(self.status, EngineStatus::Idle)
    }

    pub fn release(&mut self) {
        self.status = EngineStatus::Idle;
        self.current_job_id = None;
    }

    pub fn claim(&mut self, job_id: JobId) {
        self.status = EngineStatus::Busy;
        self.current_job_id = Some(job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_engine_defaults_to_idle() {
        let engine = Engine::builder().engine_id(EngineId::new("e1")).build();
        assert!(engine.is_idle());
        assert!(engine.current_job_id.is_none());
    }

    #[test]
    fn claim_then_release_round_trips_state() {
        let mut engine = Engine::builder().engine_id(EngineId::new("e1")).build();
        let job_id = JobId::new();
        engine.claim(job_id);
        assert!(!engine.is_idle());
        assert_eq!(engine.current_job_id, Some(job_id));
        engine.release();
        assert!(engine.is_idle());
        assert!(engine.current_job_id.is_none());
    }
}
