use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EngineId, JobId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Assigned,
    Completed,
    Failed,
    FailedPermanently,
    Cancelled,
    Expired,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::FailedPermanently | Self::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum Priority {
    Normal = 0,
    High = 1,
    Urgent = 2,
}

impl Priority {
    pub fn from_i16(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Normal),
            1 => Some(Self::High),
            2 => Some(Self::Urgent),
            _ => None,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

/// A unit of transcoding work submitted by a client.
///
/// See the six invariants in the data model: `assigned_engine` is set iff
/// `status == Assigned`; `retries <= max_retries`; terminal states accept no
/// further transitions; `created_at <= updated_at`; ids are never reused.
#[derive(Debug, Clone, Serialize, Deserialize, typed_builder::TypedBuilder)]
pub struct Job {
    #[builder(default = JobId::new())]
    pub job_id: JobId,
    #[builder(setter(into))]
    pub source_url: String,
    #[builder(setter(into))]
    pub target_codec: String,
    #[builder(default = 0.0)]
    pub job_size: f64,
    #[builder(default)]
    pub priority: Priority,
    #[builder(default = JobStatus::Pending)]
    pub status: JobStatus,
    #[builder(default)]
    pub assigned_engine: Option<EngineId>,
    #[builder(default)]
    pub output_url: Option<String>,
    #[builder(default)]
    pub error_message: Option<String>,
    #[builder(default = 0)]
    pub retries: i64,
    #[builder(default = 3)]
    pub max_retries: i64,
    #[builder(default)]
    pub progress: Option<i64>,
    #[builder(default)]
    pub resource_requirements: Option<serde_json::Value>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Size bucket used by the scheduler. Thresholds are configurable
    /// constants on `SchedulerConfig`; this just evaluates them.
    pub fn size_bucket(&self, small_max_mb: f64, large_min_mb: f64) -> SizeBucket {
        if self.job_size < small_max_mb {
            SizeBucket::Small
        } else if self.job_size >= large_min_mb {
            SizeBucket::Large
        } else {
            SizeBucket::Medium
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeBucket {
    Small,
    Medium,
    Large,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_has_default_max_retries_of_3() {
        let job = Job::builder()
            .source_url("http://x/v.mp4")
            .target_codec("h264")
            .build();
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.retries, 0);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.assigned_engine.is_none());
    }

    #[test]
    fn created_at_never_exceeds_updated_at_on_construction() {
        let job = Job::builder()
            .source_url("http://x/v.mp4")
            .target_codec("h264")
            .build();
        assert!(job.created_at <= job.updated_at);
    }

    #[test]
    fn size_bucket_classification_matches_default_thresholds() {
        let small = Job::builder()
            .source_url("u")
            .target_codec("c")
            .job_size(10.0)
            .build();
        let medium = Job::builder()
            .source_url("u")
            .target_codec("c")
            .job_size(75.0)
            .build();
        let large = Job::builder()
            .source_url("u")
            .target_codec("c")
            .job_size(200.0)
            .build();
        assert_eq!(small.size_bucket(50.0, 100.0), SizeBucket::Small);
        assert_eq!(medium.size_bucket(50.0, 100.0), SizeBucket::Medium);
        assert_eq!(large.size_bucket(50.0, 100.0), SizeBucket::Large);
    }

    #[test]
    fn terminal_states_are_exactly_the_documented_three() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::FailedPermanently.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Assigned.is_terminal());
        assert!(!JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Expired.is_terminal());
    }
}
