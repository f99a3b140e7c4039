//! Pure scheduling policy: no state of its own, operates only on snapshots
//! handed to it by the coordinator.

use chrono::{DateTime, Duration, Utc};

use crate::model::{Engine, Job, SizeBucket};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub small_job_max_mb: f64,
    pub large_job_min_mb: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            small_job_max_mb: 50.0,
            large_job_min_mb: 100.0,
        }
    }
}

/// Chooses at most one engine for `job` out of `candidates`. Deterministic:
/// the same snapshot always yields the same choice.
pub fn select_engine<'a>(
    job: &Job,
    candidates: &[&'a Engine],
    config: &SchedulerConfig,
) -> Option<&'a Engine> {
    let required_storage_gb = job.job_size / 1024.0;

    let mut filtered: Vec<&Engine> = candidates
        .iter()
        .copied()
        .filter(|e| e.is_idle())
        .filter(|e| e.benchmark_time.is_some())
        .filter(|e| e.storage_capacity_gb >= required_storage_gb)
        .collect();

    if filtered.is_empty() {
        return None;
    }

    filtered.sort_by(|a, b| {
        a.benchmark_time
            .partial_cmp(&b.benchmark_time)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.engine_id.cmp(&b.engine_id))
    });

    match job.size_bucket(config.small_job_max_mb, config.large_job_min_mb) {
        SizeBucket::Large => Some(
            filtered
                .iter()
                .copied()
                .find(|e| e.streaming_support == Some(true))
                .unwrap_or(filtered[0]),
        ),
        SizeBucket::Small => filtered.last().copied(),
        SizeBucket::Medium => Some(filtered[0]),
    }
}

/// Exponential backoff, capped at 30 minutes: `min(2^retry_count, 30)`.
pub fn retry_delay(retry_count: i64) -> Duration {
    let minutes = 2i64.saturating_pow(retry_count.max(0) as u32).min(30);
    Duration::minutes(minutes)
}

/// Richer scoring variant mentioned alongside the size-bucket policy.
/// Not wired into `select_engine` by default — tests pin the size-bucket
/// behavior — but kept available for callers that want it.
pub fn engine_score(engine: &Engine, job: &Job, now: DateTime<Utc>) -> f64 {
    let mut score = 100.0;
    if let Some(bt) = engine.benchmark_time {
        if bt > 0.0 {
            score += 100.0 / bt;
        }
    }
    if job.job_size >= 100.0 && engine.streaming_support == Some(true) {
        score += 20.0;
    }
    let required_storage_gb = job.job_size / 1024.0;
    if required_storage_gb > 0.0 && engine.storage_capacity_gb >= 2.0 * required_storage_gb {
        score += 10.0;
    }
    let age = now - engine.last_heartbeat;
    if age < Duration::minutes(1) {
        score += 15.0;
    } else if age < Duration::minutes(5) {
        score += 5.0;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::EngineId;

    fn idle_engine(id: &str, benchmark: f64) -> Engine {
        Engine::builder()
            .engine_id(EngineId::new(id))
            .benchmark_time(benchmark)
            .storage_capacity_gb(1000.0)
            .build()
    }

    fn job_with_size(mb: f64) -> Job {
        Job::builder()
            .source_url("http://x/v.mp4")
            .target_codec("h264")
            .job_size(mb)
            .build()
    }

    #[test]
    fn small_job_goes_to_slowest_candidate() {
        let e1 = idle_engine("e1", 100.0);
        let e2 = idle_engine("e2", 200.0);
        let job = job_with_size(10.0);
        let picked = select_engine(&job, &[&e1, &e2], &SchedulerConfig::default()).unwrap();
        assert_eq!(picked.engine_id, e2.engine_id);
    }

    #[test]
    fn medium_job_goes_to_fastest_candidate() {
        let e1 = idle_engine("e1", 100.0);
        let e2 = idle_engine("e2", 200.0);
        let job = job_with_size(75.0);
        let picked = select_engine(&job, &[&e1, &e2], &SchedulerConfig::default()).unwrap();
        assert_eq!(picked.engine_id, e1.engine_id);
    }

    #[test]
    fn large_job_prefers_streaming_capable_candidate() {
        let mut e1 = idle_engine("e1", 200.0);
        e1.streaming_support = Some(false);
        let mut e2 = idle_engine("e2", 100.0);
        e2.streaming_support = Some(true);
        let job = job_with_size(200.0);
        let picked = select_engine(&job, &[&e1, &e2], &SchedulerConfig::default()).unwrap();
        assert_eq!(picked.engine_id, e2.engine_id);
    }

    #[test]
    fn large_job_falls_back_to_fastest_when_none_stream() {
        let e1 = idle_engine("e1", 200.0);
        let e2 = idle_engine("e2", 100.0);
        let job = job_with_size(200.0);
        let picked = select_engine(&job, &[&e1, &e2], &SchedulerConfig::default()).unwrap();
        assert_eq!(picked.engine_id, e2.engine_id);
    }

    #[test]
    fn busy_engines_are_excluded() {
        let mut e1 = idle_engine("e1", 100.0);
        e1.status = crate::model::EngineStatus::Busy;
        let job = job_with_size(10.0);
        assert!(select_engine(&job, &[&e1], &SchedulerConfig::default()).is_none());
    }

    #[test]
    fn insufficient_storage_excludes_candidate() {
        let mut e1 = idle_engine("e1", 100.0);
        e1.storage_capacity_gb = 0.01;
        let job = job_with_size(1024.0 * 10.0);
        assert!(select_engine(&job, &[&e1], &SchedulerConfig::default()).is_none());
    }

    #[test]
    fn retry_delay_doubles_and_caps_at_30_minutes() {
        assert_eq!(retry_delay(0), Duration::minutes(1));
        assert_eq!(retry_delay(1), Duration::minutes(2));
        assert_eq!(retry_delay(5), Duration::minutes(30));
        assert_eq!(retry_delay(10), Duration::minutes(30));
    }
}
