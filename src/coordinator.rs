//! The single process-wide coordination lock.
//!
//! Every operation that touches more than one entity (assignment couples a
//! job and an engine; timeouts release an engine while failing a job) is
//! performed here, under one `tokio::sync::Mutex<()>`, so the coupling is
//! atomic from the outside regardless of which `Repository` is behind it.
//! Handlers and the reaper never touch the repository directly.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::error::{AppError, AppResult};
use crate::ids::{EngineId, JobId};
use crate::model::{Engine, Job, Priority};
use crate::persist::AsyncPersist;
use crate::repository::Repository;
use crate::scheduler::{self, SchedulerConfig};
use crate::state_machine::{self, FailOutcome, JobPatch};

pub struct Coordinator {
    repo: Arc<dyn Repository>,
    lock: tokio::sync::Mutex<()>,
    persist: Arc<AsyncPersist>,
    scheduler_config: SchedulerConfig,
}

impl Coordinator {
    pub fn new(repo: Arc<dyn Repository>, persist: Arc<AsyncPersist>, scheduler_config: SchedulerConfig) -> Self {
        Self {
            repo,
            lock: tokio::sync::Mutex::new(()),
            persist,
            scheduler_config,
        }
    }

    pub fn repository(&self) -> Arc<dyn Repository> {
        Arc::clone(&self.repo)
    }

    fn mark_dirty(&self) {
        self.persist.mark_dirty();
    }

    pub async fn submit_job(
        &self,
        source_url: String,
        target_codec: String,
        job_size: Option<f64>,
        max_retries: Option<i64>,
        priority: Option<i64>,
    ) -> AppResult<Job> {
        state_machine::validate_submission(&source_url, &target_codec, job_size, max_retries, priority)?;

        let _guard = self.lock.lock().await;
        let mut builder = Job::builder().source_url(source_url).target_codec(target_codec);
        if let Some(size) = job_size {
            builder = builder.job_size(size);
        }
        if let Some(retries) = max_retries {
            builder = builder.max_retries(retries);
        }
        if let Some(p) = priority {
            builder = builder.priority(Priority::from_i16(p).expect("validated above"));
        }
        let job = builder.build();
        self.repo.save_job(&job).await?;
        drop(_guard);
        self.mark_dirty();
        Ok(job)
    }

    pub async fn get_job(&self, id: JobId) -> AppResult<Job> {
        self.repo
            .get_job(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("job {id} not found")))
    }

    pub async fn list_jobs(&self) -> AppResult<Vec<Job>> {
        self.repo.list_jobs().await
    }

    pub async fn complete_job(&self, id: JobId, output_url: String) -> AppResult<Job> {
        let _guard = self.lock.lock().await;
        let mut job = self
            .repo
            .get_job(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("job {id} not found")))?;
        let mut engine = match job.assigned_engine.clone() {
            Some(engine_id) => self.repo.get_engine(&engine_id).await?,
            None => None,
        };
        state_machine::complete(&mut job, engine.as_mut(), output_url)?;
        self.repo.save_job(&job).await?;
        if let Some(engine) = &engine {
            self.repo.save_engine(engine).await?;
        }
        drop(_guard);
        self.mark_dirty();
        Ok(job)
    }

    pub async fn fail_job(&self, id: JobId, error_message: String) -> AppResult<Job> {
        let _guard = self.lock.lock().await;
        let mut job = self
            .repo
            .get_job(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("job {id} not found")))?;
        let mut engine = match job.assigned_engine.clone() {
            Some(engine_id) => self.repo.get_engine(&engine_id).await?,
            None => None,
        };
        let _outcome: FailOutcome = state_machine::fail(&mut job, engine.as_mut(), error_message)?;
        self.repo.save_job(&job).await?;
        if let Some(engine) = &engine {
            self.repo.save_engine(engine).await?;
        }
        drop(_guard);
        self.mark_dirty();
        Ok(job)
    }

    pub async fn cancel_job(&self, id: JobId) -> AppResult<Job> {
        let _guard = self.lock.lock().await;
        let mut job = self
            .repo
            .get_job(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("job {id} not found")))?;
        let mut engine = match job.assigned_engine.clone() {
            Some(engine_id) => self.repo.get_engine(&engine_id).await?,
            None => None,
        };
        state_machine::cancel(&mut job, engine.as_mut())?;
        self.repo.save_job(&job).await?;
        if let Some(engine) = &engine {
            self.repo.save_engine(engine).await?;
        }
        drop(_guard);
        self.mark_dirty();
        Ok(job)
    }

    pub async fn retry_job(&self, id: JobId) -> AppResult<Job> {
        let _guard = self.lock.lock().await;
        let mut job = self
            .repo
            .get_job(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("job {id} not found")))?;
        state_machine::retry(&mut job)?;
        self.repo.save_job(&job).await?;
        drop(_guard);
        self.mark_dirty();
        Ok(job)
    }

    pub async fn update_progress(&self, id: JobId, progress: i64, message: Option<String>) -> AppResult<Job> {
        let _guard = self.lock.lock().await;
        let mut job = self
            .repo
            .get_job(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("job {id} not found")))?;
        state_machine::update_progress(&mut job, progress, message)?;
        self.repo.save_job(&job).await?;
        drop(_guard);
        self.mark_dirty();
        Ok(job)
    }

    pub async fn patch_job(&self, id: JobId, patch: JobPatch) -> AppResult<Job> {
        let _guard = self.lock.lock().await;
        let mut job = self
            .repo
            .get_job(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("job {id} not found")))?;
        state_machine::apply_patch(&mut job, &patch)?;
        self.repo.save_job(&job).await?;
        drop(_guard);
        self.mark_dirty();
        Ok(job)
    }

    /// `None` success-with-no-body is represented as `Ok(None)`; callers map
    /// that to `204`.
    pub async fn assign_job(&self, only_engine: Option<EngineId>) -> AppResult<Option<Job>> {
        let _guard = self.lock.lock().await;
        let Some(mut job) = self.repo.next_pending_job().await? else {
            return Ok(None);
        };

        let engines = self.repo.list_engines().await?;
        let candidates: Vec<&Engine> = engines
            .iter()
            .filter(|e| match &only_engine {
                Some(id) => &e.engine_id == id,
                None => true,
            })
            .collect();

        let Some(chosen) = scheduler::select_engine(&job, &candidates, &self.scheduler_config) else {
            return Ok(None);
        };
        let mut engine = chosen.clone();

        state_machine::assign(&mut job, &mut engine)?;
        self.repo.save_job(&job).await?;
        self.repo.save_engine(&engine).await?;
        drop(_guard);
        self.mark_dirty();
        Ok(Some(job))
    }

    pub async fn heartbeat_engine(
        &self,
        engine_id: EngineId,
        status_idle_if_new: bool,
        benchmark_time: Option<f64>,
        streaming_support: Option<bool>,
        storage_capacity_gb: Option<f64>,
        hostname: Option<String>,
        capabilities: std::collections::HashMap<String, serde_json::Value>,
    ) -> AppResult<Engine> {
        if engine_id.as_str().trim().is_empty() {
            return Err(AppError::validation("engine_id must be a non-empty string"));
        }
        if let Some(capacity) = storage_capacity_gb {
            if capacity < 0.0 {
                return Err(AppError::validation("storage_capacity_gb must be a non-negative number"));
            }
        }
        if let Some(bt) = benchmark_time {
            if bt < 0.0 {
                return Err(AppError::validation("benchmark_time must be non-negative"));
            }
        }

        let _guard = self.lock.lock().await;
        let existing = self.repo.get_engine(&engine_id).await?;
        let mut builder = Engine::builder().engine_id(engine_id.clone());
        if let Some(hostname) = hostname {
            builder = builder.hostname(hostname);
        }
        if let Some(bt) = benchmark_time {
            builder = builder.benchmark_time(bt);
        }
        if let Some(streaming) = streaming_support {
            builder = builder.streaming_support(streaming);
        }
        if let Some(capacity) = storage_capacity_gb {
            builder = builder.storage_capacity_gb(capacity);
        }
        builder = builder.capabilities(capabilities);
        let mut engine = builder.build();

        // Preserve existing status/current_job_id unless this is a brand
        // new engine, per the registry's idle/busy discipline: only the
        // scheduler or the state machine flips `busy`/`idle`.
        if let Some(existing) = existing {
            engine.status = existing.status;
            engine.current_job_id = existing.current_job_id;
        } else if status_idle_if_new {
            engine.status = crate::model::EngineStatus::Idle;
        }
        engine.last_heartbeat = Utc::now();

        self.repo.save_engine(&engine).await?;
        drop(_guard);
        self.mark_dirty();
        Ok(engine)
    }

    pub async fn record_benchmark(&self, engine_id: EngineId, benchmark_time: f64) -> AppResult<Engine> {
        if benchmark_time < 0.0 {
            return Err(AppError::validation("benchmark_time must be non-negative"));
        }
        let _guard = self.lock.lock().await;
        let mut engine = self
            .repo
            .get_engine(&engine_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("engine {engine_id} not found")))?;
        engine.benchmark_time = Some(benchmark_time);
        self.repo.save_engine(&engine).await?;
        drop(_guard);
        self.mark_dirty();
        Ok(engine)
    }

    pub async fn list_engines(&self) -> AppResult<Vec<Engine>> {
        self.repo.list_engines().await
    }

    /// Removes the engine and reverts any job assigned to it back to
    /// `pending`, same orphaned-job sweep the reaper performs.
    pub async fn deregister_engine(&self, engine_id: &EngineId) -> AppResult<bool> {
        let _guard = self.lock.lock().await;
        let removed = self.repo.delete_engine(engine_id).await?;
        if removed {
            self.revert_jobs_assigned_to(engine_id).await?;
        }
        drop(_guard);
        if removed {
            self.mark_dirty();
        }
        Ok(removed)
    }

    /// Reverts every job assigned to `engine_id` back to `pending`,
    /// incrementing `retries` through the normal fail path (Open Question 2
    /// in SPEC_FULL.md §9). Must be called while holding `self.lock`.
    async fn revert_jobs_assigned_to(&self, engine_id: &EngineId) -> AppResult<usize> {
        let jobs = self.repo.jobs_by_engine(engine_id).await?;
        let mut reverted = 0;
        for mut job in jobs {
            if job.status != crate::model::JobStatus::Assigned {
                continue;
            }
            let _ = state_machine::fail(&mut job, None, "timeout".to_string());
            self.repo.save_job(&job).await?;
            reverted += 1;
        }
        Ok(reverted)
    }

    /// Engine sweep: removes engines whose heartbeat is older than
    /// `engine_timeout`, reverting their in-flight jobs.
    pub async fn reap_stale_engines(&self, engine_timeout: Duration) -> AppResult<usize> {
        let _guard = self.lock.lock().await;
        let cutoff = Utc::now() - engine_timeout;
        let engines = self.repo.list_engines().await?;
        let mut removed = 0;
        for engine in engines {
            if engine.last_heartbeat < cutoff {
                self.repo.delete_engine(&engine.engine_id).await?;
                self.revert_jobs_assigned_to(&engine.engine_id).await?;
                removed += 1;
            }
        }
        drop(_guard);
        if removed > 0 {
            self.mark_dirty();
        }
        Ok(removed)
    }

    /// Job sweep: times out `assigned` jobs whose `updated_at` predates
    /// `job_timeout`, releasing their engine and routing through the fail
    /// rule.
    pub async fn reap_stale_jobs(&self, job_timeout: Duration) -> AppResult<usize> {
        let _guard = self.lock.lock().await;
        let cutoff = Utc::now() - job_timeout;
        let jobs = self.repo.list_jobs().await?;
        let mut timed_out = 0;
        for mut job in jobs {
            if job.status != crate::model::JobStatus::Assigned || job.updated_at >= cutoff {
                continue;
            }
            let mut engine = match job.assigned_engine.clone() {
                Some(id) => self.repo.get_engine(&id).await?,
                None => None,
            };
            let _ = state_machine::fail(&mut job, engine.as_mut(), "timeout".to_string());
            self.repo.save_job(&job).await?;
            if let Some(engine) = &engine {
                self.repo.save_engine(engine).await?;
            }
            timed_out += 1;
        }
        drop(_guard);
        if timed_out > 0 {
            self.mark_dirty();
        }
        Ok(timed_out)
    }

    /// Stale-pending sweep: expires `pending` jobs older than
    /// `pending_timeout` (supplements the distilled spec, see §4.5).
    pub async fn reap_stale_pending(&self, pending_timeout: Duration) -> AppResult<usize> {
        let _guard = self.lock.lock().await;
        let ids = self.repo.stale_pending_jobs(pending_timeout).await?;
        let mut expired = 0;
        for id in &ids {
            if let Some(mut job) = self.repo.get_job(*id).await? {
                if state_machine::expire(&mut job).is_ok() {
                    self.repo.save_job(&job).await?;
                    expired += 1;
                }
            }
        }
        drop(_guard);
        if expired > 0 {
            self.mark_dirty();
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;

    fn coordinator() -> Coordinator {
        let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let persist = Arc::new(AsyncPersist::mock());
        Coordinator::new(repo, persist, SchedulerConfig::default())
    }

    #[tokio::test]
    async fn happy_path_submit_heartbeat_assign_complete() {
        let c = coordinator();
        let job = c
            .submit_job("http://x/v.mp4".into(), "h264".into(), None, None, None)
            .await
            .unwrap();
        assert_eq!(job.status, crate::model::JobStatus::Pending);

        c.heartbeat_engine(
            EngineId::new("e1"),
            true,
            Some(100.0),
            None,
            Some(1000.0),
            None,
            Default::default(),
        )
        .await
        .unwrap();

        let assigned = c
            .assign_job(Some(EngineId::new("e1")))
            .await
            .unwrap()
            .expect("a job should be assigned");
        assert_eq!(assigned.job_id, job.job_id);
        assert_eq!(assigned.status, crate::model::JobStatus::Assigned);

        let completed = c.complete_job(job.job_id, "http://x/o.mp4".into()).await.unwrap();
        assert_eq!(completed.status, crate::model::JobStatus::Completed);

        let engine = c
            .list_engines()
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.engine_id.as_str() == "e1")
            .unwrap();
        assert!(engine.is_idle());
    }

    #[tokio::test]
    async fn retry_then_permanent_matches_scenario_2() {
        let c = coordinator();
        let job = c
            .submit_job("http://x/v.mp4".into(), "h264".into(), None, Some(1), None)
            .await
            .unwrap();
        c.heartbeat_engine(EngineId::new("e1"), true, Some(100.0), None, Some(1000.0), None, Default::default())
            .await
            .unwrap();
        c.heartbeat_engine(EngineId::new("e2"), true, Some(200.0), None, Some(1000.0), None, Default::default())
            .await
            .unwrap();

        let assigned = c.assign_job(None).await.unwrap().unwrap();
        assert_eq!(assigned.assigned_engine, Some(EngineId::new("e1")));

        let failed = c.fail_job(job.job_id, "boom".into()).await.unwrap();
        assert_eq!(failed.status, crate::model::JobStatus::Pending);
        assert_eq!(failed.retries, 1);

        let assigned_again = c.assign_job(None).await.unwrap().unwrap();
        assert_eq!(assigned_again.assigned_engine, Some(EngineId::new("e1")));

        let failed_again = c.fail_job(job.job_id, "boom again".into()).await.unwrap();
        assert_eq!(failed_again.status, crate::model::JobStatus::FailedPermanently);
        assert_eq!(failed_again.retries, 1);
    }

    #[tokio::test]
    async fn deregister_reverts_assigned_job_to_pending() {
        let c = coordinator();
        let job = c
            .submit_job("http://x/v.mp4".into(), "h264".into(), None, None, None)
            .await
            .unwrap();
        c.heartbeat_engine(EngineId::new("e1"), true, Some(100.0), None, Some(1000.0), None, Default::default())
            .await
            .unwrap();
        c.assign_job(None).await.unwrap().unwrap();

        assert!(c.deregister_engine(&EngineId::new("e1")).await.unwrap());
        let reverted = c.get_job(job.job_id).await.unwrap();
        assert_eq!(reverted.status, crate::model::JobStatus::Pending);
        assert!(reverted.assigned_engine.is_none());
        assert_eq!(reverted.retries, 1);
    }

    #[tokio::test]
    async fn reap_stale_engines_requeues_its_job() {
        let c = coordinator();
        let job = c
            .submit_job("http://x/v.mp4".into(), "h264".into(), None, None, None)
            .await
            .unwrap();
        c.heartbeat_engine(EngineId::new("e1"), true, Some(100.0), None, Some(1000.0), None, Default::default())
            .await
            .unwrap();
        c.assign_job(None).await.unwrap().unwrap();

        // Simulate an old heartbeat by reaching into the repository.
        let mut stale_engine = c.repo.get_engine(&EngineId::new("e1")).await.unwrap().unwrap();
        stale_engine.last_heartbeat = Utc::now() - Duration::minutes(10);
        c.repo.save_engine(&stale_engine).await.unwrap();

        let removed = c.reap_stale_engines(Duration::minutes(5)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(c.repo.get_engine(&EngineId::new("e1")).await.unwrap().is_none());

        let reverted = c.get_job(job.job_id).await.unwrap();
        assert_eq!(reverted.status, crate::model::JobStatus::Pending);
    }
}
