use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{Repository, Snapshot};
use crate::error::AppResult;
use crate::ids::{EngineId, JobId};
use crate::model::{Engine, Job, JobStatus};

/// In-memory `Repository`, used for tests and transient (`:memory:`) runs.
///
/// A plain `std::sync::Mutex` is enough here: every operation is a quick
/// map mutation with no `.await` inside the critical section, so there is
/// no risk of holding the lock across a suspension point.
#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<Snapshot>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn save_job(&self, job: &Job) -> AppResult<()> {
        self.inner.lock().unwrap().jobs.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> AppResult<Option<Job>> {
        Ok(self.inner.lock().unwrap().jobs.get(&id).cloned())
    }

    async fn list_jobs(&self) -> AppResult<Vec<Job>> {
        Ok(self.inner.lock().unwrap().jobs.values().cloned().collect())
    }

    async fn delete_job(&self, id: JobId) -> AppResult<bool> {
        Ok(self.inner.lock().unwrap().jobs.remove(&id).is_some())
    }

    async fn next_pending_job(&self) -> AppResult<Option<Job>> {
        let guard = self.inner.lock().unwrap();
        let best = guard
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            })
            .cloned();
        Ok(best)
    }

    async fn jobs_by_engine(&self, engine_id: &EngineId) -> AppResult<Vec<Job>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|j| j.assigned_engine.as_ref() == Some(engine_id))
            .cloned()
            .collect())
    }

    async fn stale_pending_jobs(&self, timeout: Duration) -> AppResult<Vec<JobId>> {
        let cutoff = Utc::now() - timeout;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.created_at < cutoff)
            .map(|j| j.job_id)
            .collect())
    }

    async fn save_engine(&self, engine: &Engine) -> AppResult<()> {
        self.inner
            .lock()
            .unwrap()
            .engines
            .insert(engine.engine_id.clone(), engine.clone());
        Ok(())
    }

    async fn get_engine(&self, id: &EngineId) -> AppResult<Option<Engine>> {
        Ok(self.inner.lock().unwrap().engines.get(id).cloned())
    }

    async fn list_engines(&self) -> AppResult<Vec<Engine>> {
        Ok(self.inner.lock().unwrap().engines.values().cloned().collect())
    }

    async fn delete_engine(&self, id: &EngineId) -> AppResult<bool> {
        Ok(self.inner.lock().unwrap().engines.remove(id).is_some())
    }

    async fn snapshot(&self) -> AppResult<Snapshot> {
        Ok(self.inner.lock().unwrap().clone())
    }

    async fn restore(&self, snapshot: Snapshot) -> AppResult<()> {
        *self.inner.lock().unwrap() = snapshot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;

    fn job(priority: Priority, age_secs: i64) -> Job {
        let mut j = Job::builder().source_url("u").target_codec("c").priority(priority).build();
        j.created_at = Utc::now() - Duration::seconds(age_secs);
        j
    }

    #[tokio::test]
    async fn next_pending_job_prefers_highest_priority_then_oldest() {
        let repo = MemoryRepository::new();
        let low_old = job(Priority::Normal, 100);
        let high_new = job(Priority::Urgent, 1);
        let high_old = job(Priority::Urgent, 50);
        repo.save_job(&low_old).await.unwrap();
        repo.save_job(&high_new).await.unwrap();
        repo.save_job(&high_old).await.unwrap();

        let next = repo.next_pending_job().await.unwrap().unwrap();
        assert_eq!(next.job_id, high_old.job_id);
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_restore() {
        let repo = MemoryRepository::new();
        let j = job(Priority::Normal, 0);
        repo.save_job(&j).await.unwrap();
        let snap = repo.snapshot().await.unwrap();

        let other = MemoryRepository::new();
        other.restore(snap).await.unwrap();
        assert_eq!(other.list_jobs().await.unwrap().len(), 1);
    }
}
