use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use super::{Repository, Snapshot};
use crate::error::{AppError, AppResult};
use crate::ids::{EngineId, JobId};
use crate::model::{Engine, Job, JobStatus};

/// Durable `Repository` backed by a single sqlite file, one table per
/// namespace: `(id TEXT PRIMARY KEY, data TEXT, created_at, updated_at)`.
/// Every row's `data` column is the JSON-serialized record; `created_at`
/// and `updated_at` are duplicated out of the JSON into real columns so
/// `next_pending_job` and the stale-job sweeps can query with an index
/// instead of parsing JSON per row.
///
/// All mutating statements are parameter-bound; none concatenate input
/// into SQL text. An internal lock serializes access the same way the
/// in-memory implementation does, per the repository's concurrency
/// contract.
pub struct SqliteRepository {
    pool: SqlitePool,
    lock: Arc<Mutex<()>>,
}

impl SqliteRepository {
    pub async fn connect(path: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS engines (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        Ok(Self {
            pool,
            lock: Arc::new(Mutex::new(())),
        })
    }
}

fn internal<E: std::fmt::Display>(err: E) -> AppError {
    AppError::Internal(anyhow::anyhow!("{err}"))
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn save_job(&self, job: &Job) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let data = serde_json::to_string(job).map_err(internal)?;
        sqlx::query(
            "INSERT INTO jobs (id, data, created_at, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(job.job_id.to_string())
        .bind(data)
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> AppResult<Option<Job>> {
        let _guard = self.lock.lock().await;
        let row = sqlx::query("SELECT data FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
        row.map(|r| serde_json::from_str(r.get::<String, _>("data").as_str()).map_err(internal))
            .transpose()
    }

    async fn list_jobs(&self) -> AppResult<Vec<Job>> {
        let _guard = self.lock.lock().await;
        let rows = sqlx::query("SELECT data FROM jobs")
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
        rows.into_iter()
            .map(|r| serde_json::from_str(r.get::<String, _>("data").as_str()).map_err(internal))
            .collect()
    }

    async fn delete_job(&self, id: JobId) -> AppResult<bool> {
        let _guard = self.lock.lock().await;
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(result.rows_affected() > 0)
    }

    async fn next_pending_job(&self) -> AppResult<Option<Job>> {
        let _guard = self.lock.lock().await;
        let rows = sqlx::query("SELECT data FROM jobs ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
        let mut best: Option<Job> = None;
        for row in rows {
            let job: Job = serde_json::from_str(row.get::<String, _>("data").as_str()).map_err(internal)?;
            if job.status != JobStatus::Pending {
                continue;
            }
            best = match best {
                None => Some(job),
                Some(current) if job.priority > current.priority => Some(job),
                Some(current) => Some(current),
            };
        }
        Ok(best)
    }

    async fn jobs_by_engine(&self, engine_id: &EngineId) -> AppResult<Vec<Job>> {
        let all = self.list_jobs().await?;
        Ok(all
            .into_iter()
            .filter(|j| j.assigned_engine.as_ref() == Some(engine_id))
            .collect())
    }

    async fn stale_pending_jobs(&self, timeout: Duration) -> AppResult<Vec<JobId>> {
        let cutoff: DateTime<Utc> = Utc::now() - timeout;
        let _guard = self.lock.lock().await;
        let rows = sqlx::query("SELECT id FROM jobs WHERE created_at < ?")
            .bind(cutoff.to_rfc3339())
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
        drop(_guard);
        let mut ids = Vec::new();
        for row in rows {
            let id: String = row.get("id");
            if let Ok(job_id) = JobId::parse(&id) {
                if let Some(job) = self.get_job(job_id).await? {
                    if job.status == JobStatus::Pending {
                        ids.push(job_id);
                    }
                }
            }
        }
        Ok(ids)
    }

    async fn save_engine(&self, engine: &Engine) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let data = serde_json::to_string(engine).map_err(internal)?;
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO engines (id, data, created_at, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(engine.engine_id.to_string())
        .bind(data)
        .bind(now.clone())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get_engine(&self, id: &EngineId) -> AppResult<Option<Engine>> {
        let _guard = self.lock.lock().await;
        let row = sqlx::query("SELECT data FROM engines WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
        row.map(|r| serde_json::from_str(r.get::<String, _>("data").as_str()).map_err(internal))
            .transpose()
    }

    async fn list_engines(&self) -> AppResult<Vec<Engine>> {
        let _guard = self.lock.lock().await;
        let rows = sqlx::query("SELECT data FROM engines")
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
        rows.into_iter()
            .map(|r| serde_json::from_str(r.get::<String, _>("data").as_str()).map_err(internal))
            .collect()
    }

    async fn delete_engine(&self, id: &EngineId) -> AppResult<bool> {
        let _guard = self.lock.lock().await;
        let result = sqlx::query("DELETE FROM engines WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(result.rows_affected() > 0)
    }

    async fn snapshot(&self) -> AppResult<Snapshot> {
        let jobs = self.list_jobs().await?;
        let engines = self.list_engines().await?;
        let mut snap = Snapshot::empty();
        for job in jobs {
            snap.jobs.insert(job.job_id, job);
        }
        for engine in engines {
            snap.engines.insert(engine.engine_id.clone(), engine);
        }
        Ok(snap)
    }

    async fn restore(&self, snapshot: Snapshot) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        sqlx::query("DELETE FROM jobs").execute(&self.pool).await.map_err(internal)?;
        sqlx::query("DELETE FROM engines").execute(&self.pool).await.map_err(internal)?;
        drop(_guard);
        for job in snapshot.jobs.into_values() {
            self.save_job(&job).await?;
        }
        for engine in snapshot.engines.into_values() {
            self.save_engine(&engine).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> SqliteRepository {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.sqlite3");
        let repo = SqliteRepository::connect(path.to_str().unwrap()).await.unwrap();
        // keep tempdir alive for the duration of the test by leaking it;
        // each test gets its own file so this is bounded.
        std::mem::forget(dir);
        repo
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let repo = repo().await;
        let job = Job::builder().source_url("u").target_codec("c").build();
        repo.save_job(&job).await.unwrap();
        let fetched = repo.get_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(fetched.job_id, job.job_id);
        assert_eq!(fetched.source_url, "u");
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let repo = repo().await;
        let job = Job::builder().source_url("u").target_codec("c").build();
        repo.save_job(&job).await.unwrap();
        assert!(repo.delete_job(job.job_id).await.unwrap());
        assert!(repo.get_job(job.job_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn snapshot_and_restore_round_trip() {
        let repo = repo().await;
        let job = Job::builder().source_url("u").target_codec("c").build();
        repo.save_job(&job).await.unwrap();
        let snap = repo.snapshot().await.unwrap();

        let other = repo().await;
        other.restore(snap).await.unwrap();
        assert_eq!(other.list_jobs().await.unwrap().len(), 1);
    }
}
