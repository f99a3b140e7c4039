//! The durable mapping `JobID -> Job` and `EngineID -> Engine`.
//!
//! Two implementations share this trait and must behave identically: an
//! in-memory one (tests, transient runs) and a durable one backed by a
//! single sqlite file. Both serialize access internally; callers that need
//! a multi-step operation to be atomic across two calls (assignment,
//! timeout) still need the coordinator's own lock on top — see
//! `crate::coordinator`.

mod memory;
mod snapshot;
mod sqlite;

pub use memory::MemoryRepository;
pub use snapshot::Snapshot;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use chrono::Duration;

use crate::error::AppResult;
use crate::ids::{EngineId, JobId};
use crate::model::{Engine, Job};

#[async_trait]
pub trait Repository: Send + Sync {
    async fn save_job(&self, job: &Job) -> AppResult<()>;
    async fn get_job(&self, id: JobId) -> AppResult<Option<Job>>;
    async fn list_jobs(&self) -> AppResult<Vec<Job>>;
    async fn delete_job(&self, id: JobId) -> AppResult<bool>;
    /// Highest priority pending job, ties broken by earliest `created_at`.
    async fn next_pending_job(&self) -> AppResult<Option<Job>>;
    async fn jobs_by_engine(&self, engine_id: &EngineId) -> AppResult<Vec<Job>>;
    /// Pending jobs whose `created_at` is older than `timeout`.
    async fn stale_pending_jobs(&self, timeout: Duration) -> AppResult<Vec<JobId>>;

    async fn save_engine(&self, engine: &Engine) -> AppResult<()>;
    async fn get_engine(&self, id: &EngineId) -> AppResult<Option<Engine>>;
    async fn list_engines(&self) -> AppResult<Vec<Engine>>;
    async fn delete_engine(&self, id: &EngineId) -> AppResult<bool>;

    /// A point-in-time, non-tearing copy of the whole store.
    async fn snapshot(&self) -> AppResult<Snapshot>;
    /// Replaces the whole store with `snapshot` (used when loading from disk).
    async fn restore(&self, snapshot: Snapshot) -> AppResult<()>;
}
