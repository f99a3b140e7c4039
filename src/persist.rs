//! Debounced, atomic snapshot writer.
//!
//! Every accepted mutation calls [`AsyncPersist::mark_dirty`], which wakes a
//! background task that serializes the current state and writes it to the
//! configured path via write-temp-then-rename. If a write is already in
//! flight when another `mark_dirty` arrives, the dirty flag is set again so
//! the in-flight write's *next* round picks it up — no mutation is ever
//! silently dropped, though writes may coalesce.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::AppResult;
use crate::repository::Repository;

pub struct AsyncPersist {
    path: Option<PathBuf>,
    dirty: Arc<AtomicBool>,
    notify: Arc<Notify>,
    write_count: Arc<AtomicU64>,
    mock: bool,
}

impl AsyncPersist {
    /// `path = None` disables the snapshot file entirely (durable-sqlite
    /// deployments already persist each mutation in the database itself).
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            dirty: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            write_count: Arc::new(AtomicU64::new(0)),
            mock: false,
        }
    }

    /// Replaces writes with a counter increment, for deterministic tests.
    pub fn mock() -> Self {
        Self {
            path: None,
            dirty: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            write_count: Arc::new(AtomicU64::new(0)),
            mock: true,
        }
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::SeqCst)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Runs the background flush loop until `shutdown` fires, then performs
    /// one final synchronous flush.
    pub async fn run(
        &self,
        repo: Arc<dyn Repository>,
        shutdown: CancellationToken,
    ) -> AppResult<()> {
        loop {
            tokio::select! {
                _ = self.notify.notified() => {
                    self.flush_if_dirty(&repo).await?;
                }
                _ = shutdown.cancelled() => {
                    self.flush(&repo).await?;
                    return Ok(());
                }
            }
        }
    }

    async fn flush_if_dirty(&self, repo: &Arc<dyn Repository>) -> AppResult<()> {
        if self.dirty.swap(false, Ordering::SeqCst) {
            self.flush(repo).await?;
        }
        Ok(())
    }

    /// Synchronous save, for shutdown and for test fixtures that want to
    /// inspect the file immediately.
    pub async fn flush(&self, repo: &Arc<dyn Repository>) -> AppResult<()> {
        if self.mock {
            self.write_count.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot = repo.snapshot().await?;
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| crate::error::AppError::Internal(anyhow::anyhow!(e)))?;

        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| crate::error::AppError::Internal(anyhow::anyhow!(e)))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| crate::error::AppError::Internal(anyhow::anyhow!(e)))?;
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Loads a snapshot from `path`, tolerating an absent, empty, or
    /// malformed file by starting from empty state.
    pub async fn load(path: &std::path::Path) -> crate::repository::Snapshot {
        let Ok(bytes) = tokio::fs::read(path).await else {
            tracing::info!(path = %path.display(), "no prior state file, starting empty");
            return crate::repository::Snapshot::empty();
        };
        if bytes.is_empty() {
            tracing::warn!(path = %path.display(), "state file is empty, starting empty");
            return crate::repository::Snapshot::empty();
        }
        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "state file is malformed, starting empty");
                crate::repository::Snapshot::empty()
            }
        }
    }
}
