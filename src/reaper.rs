//! The background reaper: a single periodic task that expires stale
//! engines and times out stuck assigned jobs.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio_util::sync::CancellationToken;

use crate::coordinator::Coordinator;

#[derive(Debug, Clone, Copy)]
pub struct ReaperConfig {
    pub sweep_interval: StdDuration,
    pub engine_timeout: Duration,
    pub job_timeout: Duration,
    pub pending_timeout: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: StdDuration::from_secs(30),
            engine_timeout: Duration::minutes(5),
            job_timeout: Duration::minutes(30),
            pending_timeout: Duration::hours(24),
        }
    }
}

pub struct Reaper {
    coordinator: Arc<Coordinator>,
    config: ReaperConfig,
}

impl Reaper {
    pub fn new(coordinator: Arc<Coordinator>, config: ReaperConfig) -> Self {
        Self { coordinator, config }
    }

    /// Runs sweeps on `config.sweep_interval` until `shutdown` fires.
    /// Exits promptly on cancellation rather than mid-sweep.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("reaper shutting down");
                    return;
                }
            }
        }
    }

    /// Engine sweep, then job sweep, then stale-pending sweep — see the
    /// ordering requirement in SPEC_FULL.md §4.5.
    pub async fn sweep_once(&self) {
        match self.coordinator.reap_stale_engines(self.config.engine_timeout).await {
            Ok(n) if n > 0 => tracing::info!(count = n, "reaped stale engines"),
            Ok(_) => {}
            Err(err) => tracing::error!(error = %err, "engine sweep failed"),
        }

        match self.coordinator.reap_stale_jobs(self.config.job_timeout).await {
            Ok(n) if n > 0 => tracing::info!(count = n, "timed out stuck jobs"),
            Ok(_) => {}
            Err(err) => tracing::error!(error = %err, "job sweep failed"),
        }

        match self.coordinator.reap_stale_pending(self.config.pending_timeout).await {
            Ok(n) if n > 0 => tracing::info!(count = n, "expired stale pending jobs"),
            Ok(_) => {}
            Err(err) => tracing::error!(error = %err, "stale-pending sweep failed"),
        }
    }
}
