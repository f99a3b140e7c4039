//! CLI surface and the typed configuration it produces.
//!
//! `clap`'s derive API plays the role of the "config loader" collaborator
//! described at the interface level — see SPEC_FULL.md §6, §10.

use clap::Parser;

use crate::reaper::ReaperConfig;
use crate::scheduler::SchedulerConfig;

#[derive(Debug, Clone, Parser)]
#[command(name = "dispatch-server", about = "Distributed transcoding dispatch coordinator")]
pub struct Cli {
    /// Shared secret required on the X-API-Key header. Empty disables auth.
    #[arg(long, default_value = "")]
    pub api_key: String,

    /// Path to the sqlite state file, or ":memory:" for an ephemeral
    /// in-memory store backed by a JSON snapshot file instead.
    #[arg(long, default_value = "dispatch_server_state.db")]
    pub database: String,

    /// Path to the JSON snapshot file used by the in-memory repository.
    #[arg(long, default_value = "dispatch_server_state.json")]
    pub snapshot_path: std::path::PathBuf,

    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Seconds between reaper sweeps.
    #[arg(long, default_value_t = 30)]
    pub reaper_sweep_interval_secs: u64,

    /// Minutes of heartbeat silence before an engine is reaped.
    #[arg(long, default_value_t = 5)]
    pub engine_timeout_minutes: i64,

    /// Minutes an assigned job may run without progress before it is timed out.
    #[arg(long, default_value_t = 30)]
    pub job_timeout_minutes: i64,

    /// Hours a pending job may wait before it is expired.
    #[arg(long, default_value_t = 24)]
    pub pending_timeout_hours: i64,

    /// Jobs under this size (MB) are routed to the slowest idle engine.
    #[arg(long, default_value_t = 50.0)]
    pub small_job_max_mb: f64,

    /// Jobs at or above this size (MB) prefer a streaming-capable engine.
    #[arg(long, default_value_t = 100.0)]
    pub large_job_min_mb: f64,
}

/// The resolved, validated configuration the rest of the server runs on.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub api_key: String,
    pub database: String,
    pub port: u16,
    pub snapshot_path: std::path::PathBuf,
    pub reaper: ReaperConfig,
    pub scheduler: SchedulerConfig,
}

impl ServerConfig {
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        if cli.port == 0 {
            anyhow::bail!("--port must be a valid, non-zero port number");
        }
        Ok(Self {
            api_key: cli.api_key,
            database: cli.database,
            port: cli.port,
            snapshot_path: cli.snapshot_path,
            reaper: ReaperConfig {
                sweep_interval: std::time::Duration::from_secs(cli.reaper_sweep_interval_secs),
                engine_timeout: chrono::Duration::minutes(cli.engine_timeout_minutes),
                job_timeout: chrono::Duration::minutes(cli.job_timeout_minutes),
                pending_timeout: chrono::Duration::hours(cli.pending_timeout_hours),
            },
            scheduler: SchedulerConfig {
                small_job_max_mb: cli.small_job_max_mb,
                large_job_min_mb: cli.large_job_min_mb,
            },
        })
    }

    pub fn is_in_memory(&self) -> bool {
        self.database == ":memory:"
    }
}
