mod file_config;

pub use file_config::{FileConfig, SweeperConfig, WorkerConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub storage_url: Option<String>,
    pub storage_timeout_sec: u64,
    pub extractor_url: Option<String>,
    pub extractor_timeout_sec: u64,
    pub workers: usize,
}

/// Worker pool behavior.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Number of concurrent worker tasks.
    pub count: usize,
    /// How long an idle worker sleeps before polling for work again.
    pub poll_interval: Duration,
    /// How often a busy worker refreshes its job's heartbeat.
    pub heartbeat_interval: Duration,
    /// Payloads smaller than this are rejected before decoding.
    pub min_input_bytes: u64,
    /// Payloads larger than this are rejected before decoding.
    pub max_input_bytes: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            count: 4,
            poll_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            min_input_bytes: 1024,
            max_input_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Orphan sweeper behavior.
#[derive(Debug, Clone)]
pub struct SweeperSettings {
    /// How often the sweeper scans for orphans.
    pub interval: Duration,
    /// A PROCESSING job with no heartbeat for this long is an orphan.
    pub stale_after: Duration,
    /// Claim attempts before an orphan is abandoned instead of requeued.
    pub max_attempts: i32,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
            stale_after: Duration::from_secs(600),
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub storage_url: String,
    pub storage_timeout_sec: u64,
    pub extractor_url: String,
    pub extractor_timeout_sec: u64,
    pub worker: WorkerSettings,
    pub sweeper: SweeperSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        let storage_url = file
            .storage_url
            .or_else(|| cli.storage_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("storage_url must be specified via --storage-url or in config file")
            })?;

        let extractor_url = file
            .extractor_url
            .or_else(|| cli.extractor_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "extractor_url must be specified via --extractor-url or in config file"
                )
            })?;

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        let storage_timeout_sec = file.storage_timeout_sec.unwrap_or(cli.storage_timeout_sec);
        let extractor_timeout_sec = file
            .extractor_timeout_sec
            .unwrap_or(cli.extractor_timeout_sec);

        let worker_defaults = WorkerSettings::default();
        let worker_file = file.worker.unwrap_or_default();
        let worker = WorkerSettings {
            count: worker_file.count.unwrap_or(cli.workers),
            poll_interval: worker_file
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(worker_defaults.poll_interval),
            heartbeat_interval: worker_file
                .heartbeat_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(worker_defaults.heartbeat_interval),
            min_input_bytes: worker_file
                .min_input_bytes
                .unwrap_or(worker_defaults.min_input_bytes),
            max_input_bytes: worker_file
                .max_input_mb
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(worker_defaults.max_input_bytes),
        };

        let sweeper_defaults = SweeperSettings::default();
        let sweeper_file = file.sweeper.unwrap_or_default();
        let sweeper = SweeperSettings {
            interval: sweeper_file
                .interval_secs
                .map(Duration::from_secs)
                .unwrap_or(sweeper_defaults.interval),
            stale_after: sweeper_file
                .stale_after_secs
                .map(Duration::from_secs)
                .unwrap_or(sweeper_defaults.stale_after),
            max_attempts: sweeper_file
                .max_attempts
                .unwrap_or(sweeper_defaults.max_attempts),
        };

        if worker.count == 0 {
            bail!("worker count must be at least 1");
        }
        if worker.min_input_bytes >= worker.max_input_bytes {
            bail!(
                "min_input_bytes {} must be below max_input_bytes {}",
                worker.min_input_bytes,
                worker.max_input_bytes
            );
        }
        // A heartbeat slower than the stale window would let the sweeper
        // reclaim jobs that are merely long, not dead
        if worker.heartbeat_interval >= sweeper.stale_after {
            bail!(
                "heartbeat interval {:?} must be shorter than sweeper stale_after {:?}",
                worker.heartbeat_interval,
                sweeper.stale_after
            );
        }
        if sweeper.max_attempts < 1 {
            bail!("sweeper max_attempts must be at least 1");
        }

        Ok(Self {
            db_path,
            port,
            metrics_port,
            storage_url,
            storage_timeout_sec,
            extractor_url,
            extractor_timeout_sec,
            worker,
            sweeper,
        })
    }
}
