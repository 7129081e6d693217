use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mixgauge_analysis_server::config::{AppConfig, CliConfig, FileConfig};
use mixgauge_analysis_server::extract::HttpFeatureExtractor;
use mixgauge_analysis_server::jobs::{JobStore, OrphanSweeper, SqliteJobStore, WorkerPool};
use mixgauge_analysis_server::scoring::ProfileRegistry;
use mixgauge_analysis_server::server::{self, run_server, ServerConfig};
use mixgauge_analysis_server::storage::HttpBlobStore;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite job database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Path to a TOML config file. File values override CLI flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8080)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// Base URL of the object storage gateway holding uploaded audio.
    #[clap(long)]
    pub storage_url: Option<String>,

    /// Timeout in seconds for storage fetches.
    #[clap(long, default_value_t = 60)]
    pub storage_timeout_sec: u64,

    /// Base URL of the DSP sidecar that extracts audio features.
    #[clap(long)]
    pub extractor_url: Option<String>,

    /// Timeout in seconds for feature extraction requests.
    #[clap(long, default_value_t = 300)]
    pub extractor_timeout_sec: u64,

    /// Number of concurrent analysis workers.
    #[clap(long, default_value_t = 4)]
    pub workers: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;

    let cli_config = CliConfig {
        db_path: cli_args.db_path,
        port: cli_args.port,
        metrics_port: cli_args.metrics_port,
        storage_url: cli_args.storage_url,
        storage_timeout_sec: cli_args.storage_timeout_sec,
        extractor_url: cli_args.extractor_url,
        extractor_timeout_sec: cli_args.extractor_timeout_sec,
        workers: cli_args.workers,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening SQLite job database at {:?}...", config.db_path);
    let job_store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(&config.db_path)?);

    // A defective profile set must never reach scoring
    let profiles = Arc::new(
        ProfileRegistry::builtin().context("Built-in scoring profiles are misconfigured")?,
    );

    info!("Initializing metrics...");
    server::metrics::init_metrics();

    let blob_store = Arc::new(HttpBlobStore::new(
        config.storage_url.clone(),
        config.storage_timeout_sec,
    ));
    let extractor = Arc::new(HttpFeatureExtractor::new(
        config.extractor_url.clone(),
        config.extractor_timeout_sec,
    ));

    let shutdown = CancellationToken::new();

    let sweeper = OrphanSweeper::new(Arc::clone(&job_store), config.sweeper.clone());
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move { sweeper.run(shutdown).await }
    });

    let pool = Arc::new(WorkerPool::new(
        Arc::clone(&job_store),
        blob_store,
        extractor,
        Arc::clone(&profiles),
        config.worker.clone(),
    ));
    let worker_handles = pool.spawn(shutdown.clone());
    info!("Started {} analysis workers", config.worker.count);

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
        }
    });

    info!("Ready to serve at port {}!", config.port);
    let server_config = ServerConfig {
        port: config.port,
        metrics_port: config.metrics_port,
        stale_after: config.sweeper.stale_after,
    };
    run_server(
        server_config,
        Arc::clone(&job_store),
        Arc::clone(&profiles),
        shutdown.clone(),
    )
    .await?;

    // Server is down; stop workers and the sweeper too
    shutdown.cancel();
    for handle in worker_handles {
        let _ = handle.await;
    }
    info!("Shutdown complete");

    Ok(())
}
