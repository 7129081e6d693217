use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub storage_url: Option<String>,
    pub storage_timeout_sec: Option<u64>,
    pub extractor_url: Option<String>,
    pub extractor_timeout_sec: Option<u64>,

    // Feature configs
    pub worker: Option<WorkerConfig>,
    pub sweeper: Option<SweeperConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    pub count: Option<usize>,
    pub poll_interval_secs: Option<u64>,
    pub heartbeat_interval_secs: Option<u64>,
    pub min_input_bytes: Option<u64>,
    pub max_input_mb: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SweeperConfig {
    pub interval_secs: Option<u64>,
    pub stale_after_secs: Option<u64>,
    pub max_attempts: Option<i32>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
