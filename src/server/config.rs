use std::time::Duration;

/// Settings the HTTP layer needs at request time.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub metrics_port: u16,
    /// Stale window used when reporting queue statistics; matches the
    /// sweeper's orphan threshold.
    pub stale_after: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            metrics_port: 9091,
            stale_after: Duration::from_secs(600),
        }
    }
}
