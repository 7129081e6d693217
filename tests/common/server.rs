//! Test server lifecycle management
//!
//! Each test gets an isolated server on a random port with its own scratch
//! job database and a live worker pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use mixgauge_analysis_server::config::WorkerSettings;
use mixgauge_analysis_server::jobs::{JobStore, SqliteJobStore, WorkerPool};
use mixgauge_analysis_server::scoring::ProfileRegistry;
use mixgauge_analysis_server::server::state::ServerState;
use mixgauge_analysis_server::server::{make_app, ServerConfig};

use super::fixtures::{FixedBlobStore, FixedFeatureExtractor};

const SERVER_READY_TIMEOUT_MS: u64 = 5000;
const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;

/// Test server instance with an isolated database and worker pool.
///
/// When dropped, the server, its workers and temp resources shut down.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Store handle for direct database access in tests
    pub job_store: Arc<dyn JobStore>,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    shutdown: CancellationToken,
}

impl TestServer {
    /// Spawn a new test server on a random port with two live workers.
    pub async fn spawn() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("jobs.db");

        let job_store: Arc<dyn JobStore> =
            Arc::new(SqliteJobStore::new(&db_path).expect("Failed to open job store"));
        let profiles = Arc::new(ProfileRegistry::builtin().expect("Failed to build profiles"));

        let shutdown = CancellationToken::new();

        // Fast polling so tests settle quickly
        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&job_store),
            Arc::new(FixedBlobStore::with_standard_objects()),
            Arc::new(FixedFeatureExtractor::with_standard_features()),
            Arc::clone(&profiles),
            WorkerSettings {
                count: 2,
                poll_interval: Duration::from_millis(20),
                heartbeat_interval: Duration::from_secs(5),
                min_input_bytes: 16,
                max_input_bytes: 10 * 1024 * 1024,
            },
        ));
        pool.spawn(shutdown.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let state = ServerState {
            config: ServerConfig {
                port,
                metrics_port: 0,
                stale_after: Duration::from_secs(600),
            },
            start_time: Instant::now(),
            job_store: Arc::clone(&job_store),
            profiles,
        };
        let app = make_app(state);

        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            job_store,
            _temp_dir: temp_dir,
            shutdown,
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the health endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => {
                    return;
                }
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        // TempDir cleans up automatically
    }
}
