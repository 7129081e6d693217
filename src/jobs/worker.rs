//! Analysis worker pool.
//!
//! Each worker runs an independent claim → fetch → extract → score →
//! persist loop. Workers are stateless between jobs; all coordination goes
//! through the store's claim protocol, so any number of workers is safe.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::WorkerSettings;
use crate::extract::{ExtractError, FeatureExtractor};
use crate::scoring::{self, ProfileRegistry, ScoreError, ScoreReport};
use crate::server::metrics;
use crate::storage::{BlobStore, StorageError};

use super::models::{ErrorKind, Job, JobError};
use super::store::{JobStore, TransitionError};

pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    blob_store: Arc<dyn BlobStore>,
    extractor: Arc<dyn FeatureExtractor>,
    profiles: Arc<ProfileRegistry>,
    settings: WorkerSettings,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn JobStore>,
        blob_store: Arc<dyn BlobStore>,
        extractor: Arc<dyn FeatureExtractor>,
        profiles: Arc<ProfileRegistry>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            store,
            blob_store,
            extractor,
            profiles,
            settings,
        }
    }

    /// Spawn the configured number of worker tasks.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.settings.count)
            .map(|i| {
                let pool = Arc::clone(&self);
                let shutdown = shutdown.clone();
                let worker_id = format!("worker-{}", i + 1);
                tokio::spawn(async move { pool.run_worker(worker_id, shutdown).await })
            })
            .collect()
    }

    /// Main worker loop - claim work until shutdown.
    async fn run_worker(&self, worker_id: String, shutdown: CancellationToken) {
        info!("Worker {} started", worker_id);

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.process_one(&worker_id).await {
                // Handled a job; look for the next one right away
                Ok(true) => continue,
                Ok(false) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.settings.poll_interval) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
                Err(e) => {
                    error!("Worker {}: claim cycle failed: {:#}", worker_id, e);
                    tokio::select! {
                        _ = tokio::time::sleep(self.settings.poll_interval) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }

        info!("Worker {} stopped", worker_id);
    }

    /// Claim and process at most one job. Returns whether a job was handled.
    pub async fn process_one(&self, worker_id: &str) -> anyhow::Result<bool> {
        let Some(job) = self.store.claim_next(worker_id)? else {
            return Ok(false);
        };
        self.process_job(worker_id, job).await;
        Ok(true)
    }

    async fn process_job(&self, worker_id: &str, job: Job) {
        let started = Instant::now();
        debug!(
            "Worker {} processing job {} ({})",
            worker_id, job.id, job.input_ref
        );

        // Heartbeat keeps the sweeper off long-running extractions
        let heartbeat = tokio::spawn({
            let store = Arc::clone(&self.store);
            let job_id = job.id.clone();
            let interval = self.settings.heartbeat_interval;
            async move {
                loop {
                    tokio::time::sleep(interval).await;
                    match store.heartbeat(&job_id) {
                        Ok(true) => debug!("Heartbeat refreshed for job {}", job_id),
                        // No longer ours; the sweeper took it
                        Ok(false) => break,
                        Err(e) => warn!("Heartbeat for job {} failed: {:#}", job_id, e),
                    }
                }
            }
        });

        let outcome = self.analyze(&job).await;
        heartbeat.abort();

        let elapsed = started.elapsed();
        match outcome {
            Ok(report) => match self.store.complete(&job.id, &report) {
                Ok(()) => {
                    metrics::record_job_completed(elapsed);
                    info!(
                        "Worker {} finished job {} in {:?} (score {}, {})",
                        worker_id,
                        job.id,
                        elapsed,
                        report.score,
                        report.classification.as_str()
                    );
                    if !report.gates.is_empty() {
                        let flags: Vec<&str> =
                            report.gates.iter().map(|g| g.as_str()).collect();
                        warn!("Job {} tripped gates: {}", job.id, flags.join(", "));
                    }
                }
                Err(e) => Self::report_refused_write(worker_id, &job.id, e),
            },
            Err(job_error) => {
                warn!(
                    "Worker {} failing job {}: {} ({})",
                    worker_id,
                    job.id,
                    job_error.message,
                    job_error.kind.as_str()
                );
                match self.store.fail(&job.id, &job_error) {
                    Ok(()) => metrics::record_job_failed(job_error.kind.as_str(), elapsed),
                    Err(e) => Self::report_refused_write(worker_id, &job.id, e),
                }
            }
        }
    }

    /// A refused terminal write means this worker raced the sweeper (or a
    /// duplicate of itself). The guard kept the row consistent; surface the
    /// conflict loudly because it should be rare.
    fn report_refused_write(worker_id: &str, job_id: &str, error: TransitionError) {
        metrics::record_transition_conflict();
        error!(
            "Worker {}: terminal write for job {} refused: {}",
            worker_id, job_id, error
        );
    }

    /// Run the pipeline for one claimed job. Every failure is converted to
    /// a structured error naming the phase that broke; nothing is re-thrown
    /// past the worker loop.
    async fn analyze(&self, job: &Job) -> Result<ScoreReport, JobError> {
        let bytes = self
            .blob_store
            .fetch_bytes(&job.input_ref)
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) => JobError::new(
                    ErrorKind::Fetch,
                    format!("storage reference '{}' did not resolve", job.input_ref),
                ),
                StorageError::Request(e) => {
                    JobError::new(ErrorKind::Fetch, format!("storage fetch failed: {:#}", e))
                }
            })?;

        let size = bytes.len() as u64;
        if size < self.settings.min_input_bytes {
            return Err(JobError::new(
                ErrorKind::Decode,
                format!(
                    "payload is {} bytes, below the {} byte minimum",
                    size, self.settings.min_input_bytes
                ),
            ));
        }
        if size > self.settings.max_input_bytes {
            return Err(JobError::new(
                ErrorKind::Decode,
                format!(
                    "payload is {} bytes, above the {} byte maximum",
                    size, self.settings.max_input_bytes
                ),
            ));
        }

        let features = self
            .extractor
            .extract(&job.input_ref, bytes)
            .await
            .map_err(|e| match e {
                ExtractError::Decode(msg) => JobError::new(ErrorKind::Decode, msg),
                ExtractError::Extract(msg) => JobError::new(ErrorKind::Extract, msg),
            })?;

        let profile = self
            .profiles
            .resolve(job.genre.as_deref(), job.mode)
            .map_err(Self::score_error_to_job_error)?;

        scoring::score(&features, profile, job.mode).map_err(Self::score_error_to_job_error)
    }

    fn score_error_to_job_error(error: ScoreError) -> JobError {
        if let ScoreError::ProfileConfig(ref detail) = error {
            // Implementer bug, not a property of this job
            error!("Scoring profile configuration defect: {}", detail);
        }
        JobError::new(ErrorKind::Score, error.to_string())
    }
}
