//! Orphan recovery.
//!
//! A worker that crashes or stalls leaves its job in PROCESSING with a
//! stale heartbeat. The sweeper periodically returns such jobs to the
//! queue, or abandons them once the retry budget is spent. It needs no
//! coordination with workers: the store's transition guards make the
//! sweep safe against in-flight completions.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::SweeperSettings;
use crate::server::metrics;

use super::models::ReclaimReport;
use super::store::JobStore;

pub struct OrphanSweeper {
    store: Arc<dyn JobStore>,
    settings: SweeperSettings,
}

impl OrphanSweeper {
    pub fn new(store: Arc<dyn JobStore>, settings: SweeperSettings) -> Self {
        Self { store, settings }
    }

    /// Periodic sweep loop - call from a spawned task.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Orphan sweeper starting (interval={:?}, stale_after={:?}, max_attempts={})",
            self.settings.interval, self.settings.stale_after, self.settings.max_attempts
        );

        // Sweep once at startup: jobs orphaned by a previous crash should
        // not wait a full interval
        self.sweep_once();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {
                    self.sweep_once();
                }
                _ = shutdown.cancelled() => {
                    info!("Orphan sweeper shutting down");
                    break;
                }
            }
        }
    }

    /// One reclaim pass.
    pub fn sweep_once(&self) -> ReclaimReport {
        match self
            .store
            .reclaim_orphans(self.settings.stale_after, self.settings.max_attempts)
        {
            Ok(report) => {
                if report.requeued > 0 {
                    warn!("Requeued {} orphaned jobs", report.requeued);
                }
                if report.abandoned > 0 {
                    warn!(
                        "Abandoned {} orphaned jobs after {} attempts",
                        report.abandoned, self.settings.max_attempts
                    );
                }
                metrics::record_reclaim(&report);

                if let Ok(stats) = self.store.queue_stats(self.settings.stale_after) {
                    metrics::set_queue_depth(&stats);
                }

                report
            }
            Err(e) => {
                error!("Orphan sweep failed: {:#}", e);
                ReclaimReport::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{AnalysisMode, ErrorKind, JobStatus, SqliteJobStore, SubmitRequest};
    use std::time::Duration;

    fn settings() -> SweeperSettings {
        SweeperSettings {
            interval: Duration::from_millis(20),
            stale_after: Duration::from_secs(300),
            max_attempts: 2,
        }
    }

    fn submit_and_claim(store: &SqliteJobStore) -> String {
        let job = store
            .submit(SubmitRequest {
                input_ref: "uploads/clip.wav".to_string(),
                mode: AnalysisMode::Quick,
                genre: None,
            })
            .unwrap();
        store.claim_next("worker-1").unwrap().unwrap();
        job.id
    }

    fn backdate(store: &SqliteJobStore, id: &str) {
        store
            .connection()
            .lock()
            .unwrap()
            .execute(
                "UPDATE analysis_jobs SET updated_at = 1000 WHERE id = ?1",
                rusqlite::params![id],
            )
            .unwrap();
    }

    #[test]
    fn test_sweep_requeues_stale_job() {
        let store = Arc::new(SqliteJobStore::in_memory().unwrap());
        let job_id = submit_and_claim(&store);
        backdate(&store, &job_id);

        let sweeper = OrphanSweeper::new(store.clone(), settings());
        let report = sweeper.sweep_once();

        assert_eq!(report.requeued, 1);
        assert_eq!(report.abandoned, 0);
        assert_eq!(
            store.get_job(&job_id).unwrap().unwrap().status,
            JobStatus::Queued
        );
    }

    #[test]
    fn test_sweep_abandons_after_budget() {
        let store = Arc::new(SqliteJobStore::in_memory().unwrap());
        let job_id = submit_and_claim(&store);
        let sweeper = OrphanSweeper::new(store.clone(), settings());

        // First orphaning: requeued (attempts 1 < 2)
        backdate(&store, &job_id);
        assert_eq!(sweeper.sweep_once().requeued, 1);

        // Second claim, orphaned again: budget spent
        store.claim_next("worker-2").unwrap().unwrap();
        backdate(&store, &job_id);
        let report = sweeper.sweep_once();
        assert_eq!(report.abandoned, 1);

        let job = store.get_job(&job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.unwrap().kind, ErrorKind::OrphanExhausted);
    }

    #[test]
    fn test_sweep_leaves_live_jobs_alone() {
        let store = Arc::new(SqliteJobStore::in_memory().unwrap());
        let job_id = submit_and_claim(&store);

        let sweeper = OrphanSweeper::new(store.clone(), settings());
        let report = sweeper.sweep_once();

        assert_eq!(report.total(), 0);
        assert_eq!(
            store.get_job(&job_id).unwrap().unwrap().status,
            JobStatus::Processing
        );
    }
}
