//! Durable job storage and the atomic claim protocol.
//!
//! The store is the single source of mutual exclusion between workers: a
//! job changes status only through the guarded operations here, never by
//! ad-hoc writes. Claiming is one conditional UPDATE, so two workers can
//! never observe the same queued job.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, info};

use super::models::{
    AnalysisMode, ErrorKind, Job, JobError, JobStatus, QueueStats, ReclaimReport,
};
use super::schema::ANALYSIS_JOBS_VERSIONED_SCHEMAS;
use crate::scoring::ScoreReport;
use crate::sqlite_persistence::BASE_DB_VERSION;

/// A sanitized submission, ready to become a job row.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub input_ref: String,
    pub mode: AnalysisMode,
    pub genre: Option<String>,
}

/// Rejected before any job is created.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid submission: {0}")]
    Validation(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// A guarded status transition was refused.
///
/// `InvalidTransition` means a complete/fail arrived for a job that is not
/// PROCESSING — a duplicate completion or a worker racing the sweeper. The
/// stored row is left untouched.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("job {id} is {actual}, expected PROCESSING")]
    InvalidTransition { id: String, actual: JobStatus },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Trait for job queue storage operations.
pub trait JobStore: Send + Sync {
    /// Insert a new job with status QUEUED. Fails with `Validation` on an
    /// empty input reference or a genre-mode submission without a genre.
    fn submit(&self, request: SubmitRequest) -> Result<Job, SubmitError>;

    /// Get a job by ID.
    fn get_job(&self, id: &str) -> Result<Option<Job>>;

    /// List jobs, newest first, with an optional status filter.
    fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>>;

    /// Atomically claim the oldest queued job: QUEUED → PROCESSING,
    /// attempts incremented, heartbeat stamped. Returns `None` when no
    /// eligible job exists; that is not an error.
    ///
    /// Concurrent callers never receive the same job.
    fn claim_next(&self, worker_id: &str) -> Result<Option<Job>>;

    /// Refresh the heartbeat of a job still being processed. Returns false
    /// if the job is no longer PROCESSING (e.g. reclaimed underneath us).
    fn heartbeat(&self, id: &str) -> Result<bool>;

    /// PROCESSING → DONE with the score report. Guarded.
    fn complete(&self, id: &str, report: &ScoreReport) -> Result<(), TransitionError>;

    /// PROCESSING → FAILED with a structured error. Guarded.
    fn fail(&self, id: &str, error: &JobError) -> Result<(), TransitionError>;

    /// Reclaim PROCESSING jobs whose heartbeat is older than `stale_after`:
    /// back to QUEUED while attempts < `max_attempts`, otherwise FAILED
    /// with `orphan_exhausted`. Safe to run concurrently with claims and
    /// completions.
    fn reclaim_orphans(
        &self,
        stale_after: Duration,
        max_attempts: i32,
    ) -> Result<ReclaimReport>;

    /// Per-status counts plus the number of already-stale PROCESSING jobs.
    fn queue_stats(&self, stale_after: Duration) -> Result<QueueStats>;
}

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Open an existing database or create a new one with the current
    /// schema, validating and migrating as needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = if db_path.as_ref().exists() {
            Connection::open_with_flags(
                &db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            let conn = Connection::open(&db_path)?;
            ANALYSIS_JOBS_VERSIONED_SCHEMAS
                .last()
                .context("No schemas defined")?
                .create(&conn)?;
            info!("Created new job database at {:?}", db_path.as_ref());
            conn
        };

        let db_version = conn
            .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
            .context("Failed to read database version")?
            - BASE_DB_VERSION as i64;

        if db_version < 0 {
            bail!(
                "Job database version {} is too old, does not contain base db version {}",
                db_version,
                BASE_DB_VERSION
            );
        }
        let version = db_version as usize;

        let schema_count = ANALYSIS_JOBS_VERSIONED_SCHEMAS.len();
        if version >= schema_count {
            bail!(
                "Job database version {} is too new (max supported: {})",
                version,
                schema_count - 1
            );
        }

        ANALYSIS_JOBS_VERSIONED_SCHEMAS
            .get(version)
            .context("Failed to get schema")?
            .validate(&conn)?;

        Self::migrate_if_needed(&conn, version)?;

        Ok(SqliteJobStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for tests and ephemeral runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        ANALYSIS_JOBS_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;

        Ok(SqliteJobStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate_if_needed(conn: &Connection, current_version: usize) -> Result<()> {
        let target_version = ANALYSIS_JOBS_VERSIONED_SCHEMAS.len() - 1;

        if current_version >= target_version {
            return Ok(());
        }

        info!(
            "Migrating job database from version {} to {}",
            current_version, target_version
        );

        for schema in ANALYSIS_JOBS_VERSIONED_SCHEMAS
            .iter()
            .skip(current_version + 1)
        {
            if let Some(migration_fn) = schema.migration {
                info!("Running job database migration to version {}", schema.version);
                migration_fn(conn)?;
            }
        }

        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + target_version),
            [],
        )?;

        Ok(())
    }

    /// Direct connection access for tests that need to age rows.
    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }

    fn parse_failure(field: &str, value: &str) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            Type::Text,
            format!("invalid {}: {}", field, value).into(),
        )
    }

    /// Convert a database row to a `Job`.
    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let status_str: String = row.get("status")?;
        let status = JobStatus::from_db_str(&status_str)
            .ok_or_else(|| Self::parse_failure("status", &status_str))?;

        let mode_str: String = row.get("mode")?;
        let mode = AnalysisMode::from_str(&mode_str)
            .ok_or_else(|| Self::parse_failure("mode", &mode_str))?;

        let result = match row.get::<_, Option<String>>("result")? {
            Some(json) => Some(serde_json::from_str::<ScoreReport>(&json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
            })?),
            None => None,
        };

        let error_kind: Option<String> = row.get("error_kind")?;
        let error_message: Option<String> = row.get("error_message")?;
        let error = match error_kind {
            Some(kind_str) => {
                let kind = ErrorKind::from_str(&kind_str)
                    .ok_or_else(|| Self::parse_failure("error_kind", &kind_str))?;
                Some(JobError {
                    kind,
                    message: error_message.unwrap_or_default(),
                })
            }
            None => None,
        };

        Ok(Job {
            id: row.get("id")?,
            input_ref: row.get("input_ref")?,
            mode,
            genre: row.get("genre")?,
            status,
            result,
            error,
            attempts: row.get("attempts")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    /// Current timestamp in seconds.
    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl JobStore for SqliteJobStore {
    fn submit(&self, request: SubmitRequest) -> Result<Job, SubmitError> {
        if request.input_ref.trim().is_empty() {
            return Err(SubmitError::Validation(
                "input_ref must not be empty".to_string(),
            ));
        }
        let genre = request
            .genre
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string);
        if request.mode == AnalysisMode::Genre && genre.is_none() {
            return Err(SubmitError::Validation(
                "genre mode requires a genre".to_string(),
            ));
        }

        let job = Job::new(
            uuid::Uuid::new_v4().to_string(),
            request.input_ref,
            request.mode,
            genre,
        );

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO analysis_jobs (
                id, input_ref, mode, genre, status, attempts, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            rusqlite::params![
                job.id,
                job.input_ref,
                job.mode.as_str(),
                job.genre,
                job.status.as_db_str(),
                job.attempts,
                job.created_at,
                job.updated_at,
            ],
        )
        .context("Failed to insert job")?;

        debug!("Submitted job {} for {}", job.id, job.input_ref);
        Ok(job)
    }

    fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM analysis_jobs WHERE id = ?1")?;

        let job = stmt.query_row([id], Self::row_to_job).optional()?;

        Ok(job)
    }

    fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>> {
        let conn = self.conn.lock().unwrap();

        let (sql, params): (String, Vec<Box<dyn rusqlite::ToSql>>) = match status {
            Some(s) => (
                r#"SELECT * FROM analysis_jobs
                   WHERE status = ?1
                   ORDER BY created_at DESC
                   LIMIT ?2 OFFSET ?3"#
                    .to_string(),
                vec![
                    Box::new(s.as_db_str().to_string()),
                    Box::new(limit as i64),
                    Box::new(offset as i64),
                ],
            ),
            None => (
                r#"SELECT * FROM analysis_jobs
                   ORDER BY created_at DESC
                   LIMIT ?1 OFFSET ?2"#
                    .to_string(),
                vec![Box::new(limit as i64), Box::new(offset as i64)],
            ),
        };

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let jobs = stmt
            .query_map(params_refs.as_slice(), Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(jobs)
    }

    fn claim_next(&self, worker_id: &str) -> Result<Option<Job>> {
        let now = Self::now();
        let conn = self.conn.lock().unwrap();

        // One conditional UPDATE: selection and transition are a single
        // atomic statement, so no two claimants can pick the same row.
        let mut stmt = conn.prepare(
            r#"UPDATE analysis_jobs
               SET status = 'PROCESSING', attempts = attempts + 1, updated_at = ?1
               WHERE id = (
                   SELECT id FROM analysis_jobs
                   WHERE status = 'QUEUED'
                   ORDER BY created_at ASC, id ASC
                   LIMIT 1
               )
               RETURNING *"#,
        )?;

        let job = stmt
            .query_row(rusqlite::params![now], Self::row_to_job)
            .optional()?;

        if let Some(ref job) = job {
            debug!(
                "Worker {} claimed job {} (attempt {})",
                worker_id, job.id, job.attempts
            );
        }

        Ok(job)
    }

    fn heartbeat(&self, id: &str) -> Result<bool> {
        let now = Self::now();
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE analysis_jobs SET updated_at = ?1 WHERE id = ?2 AND status = 'PROCESSING'",
            rusqlite::params![now, id],
        )?;
        Ok(updated > 0)
    }

    fn complete(&self, id: &str, report: &ScoreReport) -> Result<(), TransitionError> {
        let payload = serde_json::to_string(report)
            .map_err(|e| TransitionError::Storage(e.into()))?;
        let now = Self::now();
        let conn = self.conn.lock().unwrap();

        let updated = conn
            .execute(
                r#"UPDATE analysis_jobs
                   SET status = 'DONE', result = ?2, completed_at = ?3, updated_at = ?3
                   WHERE id = ?1 AND status = 'PROCESSING'"#,
                rusqlite::params![id, payload, now],
            )
            .map_err(|e| TransitionError::Storage(e.into()))?;

        if updated == 0 {
            return Err(Self::refused_transition(&conn, id));
        }
        Ok(())
    }

    fn fail(&self, id: &str, error: &JobError) -> Result<(), TransitionError> {
        let now = Self::now();
        let conn = self.conn.lock().unwrap();

        let updated = conn
            .execute(
                r#"UPDATE analysis_jobs
                   SET status = 'FAILED', error_kind = ?2, error_message = ?3,
                       completed_at = ?4, updated_at = ?4
                   WHERE id = ?1 AND status = 'PROCESSING'"#,
                rusqlite::params![id, error.kind.as_str(), error.message, now],
            )
            .map_err(|e| TransitionError::Storage(e.into()))?;

        if updated == 0 {
            return Err(Self::refused_transition(&conn, id));
        }
        Ok(())
    }

    fn reclaim_orphans(
        &self,
        stale_after: Duration,
        max_attempts: i32,
    ) -> Result<ReclaimReport> {
        let now = Self::now();
        let cutoff = now - stale_after.as_secs() as i64;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        // Retry budget exhausted: abandon
        let abandoned = tx.execute(
            r#"UPDATE analysis_jobs
               SET status = 'FAILED', error_kind = 'orphan_exhausted', error_message = ?1,
                   completed_at = ?2, updated_at = ?2
               WHERE status = 'PROCESSING' AND updated_at < ?3 AND attempts >= ?4"#,
            rusqlite::params![
                format!("no worker heartbeat after {} claim attempts", max_attempts),
                now,
                cutoff,
                max_attempts
            ],
        )?;

        // Budget remaining: back to the queue. The error slot is cleared so
        // a queued job never carries a stale failure payload.
        let requeued = tx.execute(
            r#"UPDATE analysis_jobs
               SET status = 'QUEUED', error_kind = NULL, error_message = NULL, updated_at = ?1
               WHERE status = 'PROCESSING' AND updated_at < ?2 AND attempts < ?3"#,
            rusqlite::params![now, cutoff, max_attempts],
        )?;

        tx.commit()?;

        Ok(ReclaimReport {
            requeued,
            abandoned,
        })
    }

    fn queue_stats(&self, stale_after: Duration) -> Result<QueueStats> {
        let cutoff = Self::now() - stale_after.as_secs() as i64;
        let conn = self.conn.lock().unwrap();

        let mut stats = QueueStats::default();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM analysis_jobs GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        for row in rows {
            let (status, count) = row?;
            match JobStatus::from_db_str(&status) {
                Some(JobStatus::Queued) => stats.queued = count,
                Some(JobStatus::Processing) => stats.processing = count,
                Some(JobStatus::Done) => stats.done = count,
                Some(JobStatus::Failed) => stats.failed = count,
                None => {}
            }
        }

        stats.stale_processing = conn.query_row(
            "SELECT COUNT(*) FROM analysis_jobs WHERE status = 'PROCESSING' AND updated_at < ?1",
            rusqlite::params![cutoff],
            |row| row.get::<_, i64>(0),
        )? as usize;

        Ok(stats)
    }
}

impl SqliteJobStore {
    /// Figure out why a guarded transition matched no row.
    fn refused_transition(conn: &Connection, id: &str) -> TransitionError {
        let status: Result<Option<String>, _> = conn
            .query_row(
                "SELECT status FROM analysis_jobs WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional();

        match status {
            Ok(Some(s)) => match JobStatus::from_db_str(&s) {
                Some(actual) => TransitionError::InvalidTransition {
                    id: id.to_string(),
                    actual,
                },
                None => TransitionError::Storage(anyhow::anyhow!(
                    "job {} has unrecognized status {}",
                    id,
                    s
                )),
            },
            Ok(None) => TransitionError::NotFound(id.to_string()),
            Err(e) => TransitionError::Storage(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{score, ProfileRegistry};
    use std::collections::HashSet;

    fn submit(store: &SqliteJobStore, input_ref: &str) -> Job {
        store
            .submit(SubmitRequest {
                input_ref: input_ref.to_string(),
                mode: AnalysisMode::Genre,
                genre: Some("house".to_string()),
            })
            .unwrap()
    }

    fn sample_report() -> ScoreReport {
        let registry = ProfileRegistry::builtin().unwrap();
        let profile = registry.resolve(Some("house"), AnalysisMode::Genre).unwrap();
        let features = crate::scoring::FeatureSet {
            lufs_integrated: -9.0,
            loudness_range: 7.0,
            true_peak_dbtp: -1.0,
            clipping_pct: 0.0,
            dynamic_range: 7.0,
            crest_factor: 12.0,
            stereo_width: 0.55,
            stereo_correlation: 0.6,
            balance_lr: 0.0,
            dc_offset: 0.0,
            spectral_centroid_hz: None,
            spectral_flatness: None,
            bands: Default::default(),
        };
        score(&features, profile, AnalysisMode::Genre).unwrap()
    }

    fn backdate_updated_at(store: &SqliteJobStore, id: &str, to: i64) {
        store
            .connection()
            .lock()
            .unwrap()
            .execute(
                "UPDATE analysis_jobs SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![to, id],
            )
            .unwrap();
    }

    #[test]
    fn test_submit_and_get_roundtrip() {
        let store = SqliteJobStore::in_memory().unwrap();

        let job = submit(&store, "uploads/clip.wav");
        let fetched = store.get_job(&job.id).unwrap().unwrap();

        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.input_ref, "uploads/clip.wav");
        assert_eq!(fetched.mode, AnalysisMode::Genre);
        assert_eq!(fetched.genre, Some("house".to_string()));
        assert_eq!(fetched.status, JobStatus::Queued);
        assert_eq!(fetched.attempts, 0);
        assert!(fetched.result.is_none());
        assert!(fetched.error.is_none());
    }

    #[test]
    fn test_submit_rejects_empty_input_ref() {
        let store = SqliteJobStore::in_memory().unwrap();

        let err = store
            .submit(SubmitRequest {
                input_ref: "   ".to_string(),
                mode: AnalysisMode::Quick,
                genre: None,
            })
            .unwrap_err();

        assert!(matches!(err, SubmitError::Validation(_)));
    }

    #[test]
    fn test_submit_rejects_genre_mode_without_genre() {
        let store = SqliteJobStore::in_memory().unwrap();

        let err = store
            .submit(SubmitRequest {
                input_ref: "uploads/clip.wav".to_string(),
                mode: AnalysisMode::Genre,
                genre: Some("  ".to_string()),
            })
            .unwrap_err();

        assert!(matches!(err, SubmitError::Validation(_)));
    }

    #[test]
    fn test_get_job_not_found() {
        let store = SqliteJobStore::in_memory().unwrap();
        assert!(store.get_job("nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_claim_empty_queue_returns_none() {
        let store = SqliteJobStore::in_memory().unwrap();
        assert!(store.claim_next("worker-1").unwrap().is_none());
    }

    #[test]
    fn test_claim_marks_processing_and_increments_attempts() {
        let store = SqliteJobStore::in_memory().unwrap();
        let submitted = submit(&store, "uploads/clip.wav");

        let claimed = store.claim_next("worker-1").unwrap().unwrap();
        assert_eq!(claimed.id, submitted.id);
        assert_eq!(claimed.status, JobStatus::Processing);
        assert_eq!(claimed.attempts, 1);

        // No second claim while the first is outstanding
        assert!(store.claim_next("worker-2").unwrap().is_none());
    }

    #[test]
    fn test_claim_is_fifo_by_created_at() {
        let store = SqliteJobStore::in_memory().unwrap();
        let a = submit(&store, "uploads/a.wav");
        let b = submit(&store, "uploads/b.wav");
        let c = submit(&store, "uploads/c.wav");

        // Force distinct submission times; same-second submissions tie
        let conn = store.connection();
        for (id, ts) in [(&b.id, 1000_i64), (&c.id, 2000), (&a.id, 3000)] {
            conn.lock()
                .unwrap()
                .execute(
                    "UPDATE analysis_jobs SET created_at = ?1 WHERE id = ?2",
                    rusqlite::params![ts, id],
                )
                .unwrap();
        }

        assert_eq!(store.claim_next("w").unwrap().unwrap().id, b.id);
        assert_eq!(store.claim_next("w").unwrap().unwrap().id, c.id);
        assert_eq!(store.claim_next("w").unwrap().unwrap().id, a.id);
    }

    #[test]
    fn test_concurrent_claims_never_double_claim() {
        let store = Arc::new(SqliteJobStore::in_memory().unwrap());
        const JOBS: usize = 60;
        const WORKERS: usize = 6;

        for i in 0..JOBS {
            store
                .submit(SubmitRequest {
                    input_ref: format!("uploads/{}.wav", i),
                    mode: AnalysisMode::Quick,
                    genre: None,
                })
                .unwrap();
        }

        let claimed = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = (0..WORKERS)
            .map(|w| {
                let store = Arc::clone(&store);
                let claimed = Arc::clone(&claimed);
                std::thread::spawn(move || {
                    let worker_id = format!("worker-{}", w);
                    while let Some(job) = store.claim_next(&worker_id).unwrap() {
                        claimed.lock().unwrap().push(job.id);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let claimed = claimed.lock().unwrap();
        assert_eq!(claimed.len(), JOBS);
        let unique: HashSet<_> = claimed.iter().collect();
        assert_eq!(unique.len(), JOBS, "a job was claimed twice");
    }

    #[test]
    fn test_complete_sets_result_and_done() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = submit(&store, "uploads/clip.wav");
        store.claim_next("worker-1").unwrap().unwrap();

        store.complete(&job.id, &sample_report()).unwrap();

        let done = store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Done);
        assert!(done.result.is_some());
        assert!(done.error.is_none());
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn test_fail_sets_error_and_failed() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = submit(&store, "uploads/clip.wav");
        store.claim_next("worker-1").unwrap().unwrap();

        store
            .fail(&job.id, &JobError::new(ErrorKind::Fetch, "object missing"))
            .unwrap();

        let failed = store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.result.is_none());
        let error = failed.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Fetch);
        assert_eq!(error.message, "object missing");
    }

    #[test]
    fn test_complete_refused_when_not_processing() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = submit(&store, "uploads/clip.wav");

        let err = store.complete(&job.id, &sample_report()).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidTransition {
                actual: JobStatus::Queued,
                ..
            }
        ));

        // Stored state untouched
        let unchanged = store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(unchanged.status, JobStatus::Queued);
        assert!(unchanged.result.is_none());
    }

    #[test]
    fn test_double_complete_refused() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = submit(&store, "uploads/clip.wav");
        store.claim_next("worker-1").unwrap().unwrap();
        store.complete(&job.id, &sample_report()).unwrap();

        let err = store.complete(&job.id, &sample_report()).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidTransition {
                actual: JobStatus::Done,
                ..
            }
        ));
    }

    #[test]
    fn test_fail_unknown_job_is_not_found() {
        let store = SqliteJobStore::in_memory().unwrap();

        let err = store
            .fail("nonexistent", &JobError::new(ErrorKind::Extract, "boom"))
            .unwrap_err();
        assert!(matches!(err, TransitionError::NotFound(_)));
    }

    #[test]
    fn test_heartbeat_refreshes_processing_job() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = submit(&store, "uploads/clip.wav");
        store.claim_next("worker-1").unwrap().unwrap();

        backdate_updated_at(&store, &job.id, 1000);
        assert!(store.heartbeat(&job.id).unwrap());

        let refreshed = store.get_job(&job.id).unwrap().unwrap();
        assert!(refreshed.updated_at > 1000);
    }

    #[test]
    fn test_heartbeat_false_when_not_processing() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = submit(&store, "uploads/clip.wav");

        assert!(!store.heartbeat(&job.id).unwrap());
        assert!(!store.heartbeat("nonexistent").unwrap());
    }

    #[test]
    fn test_reclaim_requeues_stale_job() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = submit(&store, "uploads/clip.wav");
        store.claim_next("worker-1").unwrap().unwrap();
        backdate_updated_at(&store, &job.id, 1000);

        let report = store
            .reclaim_orphans(Duration::from_secs(300), 3)
            .unwrap();
        assert_eq!(report.requeued, 1);
        assert_eq!(report.abandoned, 0);

        let requeued = store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(requeued.status, JobStatus::Queued);
        assert!(requeued.error.is_none());
        assert_eq!(requeued.attempts, 1);

        // And it is claimable again
        let reclaimed = store.claim_next("worker-2").unwrap().unwrap();
        assert_eq!(reclaimed.id, job.id);
        assert_eq!(reclaimed.attempts, 2);
    }

    #[test]
    fn test_reclaim_abandons_after_retry_budget() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = submit(&store, "uploads/clip.wav");

        // Burn through the budget: claim, go stale, reclaim
        for _ in 0..3 {
            store.claim_next("worker-1").unwrap().unwrap();
            backdate_updated_at(&store, &job.id, 1000);
            store
                .reclaim_orphans(Duration::from_secs(300), 3)
                .unwrap();
        }

        let abandoned = store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(abandoned.status, JobStatus::Failed);
        let error = abandoned.error.unwrap();
        assert_eq!(error.kind, ErrorKind::OrphanExhausted);
        assert_eq!(abandoned.attempts, 3);
    }

    #[test]
    fn test_reclaim_ignores_fresh_processing_jobs() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = submit(&store, "uploads/clip.wav");
        store.claim_next("worker-1").unwrap().unwrap();

        let report = store
            .reclaim_orphans(Duration::from_secs(300), 3)
            .unwrap();
        assert_eq!(report.total(), 0);

        let untouched = store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(untouched.status, JobStatus::Processing);
    }

    #[test]
    fn test_reclaim_clears_leftover_error_fields() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = submit(&store, "uploads/clip.wav");
        store.claim_next("worker-1").unwrap().unwrap();

        // Simulate debris from a defective writer
        store
            .connection()
            .lock()
            .unwrap()
            .execute(
                "UPDATE analysis_jobs SET error_kind = 'extract', error_message = 'leftover', updated_at = 1000 WHERE id = ?1",
                rusqlite::params![job.id],
            )
            .unwrap();

        store
            .reclaim_orphans(Duration::from_secs(300), 3)
            .unwrap();

        let requeued = store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(requeued.status, JobStatus::Queued);
        assert!(requeued.error.is_none());
    }

    #[test]
    fn test_complete_after_reclaim_is_refused() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = submit(&store, "uploads/clip.wav");
        store.claim_next("worker-1").unwrap().unwrap();
        backdate_updated_at(&store, &job.id, 1000);
        store
            .reclaim_orphans(Duration::from_secs(300), 3)
            .unwrap();

        // The original claimant wakes up late and tries to finish
        let err = store.complete(&job.id, &sample_report()).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidTransition {
                actual: JobStatus::Queued,
                ..
            }
        ));
    }

    #[test]
    fn test_list_jobs_with_status_filter() {
        let store = SqliteJobStore::in_memory().unwrap();
        submit(&store, "uploads/a.wav");
        let b = submit(&store, "uploads/b.wav");
        store.claim_next("worker-1").unwrap().unwrap();

        let all = store.list_jobs(None, 100, 0).unwrap();
        assert_eq!(all.len(), 2);

        let queued = store.list_jobs(Some(JobStatus::Queued), 100, 0).unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id, b.id);
    }

    #[test]
    fn test_queue_stats() {
        let store = SqliteJobStore::in_memory().unwrap();
        submit(&store, "uploads/a.wav");
        submit(&store, "uploads/b.wav");
        submit(&store, "uploads/c.wav");
        let claimed = store.claim_next("worker-1").unwrap().unwrap();
        backdate_updated_at(&store, &claimed.id, 1000);

        let stats = store.queue_stats(Duration::from_secs(300)).unwrap();
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.stale_processing, 1);
        assert_eq!(stats.done, 0);
        assert_eq!(stats.failed, 0);
    }
}
