//! Data models for analysis jobs.
//!
//! A job is the unit of work: one uploaded audio file, analyzed once,
//! scored once, with a durable lifecycle record.

use serde::{Deserialize, Serialize};

use crate::scoring::ScoreReport;

/// Lifecycle status of an analysis job.
///
/// Transitions only move forward along QUEUED → PROCESSING → {DONE, FAILED},
/// except that the orphan sweeper may move PROCESSING back to QUEUED (retry)
/// or to FAILED (retry budget exhausted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,   // terminal
    Failed, // terminal
}

impl JobStatus {
    /// Returns true if this is a terminal state (Done or Failed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(JobStatus::Queued),
            "PROCESSING" => Some(JobStatus::Processing),
            "DONE" => Some(JobStatus::Done),
            "FAILED" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// Which scoring configuration a submission selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Score against a genre-specific profile. Requires a known genre.
    Genre,
    /// Score against the neutral reference targets.
    Reference,
    /// Fast pass over the core categories only.
    Quick,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Genre => "genre",
            AnalysisMode::Reference => "reference",
            AnalysisMode::Quick => "quick",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "genre" => Some(AnalysisMode::Genre),
            "reference" => Some(AnalysisMode::Reference),
            "quick" => Some(AnalysisMode::Quick),
            _ => None,
        }
    }
}

/// Which phase of the pipeline a job failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Storage reference did not resolve to audio bytes.
    Fetch,
    /// Bytes were not decodable audio (or failed basic size validation).
    Decode,
    /// Feature extraction failed on decoded audio.
    Extract,
    /// Scoring failed (unknown genre profile, configuration defect).
    Score,
    /// Abandoned by the sweeper after the retry budget ran out.
    OrphanExhausted,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Fetch => "fetch",
            ErrorKind::Decode => "decode",
            ErrorKind::Extract => "extract",
            ErrorKind::Score => "score",
            ErrorKind::OrphanExhausted => "orphan_exhausted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "fetch" => Some(ErrorKind::Fetch),
            "decode" => Some(ErrorKind::Decode),
            "extract" => Some(ErrorKind::Extract),
            "score" => Some(ErrorKind::Score),
            "orphan_exhausted" => Some(ErrorKind::OrphanExhausted),
            _ => None,
        }
    }
}

/// Structured failure payload stored on a FAILED job. This is what the
/// result boundary exposes; raw internal exception text never leaves the
/// worker loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// One analysis job row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier (UUID), assigned at submission.
    pub id: String,
    /// Opaque storage key of the audio payload.
    pub input_ref: String,
    /// Scoring configuration selector.
    pub mode: AnalysisMode,
    /// Genre for genre-specific thresholds, when the mode uses one.
    pub genre: Option<String>,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Score report, present exactly when status is DONE.
    pub result: Option<ScoreReport>,
    /// Failure payload, present exactly when status is FAILED.
    pub error: Option<JobError>,
    /// Number of claim attempts, bounded by the sweeper's retry budget.
    pub attempts: i32,
    /// When the job was submitted (Unix timestamp).
    pub created_at: i64,
    /// Heartbeat timestamp the sweeper uses to detect orphans.
    pub updated_at: i64,
    /// When the job reached a terminal state.
    pub completed_at: Option<i64>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(id: String, input_ref: String, mode: AnalysisMode, genre: Option<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id,
            input_ref,
            mode,
            genre,
            status: JobStatus::Queued,
            result: None,
            error: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Outcome of one orphan reclaim pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReclaimReport {
    /// Stale jobs returned to the queue for another attempt.
    pub requeued: usize,
    /// Stale jobs abandoned after exhausting the retry budget.
    pub abandoned: usize,
}

impl ReclaimReport {
    pub fn total(&self) -> usize {
        self.requeued + self.abandoned
    }
}

/// Per-status queue counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub processing: usize,
    pub done: usize,
    pub failed: usize,
    /// PROCESSING jobs whose heartbeat is already stale.
    pub stale_processing: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_is_terminal() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_job_status_db_conversion() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Done,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_db_str(status.as_db_str()), Some(status));
        }
        assert_eq!(JobStatus::from_db_str("RUNNING"), None);
    }

    #[test]
    fn test_job_status_serialization() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");

        let parsed: JobStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, JobStatus::Processing);
    }

    #[test]
    fn test_analysis_mode_conversion() {
        assert_eq!(AnalysisMode::from_str("genre"), Some(AnalysisMode::Genre));
        assert_eq!(
            AnalysisMode::from_str("reference"),
            Some(AnalysisMode::Reference)
        );
        assert_eq!(AnalysisMode::from_str("quick"), Some(AnalysisMode::Quick));
        assert_eq!(AnalysisMode::from_str("comparison"), None);
        assert_eq!(AnalysisMode::Genre.as_str(), "genre");
    }

    #[test]
    fn test_error_kind_conversion() {
        for kind in [
            ErrorKind::Fetch,
            ErrorKind::Decode,
            ErrorKind::Extract,
            ErrorKind::Score,
            ErrorKind::OrphanExhausted,
        ] {
            assert_eq!(ErrorKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ErrorKind::from_str("timeout"), None);
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::OrphanExhausted).unwrap();
        assert_eq!(json, "\"orphan_exhausted\"");
    }

    #[test]
    fn test_new_job_is_queued_with_zero_attempts() {
        let job = Job::new(
            "job-1".to_string(),
            "uploads/clip.wav".to_string(),
            AnalysisMode::Genre,
            Some("house".to_string()),
        );

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 0);
        assert!(job.result.is_none());
        assert!(job.error.is_none());
        assert!(job.completed_at.is_none());
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn test_reclaim_report_total() {
        let report = ReclaimReport {
            requeued: 3,
            abandoned: 2,
        };
        assert_eq!(report.total(), 5);
    }
}
