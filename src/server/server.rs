//! Analysis HTTP routes.
//!
//! Provides endpoints for:
//! - Submitting an uploaded file for analysis
//! - Polling a job's terminal state (score report or structured error)
//! - Listing jobs and registered genres
//! - Queue statistics

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::jobs::{AnalysisMode, Job, JobError, JobStatus, JobStore as _, SubmitError, SubmitRequest};
use crate::scoring::ProfileRegistry;

use super::metrics;
use super::state::{GuardedJobStore, ServerState};
use super::ServerConfig;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub input_ref: String,
    /// One of "genre", "reference", "quick".
    pub mode: String,
    #[serde(default)]
    pub genre: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Optional status filter ("QUEUED", "PROCESSING", "DONE", "FAILED").
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub jobs: Vec<JobView>,
}

/// Job state as exposed at the result boundary. The error payload is the
/// structured kind/message captured at failure time, never raw exception
/// text.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: String,
    pub status: JobStatus,
    pub mode: AnalysisMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    pub attempts: i32,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<crate::scoring::ScoreReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl JobView {
    fn from_job(job: Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            mode: job.mode,
            genre: job.genre,
            attempts: job.attempts,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
            result: job.result,
            error: job.error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenresResponse {
    pub genres: Vec<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET / - liveness probe
async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// POST /v1/analysis - submit a job
async fn submit_analysis(
    State(store): State<GuardedJobStore>,
    Json(body): Json<SubmitBody>,
) -> impl IntoResponse {
    let Some(mode) = AnalysisMode::from_str(&body.mode) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!(
                    "unrecognized mode '{}', expected one of: genre, reference, quick",
                    body.mode
                ),
            }),
        )
            .into_response();
    };

    match store.submit(SubmitRequest {
        input_ref: body.input_ref,
        mode,
        genre: body.genre,
    }) {
        Ok(job) => {
            metrics::record_job_submitted();
            info!("Accepted analysis job {} ({})", job.id, job.input_ref);
            Json(SubmitResponse {
                job_id: job.id,
                status: job.status,
            })
            .into_response()
        }
        Err(SubmitError::Validation(message)) => {
            warn!("Rejected submission: {}", message);
            (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message })).into_response()
        }
        Err(SubmitError::Storage(e)) => {
            error!("Failed to persist submission: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "failed to persist submission".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /v1/analysis/{id} - job status and, once terminal, result or error
async fn get_analysis(
    State(store): State<GuardedJobStore>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match store.get_job(&id) {
        Ok(Some(job)) => Json(JobView::from_job(job)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no job with id {}", id),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to load job {}: {:#}", id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "failed to load job".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /v1/analysis - list jobs, newest first, optionally filtered by status
async fn list_analyses(
    State(store): State<GuardedJobStore>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let status = match query.status.as_deref() {
        Some(s) => match JobStatus::from_db_str(s) {
            Some(status) => Some(status),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: format!(
                            "unrecognized status '{}', expected one of: QUEUED, PROCESSING, DONE, FAILED",
                            s
                        ),
                    }),
                )
                    .into_response()
            }
        },
        None => None,
    };

    match store.list_jobs(status, query.limit, query.offset) {
        Ok(jobs) => Json(ListResponse {
            jobs: jobs.into_iter().map(JobView::from_job).collect(),
        })
        .into_response(),
        Err(e) => {
            error!("Failed to list jobs: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "failed to list jobs".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /v1/genres - genre identifiers accepted in genre mode
async fn list_genres(State(state): State<ServerState>) -> impl IntoResponse {
    Json(GenresResponse {
        genres: state
            .profiles
            .genre_ids()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}

/// GET /v1/queue/stats - per-status counts
async fn queue_stats(State(state): State<ServerState>) -> impl IntoResponse {
    match state.job_store.queue_stats(state.config.stale_after) {
        Ok(stats) => {
            metrics::set_queue_depth(&stats);
            Json(stats).into_response()
        }
        Err(e) => {
            error!("Failed to compute queue stats: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "failed to compute queue stats".to_string(),
                }),
            )
                .into_response()
        }
    }
}

// =============================================================================
// App assembly
// =============================================================================

pub fn make_app(state: ServerState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/v1/analysis", post(submit_analysis).get(list_analyses))
        .route("/v1/analysis/{id}", get(get_analysis))
        .route("/v1/genres", get(list_genres))
        .route("/v1/queue/stats", get(queue_stats))
        .with_state(state)
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics::metrics_handler))
}

/// Serve the API and the metrics listener until `shutdown` fires.
pub async fn run_server(
    config: ServerConfig,
    job_store: GuardedJobStore,
    profiles: Arc<ProfileRegistry>,
    shutdown: CancellationToken,
) -> Result<()> {
    let state = ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        job_store,
        profiles,
    };

    let app = make_app(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;

    let metrics_listener = tokio::net::TcpListener::bind(("0.0.0.0", config.metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", config.metrics_port))?;

    info!("Serving API on port {}", config.port);
    info!("Serving metrics on port {}", config.metrics_port);

    let api_shutdown = shutdown.clone();
    let api = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { api_shutdown.cancelled().await })
            .await
    };

    let metrics_shutdown = shutdown.clone();
    let metrics_server = async move {
        axum::serve(metrics_listener, make_metrics_app())
            .with_graceful_shutdown(async move { metrics_shutdown.cancelled().await })
            .await
    };

    tokio::try_join!(api, metrics_server).context("Server error")?;

    Ok(())
}
