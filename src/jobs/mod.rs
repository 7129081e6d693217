//! Analysis job lifecycle: durable store, atomic claim protocol, worker
//! pool and orphan recovery.

mod models;
mod schema;
mod store;
mod sweeper;
mod worker;

pub use models::{
    AnalysisMode, ErrorKind, Job, JobError, JobStatus, QueueStats, ReclaimReport,
};
pub use store::{JobStore, SqliteJobStore, SubmitError, SubmitRequest, TransitionError};
pub use sweeper::OrphanSweeper;
pub use worker::WorkerPool;
