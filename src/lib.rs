//! Mixgauge Analysis Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod extract;
pub mod jobs;
pub mod scoring;
pub mod server;
pub mod sqlite_persistence;
pub mod storage;

// Re-export commonly used types for convenience
pub use jobs::{JobStore, OrphanSweeper, SqliteJobStore, WorkerPool};
pub use server::{make_app, run_server, ServerConfig};
