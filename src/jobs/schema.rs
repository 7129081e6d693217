//! Database schema for the analysis job queue.

use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};
use crate::table_column;

/// The job table is the only persisted state the pipeline owns. Its column
/// set mirrors the `Job` model one to one.
const ANALYSIS_JOBS_TABLE_V1: Table = Table {
    name: "analysis_jobs",
    columns: &[
        table_column!("id", &SqlType::Text, is_primary_key = true),
        table_column!("input_ref", &SqlType::Text, non_null = true),
        table_column!("mode", &SqlType::Text, non_null = true),
        table_column!("genre", &SqlType::Text),
        table_column!("status", &SqlType::Text, non_null = true),
        table_column!("result", &SqlType::Text),
        table_column!("error_kind", &SqlType::Text),
        table_column!("error_message", &SqlType::Text),
        table_column!("attempts", &SqlType::Integer, non_null = true, default_value = Some("0")),
        table_column!("created_at", &SqlType::Integer, non_null = true),
        table_column!("updated_at", &SqlType::Integer, non_null = true),
        table_column!("completed_at", &SqlType::Integer),
    ],
    indices: &[
        // Claim order and sweeper scans both walk status-first
        ("idx_jobs_status_created", "status, created_at"),
        ("idx_jobs_status_updated", "status, updated_at"),
    ],
};

pub const ANALYSIS_JOBS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[ANALYSIS_JOBS_TABLE_V1],
    migration: None,
}];
