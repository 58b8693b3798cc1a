//! Batch run log.

use anyhow::Result;
use buildtrack_core::{BatchReport, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool};
use uuid::Uuid;

/// One committed batch and what it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRun {
    pub run_id: Uuid,
    pub project_id: ProjectId,
    /// Project input revision the batch read
    pub input_revision: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records_written: usize,
    pub records_removed: usize,
    pub report: BatchReport,
}

pub async fn insert_run_tx(tx: &mut sqlx::Transaction<'_, Sqlite>, run: &BatchRun) -> Result<()> {
    let report_json = serde_json::to_string(&run.report)?;

    sqlx::query(
        r#"
        INSERT INTO batch_runs (run_id, project_id, input_revision, started_at, finished_at, records_written, records_removed, report)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(run.run_id.to_string())
    .bind(run.project_id)
    .bind(run.input_revision)
    .bind(run.started_at.to_rfc3339())
    .bind(run.finished_at.to_rfc3339())
    .bind(run.records_written as i64)
    .bind(run.records_removed as i64)
    .bind(report_json)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Most recent runs of a project, newest first.
pub async fn recent_runs(pool: &SqlitePool, project_id: ProjectId, limit: u32) -> Result<Vec<BatchRun>> {
    let rows = sqlx::query_as::<_, BatchRunRow>(
        r#"
        SELECT run_id, project_id, input_revision, started_at, finished_at, records_written, records_removed, report
        FROM batch_runs WHERE project_id = ?1
        ORDER BY finished_at DESC, input_revision DESC
        LIMIT ?2
        "#,
    )
    .bind(project_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

// Internal row type for SQLx
#[derive(sqlx::FromRow)]
struct BatchRunRow {
    run_id: String,
    project_id: ProjectId,
    input_revision: i64,
    started_at: String,
    finished_at: String,
    records_written: i64,
    records_removed: i64,
    report: String,
}

impl TryFrom<BatchRunRow> for BatchRun {
    type Error = anyhow::Error;

    fn try_from(row: BatchRunRow) -> Result<Self> {
        Ok(BatchRun {
            run_id: Uuid::parse_str(&row.run_id)?,
            project_id: row.project_id,
            input_revision: row.input_revision,
            started_at: DateTime::parse_from_rfc3339(&row.started_at)?.with_timezone(&Utc),
            finished_at: DateTime::parse_from_rfc3339(&row.finished_at)?.with_timezone(&Utc),
            records_written: usize::try_from(row.records_written)?,
            records_removed: usize::try_from(row.records_removed)?,
            report: serde_json::from_str(&row.report)?,
        })
    }
}
