//! Project rows and the input revision that drives recomputation.
//!
//! Every write that can change a batch result (telemetry, boundaries,
//! rulers) bumps `projects.input_revision` in the same transaction. A batch
//! records the revision it read, so a project is pending exactly when its
//! revision is ahead of its last run.

use anyhow::Result;
use buildtrack_core::ProjectId;
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub input_revision: i64,
}

/// Create or rename a project.
pub async fn upsert_project_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    project_id: ProjectId,
    name: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO projects (id, name) VALUES (?1, ?2)
        ON CONFLICT(id) DO UPDATE SET name = ?2
        "#,
    )
    .bind(project_id)
    .bind(name)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn bump_input_revision_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    project_id: ProjectId,
) -> Result<()> {
    sqlx::query("UPDATE projects SET input_revision = input_revision + 1 WHERE id = ?1")
        .bind(project_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Current input revision, or `None` for an unknown project.
pub async fn input_revision_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    project_id: ProjectId,
) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT input_revision FROM projects WHERE id = ?1")
        .bind(project_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row.map(|(revision,)| revision))
}

pub async fn list_projects(pool: &SqlitePool) -> Result<Vec<Project>> {
    let projects = sqlx::query_as::<_, Project>(
        "SELECT id, name, input_revision FROM projects ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(projects)
}

/// Projects whose inputs changed since their last batch run (or that never ran).
pub async fn pending_projects(pool: &SqlitePool) -> Result<Vec<ProjectId>> {
    let rows: Vec<(ProjectId,)> = sqlx::query_as(
        r#"
        SELECT p.id FROM projects p
        WHERE p.input_revision > COALESCE(
            (SELECT MAX(r.input_revision) FROM batch_runs r WHERE r.project_id = p.id),
            -1
        )
        ORDER BY p.id
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
