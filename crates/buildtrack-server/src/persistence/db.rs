//! SQLite pool for projects, telemetry and committed progress, plus the schema bootstrap.

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

const SCHEMA: &str = include_str!("../../migrations/001_init.sql");

/// Shared handle to the progress database.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Open (or create) the progress database at `db_path` and apply the schema.
///
/// `":memory:"` gives a private database; tests use it with one connection so
/// every query sees the same tables.
pub async fn init_database(db_path: &str, max_connections: u32) -> Result<Database> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    info!(db_path, max_connections, "Opening progress database");
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    apply_schema(&pool).await?;
    Ok(Database { pool })
}

async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    let statements = schema_statements(SCHEMA);
    for statement in &statements {
        if let Err(e) = sqlx::query(statement).execute(pool).await {
            if e.to_string().contains("already exists") {
                continue;
            }
            // Tables and indexes are required; anything else is best effort
            if statement.to_uppercase().starts_with("CREATE") {
                anyhow::bail!("Schema statement failed: {}", e);
            }
            warn!("Schema statement failed: {}", e);
        }
    }
    info!(statements = statements.len(), "Progress schema ready");
    Ok(())
}

/// Split a schema script on `;`, dropping `--` comment lines and empty statements.
fn schema_statements(script: &str) -> Vec<String> {
    script
        .split(';')
        .map(|chunk| {
            chunk
                .lines()
                .filter(|line| !line.trim().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .filter(|statement| !statement.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_creates_every_progress_table() {
        let db = init_database(":memory:", 1).await.unwrap();

        let (tables,): (i32,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
            ('projects', 'buildings', 'floor_levels', 'telemetry_samples', 'daily_progress', 'batch_runs')
            "#,
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(tables, 6);
    }

    #[tokio::test]
    async fn schema_can_be_applied_twice() {
        let db = init_database(":memory:", 1).await.unwrap();
        apply_schema(db.pool()).await.unwrap();
    }

    #[test]
    fn comments_do_not_swallow_statements() {
        let script = "-- header\nCREATE TABLE a (\n  -- inline note\n  id INTEGER\n);\n-- trailer\n;";
        assert_eq!(schema_statements(script), vec!["CREATE TABLE a (\n  id INTEGER\n)"]);
    }
}
