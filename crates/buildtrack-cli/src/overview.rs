//! Per-project status: input revision, telemetry counts and whether a batch is due.

use anyhow::Result;
use buildtrack_server::persistence::{projects, telemetry, Database};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectOverview {
    #[serde(flatten)]
    pub project: projects::Project,
    pub total_samples: i64,
    /// Samples carrying both a laser distance and a flight altitude.
    pub usable_samples: i64,
    pub pending: bool,
}

pub async fn project_overview(db: &Database) -> Result<Vec<ProjectOverview>> {
    let pending = projects::pending_projects(db.pool()).await?;
    let mut overview = Vec::new();
    for project in projects::list_projects(db.pool()).await? {
        let (total_samples, usable_samples) =
            telemetry::sample_counts(db.pool(), project.id).await?;
        overview.push(ProjectOverview {
            pending: pending.contains(&project.id),
            project,
            total_samples,
            usable_samples,
        });
    }
    Ok(overview)
}
