//! Atomic per-project recomputation.
//!
//! A batch reads the project's inputs and committed records, recomputes every
//! building on the blocking pool, and writes records, stale-day deletions and
//! the run log in the same transaction it read from. Batches for one project
//! are serialized; different projects run independently.

use std::sync::Arc;

use anyhow::{Context, Result};
use buildtrack_core::{
    plan_project, process_building, BatchReport, ProgressRules, ProjectId, ProjectSnapshot,
};
use chrono::{FixedOffset, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use crate::persistence::runs::BatchRun;
use crate::persistence::{buildings, progress, projects, runs, telemetry, Database};

/// Recomputes projects against the database.
pub struct BatchRunner {
    db: Database,
    rules: Arc<ProgressRules>,
    day_offset: FixedOffset,
    /// One entry per project with a batch running or queued.
    locks: DashMap<ProjectId, Arc<Mutex<()>>>,
}

impl BatchRunner {
    pub fn new(db: Database, rules: ProgressRules, day_offset: FixedOffset) -> Self {
        Self {
            db,
            rules: Arc::new(rules),
            day_offset,
            locks: DashMap::new(),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn rules(&self) -> &ProgressRules {
        &self.rules
    }

    fn project_lock(&self, project_id: ProjectId) -> Arc<Mutex<()>> {
        self.locks
            .entry(project_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Recompute one project. Waits for any batch already running on it.
    pub async fn recompute_project(&self, project_id: ProjectId) -> Result<BatchRun> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("batch", project_id, %run_id);
        async move {
            let lock = self.project_lock(project_id);
            let result = {
                let _guard = lock.lock().await;
                self.run_locked(project_id, run_id).await
            };
            drop(lock);
            // Waiters hold their own clone, so only the last one out removes the entry
            self.locks.remove_if(&project_id, |_, lock| Arc::strong_count(lock) == 1);
            result
        }
        .instrument(span)
        .await
    }

    async fn run_locked(&self, project_id: ProjectId, run_id: Uuid) -> Result<BatchRun> {
        let started_at = Utc::now();
        let mut tx = self.db.pool().begin().await?;

        // Any early return drops `tx`, which rolls the whole batch back
        let input_revision = projects::input_revision_tx(&mut tx, project_id)
            .await?
            .with_context(|| format!("project {project_id} does not exist"))?;
        let fences = buildings::load_geofences_tx(&mut tx, project_id, self.rules.geofence_buffer_m)
            .await
            .context("loading geofences")?;
        let snapshot = ProjectSnapshot {
            project_id,
            geofences: fences.geofences,
            unreadable_fences: fences.unreadable,
            rulers: buildings::load_rulers_tx(&mut tx, project_id).await?,
            samples: telemetry::load_usable_samples_tx(&mut tx, project_id)
                .await
                .context("loading telemetry")?,
            existing_records: progress::load_records_tx(&mut tx, project_id)
                .await
                .context("loading committed records")?,
        };
        tracing::debug!(
            buildings = snapshot.geofences.len(),
            samples = snapshot.samples.len(),
            existing_records = snapshot.existing_records.len(),
            "snapshot loaded"
        );

        let mut plan = plan_project(snapshot, self.day_offset);
        let tasks = std::mem::take(&mut plan.work).into_iter().map(|work| {
            let rules = Arc::clone(&self.rules);
            let building_id = work.building_id;
            let span = tracing::debug_span!("building", building_id);
            tokio::task::spawn_blocking(move || span.in_scope(|| process_building(work, &rules)))
        });
        let mut outcomes = Vec::new();
        for joined in join_all(tasks).await {
            outcomes.push(joined.context("building task panicked")?);
        }
        let outcome = plan.finish(outcomes);

        for record in &outcome.records {
            progress::upsert_record_tx(&mut tx, record)
                .await
                .with_context(|| format!("writing building {} day {}", record.building_id, record.day))?;
        }
        let mut records_removed = 0;
        for (building_id, day) in &outcome.stale {
            if progress::delete_record_tx(&mut tx, *building_id, *day).await? {
                records_removed += 1;
            }
        }

        let run = BatchRun {
            run_id,
            project_id,
            input_revision,
            started_at,
            finished_at: Utc::now(),
            records_written: outcome.records.len(),
            records_removed,
            report: outcome.report,
        };
        runs::insert_run_tx(&mut tx, &run).await?;
        tx.commit().await?;

        log_report(&run.report, run.records_written, run.records_removed);
        Ok(run)
    }
}

fn log_report(report: &BatchReport, written: usize, removed: usize) {
    tracing::info!(
        buildings = report.buildings_processed,
        buildings_skipped = report.buildings_skipped.len(),
        samples = report.samples_total,
        unmatched = report.samples_unmatched,
        days_committed = report.days_committed,
        days_held = report.days_held,
        days_skipped = report.days_skipped.len(),
        regressions = report.regressions.len(),
        ambiguous_ground = report.ambiguous_ground_readings,
        written,
        removed,
        "batch committed"
    );
}
