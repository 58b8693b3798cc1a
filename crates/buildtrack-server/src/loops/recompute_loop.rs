//! Re-run batches for projects whose inputs changed.
//!
//! Writers bump a project's input revision; this loop picks up every project
//! whose revision is ahead of its last committed run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::time::interval;

use crate::backoff::PassBackoff;
use crate::batch::BatchRunner;
use crate::persistence::projects;

const RECOMPUTE_BACKOFF_MAX_SECS: u64 = 300;

pub async fn run_recompute_loop(
    runner: Arc<BatchRunner>,
    watch_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(watch_interval);
    let ceiling = Duration::from_secs(RECOMPUTE_BACKOFF_MAX_SECS);
    let mut backoff = PassBackoff::new(watch_interval, ceiling);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Recompute loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                if !backoff.should_run(Instant::now()) {
                    continue;
                }
                match recompute_pending(&runner).await {
                    Ok(_) => {
                        if let Some(failed_passes) = backoff.pass_succeeded() {
                            tracing::info!(failed_passes, "Recompute loop recovered");
                        }
                    }
                    Err(err) => {
                        let delay = backoff.pass_failed(Instant::now());
                        tracing::warn!(
                            failed_passes = backoff.failed_passes(),
                            "Recompute pass failed: {:#} (next pass in {:?})",
                            err,
                            delay
                        );
                    }
                }
            }
        }
    }
}

/// Run every pending project once. A failing project is logged and left
/// pending; only a failure to list projects fails the pass.
pub async fn recompute_pending(runner: &BatchRunner) -> Result<usize> {
    let pending = projects::pending_projects(runner.db().pool()).await?;
    let mut completed = 0;
    for project_id in pending {
        match runner.recompute_project(project_id).await {
            Ok(run) => {
                completed += 1;
                tracing::debug!(project_id, run_id = %run.run_id, "pending project recomputed");
            }
            Err(err) => {
                tracing::warn!(project_id, "Batch failed, will retry: {:#}", err);
            }
        }
    }
    Ok(completed)
}
