//! Progress server: keeps committed daily records in step with incoming telemetry.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;

use buildtrack_server::batch::BatchRunner;
use buildtrack_server::config::Config;
use buildtrack_server::logging::init_tracing;
use buildtrack_server::loops::recompute_loop::run_recompute_loop;
use buildtrack_server::persistence::init_database;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing("buildtrack_server=debug", config.log_json)?;

    tracing::info!("Starting buildtrack server...");

    let db = init_database(&config.db_path, config.db_max_connections).await?;
    let runner = Arc::new(BatchRunner::new(db, config.rules.clone(), config.day_offset()?));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let watcher = tokio::spawn(run_recompute_loop(
        runner,
        Duration::from_secs(config.watch_interval_secs.max(1)),
        shutdown_rx,
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    let _ = shutdown_tx.send(());
    watcher.await?;

    Ok(())
}
