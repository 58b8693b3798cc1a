//! Operator tool: import fixtures, run batches, inspect records and rulers.
//!
//! Usage:
//!   buildtrack import site.json --recompute
//!   buildtrack recompute 1
//!   buildtrack projects
//!   buildtrack records 1 --building 10
//!   buildtrack ruler 10 --project 1 --heights 4.5,3.2,3.2

use std::path::PathBuf;

use anyhow::{bail, Result};
use buildtrack_cli::fixture::{import_fixture, load_fixture};
use buildtrack_cli::overview::project_overview;
use buildtrack_core::{BuildingId, FloorRuler, ProgressRules, ProjectId, RatchetDecision};
use buildtrack_server::batch::BatchRunner;
use buildtrack_server::config::{day_offset, load_rules};
use buildtrack_server::logging::init_tracing;
use buildtrack_server::loops::recompute_loop::recompute_pending;
use buildtrack_server::persistence::{buildings, init_database, progress, runs, Database};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Building progress from drone telemetry")]
struct Args {
    /// SQLite database path
    #[arg(long, env = "BUILDTRACK_DB_PATH", default_value = "data/buildtrack.db")]
    db: String,

    /// Site UTC offset in hours, used to group samples into days
    #[arg(long, env = "BUILDTRACK_DAY_OFFSET_HOURS", default_value_t = 0, allow_hyphen_values = true)]
    day_offset_hours: i32,

    /// JSON file overriding the default progress rules
    #[arg(long, env = "BUILDTRACK_RULES_PATH")]
    rules: Option<String>,

    /// Emit JSON log lines
    #[arg(long, env = "BUILDTRACK_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a project fixture (buildings, rulers, telemetry)
    Import {
        path: PathBuf,
        /// Recompute the project right after importing
        #[arg(long)]
        recompute: bool,
    },
    /// Recompute one project, or every project with changed inputs
    Recompute {
        project_id: Option<ProjectId>,
        #[arg(long, conflicts_with = "project_id")]
        pending: bool,
    },
    /// List projects with their sample counts and whether a batch is due
    Projects {
        #[arg(long)]
        json: bool,
    },
    /// Print committed daily records
    Records {
        project_id: ProjectId,
        #[arg(long)]
        building: Option<BuildingId>,
        #[arg(long)]
        json: bool,
    },
    /// Show a building's floor ruler, or replace it with per-storey heights
    Ruler {
        building_id: BuildingId,
        /// Owning project; required when setting heights
        #[arg(long)]
        project: Option<ProjectId>,
        #[arg(long, value_delimiter = ',')]
        heights: Vec<f64>,
    },
    /// Show recent batch runs of a project
    Runs {
        project_id: ProjectId,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing("buildtrack_cli=info", args.log_json)?;

    let rules = match &args.rules {
        Some(path) => load_rules(path)?,
        None => ProgressRules::default(),
    };
    let db = init_database(&args.db, 1).await?;

    match args.command {
        Command::Import { path, recompute } => {
            let fixture = load_fixture(&path)?;
            let summary = import_fixture(&db, &fixture).await?;
            println!(
                "Imported project {}: {} buildings, {} rulers, {} samples",
                summary.project_id, summary.buildings, summary.rulers, summary.samples
            );
            if recompute {
                let runner = BatchRunner::new(db, rules, day_offset(args.day_offset_hours)?);
                print_run(&runner, summary.project_id).await?;
            }
        }
        Command::Recompute { project_id, pending } => {
            let runner = BatchRunner::new(db, rules, day_offset(args.day_offset_hours)?);
            match (project_id, pending) {
                (Some(project_id), _) => print_run(&runner, project_id).await?,
                (None, true) => {
                    let done = recompute_pending(&runner).await?;
                    println!("Recomputed {} pending projects", done);
                }
                (None, false) => bail!("give a project id or --pending"),
            }
        }
        Command::Projects { json } => {
            let overview = project_overview(&db).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&overview)?);
            } else {
                for p in &overview {
                    println!(
                        "{:>6}  {:<24}  rev {:>4}  samples {:>6} ({} usable){}",
                        p.project.id,
                        p.project.name,
                        p.project.input_revision,
                        p.total_samples,
                        p.usable_samples,
                        if p.pending { "  pending" } else { "" },
                    );
                }
            }
        }
        Command::Records {
            project_id,
            building,
            json,
        } => {
            let records = progress::list_records(db.pool(), project_id, building).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                println!(
                    "{:>8}  {:<10}  {:>8}  {:>5}  {:<9}  {}",
                    "building", "day", "height", "floor", "ground", "ratchet"
                );
                for r in &records {
                    println!(
                        "{:>8}  {:<10}  {:>8.2}  {:>5}  {:<9}  {}{}",
                        r.building_id,
                        r.day,
                        r.height_m,
                        r.floor_level,
                        if r.is_ground_measured() { "measured" } else { "projected" },
                        ratchet_label(&r.ratchet),
                        if r.needs_review() { "  (review)" } else { "" },
                    );
                }
            }
        }
        Command::Ruler {
            building_id,
            project,
            heights,
        } => {
            if !heights.is_empty() {
                let Some(project_id) = project else {
                    bail!("--project is required with --heights");
                };
                set_ruler(&db, project_id, building_id, &heights).await?;
            }
            let levels = buildings::floor_levels(db.pool(), building_id).await?;
            if levels.is_empty() {
                println!(
                    "Building {} has no ruler; floors use {} m storeys",
                    building_id, rules.default_floor_height_m
                );
            }
            for level in levels {
                println!("floor {:>3}  top {:>7.2} m", level.floor_number, level.cumulative_height_m);
            }
        }
        Command::Runs { project_id, limit } => {
            for run in runs::recent_runs(db.pool(), project_id, limit).await? {
                println!(
                    "{}  rev {:>4}  {}  written {:>4}  removed {:>3}  held {:>3}  regressions {}",
                    run.run_id,
                    run.input_revision,
                    run.finished_at.format("%Y-%m-%d %H:%M:%S"),
                    run.records_written,
                    run.records_removed,
                    run.report.days_held,
                    run.report.regressions.len(),
                );
            }
        }
    }

    Ok(())
}

async fn print_run(runner: &BatchRunner, project_id: ProjectId) -> Result<()> {
    let run = runner.recompute_project(project_id).await?;
    println!("{}", serde_json::to_string_pretty(&run)?);
    Ok(())
}

async fn set_ruler(
    db: &Database,
    project_id: ProjectId,
    building_id: BuildingId,
    heights: &[f64],
) -> Result<()> {
    let ruler = FloorRuler::from_floor_heights(building_id, heights)?;
    let mut tx = db.pool().begin().await?;
    buildings::replace_floor_ruler_tx(&mut tx, project_id, &ruler).await?;
    tx.commit().await?;
    Ok(())
}

fn ratchet_label(decision: &RatchetDecision) -> String {
    match decision {
        RatchetDecision::Advanced => "advanced".to_string(),
        RatchetDecision::Held { raw_height_m, .. } => format!("held (raw {:.2})", raw_height_m),
        RatchetDecision::FlaggedRegression { drop_m, .. } => format!("regression -{:.2}", drop_m),
    }
}
