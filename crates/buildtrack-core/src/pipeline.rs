//! Per-project batch: match, group, clean, estimate, map, ratchet.
//!
//! The batch is split in two so hosts can fan buildings out: `plan_project`
//! validates fences and buckets samples into per-building work, each
//! `BuildingWork` is processed independently with `process_building`, and
//! `ProjectPlan::finish` folds the outcomes into records and a report.
//! `run_project` does all three sequentially.

use std::collections::{BTreeMap, HashMap};

use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::cleaning;
use crate::floors::{floor_of, FloorRuler};
use crate::geofence;
use crate::height::{self, EstimateError, HeightInputs};
use crate::history::{BuildingHistory, ProgressHistory};
use crate::models::{
    BuildingGeofence, BuildingId, DailyProgressRecord, GroundSource, ProjectId, RatchetDecision,
    TelemetrySample,
};
use crate::ratchet::{self, ProvisionalDay};
use crate::rules::ProgressRules;

/// Everything a batch reads for one project.
#[derive(Debug, Clone, Default)]
pub struct ProjectSnapshot {
    pub project_id: ProjectId,
    pub geofences: Vec<BuildingGeofence>,
    /// Boundaries that could not even be decoded, by building
    pub unreadable_fences: Vec<(BuildingId, String)>,
    pub rulers: HashMap<BuildingId, FloorRuler>,
    pub samples: Vec<TelemetrySample>,
    /// Records committed by earlier runs
    pub existing_records: Vec<DailyProgressRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoUsableReadings,
    NoRoofDistance,
    NoGroundDistance,
}

impl From<EstimateError> for SkipReason {
    fn from(err: EstimateError) -> Self {
        match err {
            EstimateError::NoRoofDistance => SkipReason::NoRoofDistance,
            EstimateError::NoGroundDistance => SkipReason::NoGroundDistance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedDay {
    pub building_id: BuildingId,
    pub day: NaiveDate,
    pub reason: SkipReason,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedBuilding {
    pub building_id: BuildingId,
    pub reason: String,
}

/// Large regression surfaced for operator review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionFlag {
    pub building_id: BuildingId,
    pub day: NaiveDate,
    pub height_m: f64,
    pub peak_height_m: f64,
    pub drop_m: f64,
}

/// Counts and diagnostics for one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub project_id: ProjectId,
    pub buildings_processed: usize,
    pub buildings_skipped: Vec<SkippedBuilding>,
    pub samples_total: usize,
    pub samples_unmatched: usize,
    pub days_committed: usize,
    pub days_held: usize,
    pub days_skipped: Vec<SkippedDay>,
    pub regressions: Vec<RegressionFlag>,
    pub ambiguous_ground_readings: usize,
}

/// One building's share of a batch.
#[derive(Debug, Clone)]
pub struct BuildingWork {
    pub project_id: ProjectId,
    pub building_id: BuildingId,
    pub ruler: Option<FloorRuler>,
    pub days: BTreeMap<NaiveDate, Vec<TelemetrySample>>,
    pub history: BuildingHistory,
}

#[derive(Debug, Clone)]
pub struct BuildingOutcome {
    pub building_id: BuildingId,
    /// Records for every day recomputed in this batch, ascending
    pub records: Vec<DailyProgressRecord>,
    /// Days that held a record before but produced none now, ascending within each cause
    pub stale_days: Vec<NaiveDate>,
    pub skipped: Vec<SkippedDay>,
    pub ambiguous_ground_readings: usize,
}

#[derive(Debug, Clone)]
pub struct ProjectPlan {
    pub work: Vec<BuildingWork>,
    report: BatchReport,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub records: Vec<DailyProgressRecord>,
    pub stale: Vec<(BuildingId, NaiveDate)>,
    pub report: BatchReport,
}

/// Validate fences and bucket samples into per-building, per-day work.
///
/// Days are calendar days at the site, given as a fixed UTC offset.
pub fn plan_project(snapshot: ProjectSnapshot, day_offset: FixedOffset) -> ProjectPlan {
    let ProjectSnapshot {
        project_id,
        geofences,
        unreadable_fences,
        mut rulers,
        samples,
        existing_records,
    } = snapshot;

    let mut report = BatchReport {
        project_id,
        samples_total: samples.len(),
        ..BatchReport::default()
    };

    for (building_id, reason) in unreadable_fences {
        tracing::warn!(project_id, building_id, %reason, "skipping building with unreadable geofence");
        report.buildings_skipped.push(SkippedBuilding { building_id, reason });
    }

    let mut fences: Vec<BuildingGeofence> = Vec::with_capacity(geofences.len());
    for fence in geofences {
        match geofence::validate(&fence) {
            Ok(()) => fences.push(fence),
            Err(err) => {
                tracing::warn!(project_id, building_id = fence.building_id, "skipping building: {}", err);
                report.buildings_skipped.push(SkippedBuilding {
                    building_id: fence.building_id,
                    reason: err.to_string(),
                });
            }
        }
    }

    let mut days: HashMap<BuildingId, BTreeMap<NaiveDate, Vec<TelemetrySample>>> = HashMap::new();
    for sample in samples {
        let winners = geofence::assign(sample.matching_point(), &fences);
        if winners.is_empty() {
            report.samples_unmatched += 1;
            continue;
        }
        let day = sample.captured_at.with_timezone(&day_offset).date_naive();
        for fence in winners {
            days.entry(fence.building_id)
                .or_default()
                .entry(day)
                .or_default()
                .push(sample.clone());
        }
    }

    let work = fences
        .iter()
        .map(|fence| BuildingWork {
            project_id,
            building_id: fence.building_id,
            ruler: rulers.remove(&fence.building_id),
            days: days.remove(&fence.building_id).unwrap_or_default(),
            history: BuildingHistory::from_records(fence.building_id, &existing_records),
        })
        .collect();

    ProjectPlan { work, report }
}

/// Process one building's days in ascending order against its own history.
///
/// Stored days with no samples in `work` are dropped before anything is recomputed.
pub fn process_building(work: BuildingWork, rules: &ProgressRules) -> BuildingOutcome {
    let BuildingWork {
        project_id,
        building_id,
        ruler,
        days,
        mut history,
    } = work;

    let mut outcome = BuildingOutcome {
        building_id,
        records: Vec::with_capacity(days.len()),
        stale_days: Vec::new(),
        skipped: Vec::new(),
        ambiguous_ground_readings: 0,
    };

    tracing::debug!(
        building_id,
        days = days.len(),
        stored = history.len(),
        "processing building"
    );

    // Every sample of the project is in the batch, so a stored day without any has lost its support
    let unsupported: Vec<NaiveDate> = history
        .records()
        .map(|record| record.day)
        .filter(|day| !days.contains_key(day))
        .collect();
    for day in unsupported {
        tracing::info!(building_id, %day, "dropping day with no matched samples");
        history.remove(day);
        outcome.stale_days.push(day);
    }

    for (day, samples) in days {
        match resolve_day(project_id, building_id, day, &samples, ruler.as_ref(), &history, rules) {
            Ok(provisional) => {
                if let GroundSource::Projected {
                    rejected_measurement_m: Some(_),
                    ..
                } = provisional.estimate.ground
                {
                    outcome.ambiguous_ground_readings += 1;
                }
                let peak = history.peak_before(day);
                let record = ratchet::commit(provisional, peak.as_ref(), rules);
                tracing::debug!(
                    building_id,
                    %day,
                    height_m = record.height_m,
                    floor_level = record.floor_level,
                    measured_ground = record.is_ground_measured(),
                    "day committed"
                );
                history.commit(record.clone());
                outcome.records.push(record);
            }
            Err(reason) => {
                tracing::info!(building_id, %day, ?reason, samples = samples.len(), "day skipped");
                if history.remove(day).is_some() {
                    outcome.stale_days.push(day);
                }
                outcome.skipped.push(SkippedDay {
                    building_id,
                    day,
                    reason,
                    sample_count: samples.len(),
                });
            }
        }
    }

    outcome
}

fn resolve_day(
    project_id: ProjectId,
    building_id: BuildingId,
    day: NaiveDate,
    samples: &[TelemetrySample],
    ruler: Option<&FloorRuler>,
    history: &BuildingHistory,
    rules: &ProgressRules,
) -> Result<ProvisionalDay, SkipReason> {
    let cleaned = cleaning::clean(samples, rules).ok_or(SkipReason::NoUsableReadings)?;
    let inputs = HeightInputs {
        roof_distance_m: cleaned.roof_distance_m,
        measured_ground_m: cleaned.ground_distance_m,
        flight_altitude_m: cleaned.flight_altitude_m,
        basis: history.latest_basis_before(day),
    };
    let estimate = height::estimate(&inputs, rules)?;
    let floor_level = floor_of(
        estimate.height_m,
        ruler,
        rules.default_floor_height_m,
        rules.ruler_tolerance_m,
    );

    Ok(ProvisionalDay {
        project_id,
        building_id,
        day,
        estimate,
        flight_altitude_m: cleaned.flight_altitude_m,
        floor_level,
        sample_count: cleaned.sample_count,
    })
}

impl ProjectPlan {
    /// Fold building outcomes into the batch result.
    pub fn finish(self, outcomes: Vec<BuildingOutcome>) -> BatchOutcome {
        let mut report = self.report;
        let mut records = Vec::new();
        let mut stale = Vec::new();

        for outcome in outcomes {
            report.buildings_processed += 1;
            report.ambiguous_ground_readings += outcome.ambiguous_ground_readings;
            report.days_skipped.extend(outcome.skipped);
            stale.extend(outcome.stale_days.into_iter().map(|day| (outcome.building_id, day)));

            for record in outcome.records {
                report.days_committed += 1;
                match record.ratchet {
                    RatchetDecision::Advanced => {}
                    RatchetDecision::Held { .. } => report.days_held += 1,
                    RatchetDecision::FlaggedRegression { peak_height_m, drop_m } => {
                        report.regressions.push(RegressionFlag {
                            building_id: record.building_id,
                            day: record.day,
                            height_m: record.height_m,
                            peak_height_m,
                            drop_m,
                        });
                    }
                }
                records.push(record);
            }
        }

        BatchOutcome {
            records,
            stale,
            report,
        }
    }
}

/// Run a whole project batch on the current thread.
pub fn run_project(
    snapshot: ProjectSnapshot,
    rules: &ProgressRules,
    day_offset: FixedOffset,
) -> BatchOutcome {
    let mut plan = plan_project(snapshot, day_offset);
    let work = std::mem::take(&mut plan.work);
    let outcomes = work
        .into_iter()
        .map(|w| process_building(w, rules))
        .collect();
    plan.finish(outcomes)
}
