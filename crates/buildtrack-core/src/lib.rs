pub mod cleaning;
pub mod floors;
pub mod geofence;
pub mod height;
pub mod history;
pub mod models;
pub mod pipeline;
pub mod ratchet;
pub mod rules;
pub mod spatial;

pub use cleaning::{clean, CleanedReadings};
pub use floors::{floor_of, FloorLevel, FloorRuler, RulerError};
pub use geofence::GeofenceError;
pub use height::{EstimateError, HeightEstimate, HeightInputs};
pub use history::{BuildingHistory, Peak, ProgressHistory};
pub use models::{
    BuildingGeofence, BuildingId, DailyProgressRecord, GeoPoint, GroundBasis, GroundSource,
    ProjectId, RatchetDecision, TelemetrySample,
};
pub use pipeline::{
    plan_project, process_building, run_project, BatchOutcome, BatchReport, BuildingOutcome,
    BuildingWork, ProjectPlan, ProjectSnapshot, RegressionFlag, SkipReason, SkippedBuilding,
    SkippedDay,
};
pub use ratchet::ProvisionalDay;
pub use rules::ProgressRules;
