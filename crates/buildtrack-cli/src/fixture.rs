//! JSON project fixtures: a project, its buildings and rulers, and raw telemetry.
//!
//! ```json
//! {
//!   "project": { "id": 1, "name": "Harbour Towers" },
//!   "buildings": [
//!     { "building_id": 10, "name": "Tower A",
//!       "boundary": [{ "lat": -33.8651, "lng": 151.2099 }, ...],
//!       "floor_heights_m": [4.5, 3.2, 3.2] }
//!   ],
//!   "samples": [
//!     { "sample_id": 1, "captured_at": "2025-03-01T01:00:00Z",
//!       "drone_position": { "lat": -33.8655, "lng": 151.2094 },
//!       "laser_distance_m": 88.0, "flight_altitude_m": 120.0 }
//!   ]
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use buildtrack_core::{BuildingId, FloorLevel, FloorRuler, GeoPoint, ProjectId};
use buildtrack_server::persistence::buildings::{self, BuildingRecord};
use buildtrack_server::persistence::telemetry::{self, RawSample};
use buildtrack_server::persistence::{projects, Database};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFixture {
    pub project: FixtureProject,
    #[serde(default)]
    pub buildings: Vec<FixtureBuilding>,
    #[serde(default)]
    pub samples: Vec<RawSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureProject {
    pub id: ProjectId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureBuilding {
    pub building_id: BuildingId,
    pub name: String,
    #[serde(default)]
    pub boundary: Option<Vec<GeoPoint>>,
    #[serde(default)]
    pub buffer_m: Option<f64>,
    /// Explicit ruler; wins over `floor_heights_m`
    #[serde(default)]
    pub ruler: Vec<FloorLevel>,
    /// Per-storey heights from the ground up
    #[serde(default)]
    pub floor_heights_m: Vec<f64>,
}

impl FixtureBuilding {
    pub fn floor_ruler(&self) -> Result<Option<FloorRuler>> {
        let ruler = if !self.ruler.is_empty() {
            FloorRuler::new(self.building_id, self.ruler.clone())
        } else if !self.floor_heights_m.is_empty() {
            FloorRuler::from_floor_heights(self.building_id, &self.floor_heights_m)
        } else {
            return Ok(None);
        };
        ruler
            .map(Some)
            .with_context(|| format!("building {} has an invalid floor ruler", self.building_id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub project_id: ProjectId,
    pub buildings: usize,
    pub rulers: usize,
    pub samples: usize,
}

pub fn parse_fixture(raw: &str) -> Result<ProjectFixture> {
    Ok(serde_json::from_str(raw)?)
}

pub fn load_fixture(path: &Path) -> Result<ProjectFixture> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading fixture {}", path.display()))?;
    parse_fixture(&raw).with_context(|| format!("parsing fixture {}", path.display()))
}

/// Import a fixture in one transaction; an invalid ruler aborts the whole import.
pub async fn import_fixture(db: &Database, fixture: &ProjectFixture) -> Result<ImportSummary> {
    let project_id = fixture.project.id;
    let rulers = fixture
        .buildings
        .iter()
        .map(|b| b.floor_ruler())
        .collect::<Result<Vec<_>>>()?;

    let mut tx = db.pool().begin().await?;
    projects::upsert_project_tx(&mut tx, project_id, &fixture.project.name).await?;

    for building in &fixture.buildings {
        let record = BuildingRecord {
            building_id: building.building_id,
            project_id,
            name: building.name.clone(),
            boundary: building.boundary.clone(),
            buffer_m: building.buffer_m,
        };
        buildings::upsert_building_tx(&mut tx, &record).await?;
    }

    let mut summary = ImportSummary {
        project_id,
        buildings: fixture.buildings.len(),
        ..ImportSummary::default()
    };
    for ruler in rulers.iter().flatten() {
        buildings::replace_floor_ruler_tx(&mut tx, project_id, ruler).await?;
        summary.rulers += 1;
    }
    summary.samples = telemetry::upsert_samples_tx(&mut tx, project_id, &fixture.samples).await?;

    tx.commit().await?;
    tracing::info!(
        project_id,
        buildings = summary.buildings,
        rulers = summary.rulers,
        samples = summary.samples,
        "fixture imported"
    );
    Ok(summary)
}
