//! Building geofence and floor ruler persistence.

use std::collections::HashMap;

use anyhow::Result;
use buildtrack_core::{
    BuildingGeofence, BuildingId, FloorLevel, FloorRuler, GeoPoint, GeofenceError, ProjectId,
};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool};

use super::projects::bump_input_revision_tx;

/// A building as stored; the boundary may be missing and the buffer may defer to the rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingRecord {
    pub building_id: BuildingId,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub boundary: Option<Vec<GeoPoint>>,
    #[serde(default)]
    pub buffer_m: Option<f64>,
}

/// Geofences that can be matched, plus buildings whose boundary could not be read.
#[derive(Debug, Clone, Default)]
pub struct LoadedGeofences {
    pub geofences: Vec<BuildingGeofence>,
    pub unreadable: Vec<(BuildingId, String)>,
}

pub async fn upsert_building_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    building: &BuildingRecord,
) -> Result<()> {
    let boundary_json = building
        .boundary
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO buildings (id, project_id, name, boundary_coords, buffer_m, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, CURRENT_TIMESTAMP)
        ON CONFLICT(id) DO UPDATE SET
            project_id = ?2, name = ?3, boundary_coords = ?4, buffer_m = ?5,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(building.building_id)
    .bind(building.project_id)
    .bind(&building.name)
    .bind(boundary_json)
    .bind(building.buffer_m)
    .execute(&mut **tx)
    .await?;

    bump_input_revision_tx(tx, building.project_id).await
}

/// Replace a building's floor ruler wholesale.
pub async fn replace_floor_ruler_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    project_id: ProjectId,
    ruler: &FloorRuler,
) -> Result<()> {
    sqlx::query("DELETE FROM floor_levels WHERE building_id = ?1")
        .bind(ruler.building_id)
        .execute(&mut **tx)
        .await?;

    let mut below = 0.0;
    for level in ruler.levels() {
        sqlx::query(
            r#"
            INSERT INTO floor_levels (building_id, floor_number, floor_height_m, cumulative_height_m)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(ruler.building_id)
        .bind(level.floor_number)
        .bind(level.cumulative_height_m - below)
        .bind(level.cumulative_height_m)
        .execute(&mut **tx)
        .await?;
        below = level.cumulative_height_m;
    }

    bump_input_revision_tx(tx, project_id).await
}

/// Load a project's geofences. Undecodable boundaries are reported, not fatal.
pub async fn load_geofences_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    project_id: ProjectId,
    default_buffer_m: f64,
) -> Result<LoadedGeofences> {
    let rows = sqlx::query_as::<_, BuildingRow>(
        "SELECT id, project_id, name, boundary_coords, buffer_m FROM buildings WHERE project_id = ?1 ORDER BY id",
    )
    .bind(project_id)
    .fetch_all(&mut **tx)
    .await?;

    let mut loaded = LoadedGeofences::default();
    for row in rows {
        let building_id = row.id;
        match row.into_geofence(default_buffer_m) {
            Ok(fence) => loaded.geofences.push(fence),
            Err(err) => loaded.unreadable.push((building_id, err.to_string())),
        }
    }
    Ok(loaded)
}

/// Load every valid ruler in a project; invalid ones fall back to the default storey height.
pub async fn load_rulers_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    project_id: ProjectId,
) -> Result<HashMap<BuildingId, FloorRuler>> {
    let rows = sqlx::query_as::<_, FloorLevelRow>(
        r#"
        SELECT f.building_id, f.floor_number, f.cumulative_height_m
        FROM floor_levels f JOIN buildings b ON b.id = f.building_id
        WHERE b.project_id = ?1
        ORDER BY f.building_id, f.floor_number
        "#,
    )
    .bind(project_id)
    .fetch_all(&mut **tx)
    .await?;

    let mut levels: HashMap<BuildingId, Vec<FloorLevel>> = HashMap::new();
    for row in rows {
        levels.entry(row.building_id).or_default().push(FloorLevel {
            floor_number: row.floor_number,
            cumulative_height_m: row.cumulative_height_m,
        });
    }

    let mut rulers = HashMap::with_capacity(levels.len());
    for (building_id, levels) in levels {
        match FloorRuler::new(building_id, levels) {
            Ok(ruler) => {
                rulers.insert(building_id, ruler);
            }
            Err(err) => {
                tracing::warn!(project_id, building_id, "ignoring floor ruler: {}", err);
            }
        }
    }
    Ok(rulers)
}

pub async fn list_buildings(pool: &SqlitePool, project_id: ProjectId) -> Result<Vec<BuildingRecord>> {
    let rows = sqlx::query_as::<_, BuildingRow>(
        "SELECT id, project_id, name, boundary_coords, buffer_m FROM buildings WHERE project_id = ?1 ORDER BY id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| BuildingRecord {
            boundary: row
                .boundary_coords
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
            building_id: row.id,
            project_id: row.project_id,
            name: row.name,
            buffer_m: row.buffer_m,
        })
        .collect())
}

/// Stored ruler levels for one building, lowest first.
pub async fn floor_levels(pool: &SqlitePool, building_id: BuildingId) -> Result<Vec<FloorLevel>> {
    let rows = sqlx::query_as::<_, FloorLevelRow>(
        "SELECT building_id, floor_number, cumulative_height_m FROM floor_levels WHERE building_id = ?1 ORDER BY floor_number",
    )
    .bind(building_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| FloorLevel {
            floor_number: row.floor_number,
            cumulative_height_m: row.cumulative_height_m,
        })
        .collect())
}

// Internal row types for SQLx
#[derive(sqlx::FromRow)]
struct BuildingRow {
    id: BuildingId,
    project_id: ProjectId,
    name: String,
    boundary_coords: Option<String>,
    buffer_m: Option<f64>,
}

impl BuildingRow {
    fn into_geofence(self, default_buffer_m: f64) -> Result<BuildingGeofence, GeofenceError> {
        let raw = self.boundary_coords.ok_or_else(|| GeofenceError::Unparsable {
            building_id: self.id,
            reason: "no boundary stored".to_string(),
        })?;
        let polygon: Vec<GeoPoint> =
            serde_json::from_str(&raw).map_err(|err| GeofenceError::Unparsable {
                building_id: self.id,
                reason: err.to_string(),
            })?;

        Ok(BuildingGeofence {
            building_id: self.id,
            project_id: self.project_id,
            name: self.name,
            polygon,
            buffer_m: self.buffer_m.unwrap_or(default_buffer_m),
        })
    }
}

#[derive(sqlx::FromRow)]
struct FloorLevelRow {
    building_id: BuildingId,
    floor_number: i32,
    cumulative_height_m: f64,
}
