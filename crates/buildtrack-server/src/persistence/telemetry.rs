//! Telemetry sample persistence.

use anyhow::Result;
use buildtrack_core::{GeoPoint, ProjectId, TelemetrySample};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool};

use super::projects::bump_input_revision_tx;

/// A sample as delivered by the drone feed; distance or altitude may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub sample_id: i64,
    pub captured_at: DateTime<Utc>,
    pub drone_position: GeoPoint,
    #[serde(default)]
    pub laser_target: Option<GeoPoint>,
    #[serde(default)]
    pub laser_distance_m: Option<f64>,
    #[serde(default)]
    pub flight_altitude_m: Option<f64>,
}

/// Insert or replace samples for a project. Returns how many were written.
pub async fn upsert_samples_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    project_id: ProjectId,
    samples: &[RawSample],
) -> Result<usize> {
    for sample in samples {
        sqlx::query(
            r#"
            INSERT INTO telemetry_samples (id, project_id, captured_at, drone_lat, drone_lon, target_lat, target_lon, laser_distance_m, flight_altitude_m)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                project_id = ?2, captured_at = ?3,
                drone_lat = ?4, drone_lon = ?5,
                target_lat = ?6, target_lon = ?7,
                laser_distance_m = ?8, flight_altitude_m = ?9
            "#,
        )
        .bind(sample.sample_id)
        .bind(project_id)
        .bind(sample.captured_at.to_rfc3339())
        .bind(sample.drone_position.lat)
        .bind(sample.drone_position.lon)
        .bind(sample.laser_target.map(|p| p.lat))
        .bind(sample.laser_target.map(|p| p.lon))
        .bind(sample.laser_distance_m)
        .bind(sample.flight_altitude_m)
        .execute(&mut **tx)
        .await?;
    }

    if !samples.is_empty() {
        bump_input_revision_tx(tx, project_id).await?;
    }
    Ok(samples.len())
}

/// Samples usable for inference: rows missing a distance or an altitude are left out.
pub async fn load_usable_samples_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    project_id: ProjectId,
) -> Result<Vec<TelemetrySample>> {
    let rows = sqlx::query_as::<_, SampleRow>(
        r#"
        SELECT id, project_id, captured_at, drone_lat, drone_lon, target_lat, target_lon, laser_distance_m, flight_altitude_m
        FROM telemetry_samples
        WHERE project_id = ?1
          AND laser_distance_m IS NOT NULL
          AND flight_altitude_m IS NOT NULL
        ORDER BY captured_at, id
        "#,
    )
    .bind(project_id)
    .fetch_all(&mut **tx)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

/// (total, usable) sample counts for a project.
pub async fn sample_counts(pool: &SqlitePool, project_id: ProjectId) -> Result<(i64, i64)> {
    let counts: (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COALESCE(SUM(CASE WHEN laser_distance_m IS NOT NULL AND flight_altitude_m IS NOT NULL THEN 1 ELSE 0 END), 0)
        FROM telemetry_samples WHERE project_id = ?1
        "#,
    )
    .bind(project_id)
    .fetch_one(pool)
    .await?;
    Ok(counts)
}

// Internal row type for SQLx
#[derive(sqlx::FromRow)]
struct SampleRow {
    id: i64,
    project_id: ProjectId,
    captured_at: String,
    drone_lat: f64,
    drone_lon: f64,
    target_lat: Option<f64>,
    target_lon: Option<f64>,
    laser_distance_m: f64,
    flight_altitude_m: f64,
}

impl TryFrom<SampleRow> for TelemetrySample {
    type Error = anyhow::Error;

    fn try_from(row: SampleRow) -> Result<Self> {
        let captured_at = DateTime::parse_from_rfc3339(&row.captured_at)?.with_timezone(&Utc);
        let laser_target = match (row.target_lat, row.target_lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        };

        Ok(TelemetrySample {
            sample_id: row.id,
            project_id: row.project_id,
            captured_at,
            drone_position: GeoPoint::new(row.drone_lat, row.drone_lon),
            laser_target,
            laser_distance_m: row.laser_distance_m,
            flight_altitude_m: row.flight_altitude_m,
        })
    }
}
