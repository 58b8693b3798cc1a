//! Daily progress record persistence, keyed by (building, day).

use anyhow::{Context, Result};
use buildtrack_core::{BuildingId, DailyProgressRecord, GroundSource, ProjectId, RatchetDecision};
use chrono::NaiveDate;
use sqlx::{Sqlite, SqlitePool};

/// Insert or overwrite the record for its (building, day).
pub async fn upsert_record_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    record: &DailyProgressRecord,
) -> Result<()> {
    let ground_json = serde_json::to_string(&record.ground)?;
    let ratchet_json = serde_json::to_string(&record.ratchet)?;

    sqlx::query(
        r#"
        INSERT INTO daily_progress (building_id, project_id, measured_on, height_m, roof_distance_m, ground_distance_m,
            flight_altitude_m, floor_level, ground_measured, ground_source, ratchet, needs_review, sample_count)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        ON CONFLICT(building_id, measured_on) DO UPDATE SET
            project_id = ?2, height_m = ?4, roof_distance_m = ?5, ground_distance_m = ?6,
            flight_altitude_m = ?7, floor_level = ?8, ground_measured = ?9,
            ground_source = ?10, ratchet = ?11, needs_review = ?12, sample_count = ?13
        "#,
    )
    .bind(record.building_id)
    .bind(record.project_id)
    .bind(record.day.to_string())
    .bind(record.height_m)
    .bind(record.roof_distance_m)
    .bind(record.ground_distance_m)
    .bind(record.flight_altitude_m)
    .bind(record.floor_level)
    .bind(record.is_ground_measured())
    .bind(ground_json)
    .bind(ratchet_json)
    .bind(record.needs_review())
    .bind(record.sample_count as i64)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Remove a day that no longer resolves. Returns whether a row existed.
pub async fn delete_record_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    building_id: BuildingId,
    day: NaiveDate,
) -> Result<bool> {
    let result = sqlx::query("DELETE FROM daily_progress WHERE building_id = ?1 AND measured_on = ?2")
        .bind(building_id)
        .bind(day.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Every committed record of a project, the history a batch starts from.
pub async fn load_records_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    project_id: ProjectId,
) -> Result<Vec<DailyProgressRecord>> {
    let rows = sqlx::query_as::<_, ProgressRow>(&format!(
        "{SELECT_RECORDS} WHERE project_id = ?1 ORDER BY building_id, measured_on"
    ))
    .bind(project_id)
    .fetch_all(&mut **tx)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

/// Records of a project, optionally narrowed to one building.
pub async fn list_records(
    pool: &SqlitePool,
    project_id: ProjectId,
    building_id: Option<BuildingId>,
) -> Result<Vec<DailyProgressRecord>> {
    let rows = sqlx::query_as::<_, ProgressRow>(&format!(
        "{SELECT_RECORDS} WHERE project_id = ?1 AND (?2 IS NULL OR building_id = ?2) ORDER BY building_id, measured_on"
    ))
    .bind(project_id)
    .bind(building_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

const SELECT_RECORDS: &str = "SELECT building_id, project_id, measured_on, height_m, roof_distance_m, ground_distance_m, \
     flight_altitude_m, floor_level, ground_source, ratchet, sample_count FROM daily_progress";

// Internal row type for SQLx
#[derive(sqlx::FromRow)]
struct ProgressRow {
    building_id: BuildingId,
    project_id: ProjectId,
    measured_on: String,
    height_m: f64,
    roof_distance_m: f64,
    ground_distance_m: f64,
    flight_altitude_m: f64,
    floor_level: i32,
    ground_source: String,
    ratchet: String,
    sample_count: i64,
}

impl TryFrom<ProgressRow> for DailyProgressRecord {
    type Error = anyhow::Error;

    fn try_from(row: ProgressRow) -> Result<Self> {
        let day: NaiveDate = row
            .measured_on
            .parse()
            .with_context(|| format!("bad measured_on {:?}", row.measured_on))?;
        let ground: GroundSource = serde_json::from_str(&row.ground_source)?;
        let ratchet: RatchetDecision = serde_json::from_str(&row.ratchet)?;

        Ok(DailyProgressRecord {
            project_id: row.project_id,
            building_id: row.building_id,
            day,
            height_m: row.height_m,
            roof_distance_m: row.roof_distance_m,
            ground_distance_m: row.ground_distance_m,
            flight_altitude_m: row.flight_altitude_m,
            floor_level: row.floor_level,
            ground,
            ratchet,
            sample_count: usize::try_from(row.sample_count)?,
        })
    }
}
