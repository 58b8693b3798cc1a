//! Fixture import followed by a batch run.

use buildtrack_cli::fixture::{import_fixture, FixtureBuilding, FixtureProject, ProjectFixture};
use buildtrack_cli::overview::project_overview;
use buildtrack_core::spatial::offset_local;
use buildtrack_core::{GeoPoint, ProgressRules};
use buildtrack_server::batch::BatchRunner;
use buildtrack_server::config::day_offset;
use buildtrack_server::persistence::telemetry::{sample_counts, RawSample};
use buildtrack_server::persistence::{buildings, init_database, progress, projects};
use chrono::{TimeZone, Utc};

const SITE: GeoPoint = GeoPoint {
    lat: 51.5072,
    lon: -0.1276,
};

fn fixture(floor_heights_m: Vec<f64>) -> ProjectFixture {
    let target = offset_local(SITE, 15.0, 15.0);
    let mut samples: Vec<RawSample> = [88.0, 88.2, 87.8, 100.0, 100.3, 99.7]
        .iter()
        .enumerate()
        .map(|(i, d)| RawSample {
            sample_id: i as i64 + 1,
            captured_at: Utc.with_ymd_and_hms(2025, 4, 2, 9, i as u32, 0).unwrap(),
            drone_position: offset_local(target, -40.0, 0.0),
            laser_target: Some(target),
            laser_distance_m: Some(*d),
            flight_altitude_m: Some(110.0),
        })
        .collect();
    // Altitude dropped by the feed
    samples.push(RawSample {
        sample_id: 7,
        flight_altitude_m: None,
        ..samples[0].clone()
    });

    ProjectFixture {
        project: FixtureProject {
            id: 3,
            name: "Canal Yard".to_string(),
        },
        buildings: vec![FixtureBuilding {
            building_id: 30,
            name: "Block C".to_string(),
            boundary: Some(vec![
                SITE,
                offset_local(SITE, 0.0, 30.0),
                offset_local(SITE, 30.0, 30.0),
                offset_local(SITE, 30.0, 0.0),
            ]),
            buffer_m: Some(15.0),
            ruler: Vec::new(),
            floor_heights_m,
        }],
        samples,
    }
}

#[tokio::test]
async fn imported_fixture_recomputes_to_ruler_floor() {
    let db = init_database(":memory:", 1).await.unwrap();
    let summary = import_fixture(&db, &fixture(vec![4.0, 4.0, 4.0, 4.0])).await.unwrap();
    assert_eq!((summary.buildings, summary.rulers, summary.samples), (1, 1, 7));
    assert_eq!(sample_counts(db.pool(), 3).await.unwrap(), (7, 6));

    let stored = buildings::list_buildings(db.pool(), 3).await.unwrap();
    assert_eq!(stored[0].buffer_m, Some(15.0));
    assert_eq!(stored[0].boundary.as_ref().map(Vec::len), Some(4));

    let runner = BatchRunner::new(db.clone(), ProgressRules::default(), day_offset(0).unwrap());
    let run = runner.recompute_project(3).await.unwrap();
    assert_eq!(run.records_written, 1);

    let records = progress::list_records(db.pool(), 3, None).await.unwrap();
    assert!((records[0].height_m - 12.0).abs() < 1e-9);
    assert_eq!(records[0].floor_level, 3);
    assert!(records[0].is_ground_measured());
}

#[tokio::test]
async fn invalid_ruler_aborts_import() {
    let db = init_database(":memory:", 1).await.unwrap();
    let err = import_fixture(&db, &fixture(vec![3.5, -1.0])).await.unwrap_err();
    assert!(err.to_string().contains("building 30"));
    assert!(projects::list_projects(db.pool()).await.unwrap().is_empty());
}

#[tokio::test]
async fn reimport_is_an_upsert() {
    let db = init_database(":memory:", 1).await.unwrap();
    import_fixture(&db, &fixture(vec![3.0])).await.unwrap();
    import_fixture(&db, &fixture(vec![3.0, 3.0])).await.unwrap();

    assert_eq!(sample_counts(db.pool(), 3).await.unwrap(), (7, 6));
    assert_eq!(buildings::floor_levels(db.pool(), 30).await.unwrap().len(), 2);
}

#[tokio::test]
async fn overview_clears_pending_after_a_run() {
    let db = init_database(":memory:", 1).await.unwrap();
    import_fixture(&db, &fixture(vec![4.0, 4.0, 4.0])).await.unwrap();

    let before = project_overview(&db).await.unwrap();
    assert_eq!(before.len(), 1);
    assert_eq!(before[0].project.name, "Canal Yard");
    assert_eq!((before[0].total_samples, before[0].usable_samples), (7, 6));
    assert!(before[0].pending);

    let runner = BatchRunner::new(db.clone(), ProgressRules::default(), day_offset(0).unwrap());
    runner.recompute_project(3).await.unwrap();

    let after = project_overview(&db).await.unwrap();
    assert!(!after[0].pending);
    assert_eq!(after[0].project.input_revision, before[0].project.input_revision);
}
