//! Per-building series of committed days.
//!
//! Every lookup is scoped to days strictly before the one being processed
//! and answered from the series itself, so a batch is reproducible from its
//! inputs and independent buildings share nothing.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{BuildingId, DailyProgressRecord, GroundBasis};

/// Highest committed progress before a given day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub day: NaiveDate,
    pub height_m: f64,
    /// Highest floor committed on any earlier day
    pub floor_level: i32,
}

/// Earlier-day lookups needed to resolve a new day.
pub trait ProgressHistory {
    /// Most recent freshly measured ground strictly before `day`.
    fn latest_basis_before(&self, day: NaiveDate) -> Option<GroundBasis>;
    /// Highest committed height strictly before `day`.
    fn peak_before(&self, day: NaiveDate) -> Option<Peak>;
}

#[derive(Debug, Clone, Default)]
pub struct BuildingHistory {
    records: BTreeMap<NaiveDate, DailyProgressRecord>,
}

impl BuildingHistory {
    /// Seed from previously persisted records; other buildings' rows are ignored.
    pub fn from_records<'a>(
        building_id: BuildingId,
        records: impl IntoIterator<Item = &'a DailyProgressRecord>,
    ) -> Self {
        let records = records
            .into_iter()
            .filter(|record| record.building_id == building_id)
            .map(|record| (record.day, record.clone()))
            .collect();
        Self { records }
    }

    /// Commit a day, replacing any earlier commit for the same day.
    pub fn commit(&mut self, record: DailyProgressRecord) {
        self.records.insert(record.day, record);
    }

    /// Drop a day that no longer produces a record.
    pub fn remove(&mut self, day: NaiveDate) -> Option<DailyProgressRecord> {
        self.records.remove(&day)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in ascending day order.
    pub fn records(&self) -> impl Iterator<Item = &DailyProgressRecord> {
        self.records.values()
    }
}

impl ProgressHistory for BuildingHistory {
    fn latest_basis_before(&self, day: NaiveDate) -> Option<GroundBasis> {
        self.records
            .range(..day)
            .rev()
            .find_map(|(_, record)| GroundBasis::from_record(record))
    }

    fn peak_before(&self, day: NaiveDate) -> Option<Peak> {
        let mut peak: Option<Peak> = None;
        for record in self.records.range(..day).map(|(_, r)| r) {
            peak = Some(match peak {
                None => Peak {
                    day: record.day,
                    height_m: record.height_m,
                    floor_level: record.floor_level,
                },
                Some(mut current) => {
                    if record.height_m > current.height_m {
                        current.day = record.day;
                        current.height_m = record.height_m;
                    }
                    current.floor_level = current.floor_level.max(record.floor_level);
                    current
                }
            });
        }
        peak
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GroundSource, RatchetDecision};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    fn record(d: u32, height_m: f64, floor_level: i32, ground: GroundSource) -> DailyProgressRecord {
        DailyProgressRecord {
            project_id: 1,
            building_id: 4,
            day: day(d),
            height_m,
            roof_distance_m: 100.0 - height_m,
            ground_distance_m: 100.0 + d as f64,
            flight_altitude_m: 120.0 + d as f64,
            floor_level,
            ground,
            ratchet: RatchetDecision::Advanced,
            sample_count: 12,
        }
    }

    #[test]
    fn basis_is_latest_measured_strictly_before() {
        let projected = GroundSource::Projected {
            basis_day: day(1),
            rejected_measurement_m: None,
        };
        let records = vec![
            record(1, 3.0, 1, GroundSource::Measured),
            record(3, 6.0, 2, GroundSource::Measured),
            record(5, 9.0, 3, projected),
        ];
        let history = BuildingHistory::from_records(4, &records);

        assert_eq!(history.latest_basis_before(day(1)), None);
        assert_eq!(history.latest_basis_before(day(3)).unwrap().day, day(1));
        let basis = history.latest_basis_before(day(9)).unwrap();
        assert_eq!(basis.day, day(3));
        assert_eq!(basis.ground_distance_m, 103.0);
        assert_eq!(basis.flight_altitude_m, 123.0);
    }

    #[test]
    fn peak_ignores_same_and_later_days() {
        let records = vec![
            record(1, 3.0, 1, GroundSource::Measured),
            record(2, 10.0, 3, GroundSource::Measured),
            record(4, 12.0, 4, GroundSource::Measured),
        ];
        let history = BuildingHistory::from_records(4, &records);

        assert_eq!(history.peak_before(day(1)), None);
        let peak = history.peak_before(day(4)).unwrap();
        assert_eq!(peak.height_m, 10.0);
        assert_eq!(peak.day, day(2));
        assert_eq!(peak.floor_level, 3);
    }

    #[test]
    fn other_buildings_are_not_seeded() {
        let mut other = record(1, 3.0, 1, GroundSource::Measured);
        other.building_id = 5;
        let history = BuildingHistory::from_records(4, &[other]);
        assert!(history.is_empty());
    }
}
