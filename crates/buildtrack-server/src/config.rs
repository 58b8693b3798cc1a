//! Server configuration from environment.

use std::env;

use anyhow::{Context, Result};
use buildtrack_core::ProgressRules;
use chrono::FixedOffset;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub db_max_connections: u32,
    /// Site UTC offset used to bucket samples into calendar days
    pub day_offset_hours: i32,
    pub watch_interval_secs: u64,
    pub log_json: bool,
    pub rules: ProgressRules,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "data/buildtrack.db".to_string(),
            db_max_connections: 5,
            day_offset_hours: 0,
            watch_interval_secs: 30,
            log_json: false,
            rules: ProgressRules::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let mut rules = match env::var("BUILDTRACK_RULES_PATH") {
            Ok(path) => load_rules(&path)?,
            Err(_) => defaults.rules.clone(),
        };
        if let Some(buffer_m) = env_parse("BUILDTRACK_BUFFER_M") {
            rules.geofence_buffer_m = buffer_m;
        }
        if let Some(tolerance_m) = env_parse("BUILDTRACK_RATCHET_TOLERANCE_M") {
            rules.ratchet_tolerance_m = tolerance_m;
        }
        if let Some(contradiction_m) = env_parse("BUILDTRACK_GROUND_CONTRADICTION_M") {
            rules.ground_contradiction_m = contradiction_m;
        }

        let config = Self {
            db_path: env::var("BUILDTRACK_DB_PATH").unwrap_or(defaults.db_path),
            db_max_connections: env_parse("BUILDTRACK_DB_MAX_CONNECTIONS")
                .unwrap_or(defaults.db_max_connections),
            day_offset_hours: env_parse("BUILDTRACK_DAY_OFFSET_HOURS")
                .unwrap_or(defaults.day_offset_hours),
            watch_interval_secs: env_parse("BUILDTRACK_WATCH_SECS")
                .unwrap_or(defaults.watch_interval_secs),
            log_json: env::var("BUILDTRACK_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            rules,
        };
        // Reject a bad offset at startup rather than on the first batch
        config.day_offset()?;
        Ok(config)
    }

    pub fn day_offset(&self) -> Result<FixedOffset> {
        day_offset(self.day_offset_hours)
    }
}

/// Fixed offset for a whole number of hours east of UTC.
pub fn day_offset(hours: i32) -> Result<FixedOffset> {
    hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .with_context(|| format!("day offset of {hours} hours is out of range"))
}

/// Load tunable rules from a JSON file; missing fields take their defaults.
pub fn load_rules(path: &str) -> Result<ProgressRules> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading rules file {path}"))?;
    ProgressRules::from_json(&raw).with_context(|| format!("parsing rules file {path}"))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_offset_accepts_site_timezones() {
        assert_eq!(day_offset(8).unwrap().local_minus_utc(), 8 * 3600);
        assert_eq!(day_offset(-5).unwrap().local_minus_utc(), -5 * 3600);
        assert!(day_offset(30).is_err());
    }

    #[test]
    fn rules_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("buildtrack-rules-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"ratchet_tolerance_m": 3.0}"#).unwrap();
        let rules = load_rules(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(rules.ratchet_tolerance_m, 3.0);
        assert_eq!(rules.geofence_buffer_m, ProgressRules::default().geofence_buffer_m);
    }
}
