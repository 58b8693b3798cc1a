//! Persistence layer for the progress server.
//!
//! SQLite storage for projects, building geofences, floor rulers, telemetry,
//! committed daily records and the batch run log.

pub mod buildings;
pub mod db;
pub mod progress;
pub mod projects;
pub mod runs;
pub mod telemetry;

pub use db::{init_database, Database};
