//! Shared library surface for the progress server, CLI and tests.

pub mod backoff;
pub mod batch;
pub mod config;
pub mod logging;
pub mod loops;
pub mod persistence;
