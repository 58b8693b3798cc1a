//! Shared code for the `buildtrack` command-line tool.

pub mod fixture;
pub mod overview;
