//! Tracing subscriber setup shared by the server and CLI binaries.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber; `directive` raises one crate's level (e.g. `buildtrack_server=debug`).
pub fn init_tracing(directive: &str, json: bool) -> Result<()> {
    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .with(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();
    Ok(())
}
