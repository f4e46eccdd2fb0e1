//! Parses the screenshot folder with OmniParser and writes the docstore.
//!
//! Usage: `context-setup [--rebuild]`. With `--rebuild` the app collection is
//! rebuilt from the fresh docstore afterwards.

use std::env;
use std::sync::Arc;

use anyhow::Context;

use ragbot_backend::core::config::{AppPaths, ConfigService};
use ragbot_backend::core::logging;
use ragbot_backend::omniparser::ContextSetup;
use ragbot_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let rebuild = env::args().skip(1).any(|arg| arg == "--rebuild");

    let paths = AppPaths::new();
    logging::init(&paths);

    let config = ConfigService::new(Arc::new(paths.clone()));
    let settings = config.load_settings().context("Failed to load settings")?;

    let setup = ContextSetup::from_settings(&settings, &paths)?;
    let report = setup.run().await.context("Context setup failed")?;
    tracing::info!(
        "Parsed {} screenshots ({} failed), saved {} documents",
        report.parsed.len(),
        report.failed.len(),
        report.saved
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    if rebuild {
        let state = AppState::build(paths).await?;
        let build = state.ingestor.rebuild_index(true).await?;
        tracing::info!("Rebuilt index with {} chunks", build.chunk_count);
    }

    Ok(())
}
