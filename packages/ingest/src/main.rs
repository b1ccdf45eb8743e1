#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI tool for ingesting the G-NAF dataset into the search backend.

use std::time::Instant;

use addresskit_cli_utils::IndicatifProgress;
use addresskit_index::{HttpSearchBackend, SearchBackend};
use addresskit_ingest::Config;
use addresskit_models::ProgressCallback;
use clap::Parser;

#[derive(Parser)]
#[command(name = "addresskit_ingest", about = "G-NAF address ingestion tool")]
struct Cli {
    /// Drop and recreate the search index before loading.
    #[arg(long)]
    clear: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = addresskit_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = Config::from_env();

    // The manifest/fetch client carries no blanket request timeout: G-NAF
    // archive downloads run well past any reasonable timeout value, and
    // `addresskit_fetch` already enforces its own connect/socket timeouts
    // per attempt. Only the backend client is bound by `index_timeout`.
    let fetch_client = reqwest::Client::builder().build()?;
    let backend_client = reqwest::Client::builder().timeout(config.index_timeout).build()?;
    let backend = HttpSearchBackend::new(backend_client, config.backend_url.clone(), config.es_index_name.clone());

    let progress: std::sync::Arc<dyn ProgressCallback> = IndicatifProgress::batch_bar(&multi, "ingesting G-NAF");

    let start = Instant::now();
    match addresskit_ingest::run(&config, &fetch_client, &backend as &dyn SearchBackend, cli.clear, Some(&progress)).await {
        Ok(summary) => {
            progress.finish(format!(
                "ingestion complete: {} regions, {} rows, {:.1}s",
                summary.regions_loaded.len(),
                summary.rows_loaded,
                start.elapsed().as_secs_f64()
            ));
        }
        Err(e) => {
            progress.finish(format!("ingestion failed: {e}"));
            log::error!("ingestion failed: {e}");
            return Err(Box::new(e));
        }
    }

    Ok(())
}
