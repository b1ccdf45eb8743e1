#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ingestion orchestrator (C8): the top-level driver that sequences
//! manifest resolution, fetch, extraction, authority loading, and
//! per-region streaming/mapping/indexing.
//!
//! Grounded on `crime_map_ingest::run_sync`/`run_geocode` (a sequential
//! per-source loop taking an `Option<&Arc<dyn ProgressCallback>>` and
//! returning a structured result), generalized from a per-source
//! fan-out to a fixed manifest → fetch → extract → authority →
//! per-region pipeline, and on `crime_map_ingest::interactive`'s
//! region-set validation pattern (an invalid entry collapses the whole
//! filter).

pub mod config;
pub mod error;
mod files;
mod manifest;
pub mod paths;
pub mod state;

use std::sync::Arc;
use std::time::Instant;

use addresskit_authority::AuthorityIndex;
use addresskit_index::{BulkRetryPolicy, SearchBackend};
use addresskit_models::{AuthorityTable, NullProgress, ProgressCallback, Region};

pub use config::Config;
pub use error::IngestError;
pub use state::IngestState;

/// The fixed per-region file load order: locality and street-locality
/// must be joinable before address-detail is streamed; geocode files
/// are optional on the geocoding switch.
const LOADING_ORDER: [&str; 1] = ["ADDRESS_DETAIL"];

/// Summary of one completed ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub regions_loaded: Vec<Region>,
    pub rows_loaded: u64,
    pub elapsed_secs: f64,
}

/// Runs the full ingestion pipeline once: resolve manifest, fetch,
/// extract, load authority tables, optionally rebuild the index, then
/// load every covered region.
///
/// # Errors
///
/// Returns [`IngestError`] on any unrecoverable failure (manifest
/// resolution, fetch exhaustion, extraction, or a backend submission
/// that exhausts its retry budget). Per-row mapping failures and
/// unresolved authority codes are logged and skipped, never returned.
pub async fn run(
    config: &Config,
    client: &reqwest::Client,
    backend: &dyn SearchBackend,
    clear: bool,
    progress: Option<&Arc<dyn ProgressCallback>>,
) -> Result<IngestSummary, IngestError> {
    let start = Instant::now();
    let progress: Arc<dyn ProgressCallback> = progress.map_or_else(
        || Arc::new(NullProgress) as Arc<dyn ProgressCallback>,
        Arc::clone,
    );

    log::info!(
        "starting ingestion run: regions={:?} geo={}",
        config.covered_states,
        config.enable_geo
    );

    // 1 + 2. Resolve configuration and the package manifest (C7).
    let mut state = IngestState::Manifest;
    log::info!("{state}");
    let mut manifest_cache = addresskit_manifest::ManifestCache::open_default()?;
    let body = addresskit_manifest::fetch_manifest(client, &mut manifest_cache, &config.manifest_url).await?;
    let resource = manifest::select_active_zip_resource(&body).ok_or(IngestError::NoActiveResource)?;

    let archive_basename = archive_basename_from_url(&resource.url);

    // 3. Fetch the archive (C1), if not already materialised.
    state = IngestState::Fetching;
    log::info!("{state}");
    let archive_path = paths::archive_path(&config.gnaf_dir, &archive_basename);
    let fetch_options = addresskit_fetch::FetchOptions {
        expected_size: resource.size,
        ..addresskit_fetch::FetchOptions::default()
    };
    addresskit_fetch::fetch(client, &resource.url, &archive_path, &fetch_options, &progress).await?;

    // 4. Extract the archive (C2), if not already extracted.
    state = IngestState::Extracting;
    log::info!("{state}");
    let extracted = paths::extracted_dir(&config.gnaf_dir, &archive_basename);
    addresskit_archive::extract(&archive_path, &extracted)?;

    // 5. Load authority-code tables (C3).
    let mut authority = AuthorityIndex::new();
    for table in AuthorityTable::ALL {
        let table_file = format!("{}_AUT", table.as_ref());
        let path = paths::authority_code_file(&extracted, &table_file);
        authority.load_table(table, &path, config.loading_chunk_bytes).await?;
    }

    // 6. Build the synonym list and optionally rebuild the backend index
    // from scratch.
    let synonyms = authority.synonym_list();
    if clear {
        log::info!("--clear requested: dropping and recreating the backend index");
        backend.drop_index().await?;
        backend.create_index(&synonyms).await?;
    } else {
        backend.create_index(&synonyms).await?;
    }

    // 7. Per covered region: locality → street-locality → geocode →
    // address-detail, in fixed dependency order.
    let retry_policy = BulkRetryPolicy {
        initial: config.index_backoff,
        increment: config.index_backoff_increment,
        cap: config.index_backoff_max,
        max_attempts: None,
    };

    let load_summary = files::read_load_summary(&extracted, config.loading_chunk_bytes).await;
    let mut rows_loaded: u64 = 0;

    for region in &config.covered_states {
        for table in LOADING_ORDER {
            state = IngestState::Loading { region: *region, table };
            log::info!("{state}");
            progress.set_message(state.to_string());

            let loaded = files::load_address_detail(
                &extracted,
                *region,
                &authority,
                backend,
                &retry_policy,
                progress.as_ref(),
                config.enable_geo,
                &load_summary,
                config.loading_chunk_bytes,
            )
            .await?;
            rows_loaded += loaded;
        }
    }

    backend.refresh().await?;

    state = IngestState::Complete;
    log::info!("{state}");
    progress.finish(format!("ingestion complete: {rows_loaded} rows loaded"));

    Ok(IngestSummary {
        regions_loaded: config.covered_states.clone(),
        rows_loaded,
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}

/// The archive's file name, taken from the final path segment of its
/// download URL.
fn archive_basename_from_url(url: &str) -> String {
    url.rsplit('/').next().map_or_else(|| "gnaf.zip".to_string(), str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_basename_is_taken_from_the_final_path_segment() {
        assert_eq!(
            archive_basename_from_url("https://example.org/releases/2026-05/gnaf_2026_05.zip"),
            "gnaf_2026_05.zip"
        );
        assert_eq!(archive_basename_from_url("not-a-url"), "not-a-url");
    }
}
