//! Environment-driven configuration for one ingestion run.
//!
//! Plain `std::env::var` reads with typed defaults, no framework —
//! mirrors `FetchOptions`/`SyncArgs` composition and
//! `crime_map_database::paths`' directory-resolution style.

use std::path::PathBuf;
use std::time::Duration;

use addresskit_models::Region;

/// The package manifest URL, if not overridden by `GNAF_MANIFEST_URL`.
///
/// Points at the data.gov.au CKAN `package_show` endpoint for the G-NAF
/// dataset, the real registry entry this system's fetcher targets.
const DEFAULT_MANIFEST_URL: &str =
    "https://data.gov.au/api/3/action/package_show?id=geocoded-national-address-file-g-naf";

/// Configuration for one ingestion run, assembled from environment
/// variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// The set of regions to load. Never empty — an invalid
    /// `COVERED_STATES` entry collapses the filter to all nine.
    pub covered_states: Vec<Region>,
    pub es_index_name: String,
    pub enable_geo: bool,
    pub index_timeout: Duration,
    pub index_backoff: Duration,
    pub index_backoff_increment: Duration,
    pub index_backoff_max: Duration,
    pub loading_chunk_bytes: u64,
    pub gnaf_dir: PathBuf,
    pub manifest_url: String,
    pub backend_url: String,
}

impl Config {
    /// Builds a [`Config`] from the process environment, falling back to
    /// the documented defaults for any unset variable.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            covered_states: parse_covered_states(std::env::var("COVERED_STATES").ok().as_deref()),
            es_index_name: std::env::var("ES_INDEX_NAME").unwrap_or_else(|_| "addresskit".to_string()),
            enable_geo: std::env::var("ADDRESSKIT_ENABLE_GEO").map(|v| v == "1").unwrap_or(false),
            index_timeout: Duration::from_secs(env_parse("ADDRESSKIT_INDEX_TIMEOUT", 30)),
            index_backoff: Duration::from_secs(env_parse("ADDRESSKIT_INDEX_BACKOFF", 30)),
            index_backoff_increment: Duration::from_secs(env_parse("ADDRESSKIT_INDEX_BACKOFF_INCREMENT", 30)),
            index_backoff_max: Duration::from_secs(env_parse("ADDRESSKIT_INDEX_BACKOFF_MAX", 600)),
            loading_chunk_bytes: env_parse::<u64>("ADDRESSKIT_LOADING_CHUNK_SIZE", 10) * 1024 * 1024,
            gnaf_dir: std::env::var("GNAF_DIR").map_or_else(|_| PathBuf::from("data/gnaf"), PathBuf::from),
            manifest_url: std::env::var("GNAF_MANIFEST_URL").unwrap_or_else(|_| DEFAULT_MANIFEST_URL.to_string()),
            backend_url: std::env::var("ADDRESSKIT_BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:9200".to_string()),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Parses a comma-separated region list. An empty or absent value means
/// "all regions". Any entry that fails to parse against the closed set
/// collapses the whole filter to all nine regions.
#[must_use]
pub fn parse_covered_states(raw: Option<&str>) -> Vec<Region> {
    let Some(raw) = raw else {
        return Region::ALL.to_vec();
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Region::ALL.to_vec();
    }

    let mut regions = Vec::new();
    for entry in raw.split(',') {
        match entry.trim().parse::<Region>() {
            Ok(region) => regions.push(region),
            Err(_) => {
                log::warn!("invalid region {entry:?} in COVERED_STATES, falling back to all regions");
                return Region::ALL.to_vec();
            }
        }
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_filter_covers_all_regions() {
        assert_eq!(parse_covered_states(None), Region::ALL.to_vec());
        assert_eq!(parse_covered_states(Some("")), Region::ALL.to_vec());
    }

    #[test]
    fn valid_filter_is_honoured() {
        assert_eq!(parse_covered_states(Some("NSW,VIC")), vec![Region::Nsw, Region::Vic]);
    }

    #[test]
    fn one_invalid_entry_collapses_to_all_regions() {
        assert_eq!(parse_covered_states(Some("NSW,ZZZ")), Region::ALL.to_vec());
    }
}
