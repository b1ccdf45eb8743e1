#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data types for the G-NAF ingestion pipeline.
//!
//! Every crate in the workspace depends on this one for the structured
//! address model, the authority-code vocabulary, and the cross-cutting
//! [`ProgressCallback`] trait. Nothing here performs I/O.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// One of the nine G-NAF administrative regions.
///
/// Parsing an unrecognised code is a configuration error handled by the
/// orchestrator (invalid entries collapse the whole filter to "all").
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Region {
    Act,
    Nsw,
    Nt,
    Ot,
    Qld,
    Sa,
    Tas,
    Vic,
    Wa,
}

impl Region {
    /// All nine regions, in the order they appear in the G-NAF release notes.
    pub const ALL: [Self; 9] = [
        Self::Act,
        Self::Nsw,
        Self::Nt,
        Self::Ot,
        Self::Qld,
        Self::Sa,
        Self::Tas,
        Self::Vic,
        Self::Wa,
    ];
}

/// The nine authority-code tables consumed by the mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorityTable {
    LevelType,
    FlatType,
    StreetType,
    StreetClass,
    LocalityClass,
    StreetSuffix,
    GeocodeReliability,
    GeocodeType,
    GeocodedLevelType,
}

impl AuthorityTable {
    /// All nine tables, in the order C3 loads them.
    pub const ALL: [Self; 9] = [
        Self::LevelType,
        Self::FlatType,
        Self::StreetType,
        Self::StreetClass,
        Self::LocalityClass,
        Self::StreetSuffix,
        Self::GeocodeReliability,
        Self::GeocodeType,
        Self::GeocodedLevelType,
    ];

    /// Tables flattened into the search backend's synonym analyser list
    /// (street-type, flat-type, level-type, street-suffix only).
    pub const SYNONYM_SOURCES: [Self; 4] = [
        Self::StreetType,
        Self::FlatType,
        Self::LevelType,
        Self::StreetSuffix,
    ];
}

/// A single `{code, name}` pair from an authority-code table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityCode {
    pub code: String,
    pub name: String,
}

/// Flat-level detail on a structured address (unit/apartment).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatDetail {
    pub type_code: Option<String>,
    pub type_name: Option<String>,
    pub prefix: Option<String>,
    pub number: Option<String>,
    pub suffix: Option<String>,
}

/// Building-level detail on a structured address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelDetail {
    pub type_code: Option<String>,
    pub type_name: Option<String>,
    pub number: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

/// First/last street-number detail, each with its own prefix/suffix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberDetail {
    pub first_prefix: Option<String>,
    pub first_number: Option<String>,
    pub first_suffix: Option<String>,
    pub last_prefix: Option<String>,
    pub last_number: Option<String>,
    pub last_suffix: Option<String>,
}

/// Street name plus its resolved type and suffix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreetDetail {
    pub name: String,
    pub type_code: Option<String>,
    pub type_name: Option<String>,
    pub suffix_code: Option<String>,
    pub suffix_name: Option<String>,
}

/// The joined locality satellite, with its class code resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locality {
    pub pid: String,
    pub name: String,
    pub class_code: String,
    pub class_name: String,
}

/// The joined street-locality satellite, with its class code resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreetLocality {
    pub pid: String,
    pub class_code: String,
    pub class_name: String,
}

/// The fully structured form of an address, as produced by the mapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredAddress {
    pub building_name: Option<String>,
    pub flat: Option<FlatDetail>,
    pub level: Option<LevelDetail>,
    pub number: NumberDetail,
    pub street: StreetDetail,
    pub locality: String,
    pub state: Region,
    pub postcode: String,
    pub lot: Option<String>,
}

/// A single geocode point, with its reliability and type resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeEntry {
    pub latitude: f64,
    pub longitude: f64,
    pub is_default: bool,
    pub reliability_code: String,
    pub reliability_name: String,
    pub type_code: String,
    pub type_name: String,
}

/// The geocode bundle for an address: an overall level rank plus the
/// ordered list of points (site entries before default entries).
///
/// Invariant: at most one entry may have `is_default = true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geocode {
    /// Coarse-to-fine rank, 1..7; the finest rank reported across both
    /// the site-level and default-level inputs.
    pub level: u8,
    pub entries: Vec<GeocodeEntry>,
}

/// The document keyed by `pid`. Backend document id is `/addresses/{pid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressDetail {
    pub pid: String,
    pub structured: StructuredAddress,
    pub sla: String,
    pub ssla: String,
    /// 1-4 lines. A 5th line is a fatal mapping error, never represented here.
    pub mla: Vec<String>,
    /// The compact counterpart of `mla`: same 1-4 line budget, built from
    /// the short-form (`ssla`-style) renderings of each line.
    pub short_mla: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<i32>,
    pub geo: Option<Geocode>,
}

impl AddressDetail {
    /// The canonical backend document path for this address.
    #[must_use]
    pub fn document_id(&self) -> String {
        format!("/addresses/{}", self.pid)
    }
}

/// A cached upstream package-manifest response: body, headers, and the
/// instant it was cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifestCacheEntry {
    pub body: String,
    pub headers: std::collections::BTreeMap<String, String>,
    pub cached_at: DateTime<Utc>,
}

/// State scoped to one download attempt; destroyed on success,
/// unrecoverable failure, or corruption detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchState {
    pub destination: PathBuf,
    pub expected_size: Option<u64>,
    pub bytes_on_disk: u64,
    pub retry_attempt: u32,
}

/// A single ranked autocomplete result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub pid: String,
    pub sla: String,
    pub score: f32,
}

/// A paginated, ranked result set from the query composer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub items: Vec<SearchHit>,
    pub total: u64,
}

/// Trait for reporting progress from long-running operations.
///
/// Implementations must be `Send + Sync` to support use across spawned
/// tokio tasks and `Arc`-based sharing. Mirrors the fetcher's progress
/// contract: bytes-downloaded, total, rate, ETA, percent, resume state,
/// and retry attempt are all expressed as plain `set_*`/`inc` calls
/// rather than a bespoke event type, so a single implementation (e.g.
/// an `indicatif` progress bar) covers the fetcher, the CSV driver, and
/// the bulk index sink alike.
pub trait ProgressCallback: Send + Sync {
    /// Set the total expected units of work (enables percentage/ETA).
    fn set_total(&self, total: u64);

    /// Set the current position (absolute, not delta).
    fn set_position(&self, pos: u64);

    /// Advance progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Update the message displayed alongside the progress indicator.
    fn set_message(&self, msg: String);

    /// Mark progress as complete with a final message.
    fn finish(&self, msg: String);

    /// Mark progress as complete and remove the progress indicator.
    fn finish_and_clear(&self);
}

/// A no-op [`ProgressCallback`] for callers that don't need visual
/// progress reporting (tests, headless runs).
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

/// Returns a shared [`NullProgress`] instance for convenient use.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_matches_spec_shape() {
        let addr = AddressDetail {
            pid: "GANSW716635811".to_string(),
            structured: StructuredAddress {
                building_name: None,
                flat: None,
                level: None,
                number: NumberDetail::default(),
                street: StreetDetail::default(),
                locality: "BARANGAROO".to_string(),
                state: Region::Nsw,
                postcode: "2000".to_string(),
                lot: None,
            },
            sla: String::new(),
            ssla: String::new(),
            mla: vec![],
            short_mla: vec![],
            confidence: None,
            geo: None,
        };
        assert_eq!(addr.document_id(), "/addresses/GANSW716635811");
    }

    #[test]
    fn region_round_trips_through_strum() {
        assert_eq!(Region::Nsw.to_string(), "NSW");
        assert_eq!("NSW".parse::<Region>().unwrap(), Region::Nsw);
        assert!("ZZZ".parse::<Region>().is_err());
    }

    #[test]
    fn authority_table_all_has_nine_entries() {
        assert_eq!(AuthorityTable::ALL.len(), 9);
        assert_eq!(AuthorityTable::SYNONYM_SOURCES.len(), 4);
    }
}
