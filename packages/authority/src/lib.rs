#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Authority-code tables: constant-time `code -> name` lookups.
//!
//! Loads the nine G-NAF authority-code tables into in-memory maps and
//! produces the synonym list consumed by the search backend's analyser.
//!
//! Grounded on `geocoder_index::synonyms` (static `BTreeMap<&str, &str>`
//! tables, `expand_token` lookup helper), generalized from two
//! hard-coded tables to nine tables loaded at runtime from
//! pipe-separated G-NAF files via `addresskit_csv`.

use std::collections::BTreeMap;
use std::path::Path;

use addresskit_csv::ChunkConfig;
use addresskit_models::{AuthorityCode, AuthorityTable};
use serde::Deserialize;

/// Errors loading an authority-code table.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// A single raw row from an authority-code file: `CODE|NAME|...`.
#[derive(Debug, Deserialize)]
struct AuthorityRow {
    #[serde(rename = "CODE")]
    code: String,
    #[serde(rename = "NAME")]
    name: String,
}

/// The nine loaded authority-code tables, built once per ingestion run.
///
/// Constructed eagerly during orchestration and passed by reference to
/// the mapper — no global, no lazy wiring.
#[derive(Debug, Default)]
pub struct AuthorityIndex {
    tables: BTreeMap<AuthorityTable, BTreeMap<String, String>>,
}

impl AuthorityIndex {
    /// An empty index, as it exists before loading (or after a reset
    /// between ingestion runs).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads one authority table from a pipe-separated file at `path`,
    /// replacing any previously loaded table of the same kind.
    ///
    /// `chunk_bytes` is the source-bytes-per-callback budget, threaded
    /// from `ADDRESSKIT_LOADING_CHUNK_SIZE` by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError`] if the file cannot be opened. Per-row
    /// parse failures are logged and skipped, never fatal.
    pub async fn load_table(
        &mut self,
        table: AuthorityTable,
        path: &Path,
        chunk_bytes: u64,
    ) -> Result<u64, AuthorityError> {
        let mut loaded = BTreeMap::new();
        let config = ChunkConfig::pipe_separated_with_bytes(chunk_bytes);
        let label = table.as_ref();

        let summary = addresskit_csv::drive_path::<AuthorityRow, _, _>(path, &config, label, |rows| {
            for row in rows {
                loaded.insert(row.code, row.name);
            }
            std::future::ready(())
        })
        .await
        .map_err(|e| AuthorityError::Io {
            path: path.display().to_string(),
            source: match e {
                addresskit_csv::CsvError::Io { source, .. } => source,
            },
        })?;

        log::info!("[{label}] loaded {} codes", loaded.len());
        self.tables.insert(table, loaded);
        Ok(summary.rows_parsed)
    }

    /// Resolves `code` against `table`. Returns `None` if the table has
    /// not been loaded or the code is unknown (the caller falls back to
    /// the raw code).
    #[must_use]
    pub fn resolve(&self, table: AuthorityTable, code: &str) -> Option<&str> {
        self.tables.get(&table)?.get(code).map(String::as_str)
    }

    /// Resolves `code` against `table`, logging a diagnostic and falling
    /// back to the raw code itself when unresolved (never fatal).
    #[must_use]
    pub fn resolve_or_raw(&self, table: AuthorityTable, code: &str) -> String {
        match self.resolve(table, code) {
            Some(name) => name.to_string(),
            None => {
                log::debug!("unresolved {table} code: {code}");
                code.to_string()
            }
        }
    }

    /// Resets the index (a new quarterly release may extend tables).
    pub fn reset(&mut self) {
        self.tables.clear();
    }

    /// The flattened, deduplicated synonym list for the search backend's
    /// synonym-expansion analyser, drawn from street-type, flat-type,
    /// level-type, and street-suffix tables.
    #[must_use]
    pub fn synonym_list(&self) -> Vec<AuthorityCode> {
        let mut seen = std::collections::BTreeSet::new();
        let mut synonyms = Vec::new();

        for table in AuthorityTable::SYNONYM_SOURCES {
            let Some(entries) = self.tables.get(&table) else {
                continue;
            };
            for (code, name) in entries {
                let key = (code.clone(), name.clone());
                if seen.insert(key) {
                    synonyms.push(AuthorityCode {
                        code: code.clone(),
                        name: name.clone(),
                    });
                }
            }
        }

        synonyms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_table(dir: &Path, name: &str, rows: &[(&str, &str)]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut body = "CODE|NAME\n".to_string();
        for (code, name) in rows {
            body.push_str(&format!("{code}|{name}\n"));
        }
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn resolves_loaded_codes_and_falls_back_to_raw() {
        let tmp = std::env::temp_dir().join("addresskit_authority_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        let path = write_table(&tmp, "street_type_aut.psv", &[("AV", "AVENUE"), ("ST", "STREET")]);

        let mut index = AuthorityIndex::new();
        index
            .load_table(AuthorityTable::StreetType, &path, addresskit_csv::DEFAULT_CHUNK_BYTES)
            .await
            .unwrap();

        assert_eq!(index.resolve(AuthorityTable::StreetType, "AV"), Some("AVENUE"));
        assert_eq!(index.resolve_or_raw(AuthorityTable::StreetType, "XYZ"), "XYZ");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn reset_clears_all_tables() {
        let tmp = std::env::temp_dir().join("addresskit_authority_reset_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        let path = write_table(&tmp, "flat_type_aut.psv", &[("U", "UNIT")]);

        let mut index = AuthorityIndex::new();
        index
            .load_table(AuthorityTable::FlatType, &path, addresskit_csv::DEFAULT_CHUNK_BYTES)
            .await
            .unwrap();
        assert!(index.resolve(AuthorityTable::FlatType, "U").is_some());

        index.reset();
        assert!(index.resolve(AuthorityTable::FlatType, "U").is_none());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn synonym_list_is_deduplicated_across_tables() {
        let tmp = std::env::temp_dir().join("addresskit_authority_synonym_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        let street_path = write_table(&tmp, "street_type_aut.psv", &[("AV", "AVENUE")]);
        let flat_path = write_table(&tmp, "flat_type_aut.psv", &[("U", "UNIT")]);

        let mut index = AuthorityIndex::new();
        index
            .load_table(AuthorityTable::StreetType, &street_path, addresskit_csv::DEFAULT_CHUNK_BYTES)
            .await
            .unwrap();
        index
            .load_table(AuthorityTable::FlatType, &flat_path, addresskit_csv::DEFAULT_CHUNK_BYTES)
            .await
            .unwrap();
        index
            .load_table(AuthorityTable::LocalityClass, &flat_path, addresskit_csv::DEFAULT_CHUNK_BYTES)
            .await
            .unwrap();

        let synonyms = index.synonym_list();
        assert_eq!(synonyms.len(), 2);
    }
}
