#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! File-backed package-manifest cache with tiered freshness.
//!
//! Caches the upstream G-NAF package manifest response (body + headers)
//! keyed by URL, so a re-run of the orchestrator doesn't re-fetch the
//! registry entry on every invocation. Three tiers: fresh (≤1 day,
//! returned without a network call), stale (1-30 days, a network fetch
//! is attempted and falls back to the cached body on failure), expired
//! (≥30 days, treated as absent).
//!
//! Grounded on `database::geocode_cache` (a persistent, keyed cache
//! with an `open`/`open_default` pair and a lookup/insert API),
//! generalized from a `DuckDB`-backed coordinate cache to an
//! `rmp-serde`-serialized map persisted at `target/keyv-file.msgpack`,
//! and on `database::paths` for the directory-resolution convention.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use addresskit_models::PackageManifestCacheEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cache entry is fresh for this long before a network re-fetch is
/// even attempted.
pub const FRESH_WINDOW: chrono::Duration = chrono::Duration::days(1);

/// A cache entry older than this is treated as entirely absent.
pub const EXPIRED_WINDOW: chrono::Duration = chrono::Duration::days(30);

/// Errors from the manifest cache.
#[derive(Debug, thiserror::Error)]
pub enum ManifestCacheError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to decode cache at {path}: {source}")]
    Decode {
        path: String,
        source: rmp_serde::decode::Error,
    },

    #[error("failed to encode cache entry: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

/// The freshness tier of a lookup result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// `age <= 1 day`: safe to use without attempting a network fetch.
    Fresh,
    /// `1 day < age < 30 days`: usable only because a network fetch failed.
    Stale,
}

/// The outcome of a [`ManifestCache::get_or_fetch`] call.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub entry: PackageManifestCacheEntry,
    pub freshness: Freshness,
}

/// On-disk representation: a flat map from URL to cache entry,
/// `rmp-serde`-encoded as a whole (the cache is small — one row per
/// distinct manifest URL the orchestrator has ever fetched).
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    entries: BTreeMap<String, PackageManifestCacheEntry>,
}

/// A persistent, file-backed cache of package-manifest responses, keyed
/// by URL. Single-writer (the ingestion process); safe to share via
/// `&mut` within one process, not across processes.
pub struct ManifestCache {
    path: PathBuf,
    file: CacheFile,
}

impl ManifestCache {
    /// Opens (or creates) the cache at `path`, loading any existing
    /// entries from disk. A missing or corrupt file is treated as an
    /// empty cache rather than an error — the cache is a convenience,
    /// not a source of truth.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestCacheError::Io`] only if the parent directory
    /// cannot be created.
    pub fn open(path: &Path) -> Result<Self, ManifestCacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ManifestCacheError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let file = match std::fs::read(path) {
            Ok(bytes) => rmp_serde::from_slice(&bytes).unwrap_or_else(|e| {
                log::warn!("manifest cache at {} is corrupt, starting empty: {e}", path.display());
                CacheFile::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheFile::default(),
            Err(e) => {
                return Err(ManifestCacheError::Io {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Opens the cache at its default location
    /// (`target/keyv-file.msgpack`, relative to the current directory).
    ///
    /// # Errors
    ///
    /// Returns [`ManifestCacheError::Io`] only if the parent directory
    /// cannot be created.
    pub fn open_default() -> Result<Self, ManifestCacheError> {
        Self::open(&default_path())
    }

    /// Looks up `url` without regard to freshness, returning the raw
    /// cached entry and its age if present.
    #[must_use]
    pub fn peek(&self, url: &str) -> Option<(&PackageManifestCacheEntry, chrono::Duration)> {
        let entry = self.file.entries.get(url)?;
        Some((entry, Utc::now() - entry.cached_at))
    }

    /// Classifies a cached entry's age into the three freshness tiers.
    #[must_use]
    pub fn classify(age: chrono::Duration) -> Option<Freshness> {
        if age <= FRESH_WINDOW {
            Some(Freshness::Fresh)
        } else if age < EXPIRED_WINDOW {
            Some(Freshness::Stale)
        } else {
            None
        }
    }

    /// Inserts or replaces the cached entry for `url`, stamped with the
    /// current time, and persists the whole cache to disk.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestCacheError`] if the cache cannot be
    /// re-serialized or written.
    pub fn put(&mut self, url: &str, body: String, headers: BTreeMap<String, String>) -> Result<(), ManifestCacheError> {
        self.file.entries.insert(
            url.to_string(),
            PackageManifestCacheEntry {
                body,
                headers,
                cached_at: Utc::now(),
            },
        );
        self.persist()
    }

    fn persist(&self) -> Result<(), ManifestCacheError> {
        let bytes = rmp_serde::to_vec(&self.file)?;
        std::fs::write(&self.path, bytes).map_err(|e| ManifestCacheError::Io {
            path: self.path.display().to_string(),
            source: e,
        })
    }
}

/// The default manifest-cache path.
#[must_use]
pub fn default_path() -> PathBuf {
    PathBuf::from("target/keyv-file.msgpack")
}

/// Errors from [`fetch_manifest`]: a network fetch failed and no usable
/// cached fallback existed (expired, or never cached).
#[derive(Debug, thiserror::Error)]
pub enum FetchManifestError {
    #[error("manifest fetch failed and no usable cache entry exists for {url}: {source}")]
    NoFallback { url: String, source: reqwest::Error },

    #[error(transparent)]
    Cache(#[from] ManifestCacheError),
}

/// Resolves the package manifest body at `url`, applying the three-tier
/// freshness policy:
///
/// - cached and fresh (≤1 day): returned without a network call.
/// - cached and stale (1-30 days): a network fetch is attempted; on
///   success the cache is refreshed, on failure the stale body is
///   returned with a staleness warning logged.
/// - cached and expired (≥30 days) or absent: treated as absent; a
///   failed network fetch surfaces the network error.
///
/// # Errors
///
/// Returns [`FetchManifestError`] if the network fetch fails and no
/// fresh-enough cached fallback exists.
pub async fn fetch_manifest(
    client: &reqwest::Client,
    cache: &mut ManifestCache,
    url: &str,
) -> Result<String, FetchManifestError> {
    if let Some((entry, age)) = cache.peek(url) {
        if matches!(ManifestCache::classify(age), Some(Freshness::Fresh)) {
            log::debug!("manifest cache hit (fresh, age {age}) for {url}");
            return Ok(entry.body.clone());
        }
    }

    match client.get(url).send().await.and_then(reqwest::Response::error_for_status) {
        Ok(response) => {
            let headers = response
                .headers()
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
                .collect();
            let body = response.text().await.map_err(|e| FetchManifestError::NoFallback {
                url: url.to_string(),
                source: e,
            })?;
            cache.put(url, body.clone(), headers)?;
            Ok(body)
        }
        Err(network_err) => {
            let Some((entry, age)) = cache.peek(url) else {
                return Err(FetchManifestError::NoFallback {
                    url: url.to_string(),
                    source: network_err,
                });
            };
            match ManifestCache::classify(age) {
                Some(Freshness::Fresh | Freshness::Stale) => {
                    log::warn!("manifest fetch for {url} failed, serving stale cache (age {age}): {network_err}");
                    Ok(entry.body.clone())
                }
                None => Err(FetchManifestError::NoFallback {
                    url: url.to_string(),
                    source: network_err,
                }),
            }
        }
    }
}

/// A generic, short-TTL cache for raw HTTP responses keyed by request
/// URL — a second, simpler cache alongside [`ManifestCache`].
/// Transparently avoids re-downloading identical small resources (e.g.
/// repeated manifest reads within one process run). Distinct from
/// [`ManifestCache`]: this cache has no staleness-fallback semantics,
/// only a flat expiry.
pub struct HttpResponseCache {
    path: PathBuf,
    entries: BTreeMap<String, (DateTime<Utc>, Vec<u8>)>,
    ttl: chrono::Duration,
}

impl HttpResponseCache {
    /// Opens the cache at `path` with the given time-to-live per entry.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestCacheError::Io`] only if the parent directory
    /// cannot be created.
    pub fn open(path: &Path, ttl: chrono::Duration) -> Result<Self, ManifestCacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ManifestCacheError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let entries = match std::fs::read(path) {
            Ok(bytes) => rmp_serde::from_slice(&bytes).unwrap_or_default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(ManifestCacheError::Io {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries,
            ttl,
        })
    }

    /// Opens the cache at its default location
    /// (`target/gnaf-http-cache.msgpack`).
    ///
    /// # Errors
    ///
    /// Returns [`ManifestCacheError::Io`] only if the parent directory
    /// cannot be created.
    pub fn open_default(ttl: chrono::Duration) -> Result<Self, ManifestCacheError> {
        Self::open(&PathBuf::from("target/gnaf-http-cache.msgpack"), ttl)
    }

    /// Returns the cached body for `url` if present and within `ttl`.
    #[must_use]
    pub fn get(&self, url: &str) -> Option<&[u8]> {
        let (cached_at, body) = self.entries.get(url)?;
        if Utc::now() - *cached_at <= self.ttl {
            Some(body.as_slice())
        } else {
            None
        }
    }

    /// Inserts `body` for `url`, stamped with the current time, and
    /// persists the cache to disk.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestCacheError`] if the cache cannot be written.
    pub fn put(&mut self, url: &str, body: Vec<u8>) -> Result<(), ManifestCacheError> {
        self.entries.insert(url.to_string(), (Utc::now(), body));
        let bytes = rmp_serde::to_vec(&self.entries)?;
        std::fs::write(&self.path, bytes).map_err(|e| ManifestCacheError::Io {
            path: self.path.display().to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("addresskit_manifest_test_{name}_{}.msgpack", std::process::id()))
    }

    #[test]
    fn fresh_window_boundary_is_inclusive() {
        assert_eq!(
            ManifestCache::classify(FRESH_WINDOW - chrono::Duration::milliseconds(1)),
            Some(Freshness::Fresh)
        );
        assert_eq!(
            ManifestCache::classify(FRESH_WINDOW + chrono::Duration::milliseconds(1)),
            Some(Freshness::Stale)
        );
    }

    #[test]
    fn expired_window_treats_entry_as_absent() {
        assert_eq!(
            ManifestCache::classify(EXPIRED_WINDOW + chrono::Duration::milliseconds(1)),
            None
        );
        assert_eq!(
            ManifestCache::classify(EXPIRED_WINDOW - chrono::Duration::milliseconds(1)),
            Some(Freshness::Stale)
        );
    }

    #[test]
    fn put_then_peek_round_trips() {
        let path = tmp_path("roundtrip");
        let _ = std::fs::remove_file(&path);

        let mut cache = ManifestCache::open(&path).unwrap();
        cache
            .put("https://example.org/manifest.json", "{}".to_string(), BTreeMap::new())
            .unwrap();

        let (entry, age) = cache.peek("https://example.org/manifest.json").unwrap();
        assert_eq!(entry.body, "{}");
        assert!(age < chrono::Duration::seconds(5));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reopening_loads_persisted_entries() {
        let path = tmp_path("persist");
        let _ = std::fs::remove_file(&path);

        {
            let mut cache = ManifestCache::open(&path).unwrap();
            cache
                .put("https://example.org/manifest.json", "body".to_string(), BTreeMap::new())
                .unwrap();
        }

        let reopened = ManifestCache::open(&path).unwrap();
        assert!(reopened.peek("https://example.org/manifest.json").is_some());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn http_response_cache_expires_after_ttl() {
        let path = tmp_path("http");
        let _ = std::fs::remove_file(&path);

        let mut cache = HttpResponseCache::open(&path, chrono::Duration::zero()).unwrap();
        cache.put("https://example.org/small.json", b"hi".to_vec()).unwrap();

        // TTL of zero: anything but an instantaneous re-read is expired.
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(cache.get("https://example.org/small.json").is_none());

        let _ = std::fs::remove_file(&path);
    }
}
