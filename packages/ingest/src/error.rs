//! The orchestrator's aggregate error type.
//!
//! Mirrors `GeocoderIndexError` in spirit: one variant per component,
//! each wrapping that component's own `thiserror` type via `#[from]`.

/// Errors that abort an ingestion run outright. Per-row mapping errors
/// and per-code authority misses are handled (logged, skipped) inside
/// the region/file loop and never reach here.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("resolving the package manifest: {0}")]
    Manifest(#[from] addresskit_manifest::FetchManifestError),

    #[error("the package manifest carried no active zip resource")]
    NoActiveResource,

    #[error("fetching the archive: {0}")]
    Download(#[from] addresskit_fetch::DownloadError),

    #[error("extracting the archive: {0}")]
    Archive(#[from] addresskit_archive::ArchiveError),

    #[error("loading authority tables: {0}")]
    Authority(#[from] addresskit_authority::AuthorityError),

    #[error("streaming a constituent file: {0}")]
    Csv(#[from] addresskit_csv::CsvError),

    #[error("submitting to the search backend: {0}")]
    Submit(#[from] addresskit_index::SubmitError),

    #[error("backend request failed: {0}")]
    Backend(#[from] addresskit_index::BulkError),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
