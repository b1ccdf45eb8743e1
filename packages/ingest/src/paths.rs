//! Persisted-state layout, as named constant-producing accessor
//! functions.
//!
//! Grounded on `crime_map_database::paths`
//! (`project_root`/`data_dir`/`shared_dir`-style accessor functions).

use std::path::{Path, PathBuf};

/// The sibling directory archive downloads and extractions land in
/// while incomplete, matching [`addresskit_fetch`]'s own resumable-file
/// semantics and [`addresskit_archive`]'s `incomplete-{name}` rename
/// discipline.
#[must_use]
pub fn incomplete_dir(gnaf_dir: &Path) -> PathBuf {
    gnaf_dir.join("incomplete")
}

/// Where the downloaded archive itself lands, once complete.
#[must_use]
pub fn archive_path(gnaf_dir: &Path, archive_basename: &str) -> PathBuf {
    gnaf_dir.join(archive_basename)
}

/// Where the archive is extracted to: the archive's basename with its
/// extension stripped.
#[must_use]
pub fn extracted_dir(gnaf_dir: &Path, archive_basename: &str) -> PathBuf {
    let stem = Path::new(archive_basename)
        .file_stem()
        .map_or_else(|| archive_basename.to_string(), |s| s.to_string_lossy().to_string());
    gnaf_dir.join(stem)
}

/// The G-NAF standard constituent-file tree lives under `Standard/` in
/// every quarterly release.
#[must_use]
pub fn standard_dir(extracted: &Path) -> PathBuf {
    extracted.join("Standard")
}

/// The authority-code table tree lives under `Authority Code/`.
#[must_use]
pub fn authority_code_dir(extracted: &Path) -> PathBuf {
    extracted.join("Authority Code")
}

/// The path to one region's constituent file, e.g.
/// `Standard/NSW_ADDRESS_DETAIL_psv.psv`.
#[must_use]
pub fn standard_file(extracted: &Path, region: &str, table: &str) -> PathBuf {
    standard_dir(extracted).join(format!("{region}_{table}_psv.psv"))
}

/// The path to one authority-code table file, e.g.
/// `Authority Code/Authority_Code_STREET_TYPE_AUT_psv.psv`.
#[must_use]
pub fn authority_code_file(extracted: &Path, table: &str) -> PathBuf {
    authority_code_dir(extracted).join(format!("Authority_Code_{table}_psv.psv"))
}

/// The summary file enumerating expected per-table row counts, bundled
/// alongside the standard tree in every release.
#[must_use]
pub fn load_summary_file(extracted: &Path) -> PathBuf {
    standard_dir(extracted).join("GNAF_LoadSummary_psv.psv")
}
