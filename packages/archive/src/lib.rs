#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Streaming ZIP archive extractor.
//!
//! Unpacks the G-NAF release archive with per-entry skip logic (an
//! on-disk file whose size already matches the entry's declared size is
//! left alone) and atomic `incomplete/`-then-rename discipline so a
//! partially-extracted tree never masquerades as complete.
//!
//! Grounded on `archive::pack`/`unpack` (tmp-file-then-rename for
//! `.tar.zst`), generalized to a `zip::ZipArchive` reader with an added
//! size-comparison skip rule.

use std::fs::File;
use std::io::copy;
use std::path::{Path, PathBuf};

/// Counts from one [`extract`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtractSummary {
    pub total_entries: u64,
    pub extracted: u64,
    pub skipped: u64,
}

/// Errors from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive not found: {0}")]
    ArchiveNotFound(String),

    #[error("zip error in {path}: {source}")]
    Zip {
        path: String,
        source: zip::result::ZipError,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Extracts `archive_path` (a ZIP file) into `dest_dir`.
///
/// If `dest_dir` already exists, entries are checked against it directly
/// (a prior complete extraction makes this call a no-op, since every
/// entry's size already matches). Otherwise extraction happens into a
/// sibling `incomplete/` directory, which is renamed into place only
/// once every entry has been processed.
///
/// # Errors
///
/// Returns [`ArchiveError`] if the archive cannot be opened or an entry
/// cannot be read or written.
pub fn extract(archive_path: &Path, dest_dir: &Path) -> Result<ExtractSummary, ArchiveError> {
    if !archive_path.exists() {
        return Err(ArchiveError::ArchiveNotFound(
            archive_path.display().to_string(),
        ));
    }

    if dest_dir.exists() {
        log::info!(
            "{} already exists, checking entries for reuse",
            dest_dir.display()
        );
        return extract_into(archive_path, dest_dir);
    }

    let incomplete_dir = incomplete_path_for(dest_dir);
    std::fs::create_dir_all(&incomplete_dir).map_err(|e| ArchiveError::Io {
        path: incomplete_dir.display().to_string(),
        source: e,
    })?;

    let summary = extract_into(archive_path, &incomplete_dir)?;

    std::fs::rename(&incomplete_dir, dest_dir).map_err(|e| ArchiveError::Io {
        path: dest_dir.display().to_string(),
        source: e,
    })?;

    log::info!(
        "extracted {} entries ({} skipped) -> {}",
        summary.extracted,
        summary.skipped,
        dest_dir.display()
    );

    Ok(summary)
}

/// The sibling `incomplete/` directory used while extracting.
#[must_use]
pub fn incomplete_path_for(dest_dir: &Path) -> PathBuf {
    let name = dest_dir
        .file_name()
        .map_or_else(|| "archive".to_string(), |n| n.to_string_lossy().to_string());
    dest_dir.with_file_name(format!("incomplete-{name}"))
}

fn extract_into(archive_path: &Path, target_dir: &Path) -> Result<ExtractSummary, ArchiveError> {
    let file = File::open(archive_path).map_err(|e| ArchiveError::Io {
        path: archive_path.display().to_string(),
        source: e,
    })?;

    let mut zip = zip::ZipArchive::new(file).map_err(|e| ArchiveError::Zip {
        path: archive_path.display().to_string(),
        source: e,
    })?;

    let mut summary = ExtractSummary {
        total_entries: zip.len() as u64,
        ..ExtractSummary::default()
    };

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| ArchiveError::Zip {
            path: archive_path.display().to_string(),
            source: e,
        })?;

        let Some(relative) = entry.enclosed_name() else {
            log::warn!("  skipping entry with unsafe path at index {i}");
            continue;
        };
        let out_path = target_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| ArchiveError::Io {
                path: out_path.display().to_string(),
                source: e,
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchiveError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        if out_path
            .metadata()
            .is_ok_and(|m| m.len() == entry.size())
        {
            summary.skipped += 1;
            continue;
        }

        let mut out_file = File::create(&out_path).map_err(|e| ArchiveError::Io {
            path: out_path.display().to_string(),
            source: e,
        })?;

        copy(&mut entry, &mut out_file).map_err(|e| ArchiveError::Io {
            path: out_path.display().to_string(),
            source: e,
        })?;

        summary.extracted += 1;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_test_zip(path: &Path) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        writer.start_file("address_detail.psv", options).unwrap();
        writer.write_all(b"ADDRESS_DETAIL_PID|...\n").unwrap();
        writer.start_file("nested/locality.psv", options).unwrap();
        writer.write_all(b"LOCALITY_PID|...\n").unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_fresh_archive_via_incomplete_dir() {
        let tmp = std::env::temp_dir().join("addresskit_archive_fresh_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        let archive_path = tmp.join("gnaf.zip");
        write_test_zip(&archive_path);

        let dest = tmp.join("extracted");
        let summary = extract(&archive_path, &dest).unwrap();

        assert_eq!(summary.extracted, 2);
        assert_eq!(summary.skipped, 0);
        assert!(dest.join("address_detail.psv").exists());
        assert!(dest.join("nested/locality.psv").exists());
        assert!(!incomplete_path_for(&dest).exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn second_extraction_is_a_no_op_when_sizes_match() {
        let tmp = std::env::temp_dir().join("addresskit_archive_reextract_test");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        let archive_path = tmp.join("gnaf.zip");
        write_test_zip(&archive_path);

        let dest = tmp.join("extracted");
        extract(&archive_path, &dest).unwrap();

        let summary = extract(&archive_path, &dest).unwrap();
        assert_eq!(summary.extracted, 0);
        assert_eq!(summary.skipped, 2);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_archive_is_an_error() {
        let tmp = std::env::temp_dir().join("addresskit_archive_missing_test");
        let result = extract(&tmp.join("nope.zip"), &tmp.join("out"));
        assert!(matches!(result, Err(ArchiveError::ArchiveNotFound(_))));
    }
}
