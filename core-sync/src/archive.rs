//! Zip extraction shared by the download pipeline and backup restore.
//!
//! Entries are only ever written below the target directory: names are
//! resolved through [`ZipFile::enclosed_name`](zip::read::ZipFile::enclosed_name)
//! and anything that would escape (absolute paths, `..` components) fails the
//! whole extraction.

use crate::error::{Result, SyncError};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

/// Extensions the pipeline knows how to unpack.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["zip"];

pub fn is_supported(extension: &str) -> bool {
    SUPPORTED_EXTENSIONS
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Unpacks `archive` into `target`, returning the number of files written.
///
/// Blocking; call from `spawn_blocking` inside async code. Partial output is
/// left in place on failure, cleanup belongs to the caller.
pub fn extract_zip(archive: &Path, target: &Path) -> Result<usize> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(BufReader::new(file))
        .map_err(|e| SyncError::extraction(target, format!("invalid archive: {}", e)))?;

    fs::create_dir_all(target)?;

    let mut written = 0;
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| SyncError::extraction(target, e))?;

        let relative = entry.enclosed_name().ok_or_else(|| {
            SyncError::extraction(target, format!("entry '{}' escapes the target", entry.name()))
        })?;
        let out_path = target.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| SyncError::extraction(&out_path, e))?;
        written += 1;
    }

    debug!(archive = %archive.display(), target = %target.display(), files = written, "Archive extracted");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_extract_nested_entries() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pkg.zip");
        write_zip(
            &archive,
            &[
                ("livery/", ""),
                ("livery/skin.ini", "[SKIN]"),
                ("livery/textures/car.dds", "DDS"),
            ],
        );

        let target = dir.path().join("out");
        assert_eq!(extract_zip(&archive, &target).unwrap(), 2);
        assert_eq!(fs::read(target.join("livery/skin.ini")).unwrap(), b"[SKIN]");
        assert_eq!(fs::read(target.join("livery/textures/car.dds")).unwrap(), b"DDS");
    }

    #[test]
    fn test_rejects_escaping_entry() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("../evil.txt", "x")]);

        let target = dir.path().join("out");
        let err = extract_zip(&archive, &target).unwrap_err();
        assert!(matches!(err, SyncError::Extraction { .. }));
        assert!(!dir.path().join("evil.txt").exists());
    }

    #[test]
    fn test_rejects_corrupt_archive() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();

        let err = extract_zip(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, SyncError::Extraction { .. }));
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported("zip"));
        assert!(is_supported("ZIP"));
        assert!(!is_supported("7z"));
        assert!(!is_supported(""));
    }
}
