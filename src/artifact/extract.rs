//! Zip extraction.

use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use super::{ArtifactError, ArtifactResult};

/// Extract a zip archive held in memory into `target`.
///
/// Entries whose names escape the target (absolute paths, `..`) are skipped.
/// Returns the number of files written.
pub fn extract_zip(data: &[u8], target: &Path) -> ArtifactResult<usize> {
    let mut archive =
        ZipArchive::new(Cursor::new(data)).map_err(|e| ArtifactError::Archive(e.to_string()))?;

    fs::create_dir_all(target)?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| ArtifactError::Archive(e.to_string()))?;

        let outpath = match entry.enclosed_name() {
            Some(path) => target.join(path),
            None => {
                tracing::warn!(entry = entry.name(), "Skipping zip entry with unsafe path");
                continue;
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&outpath)?;
        io::copy(&mut entry, &mut file)?;
        written += 1;
    }

    Ok(written)
}

/// Find the directory that holds the plugin sources after extraction.
///
/// Registry archives wrap everything in a single `<slug>/` folder; when that
/// is the case the folder is the content root, otherwise `dir` itself is.
pub fn content_root(dir: &Path) -> ArtifactResult<PathBuf> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;

    if entries.len() == 1 && entries[0].file_type()?.is_dir() {
        if let Some(only) = entries.pop() {
            return Ok(only.path());
        }
    }

    Ok(dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn build_zip(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extract_nested_files() {
        let temp = TempDir::new().unwrap();
        let data = build_zip(&[
            ("akismet/akismet.php", "<?php // main"),
            ("akismet/views/notice.php", "<?php // view"),
        ]);

        let written = extract_zip(&data, temp.path()).unwrap();

        assert_eq!(written, 2);
        assert!(temp.path().join("akismet/views/notice.php").exists());
        assert_eq!(content_root(temp.path()).unwrap(), temp.path().join("akismet"));
    }

    #[test]
    fn test_content_root_without_wrapper_folder() {
        let temp = TempDir::new().unwrap();
        let data = build_zip(&[("plugin.php", "<?php"), ("readme.txt", "readme")]);

        extract_zip(&data, temp.path()).unwrap();

        assert_eq!(content_root(temp.path()).unwrap(), temp.path());
    }

    #[test]
    fn test_unsafe_entries_are_skipped() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out");
        let data = build_zip(&[("../escape.php", "<?php"), ("ok.php", "<?php")]);

        let written = extract_zip(&data, &target).unwrap();

        assert_eq!(written, 1);
        assert!(!temp.path().join("escape.php").exists());
        assert!(target.join("ok.php").exists());
    }

    #[test]
    fn test_corrupt_archive() {
        let temp = TempDir::new().unwrap();
        let err = extract_zip(b"definitely not a zip", temp.path()).unwrap_err();
        assert!(matches!(err, ArtifactError::Archive(_)));
    }
}
