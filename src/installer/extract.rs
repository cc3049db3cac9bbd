//! Archive extraction
//!
//! Unpacks downloaded ZIP archives into the `_Index` store. Entries whose
//! normalized path would land outside the target directory are refused.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while handling a package archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Archive could not be read as a ZIP
    #[error("Malformed archive {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// Entry escapes the extraction target
    #[error("Archive {path} contains an entry escaping the target directory: {entry}")]
    Traversal { path: PathBuf, entry: String },

    /// Filesystem failure during extraction
    #[error("IO error extracting {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Extract a ZIP archive into a directory
///
/// Directories are created before the files inside them. Entry names are
/// normalized through `enclosed_name`; anything that would resolve outside
/// `target_dir` (absolute paths, `..` components) is an error.
pub fn extract_zip(archive_path: &Path, target_dir: &Path) -> Result<(), ArchiveError> {
    let file = File::open(archive_path).map_err(|e| ArchiveError::Io {
        path: archive_path.to_path_buf(),
        source: e,
    })?;

    let mut archive = zip::ZipArchive::new(file).map_err(|e| ArchiveError::Malformed {
        path: archive_path.to_path_buf(),
        reason: e.to_string(),
    })?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| ArchiveError::Malformed {
            path: archive_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let entry_path = match entry.enclosed_name() {
            Some(p) => target_dir.join(p),
            None => {
                return Err(ArchiveError::Traversal {
                    path: archive_path.to_path_buf(),
                    entry: entry.name().to_string(),
                })
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path).map_err(|e| ArchiveError::Io {
                path: entry_path.clone(),
                source: e,
            })?;
        } else {
            if let Some(parent) = entry_path.parent() {
                fs::create_dir_all(parent).map_err(|e| ArchiveError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }

            let mut outfile = File::create(&entry_path).map_err(|e| ArchiveError::Io {
                path: entry_path.clone(),
                source: e,
            })?;
            io::copy(&mut entry, &mut outfile).map_err(|e| ArchiveError::Io {
                path: entry_path.clone(),
                source: e,
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, Option<&str>)]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        for (name, contents) in entries {
            match contents {
                Some(text) => {
                    writer.start_file(*name, options).unwrap();
                    writer.write_all(text.as_bytes()).unwrap();
                }
                None => {
                    writer.add_directory(*name, options).unwrap();
                }
            }
        }

        writer.finish().unwrap();
    }

    #[test]
    fn test_extract_simple_archive() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("pkg.zip");
        write_zip(
            &archive,
            &[
                ("src/", None),
                ("src/init.lua", Some("return {}")),
                ("README.md", Some("readme")),
            ],
        );

        let target = temp.path().join("out");
        fs::create_dir_all(&target).unwrap();
        extract_zip(&archive, &target).unwrap();

        assert!(target.join("src/init.lua").exists());
        assert!(target.join("README.md").exists());
        assert_eq!(
            fs::read_to_string(target.join("src/init.lua")).unwrap(),
            "return {}"
        );
    }

    #[test]
    fn test_traversal_entry_refused() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("evil.zip");
        write_zip(&archive, &[("../escape.lua", Some("boom"))]);

        let target = temp.path().join("out");
        fs::create_dir_all(&target).unwrap();

        let result = extract_zip(&archive, &target);
        assert!(matches!(result, Err(ArchiveError::Traversal { .. })));
        assert!(!temp.path().join("escape.lua").exists());
    }

    #[test]
    fn test_malformed_archive() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("junk.zip");
        fs::write(&archive, b"this is not a zip file").unwrap();

        let target = temp.path().join("out");
        fs::create_dir_all(&target).unwrap();

        let result = extract_zip(&archive, &target);
        assert!(matches!(result, Err(ArchiveError::Malformed { .. })));
    }
}
