use crate::error::{Error, ExtractionError, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::shared::resolve_entry_path;

/// Archive extractor for ZIP files
pub struct ZipExtractor;

impl ZipExtractor {
    /// Archives directly inside `dir` whose extension is in `extensions`, sorted by name
    pub fn detect_archives(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
        debug!(?dir, "detecting archives");

        let mut archives = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && super::is_archive(&path, extensions) {
                archives.push(path);
            }
        }
        archives.sort();

        debug!("found {} archive(s)", archives.len());
        Ok(archives)
    }

    /// Extract a ZIP archive into `dest_path`
    ///
    /// Every entry name is checked before anything is written; one entry
    /// resolving outside `dest_path` aborts the whole archive.
    pub fn extract(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
        debug!(?archive_path, ?dest_path, "attempting ZIP extraction");

        let file = std::fs::File::open(archive_path).map_err(|e| failed(archive_path, e))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| failed(archive_path, e))?;

        let mut targets = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i).map_err(|e| failed(archive_path, e))?;
            let name = entry.name().to_string();
            let target = resolve_entry_path(dest_path, &name).ok_or_else(|| {
                Error::Extraction(ExtractionError::IllegalPath {
                    archive: archive_path.to_path_buf(),
                    entry: name.clone(),
                })
            })?;
            targets.push((target, entry.is_dir()));
        }

        std::fs::create_dir_all(dest_path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to create destination '{}': {}", dest_path.display(), e),
            ))
        })?;

        let mut extracted_files = Vec::new();
        for (i, (target, is_dir)) in targets.into_iter().enumerate() {
            if is_dir {
                std::fs::create_dir_all(&target)?;
                continue;
            }
            let entry = archive.by_index(i).map_err(|e| failed(archive_path, e))?;
            Self::write_entry(entry, &target, archive_path)?;
            extracted_files.push(target);
        }

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "ZIP extraction successful"
        );
        Ok(extracted_files)
    }

    fn write_entry(mut entry: impl Read, target: &Path, archive_path: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // File::create truncates, so re-extraction overwrites
        let mut outfile = std::fs::File::create(target)?;
        std::io::copy(&mut entry, &mut outfile).map_err(|e| failed(archive_path, e))?;
        Ok(())
    }
}

fn failed(archive: &Path, reason: impl std::fmt::Display) -> Error {
    Error::Extraction(ExtractionError::Failed {
        archive: archive.to_path_buf(),
        reason: reason.to_string(),
    })
}
