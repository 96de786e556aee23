//! Archive extraction
//!
//! Every archive in a directory is extracted into a sibling directory named
//! after it (extension stripped). Entry names are resolved lexically against
//! that root and an entry that would land outside it aborts the archive.
//! One archive failing never stops its siblings.

mod shared;
mod zip;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

// Re-exports
pub use shared::{Extracted, extract_recursive, extraction_root, is_archive, resolve_entry_path};
pub use zip::ZipExtractor;

use crate::config::ExtractionConfig;
use crate::error::{Error, ItemFailure, Result};
use crate::types::{Event, ExtractReport};
use std::path::Path;
use tracing::{info, warn};

/// Extract every archive directly inside `archive_dir`
///
/// Blocking; async callers should run it on `spawn_blocking`. Only a missing
/// or unreadable `archive_dir` is an `Err`.
pub fn extract_all(archive_dir: &Path, config: &ExtractionConfig) -> Result<ExtractReport> {
    extract_all_with(archive_dir, config, |_| {})
}

/// [`extract_all`], reporting each archive outcome to `on_event`
pub fn extract_all_with(
    archive_dir: &Path,
    config: &ExtractionConfig,
    mut on_event: impl FnMut(Event),
) -> Result<ExtractReport> {
    if !archive_dir.is_dir() {
        return Err(Error::DirectoryNotFound(archive_dir.to_path_buf()));
    }

    let archives = ZipExtractor::detect_archives(archive_dir, &config.archive_extensions)?;
    info!(?archive_dir, count = archives.len(), "extracting archives");

    let mut report = ExtractReport::default();
    for archive in archives {
        let dest = extraction_root(&archive);
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match extract_recursive(&archive, &dest, config, 0) {
            Ok(extracted) => {
                report.extracted += 1;
                for (nested, e) in extracted.nested_failures {
                    report
                        .failed
                        .push(ItemFailure::new(nested.to_string_lossy(), e));
                }
                on_event(Event::Extracted {
                    archive,
                    files: extracted.files.len(),
                });
            }
            Err(e) => {
                warn!(archive = %name, error = %e, "archive extraction aborted");
                on_event(Event::ExtractFailed {
                    archive,
                    error: e.to_string(),
                });
                report.failed.push(ItemFailure::new(name, e));
            }
        }
    }

    info!(
        extracted = report.extracted,
        failed = report.failed.len(),
        "extraction complete"
    );
    Ok(report)
}
