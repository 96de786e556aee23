use crate::config::ExtractionConfig;
use crate::error::Result;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use super::zip::ZipExtractor;

/// Check if a file is an archive based on its extension
///
/// # Arguments
/// * `path` - Path to the file to check
/// * `archive_extensions` - List of extensions to treat as archives (without dots)
pub fn is_archive(path: &Path, archive_extensions: &[String]) -> bool {
    if let Some(ext) = path.extension() {
        let ext_str = ext.to_string_lossy().to_lowercase();
        archive_extensions
            .iter()
            .any(|ae| ae.trim_start_matches('.').to_lowercase() == ext_str)
    } else {
        false
    }
}

/// Directory an archive is extracted into: its own path with the extension stripped
pub fn extraction_root(archive_path: &Path) -> PathBuf {
    archive_path.with_extension("")
}

/// Resolve an archive entry name to a path that is a strict descendant of `root`
///
/// The check is lexical: absolute names, drive prefixes and `..` components
/// that climb above `root` yield `None`, as does a name that resolves to
/// `root` itself. Backslashes are treated as separators.
pub fn resolve_entry_path(root: &Path, entry: &str) -> Option<PathBuf> {
    let normalized = entry.replace('\\', "/");
    let mut relative = PathBuf::new();
    let mut depth = 0usize;

    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => {
                relative.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                relative.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if depth == 0 {
        return None;
    }
    Some(root.join(relative))
}

/// Extract an archive, then any archives found inside it, up to the configured depth
///
/// Nested archives go into a sibling directory named after them. A nested
/// failure is logged and returned alongside the files; it does not undo the
/// outer extraction.
pub fn extract_recursive(
    archive_path: &Path,
    dest_path: &Path,
    config: &ExtractionConfig,
    current_depth: u32,
) -> Result<Extracted> {
    debug!(
        ?archive_path,
        current_depth,
        max_depth = config.max_recursion_depth,
        "extracting archive (depth {}/{})",
        current_depth,
        config.max_recursion_depth
    );

    let files = ZipExtractor::extract(archive_path, dest_path)?;
    let mut result = Extracted {
        files: files.clone(),
        nested_failures: Vec::new(),
    };

    if current_depth >= config.max_recursion_depth {
        return Ok(result);
    }

    for file in files
        .iter()
        .filter(|f| is_archive(f, &config.archive_extensions))
    {
        info!(?file, current_depth, "found nested archive, extracting recursively");
        let nested_dest = extraction_root(file);

        match extract_recursive(file, &nested_dest, config, current_depth + 1) {
            Ok(nested) => {
                result.files.extend(nested.files);
                result.nested_failures.extend(nested.nested_failures);
            }
            Err(e) => {
                warn!(?file, error = %e, "failed to extract nested archive, continuing with other files");
                result.nested_failures.push((file.clone(), e));
            }
        }
    }

    Ok(result)
}

/// Files produced by [`extract_recursive`]
#[derive(Debug)]
pub struct Extracted {
    /// Every file written, nested archives included
    pub files: Vec<PathBuf>,
    /// Nested archives that could not be extracted
    pub nested_failures: Vec<(PathBuf, crate::error::Error)>,
}
