use crate::config::ExtractionConfig;
use crate::error::{Error, ExtractionError};
use crate::extraction::*;
use crate::types::Event;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create a ZIP archive containing the given entries; names ending in '/' are directories
fn create_zip_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        if let Some(dir) = name.strip_suffix('/') {
            writer.add_directory(dir, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            std::io::Write::write_all(&mut writer, content).unwrap();
        }
    }
    writer.finish().unwrap();
}

/// outer.zip holding surface.xml and inner.zip (which holds deep.xml)
fn create_nested_zip(dir: &Path) -> PathBuf {
    let inner_zip_path = dir.join("inner.zip");
    create_zip_archive(&inner_zip_path, &[("deep.xml", b"<Return/>")]);
    let inner_bytes = std::fs::read(&inner_zip_path).unwrap();
    std::fs::remove_file(&inner_zip_path).unwrap();

    let outer_zip_path = dir.join("outer.zip");
    create_zip_archive(
        &outer_zip_path,
        &[("surface.xml", b"<Return/>"), ("inner.zip", &inner_bytes)],
    );
    outer_zip_path
}

fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(root).unwrap().to_path_buf())
        .collect();
    files.sort();
    files
}

// ===========================================================================
// resolve_entry_path
// ===========================================================================

#[test]
fn resolve_entry_path_accepts_descendants() {
    let root = Path::new("/data/a");
    assert_eq!(
        resolve_entry_path(root, "2024/doc.xml"),
        Some(PathBuf::from("/data/a/2024/doc.xml"))
    );
    assert_eq!(
        resolve_entry_path(root, "./x/../doc.xml"),
        Some(PathBuf::from("/data/a/doc.xml"))
    );
}

#[test]
fn resolve_entry_path_rejects_escapes() {
    let root = Path::new("/data/a");
    assert_eq!(resolve_entry_path(root, "../../evil"), None);
    assert_eq!(resolve_entry_path(root, "x/../../evil"), None);
    assert_eq!(resolve_entry_path(root, "/etc/passwd"), None);
    assert_eq!(resolve_entry_path(root, "..\\..\\evil"), None);
}

#[test]
fn resolve_entry_path_rejects_root_itself() {
    let root = Path::new("/data/a");
    assert_eq!(resolve_entry_path(root, ""), None);
    assert_eq!(resolve_entry_path(root, "./"), None);
    assert_eq!(resolve_entry_path(root, "x/.."), None);
}

#[test]
fn is_archive_is_case_insensitive() {
    let exts = vec!["zip".to_string()];
    assert!(is_archive(Path::new("a/B.ZIP"), &exts));
    assert!(!is_archive(Path::new("a/b.xml"), &exts));
    assert!(!is_archive(Path::new("a/zip"), &exts));
}

#[test]
fn extraction_root_strips_only_the_last_extension() {
    assert_eq!(
        extraction_root(Path::new("/d/990-2020v4.1.zip")),
        PathBuf::from("/d/990-2020v4.1")
    );
}

// ===========================================================================
// ZipExtractor
// ===========================================================================

#[test]
fn zip_extracts_files_and_directories() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("a.zip");
    create_zip_archive(
        &archive,
        &[
            ("docs/", b""),
            ("docs/one.xml", b"<a>1</a>"),
            ("empty/", b""),
            ("two.xml", b"<a>2</a>"),
        ],
    );
    let dest = temp.path().join("a");

    let files = ZipExtractor::extract(&archive, &dest).unwrap();

    assert_eq!(files.len(), 2);
    assert_eq!(std::fs::read(dest.join("docs/one.xml")).unwrap(), b"<a>1</a>");
    assert!(dest.join("empty").is_dir());
}

#[test]
fn zip_overwrites_existing_files() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("a.zip");
    create_zip_archive(&archive, &[("doc.xml", b"new")]);
    let dest = temp.path().join("a");
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(dest.join("doc.xml"), b"old and longer").unwrap();

    ZipExtractor::extract(&archive, &dest).unwrap();

    assert_eq!(std::fs::read(dest.join("doc.xml")).unwrap(), b"new");
}

#[test]
fn zip_with_escaping_entry_writes_nothing_outside_root() {
    let temp = TempDir::new().unwrap();
    let work = temp.path().join("work");
    std::fs::create_dir_all(&work).unwrap();
    let archive = work.join("evil.zip");
    create_zip_archive(&archive, &[("ok.xml", b"fine"), ("../../evil", b"pwned")]);
    let dest = work.join("evil");

    let result = ZipExtractor::extract(&archive, &dest);

    match result {
        Err(Error::Extraction(ExtractionError::IllegalPath { entry, .. })) => {
            assert_eq!(entry, "../../evil");
        }
        other => panic!("expected IllegalPath, got {other:?}"),
    }
    assert!(!temp.path().join("evil").exists());
    assert!(!work.join("evil").join("ok.xml").exists(), "archive must be rejected before writing");
}

#[test]
fn zip_rejects_corrupt_archive() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("bad.zip");
    std::fs::write(&archive, b"this is not a zip file").unwrap();

    let result = ZipExtractor::extract(&archive, &temp.path().join("bad"));

    assert!(matches!(
        result,
        Err(Error::Extraction(ExtractionError::Failed { .. }))
    ));
}

#[test]
fn detect_archives_is_sorted_and_filtered() {
    let temp = TempDir::new().unwrap();
    for name in ["b.zip", "a.zip", "notes.txt"] {
        std::fs::write(temp.path().join(name), b"x").unwrap();
    }
    std::fs::create_dir(temp.path().join("dir.zip")).unwrap();

    let found = ZipExtractor::detect_archives(temp.path(), &["zip".to_string()]).unwrap();

    let names: Vec<_> = found
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.zip", "b.zip"]);
}

// ===========================================================================
// extract_recursive
// ===========================================================================

#[test]
fn nested_archive_at_max_depth_is_left_alone() {
    let temp = TempDir::new().unwrap();
    let outer = create_nested_zip(temp.path());
    let config = ExtractionConfig {
        max_recursion_depth: 0,
        ..ExtractionConfig::default()
    };

    let extracted = extract_recursive(&outer, &temp.path().join("outer"), &config, 0).unwrap();

    assert_eq!(extracted.files.len(), 2);
    assert!(!temp.path().join("outer/inner").exists());
}

#[test]
fn nested_archive_is_extracted_into_sibling_directory() {
    let temp = TempDir::new().unwrap();
    let outer = create_nested_zip(temp.path());

    let extracted =
        extract_recursive(&outer, &temp.path().join("outer"), &ExtractionConfig::default(), 0)
            .unwrap();

    assert_eq!(extracted.files.len(), 3);
    assert!(extracted.nested_failures.is_empty());
    assert!(temp.path().join("outer/inner/deep.xml").is_file());
}

// ===========================================================================
// extract_all
// ===========================================================================

#[test]
fn extract_all_missing_directory_is_fatal() {
    let result = extract_all(Path::new("/nonexistent/990_zips"), &ExtractionConfig::default());
    assert!(matches!(result, Err(Error::DirectoryNotFound(_))));
}

#[test]
fn extract_all_continues_past_bad_archives() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    std::fs::write(dir.join("a_corrupt.zip"), b"garbage").unwrap();
    create_zip_archive(&dir.join("b_evil.zip"), &[("../../evil", b"x")]);
    create_zip_archive(&dir.join("c_good.zip"), &[("2024/doc.xml", b"<Return/>")]);

    let report = extract_all(dir, &ExtractionConfig::default()).unwrap();

    assert_eq!(report.extracted, 1);
    assert_eq!(report.failed.len(), 2);
    let failed: Vec<_> = report.failed.iter().map(|f| f.item.as_str()).collect();
    assert_eq!(failed, vec!["a_corrupt.zip", "b_evil.zip"]);
    assert_eq!(
        files_under(&dir.join("c_good")),
        vec![PathBuf::from("2024/doc.xml")]
    );
}

#[test]
fn extract_all_reports_events() {
    let temp = TempDir::new().unwrap();
    create_zip_archive(&temp.path().join("a.zip"), &[("x.xml", b"1"), ("y.xml", b"2")]);
    std::fs::write(temp.path().join("b.zip"), b"garbage").unwrap();

    let mut events = Vec::new();
    let _ = extract_all_with(temp.path(), &ExtractionConfig::default(), |e| events.push(e)).unwrap();

    assert!(matches!(events[0], Event::Extracted { files: 2, .. }));
    assert!(matches!(events[1], Event::ExtractFailed { .. }));
}

#[test]
fn extract_all_is_repeatable() {
    let temp = TempDir::new().unwrap();
    create_zip_archive(&temp.path().join("a.zip"), &[("x.xml", b"1")]);

    let first = extract_all(temp.path(), &ExtractionConfig::default()).unwrap();
    let second = extract_all(temp.path(), &ExtractionConfig::default()).unwrap();

    assert_eq!(first.extracted, 1);
    assert_eq!(second.extracted, 1);
    assert!(second.failed.is_empty());
}
