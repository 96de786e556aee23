//! Schema code generation
//!
//! Extracted TEOS schema files are handed to an external generator one at a
//! time. The generator runs with the schema's own directory as working
//! directory so relative `xsd:include` paths resolve. A failing file is
//! recorded and the run moves on.

use crate::config::SchemaGenConfig;
use crate::error::{Error, ItemFailure, Result};
use crate::types::SchemaGenReport;
use async_trait::async_trait;
use glob::Pattern;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Generates code from a single schema file
#[async_trait]
pub trait SchemaGenerator: Send + Sync {
    /// Generate code for `schema` into `output_dir`
    async fn generate(&self, schema: &Path, output_dir: &Path) -> Result<()>;

    /// Name of this generator
    fn name(&self) -> &'static str;
}

/// Generator backed by an external binary (`xsd2go` by default)
///
/// `{schema}` in the argument template becomes the schema's file name and
/// `{output}` the absolute output directory.
pub struct CliSchemaGenerator {
    binary_path: PathBuf,
    args: Vec<String>,
}

impl CliSchemaGenerator {
    /// Create a generator with an explicit binary path and argument template
    pub fn new(binary_path: PathBuf, args: Vec<String>) -> Self {
        Self { binary_path, args }
    }

    /// Attempt to find `tool_name` in PATH
    pub fn from_path(tool_name: &str, args: Vec<String>) -> Option<Self> {
        which::which(tool_name)
            .ok()
            .map(|path| Self::new(path, args))
    }

    /// Build from configuration: an explicit `tool_path`, else a PATH lookup
    pub fn from_config(config: &SchemaGenConfig) -> Option<Self> {
        match &config.tool_path {
            Some(path) => Some(Self::new(path.clone(), config.tool_args.clone())),
            None => Self::from_path(&config.tool_name, config.tool_args.clone()),
        }
    }

    fn render_args(&self, schema_name: &str, output_dir: &Path) -> Vec<String> {
        let output = output_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{schema}", schema_name)
                    .replace("{output}", &output)
            })
            .collect()
    }
}

#[async_trait]
impl SchemaGenerator for CliSchemaGenerator {
    async fn generate(&self, schema: &Path, output_dir: &Path) -> Result<()> {
        let schema_name = schema
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::ExternalTool(format!("not a file: {}", schema.display())))?;
        let working_dir = schema
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let output_dir = std::path::absolute(output_dir)?;
        tokio::fs::create_dir_all(&output_dir).await?;

        let args = self.render_args(&schema_name, &output_dir);
        debug!(binary = ?self.binary_path, ?args, ?working_dir, "running schema generator");

        let output = Command::new(&self.binary_path)
            .args(&args)
            .current_dir(working_dir)
            .output()
            .await
            .map_err(|e| {
                Error::ExternalTool(format!(
                    "Failed to execute {}: {}",
                    self.binary_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(Error::ExternalTool(format!(
                "{} exited with {} for {}: {}",
                self.binary_path.display(),
                output.status,
                schema.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cli"
    }
}

/// Generator used when no tool is available
pub struct NoOpSchemaGenerator;

#[async_trait]
impl SchemaGenerator for NoOpSchemaGenerator {
    async fn generate(&self, _schema: &Path, _output_dir: &Path) -> Result<()> {
        Err(Error::NotSupported(
            "schema code generation requires an external generator binary".into(),
        ))
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Compile a file name glob (`*`, `?`, `[...]`)
pub fn schema_pattern(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).map_err(|e| Error::Config {
        message: format!("invalid schema pattern '{}': {}", pattern, e),
        key: Some("schema_pattern".to_string()),
    })
}

/// Files under `root` whose file name matches `pattern`, sorted
pub fn find_schema_files(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::DirectoryNotFound(root.to_path_buf()));
    }
    let matcher = schema_pattern(pattern)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && matcher.matches(&entry.file_name().to_string_lossy()) {
            files.push(entry.into_path());
        }
    }
    debug!(?root, pattern, count = files.len(), "found schema files");
    Ok(files)
}

/// Run `generator` over each schema in turn; failures are logged and reported
pub async fn generate_all(
    generator: &dyn SchemaGenerator,
    schemas: &[PathBuf],
    output_dir: &Path,
) -> SchemaGenReport {
    let mut report = SchemaGenReport::default();

    for schema in schemas {
        match generator.generate(schema, output_dir).await {
            Ok(()) => {
                debug!(?schema, generator = generator.name(), "generated");
                report.generated.push(schema.clone());
            }
            Err(e) => {
                warn!(?schema, generator = generator.name(), error = %e, "schema generation failed");
                report
                    .failed
                    .push(ItemFailure::new(schema.to_string_lossy(), e));
            }
        }
    }

    info!(
        generated = report.generated.len(),
        failed = report.failed.len(),
        "schema generation complete"
    );
    report
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn pattern_matches_whole_name() {
        let pattern = schema_pattern("*.xsd").unwrap();
        assert!(pattern.matches("IRS990.xsd"));
        assert!(!pattern.matches("IRS990.xsd.bak"));
        assert!(!pattern.matches("IRS990xsd"));

        let pattern = schema_pattern("IRS990Schedule?.xsd").unwrap();
        assert!(pattern.matches("IRS990ScheduleA.xsd"));
        assert!(!pattern.matches("IRS990ScheduleAB.xsd"));
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let result = schema_pattern("IRS990Schedule[A-.xsd");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn find_schema_files_honors_character_classes() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        for name in ["IRS990ScheduleA.xsd", "IRS990ScheduleR.xsd", "IRS990ScheduleO.xsd", "IRS990ScheduleZ.xsd"] {
            std::fs::write(root.join(name), "").unwrap();
        }

        let files = find_schema_files(root, "IRS990Schedule[A-R].xsd").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            names,
            vec!["IRS990ScheduleA.xsd", "IRS990ScheduleO.xsd", "IRS990ScheduleR.xsd"]
        );
    }

    #[test]
    fn find_schema_files_walks_recursively() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("2024v5.0/TEGE/Common")).unwrap();
        std::fs::write(root.join("2024v5.0/TEGE/Common/efileTypes.xsd"), "").unwrap();
        std::fs::write(root.join("2024v5.0/IRS990.xsd"), "").unwrap();
        std::fs::write(root.join("2024v5.0/readme.txt"), "").unwrap();

        let files = find_schema_files(root, "*.xsd").unwrap();

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().unwrap() == "xsd"));
    }

    #[test]
    fn find_schema_files_missing_root() {
        let result = find_schema_files(Path::new("/nonexistent/990_xsd"), "*.xsd");
        assert!(matches!(result, Err(Error::DirectoryNotFound(_))));
    }

    #[test]
    fn args_are_substituted() {
        let generator = CliSchemaGenerator::new(
            PathBuf::from("xsd2go"),
            vec!["convert".into(), "{schema}".into(), "main".into(), "{output}".into()],
        );

        let args = generator.render_args("IRS990.xsd", Path::new("/out/templates"));

        assert_eq!(args, vec!["convert", "IRS990.xsd", "main", "/out/templates"]);
    }

    #[test]
    fn from_path_returns_none_for_nonexistent_binary() {
        assert!(CliSchemaGenerator::from_path("nonexistent-xsd2go-binary-xyz", vec![]).is_none());
    }

    #[tokio::test]
    async fn noop_generator_is_not_supported() {
        let result = NoOpSchemaGenerator
            .generate(Path::new("a.xsd"), Path::new("out"))
            .await;
        assert!(matches!(result, Err(Error::NotSupported(_))));
    }

    #[tokio::test]
    async fn invalid_binary_is_external_tool_error() {
        let temp = TempDir::new().unwrap();
        let schema = temp.path().join("a.xsd");
        std::fs::write(&schema, "").unwrap();
        let generator = CliSchemaGenerator::new(PathBuf::from("/nonexistent/path/to/xsd2go"), vec![]);

        let result = generator.generate(&schema, &temp.path().join("out")).await;

        match result {
            Err(Error::ExternalTool(msg)) => assert!(msg.contains("Failed to execute")),
            other => panic!("expected ExternalTool error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn generator_runs_in_schema_directory() {
        let temp = TempDir::new().unwrap();
        let schema_dir = temp.path().join("schemas");
        std::fs::create_dir_all(&schema_dir).unwrap();
        let schema = schema_dir.join("IRS990.xsd");
        std::fs::write(&schema, "<xsd:schema/>").unwrap();
        let out = temp.path().join("out");

        // `cp {schema} {output}` only works if the working directory is the schema's
        let generator = CliSchemaGenerator::new(
            which::which("cp").unwrap(),
            vec!["{schema}".into(), "{output}".into()],
        );
        generator.generate(&schema, &out).await.unwrap();

        assert!(out.join("IRS990.xsd").is_file());
    }

    #[tokio::test]
    async fn generate_all_continues_past_failures() {
        let schemas = vec![PathBuf::from("a.xsd"), PathBuf::from("b.xsd")];

        let report = generate_all(&NoOpSchemaGenerator, &schemas, Path::new("out")).await;

        assert!(report.generated.is_empty());
        assert_eq!(report.failed.len(), 2);
    }
}
