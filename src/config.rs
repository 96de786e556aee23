//! Configuration types for irs990-etl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Remote source settings (index pages, timeouts, bulk URL candidates)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Index page listing the Form 990 series archive downloads
    #[serde(default = "default_filings_index_url")]
    pub filings_index_url: String,

    /// Index page listing the TEOS schema archives
    #[serde(default = "default_schemas_index_url")]
    pub schemas_index_url: String,

    /// Substring a link target must contain to be treated as an archive (default: ".zip")
    #[serde(default = "default_archive_marker")]
    pub archive_marker: String,

    /// Per-request timeout (default: 600 seconds; bulk archives are large)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Base URL the bulk archive candidates are built from
    #[serde(default = "default_bulk_base_url")]
    pub bulk_base_url: String,

    /// First year of bulk archive candidates (default: 2019)
    #[serde(default = "default_bulk_start_year")]
    pub bulk_start_year: u16,

    /// Last year of bulk archive candidates, inclusive (default: 2025)
    #[serde(default = "default_bulk_end_year")]
    pub bulk_end_year: u16,

    /// Number of archive parts probed per year (default: 12)
    #[serde(default = "default_bulk_parts")]
    pub bulk_parts_per_year: u8,

    /// Merge the bulk candidates into the discovered filings links (default: false)
    #[serde(default)]
    pub include_bulk_candidates: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            filings_index_url: default_filings_index_url(),
            schemas_index_url: default_schemas_index_url(),
            archive_marker: default_archive_marker(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            bulk_base_url: default_bulk_base_url(),
            bulk_start_year: default_bulk_start_year(),
            bulk_end_year: default_bulk_end_year(),
            bulk_parts_per_year: default_bulk_parts(),
            include_bulk_candidates: false,
        }
    }
}

/// On-disk layout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory the filing archives are downloaded to and extracted in
    #[serde(default = "default_filings_dir")]
    pub filings_dir: PathBuf,

    /// Directory the schema archives are downloaded to and extracted in
    #[serde(default = "default_schemas_dir")]
    pub schemas_dir: PathBuf,

    /// Flattened CSV output path
    #[serde(default = "default_output_csv")]
    pub output_csv: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            filings_dir: default_filings_dir(),
            schemas_dir: default_schemas_dir(),
            output_csv: default_output_csv(),
        }
    }
}

/// Download behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum concurrent transfers (default: 4)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent(),
        }
    }
}

/// Archive extraction configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Maximum depth for nested archive extraction (default: 1)
    #[serde(default = "default_max_recursion")]
    pub max_recursion_depth: u32,

    /// File extensions to treat as archives
    #[serde(default = "default_archive_extensions")]
    pub archive_extensions: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: default_max_recursion(),
            archive_extensions: default_archive_extensions(),
        }
    }
}

/// Flatten engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlattenConfig {
    /// Explicit worker pool size; derived from hardware parallelism when None
    #[serde(default)]
    pub workers: Option<usize>,

    /// Workers per available CPU when `workers` is None (default: 2)
    #[serde(default = "default_worker_multiplier")]
    pub worker_multiplier: usize,

    /// Upper bound on the derived pool size (default: 12)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Extension of the documents to flatten (default: "xml")
    #[serde(default = "default_document_extension")]
    pub document_extension: String,

    /// Serialize unmapped paths into the AdditionalData column (default: false)
    #[serde(default)]
    pub include_additional_data: bool,

    /// Log progress every N processed documents (default: 1000)
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            workers: None,
            worker_multiplier: default_worker_multiplier(),
            max_workers: default_max_workers(),
            document_extension: default_document_extension(),
            include_additional_data: false,
            progress_interval: default_progress_interval(),
        }
    }
}

impl FlattenConfig {
    /// Effective pool size: explicit value, or a multiple of the available
    /// parallelism capped at `max_workers`. Never zero.
    pub fn pool_size(&self) -> usize {
        if let Some(workers) = self.workers {
            return workers.max(1);
        }
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        (cpus * self.worker_multiplier).clamp(1, self.max_workers.max(1))
    }
}

/// Where the schedule label and category discriminant sit inside a schema link
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Slash-delimited segment index holding the schedule label (default: 5)
    #[serde(default = "default_schedule_segment")]
    pub schedule_segment: usize,

    /// Character offset into the label's first hyphen segment that identifies the form category (default: 3)
    #[serde(default = "default_category_offset")]
    pub category_offset: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            schedule_segment: default_schedule_segment(),
            category_offset: default_category_offset(),
        }
    }
}

/// External schema code generator
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaGenConfig {
    /// Path to the generator executable (auto-detected from `tool_name` if None)
    #[serde(default)]
    pub tool_path: Option<PathBuf>,

    /// Executable name searched in PATH (default: "xsd2go")
    #[serde(default = "default_tool_name")]
    pub tool_name: String,

    /// Arguments; `{schema}` and `{output}` are substituted per file
    #[serde(default = "default_tool_args")]
    pub tool_args: Vec<String>,

    /// Directory generated code is written to
    #[serde(default = "default_generated_dir")]
    pub output_dir: PathBuf,

    /// File name glob selecting the schema files to generate from (default: "*.xsd")
    #[serde(default = "default_schema_pattern")]
    pub schema_pattern: String,
}

impl Default for SchemaGenConfig {
    fn default() -> Self {
        Self {
            tool_path: None,
            tool_name: default_tool_name(),
            tool_args: default_tool_args(),
            output_dir: default_generated_dir(),
            schema_pattern: default_schema_pattern(),
        }
    }
}

/// Main configuration for the pipeline
///
/// Every section has sensible defaults, so `Config::default()` mirrors the
/// IRS layout used in production (`./data/990_zips`, `./data/990_xsd`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote source settings
    #[serde(default)]
    pub source: SourceConfig,

    /// On-disk layout
    #[serde(default)]
    pub storage: StorageConfig,

    /// Download behavior
    #[serde(default)]
    pub download: DownloadConfig,

    /// Archive extraction
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Flatten engine
    #[serde(default)]
    pub flatten: FlattenConfig,

    /// Version ledger filename layout
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Schema code generator
    #[serde(default)]
    pub schema_gen: SchemaGenConfig,
}

impl Config {
    /// Load a JSON configuration file; missing keys fall back to defaults
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read config '{}': {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no operation can run with
    pub fn validate(&self) -> Result<()> {
        if self.source.archive_marker.is_empty() {
            return Err(config_error("archive marker must not be empty", "archive_marker"));
        }
        if self.download.max_concurrent_downloads == 0 {
            return Err(config_error(
                "at least one concurrent download is required",
                "max_concurrent_downloads",
            ));
        }
        if self.flatten.workers == Some(0) || self.flatten.max_workers == 0 {
            return Err(config_error("worker pool size must be positive", "workers"));
        }
        if self.source.bulk_start_year > self.source.bulk_end_year {
            return Err(config_error(
                "bulk_start_year is after bulk_end_year",
                "bulk_start_year",
            ));
        }
        if self.extraction.archive_extensions.is_empty() {
            return Err(config_error(
                "at least one archive extension is required",
                "archive_extensions",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn default_filings_index_url() -> String {
    "https://www.irs.gov/charities-non-profits/form-990-series-downloads".to_string()
}

fn default_schemas_index_url() -> String {
    "https://www.irs.gov/charities-non-profits/tax-exempt-organization-search-teos-schemas"
        .to_string()
}

fn default_archive_marker() -> String {
    ".zip".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_user_agent() -> String {
    concat!("irs990-etl/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_bulk_base_url() -> String {
    "https://apps.irs.gov/pub/epostcard/990/xml/".to_string()
}

fn default_bulk_start_year() -> u16 {
    2019
}

fn default_bulk_end_year() -> u16 {
    2025
}

fn default_bulk_parts() -> u8 {
    12
}

fn default_filings_dir() -> PathBuf {
    PathBuf::from("./data/990_zips")
}

fn default_schemas_dir() -> PathBuf {
    PathBuf::from("./data/990_xsd")
}

fn default_output_csv() -> PathBuf {
    PathBuf::from("./irs_990_data.csv")
}

fn default_max_concurrent() -> usize {
    4
}

fn default_max_recursion() -> u32 {
    1
}

fn default_archive_extensions() -> Vec<String> {
    vec!["zip".to_string()]
}

fn default_worker_multiplier() -> usize {
    2
}

fn default_max_workers() -> usize {
    12
}

fn default_document_extension() -> String {
    "xml".to_string()
}

fn default_progress_interval() -> u64 {
    1000
}

fn default_schedule_segment() -> usize {
    5
}

fn default_category_offset() -> usize {
    3
}

fn default_tool_name() -> String {
    "xsd2go".to_string()
}

fn default_tool_args() -> Vec<String> {
    vec![
        "convert".to_string(),
        "{schema}".to_string(),
        "main".to_string(),
        "{output}".to_string(),
    ]
}

fn default_generated_dir() -> PathBuf {
    PathBuf::from("./data/990_xsd/output/generated_templates")
}

fn default_schema_pattern() -> String {
    "*.xsd".to_string()
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
