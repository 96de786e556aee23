//! Core types: remote links, per-operation reports and progress events

use crate::error::ItemFailure;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// URL of a downloadable archive
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteLink(pub String);

impl RemoteLink {
    /// Create a new link
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// The URL as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path segment of the URL, percent-decoded, without query or fragment
    ///
    /// Returns `None` when the link ends in a slash or has no path at all.
    pub fn filename(&self) -> Option<String> {
        let path = match url::Url::parse(&self.0) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => self
                .0
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string(),
        };
        let last = path.rsplit('/').next()?;
        if last.is_empty() {
            return None;
        }
        let decoded = urlencoding::decode(last)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| last.to_string());
        // A decoded separator would let a link name a file outside the content dir
        if decoded.contains(['/', '\\']) || decoded == "." || decoded == ".." {
            return None;
        }
        Some(decoded)
    }
}

impl std::fmt::Display for RemoteLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemoteLink {
    fn from(url: &str) -> Self {
        Self(url.to_string())
    }
}

impl From<String> for RemoteLink {
    fn from(url: String) -> Self {
        Self(url)
    }
}

/// Outcome of a download sync
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Files fetched and committed during this run
    pub downloaded: usize,
    /// Files already present locally, duplicate links, or destination conflicts
    pub skipped: usize,
    /// Per-URL failures
    pub failed: Vec<ItemFailure>,
}

impl SyncReport {
    /// Number of HTTP transfers this run started
    pub fn attempted(&self) -> usize {
        self.downloaded + self.failed.len()
    }
}

/// Outcome of extracting a directory of archives
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractReport {
    /// Archives extracted completely (nested archives included)
    pub extracted: usize,
    /// Per-archive failures
    pub failed: Vec<ItemFailure>,
}

/// Outcome of flattening documents into the sink
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenReport {
    /// Directories walked
    pub directories: usize,
    /// Rows appended to the sink
    pub rows_written: u64,
    /// Per-document failures
    pub failed: Vec<ItemFailure>,
}

impl FlattenReport {
    pub(crate) fn merge(&mut self, other: FlattenReport) {
        self.directories += other.directories;
        self.rows_written += other.rows_written;
        self.failed.extend(other.failed);
    }
}

/// Outcome of running the schema code generator over a set of files
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaGenReport {
    /// Schema files the generator completed
    pub generated: Vec<PathBuf>,
    /// Per-file failures
    pub failed: Vec<ItemFailure>,
}

/// Outcome of the full schema flow (discover, ledger, sync, extract, generate)
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSyncReport {
    /// Winning ledger entries, one per (year, category) key
    pub selected: Vec<crate::ledger::LedgerEntry>,
    /// Download of the winners
    pub sync: SyncReport,
    /// Extraction of the downloaded schema archives
    pub extract: ExtractReport,
    /// Code generation over the extracted schema files
    pub generate: SchemaGenReport,
}

/// Pipeline stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Index page fetch and link discovery
    Discover,
    /// Archive download
    Download,
    /// Archive extraction
    Extract,
    /// Document flattening
    Flatten,
    /// Schema code generation
    Generate,
}

/// Progress event broadcast by the pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Links found on an index page
    LinksDiscovered {
        /// Index page URL
        url: String,
        /// Number of archive links
        count: usize,
    },

    /// Transfer started
    DownloadStarted {
        /// Remote URL
        url: String,
    },

    /// Transfer committed to disk
    Downloaded {
        /// Local file
        path: PathBuf,
        /// Payload size
        bytes: u64,
    },

    /// Transfer failed
    DownloadFailed {
        /// Remote URL
        url: String,
        /// Error message
        error: String,
    },

    /// Archive extracted
    Extracted {
        /// Archive path
        archive: PathBuf,
        /// Files written
        files: usize,
    },

    /// Archive extraction aborted
    ExtractFailed {
        /// Archive path
        archive: PathBuf,
        /// Error message
        error: String,
    },

    /// Running count of flattened documents
    DocumentsFlattened {
        /// Documents processed so far
        processed: u64,
    },

    /// Schema code generation finished for a file
    SchemaGenerated {
        /// Schema file
        schema: PathBuf,
    },

    /// Stage finished
    StageComplete {
        /// Which stage
        stage: Stage,
        /// Items that failed in that stage
        failures: usize,
    },
}
