//! Error types for irs990-etl
//!
//! This module provides the error handling for the library:
//! - A top-level [`Error`] with conversions from the underlying crates
//! - Stage-specific error types (download, extraction, flatten)
//! - [`ItemFailure`], the per-item failure record carried inside reports
//!
//! Batch operations (sync, extract, flatten) never fail on a single bad item.
//! Item-level problems are collected as [`ItemFailure`] entries and only
//! problems at the top of an operation are returned as `Err`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for irs990-etl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for irs990-etl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_workers")
        key: Option<String>,
    },

    /// Download-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Archive extraction error
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Document flatten error
    #[error("flatten error: {0}")]
    Flatten(#[from] FlattenError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Directory walk error
    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// A required directory does not exist
    #[error("directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// Operation interrupted by cancellation
    #[error("operation cancelled")]
    Cancelled,

    /// External tool execution failed (schema code generator)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, not configured, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Download-related errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Remote answered with a non-success status
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// The URL that was requested
        url: String,
        /// The HTTP status code
        status: u16,
    },

    /// Transfer finished without a single byte of payload
    #[error("empty payload from {url}")]
    EmptyPayload {
        /// The URL that returned nothing
        url: String,
    },

    /// Link has no usable final path segment
    #[error("cannot derive a filename from {url}")]
    NoFilename {
        /// The offending URL
        url: String,
    },
}

/// Archive extraction errors
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Archive could not be opened or read
    #[error("extraction failed for {archive}: {reason}")]
    Failed {
        /// The archive file that failed to extract
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// Entry name resolves outside the extraction root
    #[error("illegal entry path {entry:?} in {archive}")]
    IllegalPath {
        /// The archive containing the entry
        archive: PathBuf,
        /// The raw entry name
        entry: String,
    },
}

/// Document flatten errors
#[derive(Debug, Error)]
pub enum FlattenError {
    /// Token stream error mid-document
    #[error("malformed document {path} at byte {position}: {reason}")]
    Malformed {
        /// The document that failed to parse
        path: PathBuf,
        /// Byte offset reported by the tokenizer
        position: u64,
        /// Tokenizer error message
        reason: String,
    },

    /// Document ended while elements were still open
    #[error("truncated document {path}: {open} element(s) left open")]
    Truncated {
        /// The truncated document
        path: PathBuf,
        /// Number of unclosed elements
        open: usize,
    },

    /// Row width does not match the sink header
    #[error("row has {actual} cells but header declares {expected}")]
    RowWidth {
        /// Header width
        expected: usize,
        /// Row width
        actual: usize,
    },
}

/// A single failed item inside a batch report
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// URL, archive name or document path the failure belongs to
    pub item: String,
    /// Human-readable reason
    pub reason: String,
}

impl ItemFailure {
    /// Create a failure record for an item
    pub fn new(item: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            item: item.into(),
            reason: reason.to_string(),
        }
    }
}

impl Error {
    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Download(DownloadError::HttpStatus { .. }) => "http_status",
            Error::Download(DownloadError::EmptyPayload { .. }) => "empty_payload",
            Error::Download(DownloadError::NoFilename { .. }) => "no_filename",
            Error::Extraction(ExtractionError::Failed { .. }) => "extraction_failed",
            Error::Extraction(ExtractionError::IllegalPath { .. }) => "illegal_path",
            Error::Flatten(FlattenError::Malformed { .. }) => "malformed_document",
            Error::Flatten(FlattenError::Truncated { .. }) => "truncated_document",
            Error::Flatten(FlattenError::RowWidth { .. }) => "row_width",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Csv(_) => "csv_error",
            Error::Walk(_) => "walk_error",
            Error::DirectoryNotFound(_) => "directory_not_found",
            Error::Cancelled => "cancelled",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
            Error::Other(_) => "internal_error",
        }
    }
}
