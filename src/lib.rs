//! # irs990-etl
//!
//! Acquisition and flattening pipeline for IRS Form 990 e-file data.
//!
//! ## Stages
//!
//! - **Discover** - scrape irs.gov index pages for archive links
//! - **Download** - fetch only the archives missing locally, with bounded concurrency
//! - **Extract** - unpack every archive into a sibling directory
//! - **Flatten** - turn each XML filing into one row of a fixed-schema CSV
//! - **Schemas** - keep the newest TEOS schema per (year, category) and run a
//!   code generator over it
//!
//! Consumers subscribe to [`Event`]s instead of polling, and every stage
//! reports per-item failures without aborting.
//!
//! ## Quick Start
//!
//! ```no_run
//! use irs990_etl::{Config, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(Config::default())?;
//!
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let synced = pipeline.sync_filings().await?;
//!     let extracted = pipeline.extract().await?;
//!     let flattened = pipeline.flatten().await?;
//!     println!("{} downloaded, {} extracted, {} rows", synced.downloaded, extracted.extracted, flattened.rows_written);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Archive link discovery on index pages
pub mod discovery;
/// Incremental archive downloads
pub mod download;
/// Error types
pub mod error;
/// Archive extraction
pub mod extraction;
/// XML flattening and column mapping
pub mod flatten;
/// Schema version ledger
pub mod ledger;
/// Stage orchestration
pub mod pipeline;
/// Schema code generation
pub mod schema_gen;
/// Concurrent CSV output
pub mod sink;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use download::DownloadManager;
pub use error::{DownloadError, Error, ExtractionError, FlattenError, ItemFailure, Result};
pub use flatten::{FlatRecord, FlattenEngine, HEADER};
pub use ledger::{VersionKey, VersionLedger, VersionRecord};
pub use pipeline::Pipeline;
pub use schema_gen::{CliSchemaGenerator, NoOpSchemaGenerator, SchemaGenerator};
pub use sink::CsvSink;
pub use types::{
    Event, ExtractReport, FlattenReport, RemoteLink, SchemaGenReport, SchemaSyncReport, Stage,
    SyncReport,
};

use tokio_util::sync::CancellationToken;

/// Cancel `token` once a termination signal arrives.
///
/// In-flight transfers abort and leave no partial file; the flattener stops
/// appending rows.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use irs990_etl::{Config, Pipeline, cancel_on_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = Pipeline::new(Config::default())?;
///     tokio::spawn(cancel_on_signal(pipeline.cancellation_token()));
///
///     pipeline.sync_filings().await?;
///     Ok(())
/// }
/// ```
pub async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        _ = token.cancelled() => {}
        signal = wait_for_signal() => {
            tracing::info!(signal, "cancelling pipeline, in-flight downloads will be discarded");
            token.cancel();
        }
    }
}

/// Resolve with the name of the first termination signal received
#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let sigterm = signal(SignalKind::terminate());
    let sigint = signal(SignalKind::interrupt());

    match (sigterm, sigint) {
        (Ok(mut term), Ok(mut int)) => tokio::select! {
            _ = term.recv() => "SIGTERM",
            _ = int.recv() => "SIGINT",
        },
        (Err(e), Ok(mut int)) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, pipeline cancels on SIGINT only");
            int.recv().await;
            "SIGINT"
        }
        (Ok(mut term), Err(e)) => {
            tracing::warn!(error = %e, "SIGINT handler unavailable, pipeline cancels on SIGTERM only");
            term.recv().await;
            "SIGTERM"
        }
        (Err(term_err), Err(int_err)) => {
            tracing::error!(
                sigterm = %term_err,
                sigint = %int_err,
                "no signal handlers registered, pipeline cancels on Ctrl+C only"
            );
            ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "Ctrl+C",
        Err(e) => {
            tracing::error!(error = %e, "Ctrl+C listener failed, pipeline will not cancel on signals");
            std::future::pending().await
        }
    }
}
