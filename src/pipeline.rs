//! Pipeline orchestration
//!
//! [`Pipeline`] owns the configuration, the HTTP client, the cancellation
//! token and the event channel, and wires the stages together:
//!
//! - filings: discover → download → extract → flatten
//! - schemas: discover → version ledger → download winners → extract → generate
//!
//! Each entry point returns a report; only failures at the top of a stage
//! come back as `Err`.

use crate::config::Config;
use crate::discovery::{bulk_archive_urls, discover_links, fetch_index, resolve_links};
use crate::download::{DownloadManager, build_client};
use crate::error::{Error, Result};
use crate::extraction::{extract_all_with, extraction_root};
use crate::flatten::{FlattenEngine, HEADER};
use crate::ledger::VersionLedger;
use crate::schema_gen::{SchemaGenerator, find_schema_files, generate_all};
use crate::sink::CsvSink;
use crate::types::{
    Event, ExtractReport, FlattenReport, RemoteLink, SchemaSyncReport, Stage, SyncReport,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const EVENT_CAPACITY: usize = 1000;

/// Acquisition and transform pipeline
pub struct Pipeline {
    config: Arc<Config>,
    client: reqwest::Client,
    cancel: CancellationToken,
    event_tx: broadcast::Sender<Event>,
}

impl Pipeline {
    /// Validate `config` and build the HTTP client
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = build_client(&config.source)?;
        let (event_tx, _rx) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            client,
            cancel: CancellationToken::new(),
            event_tx,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that aborts in-flight transfers and stops new rows when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel whatever is running
    pub fn shutdown(&self) {
        info!("pipeline shutdown requested");
        self.cancel.cancel();
    }

    fn emit(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    fn stage_complete(&self, stage: Stage, failures: usize) {
        self.emit(Event::StageComplete { stage, failures });
    }

    fn downloader(&self) -> DownloadManager {
        DownloadManager::new(self.client.clone(), &self.config.download)
            .with_cancellation(self.cancel.clone())
            .with_events(self.event_tx.clone())
    }

    /// Fetch an index page and return its archive links, absolute and deduplicated
    pub async fn discover(&self, index_url: &str) -> Result<Vec<RemoteLink>> {
        let page = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            page = fetch_index(&self.client, index_url) => page?,
        };
        let links = resolve_links(
            index_url,
            discover_links(&page, &self.config.source.archive_marker),
        );

        info!(url = index_url, count = links.len(), "discovered archive links");
        self.emit(Event::LinksDiscovered {
            url: index_url.to_string(),
            count: links.len(),
        });
        Ok(links)
    }

    /// Links for the filings sync: the index page, plus bulk candidates when enabled
    pub async fn filings_links(&self) -> Result<Vec<RemoteLink>> {
        let source = &self.config.source;
        let mut links = self.discover(&source.filings_index_url).await?;

        if source.include_bulk_candidates {
            let candidates = bulk_archive_urls(
                &source.bulk_base_url,
                source.bulk_start_year,
                source.bulk_end_year,
                source.bulk_parts_per_year,
            );
            info!(count = candidates.len(), "adding bulk archive candidates");
            links.extend(candidates);
            links = resolve_links(&source.filings_index_url, links);
        }
        Ok(links)
    }

    /// Download every filing archive not yet in the filings directory
    pub async fn sync_filings(&self) -> Result<SyncReport> {
        let links = self.filings_links().await?;
        self.stage_complete(Stage::Discover, 0);

        let report = self
            .downloader()
            .sync(&links, &self.config.storage.filings_dir)
            .await?;
        self.stage_complete(Stage::Download, report.failed.len());
        Ok(report)
    }

    /// Refresh the schema set and generate code from it
    ///
    /// Only the highest version per (year, category) is downloaded. Code
    /// generation runs over the extracted directories of those winners.
    pub async fn sync_schemas(&self, generator: &dyn SchemaGenerator) -> Result<SchemaSyncReport> {
        let links = self.discover(&self.config.source.schemas_index_url).await?;

        let mut ledger = VersionLedger::new(self.config.ledger.clone());
        for link in &links {
            ledger.ingest(link.as_str());
        }
        let winners = ledger.download_links();
        info!(
            links = links.len(),
            selected = winners.len(),
            "schema versions resolved"
        );
        self.stage_complete(Stage::Discover, 0);

        let schemas_dir = &self.config.storage.schemas_dir;
        let sync = self.downloader().sync(&winners, schemas_dir).await?;
        self.stage_complete(Stage::Download, sync.failed.len());

        let extract = self.extract_dir(schemas_dir).await?;

        let mut schema_files = Vec::new();
        for root in winner_roots(schemas_dir, &winners) {
            match find_schema_files(&root, &self.config.schema_gen.schema_pattern) {
                Ok(files) => schema_files.extend(files),
                Err(e) => warn!(?root, error = %e, "skipping schema directory"),
            }
        }

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let generate =
            generate_all(generator, &schema_files, &self.config.schema_gen.output_dir).await;
        for schema in &generate.generated {
            self.emit(Event::SchemaGenerated {
                schema: schema.clone(),
            });
        }
        self.stage_complete(Stage::Generate, generate.failed.len());

        Ok(SchemaSyncReport {
            selected: ledger.entries(),
            sync,
            extract,
            generate,
        })
    }

    /// Extract every archive in the filings directory
    pub async fn extract(&self) -> Result<ExtractReport> {
        let dir = self.config.storage.filings_dir.clone();
        self.extract_dir(&dir).await
    }

    async fn extract_dir(&self, dir: &Path) -> Result<ExtractReport> {
        let dir = dir.to_path_buf();
        let config = self.config.extraction.clone();
        let events = self.event_tx.clone();

        let report = tokio::task::spawn_blocking(move || {
            extract_all_with(&dir, &config, |event| {
                let _ = events.send(event);
            })
        })
        .await
        .map_err(|e| Error::Other(format!("extraction task panicked: {}", e)))??;

        self.stage_complete(Stage::Extract, report.failed.len());
        Ok(report)
    }

    /// Flatten every extracted filing into the output CSV
    ///
    /// The output file is recreated on every run.
    pub async fn flatten(&self) -> Result<FlattenReport> {
        let storage = &self.config.storage;
        if !storage.filings_dir.is_dir() {
            return Err(Error::DirectoryNotFound(storage.filings_dir.clone()));
        }

        let sink = Arc::new(CsvSink::open(&storage.output_csv, HEADER)?);
        let engine = FlattenEngine::new(Arc::clone(&sink), self.config.flatten.clone())
            .with_archive_extensions(self.config.extraction.archive_extensions.clone())
            .with_cancellation(self.cancel.clone())
            .with_events(self.event_tx.clone());

        let result = engine.flatten_all(&storage.filings_dir).await;
        let processed = engine.processed();
        drop(engine);

        match Arc::try_unwrap(sink) {
            Ok(sink) => {
                sink.close()?;
            }
            Err(shared) => shared.flush()?,
        }

        let report = result?;
        info!(
            processed,
            output = ?storage.output_csv,
            "flatten complete"
        );
        self.stage_complete(Stage::Flatten, report.failed.len());
        Ok(report)
    }
}

fn winner_roots(dir: &Path, winners: &[RemoteLink]) -> Vec<PathBuf> {
    winners
        .iter()
        .filter_map(|link| link.filename())
        .map(|name| extraction_root(&dir.join(name)))
        .filter(|root| root.is_dir())
        .collect()
}
