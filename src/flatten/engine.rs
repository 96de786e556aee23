use super::columns::build_row;
use super::record::flatten_document;
use crate::config::FlattenConfig;
use crate::error::{Error, ItemFailure, Result};
use crate::sink::CsvSink;
use crate::types::{Event, FlattenReport};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Flattens directories of documents into a shared sink
///
/// At most `pool_size` documents are in flight at once across every
/// directory this engine is processing; each one is parsed on a blocking
/// thread with its own [`FlatRecord`](super::FlatRecord).
pub struct FlattenEngine<W: Write + Send + 'static = File> {
    sink: Arc<CsvSink<W>>,
    config: FlattenConfig,
    archive_extensions: Vec<String>,
    gate: Arc<Semaphore>,
    processed: Arc<AtomicU64>,
    cancel: CancellationToken,
    events: Option<broadcast::Sender<Event>>,
}

impl<W: Write + Send + 'static> FlattenEngine<W> {
    /// Create an engine writing to `sink`
    pub fn new(sink: Arc<CsvSink<W>>, config: FlattenConfig) -> Self {
        let pool_size = config.pool_size();
        debug!(pool_size, "flatten engine created");
        Self {
            sink,
            config,
            archive_extensions: vec!["zip".to_string()],
            gate: Arc::new(Semaphore::new(pool_size)),
            processed: Arc::new(AtomicU64::new(0)),
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    /// Stop scheduling documents and appending rows once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Broadcast progress on `sender`
    pub fn with_events(mut self, sender: broadcast::Sender<Event>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Extensions of files [`flatten_all`](Self::flatten_all) treats as archives and never walks into
    pub fn with_archive_extensions(mut self, extensions: Vec<String>) -> Self {
        self.archive_extensions = extensions;
        self
    }

    /// Documents flattened so far
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Flatten every extracted directory directly under `root`
    ///
    /// Archive files sitting next to their extraction directories are skipped.
    /// Directories run concurrently; the document gate still bounds the
    /// total number in flight.
    pub async fn flatten_all(&self, root: &Path) -> Result<FlattenReport> {
        if !root.is_dir() {
            return Err(Error::DirectoryNotFound(root.to_path_buf()));
        }

        let mut directories = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let path = entry?.path();
            if path.is_dir() {
                directories.push(path);
            } else if crate::extraction::is_archive(&path, &self.archive_extensions) {
                debug!(?path, "skipping archive");
            }
        }
        directories.sort();
        info!(?root, directories = directories.len(), "flattening extracted directories");

        let results =
            futures::future::join_all(directories.iter().map(|dir| self.flatten_directory(dir)))
                .await;

        let mut report = FlattenReport::default();
        for (dir, result) in directories.iter().zip(results) {
            match result {
                Ok(partial) => report.merge(partial),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!(?dir, error = %e, "directory flatten failed");
                    report
                        .failed
                        .push(ItemFailure::new(dir.to_string_lossy(), e));
                }
            }
        }

        info!(
            directories = report.directories,
            rows = report.rows_written,
            failed = report.failed.len(),
            "processing complete"
        );
        Ok(report)
    }

    /// Flatten every document under `dir` (recursively) into the sink
    ///
    /// Row order in the sink follows completion order, not directory order.
    pub async fn flatten_directory(&self, dir: &Path) -> Result<FlattenReport> {
        if !dir.is_dir() {
            return Err(Error::DirectoryNotFound(dir.to_path_buf()));
        }
        info!(?dir, "processing directory");

        let mut report = FlattenReport {
            directories: 1,
            ..Default::default()
        };
        let documents = self.collect_documents(dir, &mut report);

        let mut tasks: JoinSet<(PathBuf, Result<()>)> = JoinSet::new();
        for document in documents {
            let permit = tokio::select! {
                _ = self.cancel.cancelled() => break,
                permit = Arc::clone(&self.gate).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            while let Some(done) = tasks.try_join_next() {
                self.record_outcome(done, &mut report);
            }

            let sink = Arc::clone(&self.sink);
            let cancel = self.cancel.clone();
            let include_additional = self.config.include_additional_data;
            tasks.spawn_blocking(move || {
                let _permit = permit;
                let result = process_document(&document, &sink, &cancel, include_additional);
                (document, result)
            });
        }

        while let Some(done) = tasks.join_next().await {
            self.record_outcome(done, &mut report);
        }

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(report)
    }

    fn collect_documents(&self, dir: &Path, report: &mut FlattenReport) -> Vec<PathBuf> {
        let wanted = self.config.document_extension.trim_start_matches('.').to_lowercase();
        let mut documents = Vec::new();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    let matches = entry
                        .path()
                        .extension()
                        .is_some_and(|ext| ext.to_string_lossy().to_lowercase() == wanted);
                    if matches {
                        documents.push(entry.into_path());
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(?dir, error = %e, "skipping unreadable entry");
                    let item = e
                        .path()
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_else(|| dir.to_string_lossy().into_owned());
                    report.failed.push(ItemFailure::new(item, Error::Walk(e)));
                }
            }
        }

        debug!(?dir, count = documents.len(), "found documents");
        documents
    }

    fn record_outcome(
        &self,
        done: std::result::Result<(PathBuf, Result<()>), tokio::task::JoinError>,
        report: &mut FlattenReport,
    ) {
        match done {
            Ok((_, Ok(()))) => {
                report.rows_written += 1;
                let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
                let interval = self.config.progress_interval;
                if interval > 0 && processed % interval == 0 {
                    info!(processed, "processed {} files", processed);
                    if let Some(events) = &self.events {
                        let _ = events.send(Event::DocumentsFlattened { processed });
                    }
                }
            }
            Ok((document, Err(Error::Cancelled))) => {
                debug!(?document, "row dropped after cancellation");
            }
            Ok((document, Err(e))) => {
                warn!(?document, error = %e, "error processing document");
                report
                    .failed
                    .push(ItemFailure::new(document.to_string_lossy(), e));
            }
            Err(e) => {
                warn!(error = %e, "flatten task failed");
                report
                    .failed
                    .push(ItemFailure::new("flatten task", e));
            }
        }
    }
}

fn process_document<W: Write>(
    document: &Path,
    sink: &CsvSink<W>,
    cancel: &CancellationToken,
    include_additional: bool,
) -> Result<()> {
    let record = flatten_document(document)?;
    let file_name = document
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let row = build_row(&record, &file_name, include_additional);

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    sink.append(&row)
}
