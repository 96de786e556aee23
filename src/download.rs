//! Download manager
//!
//! Brings a content directory in line with a set of remote archive links.
//! Only files missing locally are fetched; every transfer lands in a `.part`
//! file first and is renamed into place once it is known to be non-empty.
//! Running [`DownloadManager::sync`] again against the same directory fetches
//! nothing that is already there.

use crate::config::{DownloadConfig, SourceConfig};
use crate::error::{DownloadError, Error, ItemFailure, Result};
use crate::types::{Event, RemoteLink, SyncReport};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Suffix of in-flight transfers
pub const PARTIAL_SUFFIX: &str = ".part";

/// Build the HTTP client used for index pages and archive transfers
pub fn build_client(source: &SourceConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(source.request_timeout)
        .user_agent(source.user_agent.clone())
        .build()
        .map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to create HTTP client: {}",
                e
            )))
        })
}

/// Names of the non-empty files already in `dir`
///
/// Creates the directory when it does not exist. Zero-byte leftovers and
/// in-flight `.part` files are not counted, so they get fetched again.
pub async fn local_inventory(dir: &Path) -> Result<HashSet<String>> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to create content directory '{}': {}", dir.display(), e),
        ))
    })?;

    let mut inventory = HashSet::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() || metadata.len() == 0 {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(PARTIAL_SUFFIX) {
            inventory.insert(name);
        }
    }
    Ok(inventory)
}

/// Links still to fetch, paired with their target filename
#[derive(Debug, Default)]
pub struct SyncPlan {
    /// Links whose filename is not in the inventory (first occurrence only)
    pub missing: Vec<(RemoteLink, String)>,
    /// Links already present locally or repeated in the input
    pub skipped: usize,
    /// Links no filename could be derived from
    pub invalid: Vec<ItemFailure>,
}

/// Set difference between remote filenames and the local inventory
pub fn plan_sync(links: &[RemoteLink], inventory: &HashSet<String>) -> SyncPlan {
    let mut plan = SyncPlan::default();
    let mut planned = HashSet::new();

    for link in links {
        let Some(filename) = link.filename() else {
            plan.invalid.push(ItemFailure::new(
                link.as_str(),
                DownloadError::NoFilename {
                    url: link.to_string(),
                },
            ));
            continue;
        };

        if inventory.contains(&filename) || !planned.insert(filename.clone()) {
            plan.skipped += 1;
            continue;
        }
        plan.missing.push((link.clone(), filename));
    }

    plan
}

/// Result of moving a finished transfer into place
#[derive(Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The file now lives at the destination
    Committed,
    /// A non-empty file was already there; the transfer was discarded
    Conflict,
}

/// Move a finished `.part` file to its destination unless something non-empty is already there
pub async fn commit_download(partial: &Path, dest: &Path) -> Result<CommitOutcome> {
    if let Ok(existing) = tokio::fs::metadata(dest).await
        && existing.len() > 0
    {
        remove_partial(partial).await;
        return Ok(CommitOutcome::Conflict);
    }

    tokio::fs::rename(partial, dest).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to move download into '{}': {}", dest.display(), e),
        ))
    })?;
    Ok(CommitOutcome::Committed)
}

async fn remove_partial(partial: &Path) {
    if let Err(e) = tokio::fs::remove_file(partial).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(?partial, error = %e, "failed to remove partial download");
    }
}

enum FetchOutcome {
    Downloaded { path: PathBuf, bytes: u64 },
    Conflict(PathBuf),
}

/// Fetches missing archives into a content directory
///
/// One GET per missing file, no retries; failures are reported per URL.
#[derive(Clone)]
pub struct DownloadManager {
    client: reqwest::Client,
    max_concurrent: usize,
    cancel: CancellationToken,
    events: Option<broadcast::Sender<Event>>,
}

impl DownloadManager {
    /// Create a manager around an existing client
    pub fn new(client: reqwest::Client, config: &DownloadConfig) -> Self {
        Self {
            client,
            max_concurrent: config.max_concurrent_downloads.max(1),
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    /// Abort in-flight transfers when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Broadcast progress events on `sender`
    pub fn with_events(mut self, sender: broadcast::Sender<Event>) -> Self {
        self.events = Some(sender);
        self
    }

    fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            // No subscribers is fine
            let _ = events.send(event);
        }
    }

    /// Download every link whose file is missing from `content_dir`
    ///
    /// Fails as a whole only if the content directory cannot be created or
    /// listed; everything else lands in the report.
    pub async fn sync(&self, links: &[RemoteLink], content_dir: &Path) -> Result<SyncReport> {
        let inventory = local_inventory(content_dir).await?;
        let plan = plan_sync(links, &inventory);

        info!(
            ?content_dir,
            remote = links.len(),
            local = inventory.len(),
            missing = plan.missing.len(),
            "computed missing archives"
        );

        let mut report = SyncReport {
            downloaded: 0,
            skipped: plan.skipped,
            failed: plan.invalid,
        };

        let results: Vec<(RemoteLink, Result<FetchOutcome>)> = stream::iter(plan.missing)
            .map(|(link, filename)| async move {
                let dest = content_dir.join(&filename);
                let result = self.fetch_one(&link, &dest).await;
                (link, result)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        for (link, result) in results {
            match result {
                Ok(FetchOutcome::Downloaded { path, bytes }) => {
                    info!(?path, bytes, "downloaded archive");
                    report.downloaded += 1;
                    self.emit(Event::Downloaded { path, bytes });
                }
                Ok(FetchOutcome::Conflict(path)) => {
                    info!(?path, "destination already has content, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(url = %link, error = %e, "download failed");
                    self.emit(Event::DownloadFailed {
                        url: link.to_string(),
                        error: e.to_string(),
                    });
                    report.failed.push(ItemFailure::new(link.as_str(), e));
                }
            }
        }

        info!(
            downloaded = report.downloaded,
            skipped = report.skipped,
            failed = report.failed.len(),
            "sync complete"
        );
        Ok(report)
    }

    async fn fetch_one(&self, link: &RemoteLink, dest: &Path) -> Result<FetchOutcome> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        debug!(url = %link, ?dest, "starting download");
        self.emit(Event::DownloadStarted {
            url: link.to_string(),
        });

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            response = self.client.get(link.as_str()).send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Download(DownloadError::HttpStatus {
                url: link.to_string(),
                status: status.as_u16(),
            }));
        }

        let partial = partial_path(dest);
        let bytes = match self.stream_to_file(response, &partial).await {
            Ok(bytes) => bytes,
            Err(e) => {
                remove_partial(&partial).await;
                return Err(e);
            }
        };

        if bytes == 0 {
            remove_partial(&partial).await;
            return Err(Error::Download(DownloadError::EmptyPayload {
                url: link.to_string(),
            }));
        }

        match commit_download(&partial, dest).await {
            Ok(CommitOutcome::Committed) => Ok(FetchOutcome::Downloaded {
                path: dest.to_path_buf(),
                bytes,
            }),
            Ok(CommitOutcome::Conflict) => Ok(FetchOutcome::Conflict(dest.to_path_buf())),
            Err(e) => {
                remove_partial(&partial).await;
                Err(e)
            }
        }
    }

    async fn stream_to_file(&self, mut response: reqwest::Response, partial: &Path) -> Result<u64> {
        let mut file = tokio::fs::File::create(partial).await?;
        let mut written = 0u64;

        loop {
            let chunk = tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                chunk = response.chunk() => chunk?,
            };
            match chunk {
                Some(bytes) => {
                    file.write_all(&bytes).await?;
                    written += bytes.len() as u64;
                }
                None => break,
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAYLOAD: &[u8] = b"PK\x03\x04 not really a zip but not empty";

    fn manager() -> DownloadManager {
        DownloadManager::new(reqwest::Client::new(), &DownloadConfig::default())
    }

    fn links(server: &MockServer, names: &[&str]) -> Vec<RemoteLink> {
        names
            .iter()
            .map(|n| RemoteLink::new(format!("{}/xml/2024/{}", server.uri(), n)))
            .collect()
    }

    fn names_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn plan_skips_present_and_repeated_files() {
        let links = vec![
            RemoteLink::new("https://x/a.zip"),
            RemoteLink::new("https://x/b.zip"),
            RemoteLink::new("https://y/b.zip"),
            RemoteLink::new("https://x/"),
        ];
        let inventory: HashSet<String> = ["a.zip".to_string()].into();

        let plan = plan_sync(&links, &inventory);

        assert_eq!(plan.missing.len(), 1);
        assert_eq!(plan.missing[0].1, "b.zip");
        assert_eq!(plan.skipped, 2);
        assert_eq!(plan.invalid.len(), 1);
    }

    #[tokio::test]
    async fn inventory_ignores_empty_and_partial_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("full.zip"), b"data").unwrap();
        std::fs::write(dir.path().join("empty.zip"), b"").unwrap();
        std::fs::write(dir.path().join("half.zip.part"), b"data").unwrap();
        std::fs::create_dir(dir.path().join("full")).unwrap();

        let inventory = local_inventory(dir.path()).await.unwrap();

        assert_eq!(inventory, ["full.zip".to_string()].into());
    }

    #[tokio::test]
    async fn missing_directory_is_created() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("nested").join("990_zips");

        let inventory = local_inventory(&content).await.unwrap();

        assert!(inventory.is_empty());
        assert!(content.is_dir());
    }

    #[tokio::test]
    async fn downloads_only_missing_files() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PAYLOAD))
            .expect(2)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        for name in ["a.zip", "b.zip", "c.zip"] {
            std::fs::write(dir.path().join(name), b"already here").unwrap();
        }
        let links = links(&server, &["a.zip", "b.zip", "c.zip", "d.zip", "e.zip"]);

        let report = manager().sync(&links, dir.path()).await.unwrap();

        assert_eq!(report.downloaded, 2);
        assert_eq!(report.skipped, 3);
        assert!(report.failed.is_empty());
        assert_eq!(std::fs::read(dir.path().join("d.zip")).unwrap(), PAYLOAD);
        assert_eq!(
            std::fs::read(dir.path().join("a.zip")).unwrap(),
            b"already here",
            "present files must not be touched"
        );
    }

    #[tokio::test]
    async fn second_sync_downloads_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PAYLOAD))
            .expect(3)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let links = links(&server, &["a.zip", "b.zip", "c.zip"]);

        let first = manager().sync(&links, dir.path()).await.unwrap();
        let second = manager().sync(&links, dir.path()).await.unwrap();

        assert_eq!(first.downloaded, 3);
        assert_eq!(second.downloaded, 0);
        assert_eq!(second.attempted(), 0);
        assert_eq!(second.skipped, 3);
    }

    #[tokio::test]
    async fn empty_payload_is_a_failure_and_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let report = manager()
            .sync(&links(&server, &["empty.zip"]), dir.path())
            .await
            .unwrap();

        assert_eq!(report.downloaded, 0);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].reason.contains("empty payload"));
        assert!(names_in(dir.path()).is_empty(), "no final or partial file may remain");
    }

    #[tokio::test]
    async fn error_status_fails_only_that_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/xml/2024/gone.zip"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/xml/2024/ok.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PAYLOAD))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let links = links(&server, &["gone.zip", "ok.zip"]);
        let report = manager().sync(&links, dir.path()).await.unwrap();

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].item, links[0].as_str());
        assert!(report.failed[0].reason.contains("404"));
        assert_eq!(names_in(dir.path()), vec!["ok.zip"]);
    }

    #[tokio::test]
    async fn cancelled_sync_issues_no_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PAYLOAD))
            .expect(0)
            .mount(&server)
            .await;

        let token = CancellationToken::new();
        token.cancel();
        let dir = TempDir::new().unwrap();

        let report = manager()
            .with_cancellation(token)
            .sync(&links(&server, &["a.zip", "b.zip"]), dir.path())
            .await
            .unwrap();

        assert_eq!(report.downloaded, 0);
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed.iter().all(|f| f.reason == "operation cancelled"));
    }

    #[tokio::test]
    async fn cancelling_mid_transfer_aborts_promptly() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(PAYLOAD)
                    .set_delay(Duration::from_secs(5)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });
        let dir = TempDir::new().unwrap();
        let started = Instant::now();

        let report = manager()
            .with_cancellation(token)
            .sync(&links(&server, &["slow.zip"]), dir.path())
            .await
            .unwrap();

        assert!(
            started.elapsed() < Duration::from_secs(3),
            "sync waited {:?} for a cancelled transfer",
            started.elapsed()
        );
        assert_eq!(report.downloaded, 0);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].reason, "operation cancelled");
        assert!(names_in(dir.path()).is_empty(), "no file or partial left behind");
    }

    #[tokio::test]
    async fn commit_refuses_to_clobber_non_empty_destination() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.zip");
        let partial = partial_path(&dest);
        std::fs::write(&dest, b"being processed").unwrap();
        std::fs::write(&partial, PAYLOAD).unwrap();

        let outcome = commit_download(&partial, &dest).await.unwrap();

        assert_eq!(outcome, CommitOutcome::Conflict);
        assert_eq!(std::fs::read(&dest).unwrap(), b"being processed");
        assert!(!partial.exists());
    }

    #[tokio::test]
    async fn commit_replaces_empty_destination() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.zip");
        let partial = partial_path(&dest);
        std::fs::write(&dest, b"").unwrap();
        std::fs::write(&partial, PAYLOAD).unwrap();

        let outcome = commit_download(&partial, &dest).await.unwrap();

        assert_eq!(outcome, CommitOutcome::Committed);
        assert_eq!(std::fs::read(&dest).unwrap(), PAYLOAD);
    }

    #[tokio::test]
    async fn events_report_each_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PAYLOAD))
            .mount(&server)
            .await;

        let (tx, mut rx) = broadcast::channel(16);
        let dir = TempDir::new().unwrap();
        let _ = manager()
            .with_events(tx)
            .sync(&links(&server, &["a.zip"]), dir.path())
            .await
            .unwrap();

        assert!(matches!(rx.recv().await.unwrap(), Event::DownloadStarted { .. }));
        match rx.recv().await.unwrap() {
            Event::Downloaded { bytes, .. } => assert_eq!(bytes, PAYLOAD.len() as u64),
            other => panic!("expected Downloaded, got {other:?}"),
        }
    }
}
