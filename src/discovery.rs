//! Archive link discovery
//!
//! Index pages on irs.gov list their downloadable archives as plain anchors.
//! [`discover_links`] is a pure function over the page bytes so it can be
//! exercised against fixture HTML; fetching lives in [`fetch_index`].

use crate::error::{Error, Result};
use crate::types::RemoteLink;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

/// Extract every anchor target containing `marker`, in document order
///
/// Malformed or empty input yields an empty list, never an error.
pub fn discover_links(page: &[u8], marker: &str) -> Vec<RemoteLink> {
    if page.is_empty() || marker.is_empty() {
        return Vec::new();
    }

    let text = String::from_utf8_lossy(page);
    let document = Html::parse_document(&text);
    let selector = match Selector::parse("a[href]") {
        Ok(selector) => selector,
        Err(e) => {
            warn!(error = ?e, "anchor selector failed to parse");
            return Vec::new();
        }
    };

    let links: Vec<RemoteLink> = document
        .select(&selector)
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter(|href| href.contains(marker))
        .map(RemoteLink::new)
        .collect();

    debug!(count = links.len(), marker, "discovered archive links");
    links
}

/// Resolve links against the page they were found on and drop duplicates
///
/// The first occurrence of each absolute URL wins; links that cannot be
/// resolved are dropped with a warning.
pub fn resolve_links(base: &str, links: Vec<RemoteLink>) -> Vec<RemoteLink> {
    let base = Url::parse(base).ok();
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(links.len());

    for link in links {
        let absolute = match (Url::parse(link.as_str()), &base) {
            (Ok(url), _) => url,
            (Err(_), Some(base)) => match base.join(link.as_str()) {
                Ok(url) => url,
                Err(e) => {
                    warn!(link = %link, error = %e, "dropping unresolvable link");
                    continue;
                }
            },
            (Err(e), None) => {
                warn!(link = %link, error = %e, "dropping relative link without a base");
                continue;
            }
        };

        if seen.insert(absolute.to_string()) {
            resolved.push(RemoteLink::new(absolute.to_string()));
        }
    }

    resolved
}

/// Build the bulk filing archive URLs the IRS publishes per year
///
/// Years before 2021 use `download990xml_{year}_{n}.zip`; later years use
/// `{year}_TEOS_XML_{nn}A.zip`. Parts are listed from `parts` down to 1.
pub fn bulk_archive_urls(base: &str, start_year: u16, end_year: u16, parts: u8) -> Vec<RemoteLink> {
    let base = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    };

    let mut links = Vec::new();
    for year in start_year..=end_year {
        for part in (1..=parts).rev() {
            let name = if year < 2021 {
                format!("download990xml_{}_{}.zip", year, part)
            } else {
                format!("{}_TEOS_XML_{:02}A.zip", year, part)
            };
            links.push(RemoteLink::new(format!("{}{}/{}", base, year, name)));
        }
    }
    links
}

/// Fetch an index page body
///
/// Non-success statuses are returned as errors; there is nothing to discover
/// on an error page.
pub async fn fetch_index(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Download(crate::error::DownloadError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        }));
    }
    Ok(response.bytes().await?.to_vec())
}
