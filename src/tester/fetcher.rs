//! Tester report retrieval.
//!
//! Reports are fetched over HTTP(S) or read from disk, one tester at a time.
//! Every failure here is per-tester: the caller logs it and moves on.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Name of the per-tester file listing recent report locations, newest first.
pub const LIST_RECENT_FILE: &str = "list_recent.txt";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Where a tester's latest report is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportSource {
    /// Explicit location from the configuration.
    Location(String),
    /// First line of `<output_dir>/archive/<key>/list_recent.txt`.
    Archive(PathBuf),
}

impl ReportSource {
    /// Source for a tester: the configured URL, else its archive listing.
    pub fn for_tester(key: &str, report_url: Option<&str>, output_dir: &Path) -> Self {
        match report_url {
            Some(url) => Self::Location(url.to_string()),
            None => Self::Archive(
                output_dir
                    .join("archive")
                    .join(key)
                    .join(LIST_RECENT_FILE),
            ),
        }
    }

    /// Resolve to a concrete location. `Ok(None)` when the listing is empty.
    pub fn resolve(&self) -> Result<Option<String>> {
        match self {
            Self::Location(location) => Ok(Some(location.clone())),
            Self::Archive(list_path) => {
                let content = std::fs::read_to_string(list_path)
                    .with_context(|| format!("Failed to read {}", list_path.display()))?;
                Ok(latest_report(&content))
            }
        }
    }
}

/// Newest entry of a `list_recent.txt` listing.
pub fn latest_report(listing: &str) -> Option<String> {
    listing
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
}

/// Decode raw report bytes: gunzip if compressed, then lossy UTF-8.
pub fn decode_report_bytes(bytes: &[u8]) -> Result<String> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut decoder = GzDecoder::new(bytes);
        let mut raw = Vec::new();
        decoder
            .read_to_end(&mut raw)
            .context("Failed to decompress report")?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    } else {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Fetches reports with a bounded per-request timeout.
pub struct ReportFetcher {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl ReportFetcher {
    /// Create a fetcher whose requests give up after `timeout_seconds`.
    pub fn new(timeout_seconds: u64) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_seconds);
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            timeout,
        })
    }

    /// Fetch and decode the report at `location`.
    pub async fn fetch(&self, location: &str) -> Result<String> {
        info!("Parsing: {}", location);

        let bytes = if is_remote(location) {
            self.fetch_remote(location).await?
        } else {
            let path = location.strip_prefix("file://").unwrap_or(location);
            tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read report: {}", path))?
        };

        debug!("Fetched {} bytes from {}", bytes.len(), location);
        decode_report_bytes(&bytes)
    }

    async fn fetch_remote(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to fetch report (timeout {}s): {}",
                    self.timeout.as_secs(),
                    url
                )
            })?
            .error_for_status()
            .with_context(|| format!("Report request failed: {}", url))?;

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read report body: {}", url))?;
        Ok(bytes.to_vec())
    }
}
