//! Paginated signature crawl.
//!
//! Follows the directory's `next` cursor one page at a time, accumulates every
//! row in arrival order, and only once the cursor is exhausted writes the whole
//! collection to its JSON file. Any transport or parse failure aborts the crawl
//! and leaves the previous file untouched.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;
use crate::net::{http_client, send_with_backoff};
use crate::types::{SignatureKind, SignaturePage};

/// Anything that can produce one page of a listing for a URL
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<SignaturePage>;
}

/// Directory pages over HTTP
pub struct HttpPageSource {
    timeout: Duration,
    max_retries: u8,
}

impl HttpPageSource {
    pub fn new(timeout_ms: u64, max_retries: u8) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
            max_retries,
        }
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, url: &str) -> Result<SignaturePage> {
        let request = http_client()?.get(url).timeout(self.timeout);
        let response = send_with_backoff(request, url, self.max_retries).await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("Signature API error ({status}) at {url}: {error_text}"));
        }

        response
            .json::<SignaturePage>()
            .await
            .with_context(|| format!("Failed to parse signature page from {url}"))
    }
}

#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    /// Pause before every request after the first
    pub delay: Duration,
    /// Stop after this many pages even if `next` is still set
    pub max_pages: Option<usize>,
}

/// Everything a crawl accumulated, in page-arrival order
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<Value>,
    pub pages: usize,
    /// True when `max_pages` cut the crawl short
    pub truncated: bool,
}

/// Walk the cursor from `start_url` until `next` is null.
pub async fn fetch_all<S>(
    source: &S,
    start_url: &str,
    opts: &FetchOptions,
) -> Result<FetchOutcome>
where
    S: PageSource + ?Sized,
{
    let mut outcome = FetchOutcome::default();
    let mut url = Some(start_url.to_string());

    while let Some(current) = url.take() {
        if let Some(max) = opts.max_pages {
            if outcome.pages >= max {
                log::warn!("[fetch] page limit {max} reached, stopping before {current}");
                outcome.truncated = true;
                break;
            }
        }
        if outcome.pages > 0 && !opts.delay.is_zero() {
            tokio::time::sleep(opts.delay).await;
        }

        let page = source.fetch_page(&current).await?;
        outcome.pages += 1;
        log::debug!(
            "[fetch] page {} from {} ({} rows)",
            outcome.pages,
            current,
            page.results.len()
        );
        outcome.records.extend(page.results);

        url = match page.next {
            Some(next) if !next.is_empty() => Some(resolve_next(&current, &next)),
            _ => None,
        };
    }

    Ok(outcome)
}

/// Resolve a possibly relative `next` link against the page that returned it
fn resolve_next(current: &str, next: &str) -> String {
    if url::Url::parse(next).is_ok() {
        return next.to_string();
    }
    match url::Url::parse(current).and_then(|base| base.join(next)) {
        Ok(joined) => joined.to_string(),
        Err(_) => next.to_string(),
    }
}

/// Overwrite `path` with the collection as one JSON array.
pub async fn write_collection(path: &Path, records: &[Value]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let bytes =
        serde_json::to_vec(records).context("Failed to serialize signature collection")?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(anyhow!("Failed to move {} into place: {e}", path.display()));
    }
    Ok(())
}

#[derive(Debug)]
pub struct FetchSummary {
    pub kind: SignatureKind,
    pub pages: usize,
    pub records: usize,
    pub truncated: bool,
    pub path: PathBuf,
}

/// Crawl one kind with an explicit page source and write its collection file
pub async fn fetch_kind_with<S>(
    source: &S,
    cfg: &Config,
    kind: SignatureKind,
) -> Result<FetchSummary>
where
    S: PageSource + ?Sized,
{
    let start_url = cfg.start_url(kind);
    let path = cfg.collection_path(kind);
    log::info!("[fetch] {kind} signatures from {start_url}");

    let opts = FetchOptions {
        delay: Duration::from_millis(cfg.request_delay_ms),
        max_pages: cfg.max_pages,
    };
    let outcome = fetch_all(source, &start_url, &opts)
        .await
        .with_context(|| format!("Failed to crawl {kind} signatures"))?;

    write_collection(&path, &outcome.records).await?;
    log::info!(
        "[fetch] wrote {} {kind} signatures from {} pages to {}",
        outcome.records.len(),
        outcome.pages,
        path.display()
    );

    Ok(FetchSummary {
        kind,
        pages: outcome.pages,
        records: outcome.records.len(),
        truncated: outcome.truncated,
        path,
    })
}

/// Crawl one kind over HTTP and write its collection file
pub async fn fetch_kind(cfg: &Config, kind: SignatureKind) -> Result<FetchSummary> {
    let source = HttpPageSource::new(cfg.request_timeout_ms, cfg.max_retries);
    fetch_kind_with(&source, cfg, kind).await
}
