// src/utils/http.rs

//! HTTP fetching utilities.
//!
//! Every network access in the pipeline goes through [`PageFetcher`], so the
//! whole pipeline can run against [`ScriptedFetcher`] without a network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;
use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;
use crate::utils::get_domain;

/// Outcome of a GET that reached a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    /// Decoded body; `None` when empty or undecodable
    pub body: Option<String>,
    /// URL after redirects
    pub final_url: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body text, or `""` when there is none.
    pub fn text(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }
}

/// Network access used by every pipeline component.
///
/// Implementations return `Ok` for any HTTP status and `Err` only for
/// network-level failures (DNS, refused connection, timeout).
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET `url`, following redirects.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage>;

    /// HEAD `url` and return the status code.
    async fn head(&self, url: &str, timeout: Duration) -> Result<u16>;
}

/// Create a configured asynchronous HTTP client with browser-like headers.
pub fn create_async_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_str(&config.accept)
            .map_err(|e| AppError::config(format!("invalid crawler.accept: {e}")))?,
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_str(&config.accept_language)
            .map_err(|e| AppError::config(format!("invalid crawler.accept_language: {e}")))?,
    );

    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(headers)
        .timeout(config.timeout())
        .redirect(Policy::limited(10))
        .build()?;
    Ok(client)
}

/// [`PageFetcher`] backed by `reqwest`.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = match response.text().await {
            Ok(text) if !text.is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                log::debug!("Body of {} could not be decoded: {}", url, e);
                None
            }
        };
        Ok(FetchedPage {
            status,
            body,
            final_url,
        })
    }

    async fn head(&self, url: &str, timeout: Duration) -> Result<u16> {
        let response = self.client.head(url).timeout(timeout).send().await?;
        Ok(response.status().as_u16())
    }
}

type HostSlot = Arc<tokio::sync::Mutex<Option<Instant>>>;

/// [`PageFetcher`] enforcing per-host politeness.
///
/// Requests to one host are serialized, and each starts at least `delay`
/// after the previous one to that host ended. Shared by every shard of a
/// run, so branches whose calendars live on one platform host take turns.
pub struct HostThrottle {
    inner: Arc<dyn PageFetcher>,
    delay: Duration,
    hosts: Mutex<HashMap<String, HostSlot>>,
}

impl HostThrottle {
    pub fn new(inner: Arc<dyn PageFetcher>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, url: &str) -> HostSlot {
        let host = get_domain(url).unwrap_or_default();
        match self.hosts.lock() {
            Ok(mut hosts) => Arc::clone(hosts.entry(host).or_default()),
            // poisoned map: run this call unshared
            Err(_) => HostSlot::default(),
        }
    }

    async fn throttled<T, F>(&self, url: &str, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let slot = self.slot(url);
        let mut last = slot.lock().await;
        if let Some(ended) = *last {
            let since = ended.elapsed();
            if since < self.delay {
                tokio::time::sleep(self.delay - since).await;
            }
        }
        let result = request.await;
        *last = Some(Instant::now());
        result
    }
}

#[async_trait]
impl PageFetcher for HostThrottle {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage> {
        self.throttled(url, self.inner.fetch(url, timeout)).await
    }

    async fn head(&self, url: &str, timeout: Duration) -> Result<u16> {
        self.throttled(url, self.inner.head(url, timeout)).await
    }
}

/// [`PageFetcher`] answering each GET URL at most once.
///
/// Scoped to one library, so the calendar root fetched by the classifier is
/// reused by every adapter of the fallback chain. Network errors are not
/// remembered; HEAD always goes through.
pub struct PageMemo {
    inner: Arc<dyn PageFetcher>,
    pages: Mutex<HashMap<String, FetchedPage>>,
}

impl PageMemo {
    pub fn new(inner: Arc<dyn PageFetcher>) -> Self {
        Self {
            inner,
            pages: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, url: &str) -> Option<FetchedPage> {
        self.pages.lock().ok()?.get(url).cloned()
    }
}

#[async_trait]
impl PageFetcher for PageMemo {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage> {
        if let Some(page) = self.cached(url) {
            log::trace!("Reusing {}", url);
            return Ok(page);
        }
        let page = self.inner.fetch(url, timeout).await?;
        if let Ok(mut pages) = self.pages.lock() {
            pages.insert(url.to_string(), page.clone());
        }
        Ok(page)
    }

    async fn head(&self, url: &str, timeout: Duration) -> Result<u16> {
        self.inner.head(url, timeout).await
    }
}

/// GET a page that the caller cannot do without.
///
/// Non-2xx statuses become [`AppError::HttpStatus`].
pub async fn fetch_required(
    fetcher: &dyn PageFetcher,
    url: &str,
    timeout: Duration,
) -> Result<FetchedPage> {
    let page = fetcher.fetch(url, timeout).await?;
    if !page.is_success() {
        return Err(AppError::status(url, page.status));
    }
    Ok(page)
}

/// Probe whether `url` is served at all.
///
/// HEAD first; 404/410 are the only conclusive negatives. Statuses such as
/// 401/403/405/429 (and HEAD network errors) fall back to a GET, which is
/// authoritative: 404/410 or a network error mean unreachable, anything
/// else means reachable.
pub async fn reachable(fetcher: &dyn PageFetcher, url: &str, timeout: Duration) -> bool {
    match fetcher.head(url, timeout).await {
        Ok(status) if status < 400 => return true,
        Ok(404 | 410) => return false,
        Ok(status) => log::debug!("HEAD {} returned {}, retrying with GET", url, status),
        Err(e) => log::debug!("HEAD {} failed ({}), retrying with GET", url, e),
    }

    match fetcher.fetch(url, timeout).await {
        Ok(page) => !matches!(page.status, 404 | 410),
        Err(e) => {
            log::debug!("GET {} failed: {}", url, e);
            false
        }
    }
}

/// Sleep for the politeness interval between requests to the same host.
pub async fn polite_pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Page(u16, String),
    NetworkError,
}

/// In-memory [`PageFetcher`] serving canned responses.
///
/// Lookups try the exact URL first, then the longest registered prefix.
/// Unknown URLs answer 404. Every GET and HEAD is recorded in order.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    pages: HashMap<String, Scripted>,
    prefixes: Vec<(String, Scripted)>,
    heads: HashMap<String, u16>,
    requests: Mutex<Vec<(Instant, String)>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with `status` for GET `url`.
    pub fn page(mut self, url: &str, status: u16, body: impl Into<String>) -> Self {
        self.pages
            .insert(url.to_string(), Scripted::Page(status, body.into()));
        self
    }

    /// Serve `body` with `status` for every GET starting with `prefix`.
    pub fn prefix(mut self, prefix: &str, status: u16, body: impl Into<String>) -> Self {
        self.prefixes
            .push((prefix.to_string(), Scripted::Page(status, body.into())));
        self
    }

    /// Fail GET and HEAD of `url` at the network level.
    pub fn network_error(mut self, url: &str) -> Self {
        self.pages.insert(url.to_string(), Scripted::NetworkError);
        self
    }

    /// Answer HEAD `url` with `status`. Without this, HEAD mirrors GET.
    pub fn head_status(mut self, url: &str, status: u16) -> Self {
        self.heads.insert(url.to_string(), status);
        self
    }

    /// Requests seen so far, as `"GET <url>"` / `"HEAD <url>"`.
    pub fn requests(&self) -> Vec<String> {
        self.timeline().into_iter().map(|(_, line)| line).collect()
    }

    /// Requests seen so far, with the instant each one arrived.
    pub fn timeline(&self) -> Vec<(Instant, String)> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// URLs fetched with GET, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|r| r.strip_prefix("GET ").map(str::to_string))
            .collect()
    }

    fn record(&self, line: String) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((Instant::now(), line));
        }
    }

    fn lookup(&self, url: &str) -> Option<&Scripted> {
        self.pages.get(url).or_else(|| {
            self.prefixes
                .iter()
                .filter(|(prefix, _)| url.starts_with(prefix.as_str()))
                .max_by_key(|(prefix, _)| prefix.len())
                .map(|(_, scripted)| scripted)
        })
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<FetchedPage> {
        self.record(format!("GET {url}"));
        match self.lookup(url) {
            Some(Scripted::Page(status, body)) => Ok(FetchedPage {
                status: *status,
                body: (!body.is_empty()).then(|| body.clone()),
                final_url: url.to_string(),
            }),
            Some(Scripted::NetworkError) => Err(AppError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("connection refused: {url}"),
            ))),
            None => Ok(FetchedPage {
                status: 404,
                body: None,
                final_url: url.to_string(),
            }),
        }
    }

    async fn head(&self, url: &str, _timeout: Duration) -> Result<u16> {
        self.record(format!("HEAD {url}"));
        if let Some(status) = self.heads.get(url) {
            return Ok(*status);
        }
        match self.lookup(url) {
            Some(Scripted::Page(status, _)) => Ok(*status),
            Some(Scripted::NetworkError) => Err(AppError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("connection refused: {url}"),
            ))),
            None => Ok(404),
        }
    }
}
