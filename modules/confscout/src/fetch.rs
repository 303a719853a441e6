//! Page fetch strategies.
//!
//! Listing and detail pages go through a [`FallbackFetcher`] that tries a plain
//! HTTP client first, then a local headless browser, then (optionally) a remote
//! Browserless instance.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::StatusCode;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use confscout_common::{Config, TransportError};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Interstitial markers served instead of content by anti-bot front ends.
const CHALLENGE_MARKERS: &[&str] = &["Just a moment", "cf-challenge", "challenge-platform"];
/// Real pages may embed challenge scripts; only small pages are treated as interstitials.
const MAX_CHALLENGE_BYTES: usize = 64 * 1024;

/// Browser dumps at or below this size are launch failures, not pages.
const MIN_BROWSER_DUMP_BYTES: usize = 1000;

/// Max retry attempts for transient Chrome failures (e.g. "Cannot fork").
const CHROME_MAX_ATTEMPTS: u32 = 3;

// --- PageFetcher trait ---

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, TransportError>;
    fn name(&self) -> &str;
}

// --- Settings ---

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Wait before attempt `n` (n >= 1) is `backoff_base * 2^n`.
    pub backoff_base: Duration,
    /// Extra wait after an HTTP 403 before retrying.
    pub forbidden_wait: Duration,
    /// Base delay for browser relaunches. Actual delay is base * 3^attempt + jitter.
    pub browser_retry_base: Duration,
    pub chrome_bin: String,
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
    /// Parallel detail-page fetches.
    pub concurrency: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            forbidden_wait: Duration::from_secs(5),
            browser_retry_base: Duration::from_secs(3),
            chrome_bin: "chromium".to_string(),
            browserless_url: None,
            browserless_token: None,
            concurrency: 3,
        }
    }
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.http_timeout_secs),
            chrome_bin: config.chrome_bin.clone(),
            browserless_url: config.browserless_url.clone(),
            browserless_token: config.browserless_token.clone(),
            concurrency: config.fetch_concurrency.max(1),
            ..Self::default()
        }
    }
}

/// The anti-bot marker found in `html`, if the page is a challenge interstitial.
pub fn challenge_marker(html: &str) -> Option<&'static str> {
    if html.len() > MAX_CHALLENGE_BYTES {
        return None;
    }
    CHALLENGE_MARKERS.iter().copied().find(|m| html.contains(m))
}

fn check_http_url(url: &str) -> Result<(), TransportError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| TransportError::Network(format!("Invalid URL {url}: {e}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(TransportError::Network(format!(
            "Only http/https URLs are allowed, got: {}",
            parsed.scheme()
        )));
    }
    Ok(())
}

// --- Plain HTTP ---

pub struct HttpFetcher {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl HttpFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, settings })
    }

    async fn attempt(&self, url: &str) -> Result<String, TransportError> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(format!("{url}: {e}"))
            } else {
                TransportError::Network(format!("{url}: {e}"))
            }
        })?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::Network(format!("{url}: {e}")))?;
        if let Some(marker) = challenge_marker(&body) {
            return Err(TransportError::Blocked {
                url: url.to_string(),
                marker: marker.to_string(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, TransportError> {
        check_http_url(url)?;

        let attempts = self.settings.max_attempts.max(1);
        let mut last_err = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.settings.backoff_base * 2u32.pow(attempt)).await;
            }

            match self.attempt(url).await {
                Ok(body) => {
                    debug!(url, fetcher = "http", bytes = body.len(), "Fetched page");
                    return Ok(body);
                }
                Err(TransportError::Status { status: 403, .. }) if attempt + 1 < attempts => {
                    warn!(url, attempt = attempt + 1, "HTTP 403, waiting before retry");
                    tokio::time::sleep(self.settings.forbidden_wait).await;
                    last_err = Some(TransportError::Status {
                        url: url.to_string(),
                        status: 403,
                    });
                }
                Err(e) if e.is_transient() => {
                    warn!(url, attempt = attempt + 1, error = %e, "Fetch attempt failed");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| TransportError::Network(format!("{url}: no attempts made"))))
    }

    fn name(&self) -> &str {
        "http"
    }
}

// --- Local headless Chrome ---

/// Headless Chromium `--dump-dom`. A browser instance monopolizes the host, so
/// only one runs at a time.
pub struct ChromeFetcher {
    semaphore: Semaphore,
    settings: FetchSettings,
}

impl ChromeFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        info!(chrome_bin = %settings.chrome_bin, "Using ChromeFetcher (dump-dom, one instance at a time)");
        Self {
            semaphore: Semaphore::new(1),
            settings,
        }
    }

    async fn backoff(&self, url: &str, attempt: u32, reason: &str) {
        let backoff = self.settings.browser_retry_base * 3u32.pow(attempt);
        let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
        warn!(
            url,
            attempt = attempt + 1,
            backoff_secs = backoff.as_secs(),
            reason,
            "Chrome failed, retrying after backoff"
        );
        tokio::time::sleep(backoff + jitter).await;
    }

    /// Launch Chrome --dump-dom and return raw stdout bytes.
    async fn run_chrome(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        for attempt in 0..CHROME_MAX_ATTEMPTS {
            let retry = attempt + 1 < CHROME_MAX_ATTEMPTS;
            let tmp_dir = tempfile::tempdir().map_err(|e| {
                TransportError::Browser(format!("Failed to create temp profile dir: {e}"))
            })?;

            let result = tokio::time::timeout(
                self.settings.timeout,
                tokio::process::Command::new(&self.settings.chrome_bin)
                    .args([
                        "--headless",
                        "--no-sandbox",
                        "--disable-gpu",
                        "--disable-dev-shm-usage",
                        &format!("--user-data-dir={}", tmp_dir.path().display()),
                        "--dump-dom",
                        url,
                    ])
                    .kill_on_drop(true)
                    .output(),
            )
            .await;

            match result {
                Ok(Ok(output)) if output.status.success() => {
                    if output.stdout.len() > MIN_BROWSER_DUMP_BYTES || !retry {
                        return Ok(output.stdout);
                    }
                    self.backoff(url, attempt, "short DOM dump").await;
                }
                Ok(Ok(output)) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    if is_transient_launch_failure(&stderr) && retry {
                        self.backoff(url, attempt, "cannot fork").await;
                        continue;
                    }
                    return Err(TransportError::Browser(format!(
                        "Chrome exited with {}: {}",
                        output.status,
                        stderr.trim()
                    )));
                }
                Ok(Err(e)) => {
                    if is_transient_launch_failure(&e.to_string()) && retry {
                        self.backoff(url, attempt, "launch failed").await;
                        continue;
                    }
                    return Err(TransportError::Browser(format!(
                        "Failed to run Chrome for {url}: {e}"
                    )));
                }
                Err(_) => {
                    if retry {
                        self.backoff(url, attempt, "timed out").await;
                        continue;
                    }
                    return Err(TransportError::Timeout(format!(
                        "Chrome timed out after {}s for {url}",
                        self.settings.timeout.as_secs()
                    )));
                }
            }
        }

        Ok(Vec::new())
    }
}

fn is_transient_launch_failure(message: &str) -> bool {
    message.contains("Cannot fork") || message.contains("Resource temporarily unavailable")
}

#[async_trait]
impl PageFetcher for ChromeFetcher {
    async fn fetch(&self, url: &str) -> Result<String, TransportError> {
        check_http_url(url)?;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| TransportError::Browser("Chrome semaphore closed".into()))?;

        info!(url, fetcher = "chrome", "Rendering page");

        let dump = self.run_chrome(url).await?;
        if dump.len() <= MIN_BROWSER_DUMP_BYTES {
            return Err(TransportError::Browser(format!(
                "DOM dump too short ({} bytes) for {url}",
                dump.len()
            )));
        }

        let html = String::from_utf8_lossy(&dump).into_owned();
        if let Some(marker) = challenge_marker(&html) {
            return Err(TransportError::Blocked {
                url: url.to_string(),
                marker: marker.to_string(),
            });
        }

        info!(url, fetcher = "chrome", bytes = html.len(), "Rendered page");
        Ok(html)
    }

    fn name(&self) -> &str {
        "chrome"
    }
}

// --- Remote Browserless ---

pub struct BrowserlessFetcher {
    client: browserless_client::BrowserlessClient,
}

impl BrowserlessFetcher {
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        info!(base_url, "Using BrowserlessFetcher");
        let client = browserless_client::BrowserlessClient::with_timeout(base_url, token, timeout)
            .map_err(|e| TransportError::Browser(e.to_string()))?
            .with_settle(Duration::from_secs(3));
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for BrowserlessFetcher {
    async fn fetch(&self, url: &str) -> Result<String, TransportError> {
        use browserless_client::BrowserlessError;

        info!(url, fetcher = "browserless", "Rendering page");

        let html = self.client.content(url).await.map_err(|e| match e {
            BrowserlessError::Timeout(msg) => TransportError::Timeout(msg),
            BrowserlessError::Network(msg) => TransportError::Network(msg),
            BrowserlessError::Api { status, .. } => TransportError::Status {
                url: url.to_string(),
                status,
            },
            other => TransportError::Browser(other.to_string()),
        })?;

        if let Some(marker) = challenge_marker(&html) {
            return Err(TransportError::Blocked {
                url: url.to_string(),
                marker: marker.to_string(),
            });
        }
        Ok(html)
    }

    fn name(&self) -> &str {
        "browserless"
    }
}

// --- Fallback chain ---

/// Tries each strategy in order and returns the first success.
pub struct FallbackFetcher {
    strategies: Vec<Box<dyn PageFetcher>>,
}

impl FallbackFetcher {
    pub fn new(strategies: Vec<Box<dyn PageFetcher>>) -> Self {
        Self { strategies }
    }

    /// http, then chrome, then browserless when configured.
    pub fn from_settings(settings: &FetchSettings) -> Result<Self, TransportError> {
        let mut strategies: Vec<Box<dyn PageFetcher>> = vec![
            Box::new(HttpFetcher::new(settings.clone())?),
            Box::new(ChromeFetcher::new(settings.clone())),
        ];
        if let Some(base_url) = &settings.browserless_url {
            strategies.push(Box::new(BrowserlessFetcher::new(
                base_url,
                settings.browserless_token.as_deref(),
                settings.timeout,
            )?));
        }
        Ok(Self::new(strategies))
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl PageFetcher for FallbackFetcher {
    async fn fetch(&self, url: &str) -> Result<String, TransportError> {
        let mut failures = Vec::new();
        for strategy in &self.strategies {
            match strategy.fetch(url).await {
                Ok(html) => {
                    if !failures.is_empty() {
                        info!(url, fetcher = strategy.name(), "Fallback strategy succeeded");
                    }
                    return Ok(html);
                }
                Err(e) => {
                    warn!(url, fetcher = strategy.name(), error = %e, "Fetch strategy failed");
                    failures.push(format!("{}: {e}", strategy.name()));
                }
            }
        }
        Err(TransportError::Exhausted {
            url: url.to_string(),
            failures,
        })
    }

    fn name(&self) -> &str {
        "fallback"
    }
}
