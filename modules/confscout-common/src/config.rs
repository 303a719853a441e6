use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

pub const DEFAULT_LISTING_URL: &str =
    "https://www.ssrn.com/index.cfm/en/janda/professional-announcements/?annsNet=203#AnnType_1";

/// Application configuration loaded from environment variables.
/// The binary turns this into per-component settings; nothing reads it globally.
#[derive(Debug, Clone)]
pub struct Config {
    // Extraction service
    pub deepseek_api_key: String,
    pub extraction_base_url: String,
    pub extraction_model: String,
    pub extraction_concurrency: usize,
    pub extraction_chunk_size: usize,
    pub extraction_max_attempts: u32,
    pub extraction_cache: bool,

    // Listing source
    pub listing_urls: Vec<String>,
    pub max_listing_pages: usize,
    pub scrape_freshness_hours: u64,

    // Fetching
    pub fetch_concurrency: usize,
    pub http_timeout_secs: u64,
    pub chrome_bin: String,
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,

    // Storage
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.log_keys();
        Ok(config)
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let listing_urls: Vec<String> = get("LISTING_URLS")
            .unwrap_or_else(|| DEFAULT_LISTING_URL.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if listing_urls.is_empty() {
            return Err(anyhow!("LISTING_URLS must name at least one URL"));
        }

        Ok(Self {
            deepseek_api_key: get("DEEPSEEK_API_KEY")
                .ok_or_else(|| anyhow!("DEEPSEEK_API_KEY environment variable is required"))?,
            extraction_base_url: get("EXTRACTION_BASE_URL")
                .unwrap_or_else(|| "https://api.deepseek.com/v1".to_string()),
            extraction_model: get("EXTRACTION_MODEL")
                .unwrap_or_else(|| "deepseek-chat".to_string()),
            extraction_concurrency: parsed(&get, "EXTRACTION_CONCURRENCY", 5)?,
            extraction_chunk_size: parsed(&get, "EXTRACTION_CHUNK_SIZE", 20)?,
            extraction_max_attempts: parsed(&get, "EXTRACTION_MAX_ATTEMPTS", 3)?,
            extraction_cache: parsed(&get, "EXTRACTION_CACHE", true)?,
            listing_urls,
            max_listing_pages: parsed(&get, "MAX_LISTING_PAGES", 5)?,
            scrape_freshness_hours: parsed(&get, "SCRAPE_FRESHNESS_HOURS", 24)?,
            fetch_concurrency: parsed(&get, "FETCH_CONCURRENCY", 3)?,
            http_timeout_secs: parsed(&get, "HTTP_TIMEOUT_SECS", 30)?,
            chrome_bin: get("CHROME_BIN").unwrap_or_else(|| "chromium".to_string()),
            browserless_url: get("BROWSERLESS_URL"),
            browserless_token: get("BROWSERLESS_TOKEN"),
            data_dir: get("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("output")),
        })
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val.char_indices().nth(5).map(|(i, _)| i).unwrap_or(val.len());
            format!("{}...({} chars)", &val[..n], val.len())
        }
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) => preview(v),
                None => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  DEEPSEEK_API_KEY: {}", preview(&self.deepseek_api_key));
        tracing::info!("  EXTRACTION_MODEL: {}", self.extraction_model);
        tracing::info!("  LISTING_URLS: {} url(s)", self.listing_urls.len());
        tracing::info!("  BROWSERLESS_URL: {}", preview_opt(&self.browserless_url));
        tracing::info!("  BROWSERLESS_TOKEN: {}", preview_opt(&self.browserless_token));
        tracing::info!("  DATA_DIR: {}", self.data_dir.display());
    }
}

fn parsed<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}
