use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::DeepSeek;
use confscout::extraction::{ExtractionCache, ExtractionClient, RetryPolicy};
use confscout::fetch::{FallbackFetcher, FetchSettings};
use confscout::pipeline::{Pipeline, PipelineOptions, StorePaths};
use confscout_common::Config;

#[derive(Parser)]
#[command(name = "confscout", about = "Discover, deduplicate and enrich finance conference calls")]
struct Cli {
    /// Scrape listings even if the scrape ledger is fresh
    #[arg(long, env = "FORCE_RESCRAPE")]
    force_rescrape: bool,

    /// Re-extract every ledger record and replace stored records
    #[arg(long, env = "FORCE_REPROCESS")]
    force_reprocess: bool,

    /// Override FETCH_CONCURRENCY
    #[arg(long)]
    fetch_concurrency: Option<usize>,

    /// Override EXTRACTION_CONCURRENCY
    #[arg(long)]
    extraction_concurrency: Option<usize>,

    /// Skip the extraction cache for this run
    #[arg(long)]
    no_cache: bool,

    /// Override DATA_DIR
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("confscout=info".parse()?);
    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Conference scout starting...");

    let mut config = Config::from_env()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(n) = cli.fetch_concurrency {
        config.fetch_concurrency = n;
    }
    if let Some(n) = cli.extraction_concurrency {
        config.extraction_concurrency = n;
    }
    if cli.no_cache {
        config.extraction_cache = false;
    }

    let paths = StorePaths::new(&config.data_dir);

    // Fetch chain: plain HTTP, then headless Chrome, then Browserless if configured
    let fetch_settings = FetchSettings::from_config(&config);
    let fetcher = FallbackFetcher::from_settings(&fetch_settings)?;
    info!(strategies = ?fetcher.strategy_names(), "Fetch chain ready");

    let deepseek = DeepSeek::new(&config.deepseek_api_key, &config.extraction_model)
        .with_base_url(&config.extraction_base_url)
        .with_timeout(Duration::from_secs(60));
    let mut client = ExtractionClient::new(Arc::new(deepseek), RetryPolicy::from_config(&config));
    if config.extraction_cache {
        let cache = ExtractionCache::load(&paths.cache);
        info!(entries = cache.len(), path = %paths.cache.display(), "Extraction cache loaded");
        client = client.with_cache(cache);
    }
    let client = Arc::new(client);

    let mut options = PipelineOptions::from_config(&config);
    options.force_rescrape = cli.force_rescrape;
    options.force_reprocess = cli.force_reprocess;

    let pipeline = Pipeline::new(Arc::new(fetcher), client.clone(), paths, options);
    let outcome = pipeline.run().await;

    match client.flush_cache() {
        Ok(true) => info!("Extraction cache saved"),
        Ok(false) => {}
        Err(e) => warn!(error = %e, "Failed to save extraction cache"),
    }

    match outcome {
        Ok(stats) => {
            info!("Conference run complete. {stats}");
            Ok(())
        }
        Err(e) => {
            error!(stage = %e.stage, error = %format!("{:#}", e.source), "Run halted");
            Err(e.into())
        }
    }
}
