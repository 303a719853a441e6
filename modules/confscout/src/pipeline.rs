//! Pipeline driver.
//!
//! One run walks ScrapeListings → FilterAgainstStore → EnrichNew →
//! PersistNewRaw → ExtractFields → MergeIntoStore → ExportFlat → Done. A failing
//! stage halts the run; files written by earlier stages stay in place, and every
//! stage after the scrape recomputes "what is new" from the files on disk, so
//! re-running is safe.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::bail;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use confscout_common::{Config, ConferenceCandidate, StoredConference};

use crate::batch::{BatchProcessor, BatchSettings, BatchSummary};
use crate::enrichment::DetailEnricher;
use crate::export;
use crate::extraction::FieldExtractor;
use crate::fetch::PageFetcher;
use crate::listing;
use crate::run_log::{EventKind, RunLog};
use crate::store::{ConferenceStore, ScrapeLedger};

// ---------------------------------------------------------------------------
// Stages and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ScrapeListings,
    FilterAgainstStore,
    EnrichNew,
    PersistNewRaw,
    ExtractFields,
    MergeIntoStore,
    ExportFlat,
    Done,
}

impl Stage {
    pub fn next(self) -> Stage {
        match self {
            Stage::ScrapeListings => Stage::FilterAgainstStore,
            Stage::FilterAgainstStore => Stage::EnrichNew,
            Stage::EnrichNew => Stage::PersistNewRaw,
            Stage::PersistNewRaw => Stage::ExtractFields,
            Stage::ExtractFields => Stage::MergeIntoStore,
            Stage::MergeIntoStore => Stage::ExportFlat,
            Stage::ExportFlat | Stage::Done => Stage::Done,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ScrapeListings => "scrape_listings",
            Stage::FilterAgainstStore => "filter_against_store",
            Stage::EnrichNew => "enrich_new",
            Stage::PersistNewRaw => "persist_new_raw",
            Stage::ExtractFields => "extract_fields",
            Stage::MergeIntoStore => "merge_into_store",
            Stage::ExportFlat => "export_flat",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("stage {stage} failed: {source:#}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: anyhow::Error,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// File layout under the data directory.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub data_dir: PathBuf,
    pub ledger: PathBuf,
    pub store: PathBuf,
    pub export: PathBuf,
    pub cache: PathBuf,
    pub runs: PathBuf,
}

impl StorePaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            ledger: data_dir.join("ssrn.json"),
            store: data_dir.join("conferences.json"),
            export: data_dir.join("conferences.csv"),
            cache: data_dir.join("extraction_cache.json"),
            runs: data_dir.join("runs"),
            data_dir,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub listing_urls: Vec<String>,
    /// Pages fetched per listing URL, first page included.
    pub max_listing_pages: usize,
    /// A ledger written more recently than this skips the listing scrape.
    pub scrape_freshness: Duration,
    pub force_rescrape: bool,
    pub force_reprocess: bool,
    pub fetch_concurrency: usize,
    pub batch: BatchSettings,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            listing_urls: config.listing_urls.clone(),
            max_listing_pages: config.max_listing_pages.max(1),
            scrape_freshness: Duration::from_secs(config.scrape_freshness_hours * 3600),
            force_rescrape: false,
            force_reprocess: false,
            fetch_concurrency: config.fetch_concurrency.max(1),
            batch: BatchSettings::from_config(config),
        }
    }
}

// ---------------------------------------------------------------------------
// Run statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunStats {
    pub scrape_skipped: bool,
    pub listing_pages: usize,
    pub listing_failures: usize,
    pub candidates_parsed: usize,
    pub candidates_discarded: usize,
    pub duplicates_in_scrape: usize,
    pub new_candidates: usize,
    pub details_enriched: usize,
    pub ledger_added: usize,
    pub pending_extraction: usize,
    pub extracted: usize,
    pub cache_hits: usize,
    pub extraction_failures: usize,
    pub records_added: usize,
    pub records_replaced: usize,
    pub rows_exported: usize,
    pub stage_timings: Vec<StageTiming>,
}

impl RunStats {
    fn record_stage(&mut self, stage: Stage, elapsed: Duration) {
        self.stage_timings.push(StageTiming {
            stage,
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }

    fn elapsed(&self, stage: Stage) -> Option<Duration> {
        self.stage_timings
            .iter()
            .find(|t| t.stage == stage)
            .map(|t| Duration::from_millis(t.elapsed_ms))
    }

    /// Items per second for a stage, if it ran and took measurable time.
    pub fn throughput(&self, stage: Stage, items: usize) -> Option<f64> {
        let secs = self.elapsed(stage)?.as_secs_f64();
        (secs > 0.0).then(|| items as f64 / secs)
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rate = |stage: Stage, items: usize| match self.throughput(stage, items) {
            Some(r) => format!(" ({r:.2}/s)"),
            None => String::new(),
        };

        writeln!(f, "\n=== Conference Run Complete ===")?;
        if self.scrape_skipped {
            writeln!(f, "Listing scrape:       skipped (ledger fresh)")?;
        } else {
            writeln!(
                f,
                "Listing pages:        {} ({} failed)",
                self.listing_pages, self.listing_failures
            )?;
            writeln!(
                f,
                "Candidates parsed:    {}{}",
                self.candidates_parsed,
                rate(Stage::ScrapeListings, self.candidates_parsed)
            )?;
            writeln!(f, "  discarded:          {}", self.candidates_discarded)?;
            writeln!(f, "  repeated:           {}", self.duplicates_in_scrape)?;
        }
        writeln!(f, "New candidates:       {}", self.new_candidates)?;
        writeln!(
            f,
            "Details enriched:     {}{}",
            self.details_enriched,
            rate(Stage::EnrichNew, self.new_candidates)
        )?;
        writeln!(f, "Ledger additions:     {}", self.ledger_added)?;
        writeln!(
            f,
            "Extraction pending:   {}{}",
            self.pending_extraction,
            rate(Stage::ExtractFields, self.pending_extraction)
        )?;
        writeln!(f, "  extracted:          {}", self.extracted)?;
        writeln!(f, "  cache hits:         {}", self.cache_hits)?;
        writeln!(f, "  failed:             {}", self.extraction_failures)?;
        writeln!(f, "Records added:        {}", self.records_added)?;
        writeln!(f, "Records replaced:     {}", self.records_replaced)?;
        writeln!(f, "Rows exported:        {}", self.rows_exported)?;
        if !self.stage_timings.is_empty() {
            writeln!(f, "\nStage timings:")?;
            for t in &self.stage_timings {
                writeln!(f, "  {:<22}{} ms", t.stage.as_str(), t.elapsed_ms)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Everything one run reads and produces. Stores are read once up front and
/// written by the stages that own them.
struct RunState {
    ledger: ScrapeLedger,
    store: ConferenceStore,
    scraped: Vec<ConferenceCandidate>,
    fresh: Vec<ConferenceCandidate>,
    extracted: Vec<StoredConference>,
    stats: RunStats,
}

pub struct Pipeline {
    fetcher: Arc<dyn PageFetcher>,
    enricher: DetailEnricher,
    batch: BatchProcessor,
    paths: StorePaths,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn FieldExtractor>,
        paths: StorePaths,
        options: PipelineOptions,
    ) -> Self {
        Self {
            enricher: DetailEnricher::new(fetcher.clone(), options.fetch_concurrency),
            batch: BatchProcessor::new(extractor, options.batch.clone()),
            fetcher,
            paths,
            options,
        }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Run every stage in order. The run log is written whether or not the run succeeds.
    pub async fn run(&self) -> Result<RunStats, PipelineError> {
        let mut log = RunLog::new();
        info!(run_id = %log.run_id, data_dir = %self.paths.data_dir.display(), "Pipeline run starting");

        let mut run = RunState {
            ledger: ScrapeLedger::load(&self.paths.ledger),
            store: ConferenceStore::load(&self.paths.store),
            scraped: Vec::new(),
            fresh: Vec::new(),
            extracted: Vec::new(),
            stats: RunStats::default(),
        };

        let result = self.drive(&mut run, &mut log).await;

        if let Err(e) = log.save(&self.paths.runs, &run.stats) {
            warn!(error = %e, "Failed to save run log");
        }
        result.map(|()| run.stats)
    }

    async fn drive(&self, run: &mut RunState, log: &mut RunLog) -> Result<(), PipelineError> {
        let mut stage = Stage::ScrapeListings;
        while stage != Stage::Done {
            let started = Instant::now();
            let outcome = match stage {
                Stage::ScrapeListings => self.scrape_listings(run, log).await,
                Stage::FilterAgainstStore => self.filter_against_store(run, log),
                Stage::EnrichNew => self.enrich_new(run, log).await,
                Stage::PersistNewRaw => self.persist_new_raw(run, log),
                Stage::ExtractFields => self.extract_fields(run, log).await,
                Stage::MergeIntoStore => self.merge_into_store(run, log),
                Stage::ExportFlat => self.export_flat(run, log),
                Stage::Done => Ok(()),
            };
            let elapsed = started.elapsed();
            run.stats.record_stage(stage, elapsed);

            if let Err(source) = outcome {
                let reason = format!("{source:#}");
                error!(%stage, error = %reason, "Stage failed, halting run");
                log.log(EventKind::StageFailed { stage, reason });
                return Err(PipelineError { stage, source });
            }

            log.log(EventKind::StageCompleted {
                stage,
                elapsed_ms: elapsed.as_millis() as u64,
            });
            stage = stage.next();
        }
        Ok(())
    }

    // --- ScrapeListings ---

    async fn scrape_listings(&self, run: &mut RunState, log: &mut RunLog) -> anyhow::Result<()> {
        if !self.options.force_rescrape && run.ledger.is_fresh(self.options.scrape_freshness) {
            let age = run.ledger.age().unwrap_or_default();
            info!(
                age_secs = age.as_secs(),
                records = run.ledger.len(),
                "Scrape ledger is fresh, skipping listing scrape"
            );
            run.stats.scrape_skipped = true;
            log.log(EventKind::ScrapeSkipped {
                ledger_age_secs: age.as_secs(),
                ledger_records: run.ledger.len(),
            });
            return Ok(());
        }

        let mut seen = HashSet::new();
        for listing_url in &self.options.listing_urls {
            let Some(html) = self.fetch_listing(listing_url, run, log).await else {
                continue;
            };
            let more = listing::discover_pages(
                &html,
                listing_url,
                self.options.max_listing_pages.saturating_sub(1),
            );
            if !more.is_empty() {
                info!(url = %listing_url, pages = more.len(), "Following listing pagination");
            }
            self.take_candidates(&html, listing_url, run, log, &mut seen);

            for page_url in more {
                if let Some(html) = self.fetch_listing(&page_url, run, log).await {
                    self.take_candidates(&html, &page_url, run, log, &mut seen);
                }
            }
        }

        if run.stats.listing_pages == 0 {
            bail!(
                "no listing page could be fetched ({} url(s) tried)",
                self.options.listing_urls.len()
            );
        }
        info!(
            pages = run.stats.listing_pages,
            candidates = run.scraped.len(),
            "Listing scrape complete"
        );
        Ok(())
    }

    async fn fetch_listing(
        &self,
        url: &str,
        run: &mut RunState,
        log: &mut RunLog,
    ) -> Option<String> {
        match self.fetcher.fetch(url).await {
            Ok(html) => {
                run.stats.listing_pages += 1;
                Some(html)
            }
            Err(e) => {
                warn!(url, error = %e, "Listing page unavailable");
                run.stats.listing_failures += 1;
                log.log(EventKind::ListingFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    fn take_candidates(
        &self,
        html: &str,
        page_url: &str,
        run: &mut RunState,
        log: &mut RunLog,
        seen: &mut HashSet<confscout_common::Signature>,
    ) {
        let candidates = listing::extract_candidates(html, page_url);
        log.log(EventKind::ListingFetched {
            url: page_url.to_string(),
            bytes: html.len(),
            candidates: candidates.len(),
        });
        run.stats.candidates_parsed += candidates.len();

        for candidate in candidates {
            if !candidate.is_actionable() {
                run.stats.candidates_discarded += 1;
            } else if seen.insert(candidate.signature()) {
                run.scraped.push(candidate);
            } else {
                run.stats.duplicates_in_scrape += 1;
            }
        }
    }

    // --- FilterAgainstStore ---

    fn filter_against_store(&self, run: &mut RunState, log: &mut RunLog) -> anyhow::Result<()> {
        let scraped = std::mem::take(&mut run.scraped);
        let total = scraped.len();
        let (store, ledger) = (&run.store, &run.ledger);
        run.fresh = scraped
            .into_iter()
            .filter(|c| {
                let signature = c.signature();
                !store.contains(&signature) && !ledger.contains(&signature)
            })
            .collect();

        run.stats.new_candidates = run.fresh.len();
        info!(
            scraped = total,
            new = run.fresh.len(),
            known = store.len(),
            "Filtered against store"
        );
        log.log(EventKind::CandidatesFiltered {
            scraped: total,
            new: run.fresh.len(),
        });
        Ok(())
    }

    // --- EnrichNew ---

    async fn enrich_new(&self, run: &mut RunState, log: &mut RunLog) -> anyhow::Result<()> {
        if run.fresh.is_empty() {
            return Ok(());
        }
        let attempted = run.fresh.len();
        let report = self.enricher.enrich_all(std::mem::take(&mut run.fresh)).await;
        run.fresh = report.candidates;
        run.stats.details_enriched = report.enriched;
        log.log(EventKind::DetailsEnriched {
            attempted,
            enriched: report.enriched,
        });
        Ok(())
    }

    // --- PersistNewRaw ---

    fn persist_new_raw(&self, run: &mut RunState, log: &mut RunLog) -> anyhow::Result<()> {
        if run.stats.scrape_skipped {
            return Ok(());
        }
        let added = run.ledger.append(&run.fresh)?;
        run.stats.ledger_added = added;
        log.log(EventKind::LedgerWritten {
            added,
            total: run.ledger.len(),
        });
        Ok(())
    }

    // --- ExtractFields ---

    async fn extract_fields(&self, run: &mut RunState, log: &mut RunLog) -> anyhow::Result<()> {
        let force = self.options.force_reprocess;
        let mut seen = HashSet::new();
        let pending: Vec<ConferenceCandidate> = run
            .ledger
            .candidates()
            .iter()
            .filter(|c| {
                let signature = c.signature();
                (force || !run.store.contains(&signature)) && seen.insert(signature)
            })
            .cloned()
            .collect();

        run.stats.pending_extraction = pending.len();
        if pending.is_empty() {
            info!("No conferences awaiting extraction");
            return Ok(());
        }
        info!(pending = pending.len(), force_reprocess = force, "Extracting fields");

        let results = self.batch.process_all(pending).await;
        let summary = BatchSummary::of(&results);
        run.stats.extracted = summary.extracted;
        run.stats.cache_hits = summary.cached;
        run.stats.extraction_failures = summary.failed;

        run.extracted = results
            .into_iter()
            .map(|(candidate, result)| {
                log.log(EventKind::Extraction {
                    title: candidate.title.clone(),
                    provenance: result.provenance,
                });
                StoredConference::new(candidate, result.fields)
            })
            .collect();
        Ok(())
    }

    // --- MergeIntoStore ---

    fn merge_into_store(&self, run: &mut RunState, log: &mut RunLog) -> anyhow::Result<()> {
        let records = std::mem::take(&mut run.extracted);
        let outcome = if self.options.force_reprocess {
            run.store.upsert(records)?
        } else {
            run.store.merge(records)?
        };
        run.stats.records_added = outcome.added;
        run.stats.records_replaced = outcome.replaced;
        log.log(EventKind::StoreMerged {
            added: outcome.added,
            replaced: outcome.replaced,
            skipped: outcome.skipped,
        });
        Ok(())
    }

    // --- ExportFlat ---

    fn export_flat(&self, run: &mut RunState, log: &mut RunLog) -> anyhow::Result<()> {
        let rows = export::write_csv(run.store.records(), &self.paths.export)?;
        run.stats.rows_exported = rows;
        log.log(EventKind::Exported { rows });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_advance_in_order_and_stop_at_done() {
        let mut stage = Stage::ScrapeListings;
        let mut order = vec![stage];
        while stage != Stage::Done {
            stage = stage.next();
            order.push(stage);
        }
        assert_eq!(
            order,
            vec![
                Stage::ScrapeListings,
                Stage::FilterAgainstStore,
                Stage::EnrichNew,
                Stage::PersistNewRaw,
                Stage::ExtractFields,
                Stage::MergeIntoStore,
                Stage::ExportFlat,
                Stage::Done,
            ]
        );
        assert_eq!(Stage::Done.next(), Stage::Done);
    }

    #[test]
    fn store_paths_live_under_the_data_dir() {
        let paths = StorePaths::new("output");
        assert_eq!(paths.ledger, PathBuf::from("output/ssrn.json"));
        assert_eq!(paths.store, PathBuf::from("output/conferences.json"));
        assert_eq!(paths.export, PathBuf::from("output/conferences.csv"));
        assert_eq!(paths.runs, PathBuf::from("output/runs"));
    }

    #[test]
    fn error_names_the_stage_and_reason() {
        let err = PipelineError {
            stage: Stage::ScrapeListings,
            source: anyhow::anyhow!("no listing page could be fetched"),
        };
        assert_eq!(
            err.to_string(),
            "stage scrape_listings failed: no listing page could be fetched"
        );
    }

    #[test]
    fn throughput_needs_a_measured_stage() {
        let mut stats = RunStats::default();
        assert_eq!(stats.throughput(Stage::ExtractFields, 10), None);
        stats.record_stage(Stage::ExtractFields, Duration::from_secs(2));
        assert_eq!(stats.throughput(Stage::ExtractFields, 10), Some(5.0));
        assert!(stats.to_string().contains("Extraction pending:   0"));
    }
}
