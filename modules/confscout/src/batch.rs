//! Bounded-concurrency extraction over a batch of candidates.
//!
//! Candidates run in fixed-size chunks, one chunk at a time, with a pause
//! between chunks. Inside a chunk every item is its own task behind a shared
//! semaphore. Output order always matches input order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{info, warn};

use confscout_common::{Config, ConferenceCandidate};

use crate::extraction::{ExtractionResult, FieldExtractor, Provenance};

#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Max extraction calls in flight.
    pub concurrency: usize,
    pub chunk_size: usize,
    pub chunk_pause: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            chunk_size: 20,
            chunk_pause: Duration::from_secs(1),
        }
    }
}

impl BatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.extraction_concurrency.max(1),
            chunk_size: config.extraction_chunk_size.max(1),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub extracted: usize,
    pub cached: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn of(results: &[(ConferenceCandidate, ExtractionResult)]) -> Self {
        let mut summary = Self::default();
        for (_, result) in results {
            match result.provenance {
                Provenance::Extracted => summary.extracted += 1,
                Provenance::Cached => summary.cached += 1,
                Provenance::Failed => summary.failed += 1,
            }
        }
        summary
    }
}

pub struct BatchProcessor {
    extractor: Arc<dyn FieldExtractor>,
    settings: BatchSettings,
}

impl BatchProcessor {
    pub fn new(extractor: Arc<dyn FieldExtractor>, settings: BatchSettings) -> Self {
        Self { extractor, settings }
    }

    /// One `(candidate, result)` pair per input, in input order. A task that
    /// panics yields [`ExtractionResult::failed`] for its own slot only.
    pub async fn process_all(
        &self,
        candidates: Vec<ConferenceCandidate>,
    ) -> Vec<(ConferenceCandidate, ExtractionResult)> {
        let total = candidates.len();
        if total == 0 {
            return Vec::new();
        }

        let chunk_size = self.settings.chunk_size.max(1);
        let gate = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut results: Vec<Option<ExtractionResult>> = (0..total).map(|_| None).collect();
        let started = Instant::now();
        let mut processed = 0;

        info!(
            total,
            chunk_size,
            concurrency = self.settings.concurrency,
            "Starting batch extraction"
        );

        for (chunk_index, chunk) in candidates.chunks(chunk_size).enumerate() {
            if chunk_index > 0 && !self.settings.chunk_pause.is_zero() {
                tokio::time::sleep(self.settings.chunk_pause).await;
            }

            let offset = chunk_index * chunk_size;
            let handles: Vec<_> = chunk
                .iter()
                .cloned()
                .enumerate()
                .map(|(i, candidate)| {
                    let gate = gate.clone();
                    let extractor = self.extractor.clone();
                    let handle = tokio::spawn(async move {
                        let _permit = gate.acquire_owned().await;
                        extractor.extract(&candidate).await
                    });
                    (offset + i, handle)
                })
                .collect();

            for (index, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(index, error = %e, "Extraction task aborted, using empty fields");
                        ExtractionResult::failed()
                    }
                };
                results[index] = Some(result);
            }

            processed += chunk.len();
            info!(
                processed,
                total,
                percent = processed * 100 / total,
                "Extraction progress"
            );
        }

        let elapsed = started.elapsed().as_secs_f64();
        info!(
            total,
            elapsed_secs = elapsed,
            per_sec = total as f64 / elapsed.max(f64::EPSILON),
            "Batch extraction complete"
        );

        candidates
            .into_iter()
            .zip(results)
            .map(|(candidate, result)| (candidate, result.unwrap_or_else(ExtractionResult::failed)))
            .collect()
    }
}
