//! Run log: a persisted JSON timeline of what one pipeline run did.
//!
//! Each run produces a single `{DATA_DIR}/runs/{run_id}.json` file containing
//! the final stats and an ordered list of timestamped events.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::extraction::Provenance;
use crate::pipeline::{RunStats, Stage};

// ---------------------------------------------------------------------------
// RunLog
// ---------------------------------------------------------------------------

pub struct RunLog {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Serialize)]
struct RunEvent {
    seq: u32,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    kind: EventKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    ScrapeSkipped {
        ledger_age_secs: u64,
        ledger_records: usize,
    },
    ListingFetched {
        url: String,
        bytes: usize,
        candidates: usize,
    },
    ListingFailed {
        url: String,
        reason: String,
    },
    CandidatesFiltered {
        scraped: usize,
        new: usize,
    },
    DetailsEnriched {
        attempted: usize,
        enriched: usize,
    },
    LedgerWritten {
        added: usize,
        total: usize,
    },
    Extraction {
        title: String,
        provenance: Provenance,
    },
    StoreMerged {
        added: usize,
        replaced: usize,
        skipped: usize,
    },
    Exported {
        rows: usize,
    },
    StageCompleted {
        stage: Stage,
        elapsed_ms: u64,
    },
    StageFailed {
        stage: Stage,
        reason: String,
    },
}

fn new_run_id() -> String {
    let suffix: u16 = rand::rng().random();
    format!("{}-{suffix:04x}", Utc::now().format("%Y%m%dT%H%M%SZ"))
}

impl RunLog {
    pub fn new() -> Self {
        Self {
            run_id: new_run_id(),
            started_at: Utc::now(),
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn log(&mut self, kind: EventKind) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            kind,
        });
        self.seq += 1;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Serialize the run log to JSON and write it under `dir`.
    /// Returns the file path on success.
    pub fn save(&self, dir: &Path, stats: &RunStats) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.run_id));

        let output = SerializedRunLog {
            run_id: &self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            stats,
            events: &self.events,
        };

        std::fs::write(&path, serde_json::to_string_pretty(&output)?)?;
        info!(path = %path.display(), events = self.events.len(), "Run log saved");

        Ok(path)
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct SerializedRunLog<'a> {
    run_id: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    stats: &'a RunStats,
    events: &'a [RunEvent],
}
