//! Whole-file JSON stores: the conference store (deduplication source of truth)
//! and the raw scrape ledger.
//!
//! Both share one document shape, a metadata block plus an ordered record
//! list. Unreadable or corrupt files load as empty with a warning and are moved
//! to a `.corrupt-*` sibling before the first write replaces them. Writes go to
//! a sibling temp file that is then renamed over the target.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use confscout_common::{ConferenceCandidate, PersistenceError, Signature, StoredConference};

/// Naive timestamp layouts accepted in metadata besides RFC 3339, read as UTC.
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

// ---------------------------------------------------------------------------
// Document format
// ---------------------------------------------------------------------------

/// Unparseable or `null` timestamps load as `None` rather than failing the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreMetadata {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_conferences: usize,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl StoreMetadata {
    fn fresh() -> Self {
        let now = Utc::now();
        Self {
            created: Some(now),
            total_conferences: 0,
            last_updated: Some(now),
        }
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NAIVE_TIMESTAMP_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|naive| naive.and_utc())
        })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(|v| v.as_str()).and_then(parse_timestamp))
}

/// A metadata block of the wrong shape never costs the record list.
fn lenient_metadata<'de, D>(deserializer: D) -> Result<StoreMetadata, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    if raw.is_null() {
        return Ok(StoreMetadata::default());
    }
    Ok(serde_json::from_value(raw).unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring malformed store metadata");
        StoreMetadata::default()
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDocument<T> {
    #[serde(default, deserialize_with = "lenient_metadata")]
    pub metadata: StoreMetadata,
    #[serde(default = "Vec::new")]
    pub conferences: Vec<T>,
}

impl<T> StoreDocument<T> {
    fn empty() -> Self {
        Self {
            metadata: StoreMetadata::fresh(),
            conferences: Vec::new(),
        }
    }

    fn touch(&mut self) {
        let now = Utc::now();
        self.metadata.total_conferences = self.conferences.len();
        self.metadata.created.get_or_insert(now);
        self.metadata.last_updated = Some(now);
    }
}

/// `Ok(None)` when the file does not exist.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PersistenceError::io(path, e)),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| PersistenceError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

pub(crate) fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
    }
    let body = serde_json::to_string_pretty(value)?;
    let tmp = temp_sibling(path);
    fs::write(&tmp, body).map_err(|e| PersistenceError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| PersistenceError::io(path, e))
}

pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// `{name}.corrupt-{timestamp}` next to `path`.
fn corrupt_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ")));
    path.with_file_name(name)
}

/// Move a file that could not be read out of the way before it is rewritten.
fn set_aside(path: &Path) -> Result<Option<PathBuf>, PersistenceError> {
    if !path.exists() {
        return Ok(None);
    }
    let target = corrupt_sibling(path);
    fs::rename(path, &target).map_err(|e| PersistenceError::io(path, e))?;
    warn!(
        path = %path.display(),
        moved_to = %target.display(),
        "Unreadable file moved aside before rewrite"
    );
    Ok(Some(target))
}

/// The document, and whether an existing file failed to load.
fn load_or_empty<T: DeserializeOwned>(path: &Path, what: &str) -> (StoreDocument<T>, bool) {
    match read_json(path) {
        Ok(Some(doc)) => (doc, false),
        Ok(None) => (StoreDocument::empty(), false),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable {what}, treating as empty");
            (StoreDocument::empty(), true)
        }
    }
}

// ---------------------------------------------------------------------------
// Conference store
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added: usize,
    pub replaced: usize,
    pub skipped: usize,
}

/// Persisted conference records keyed by identity signature. Append-only in
/// normal runs; [`ConferenceStore::upsert`] is the explicit re-processing path.
pub struct ConferenceStore {
    path: PathBuf,
    document: StoreDocument<StoredConference>,
    signatures: HashSet<Signature>,
    /// The file on disk could not be read; it is set aside on the next save.
    unreadable: bool,
}

impl ConferenceStore {
    /// Missing or corrupt files yield an empty store. A corrupt file is kept
    /// under a `.corrupt-*` name when the store is next written.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (document, unreadable): (StoreDocument<StoredConference>, _) =
            load_or_empty(&path, "conference store");
        let signatures = document.conferences.iter().map(|c| c.signature()).collect();
        info!(path = %path.display(), records = document.conferences.len(), "Conference store loaded");
        Self {
            path,
            document,
            signatures,
            unreadable,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn signatures(&self) -> &HashSet<Signature> {
        &self.signatures
    }

    pub fn records(&self) -> &[StoredConference] {
        &self.document.conferences
    }

    pub fn metadata(&self) -> &StoreMetadata {
        &self.document.metadata
    }

    pub fn len(&self) -> usize {
        self.document.conferences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.conferences.is_empty()
    }

    pub fn contains(&self, signature: &Signature) -> bool {
        self.signatures.contains(signature)
    }

    pub fn is_new(&self, candidate: &ConferenceCandidate) -> bool {
        !self.contains(&candidate.signature())
    }

    /// Pick up records written to disk since this store was loaded.
    fn refresh_from_disk(&mut self) {
        match read_json::<StoreDocument<StoredConference>>(&self.path) {
            Ok(Some(on_disk)) => {
                self.signatures = on_disk.conferences.iter().map(|c| c.signature()).collect();
                self.document = on_disk;
                self.unreadable = false;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Store unreadable at merge time, merging into loaded copy"
                );
                self.unreadable = true;
            }
        }
    }

    fn save(&mut self) -> Result<(), PersistenceError> {
        if self.unreadable {
            set_aside(&self.path)?;
            self.unreadable = false;
        }
        self.document.touch();
        write_json_atomic(&self.path, &self.document)
    }

    /// Append records whose signatures are not yet present. Idempotent.
    pub fn merge(
        &mut self,
        records: Vec<StoredConference>,
    ) -> Result<MergeOutcome, PersistenceError> {
        self.refresh_from_disk();

        let mut outcome = MergeOutcome::default();
        for record in records {
            if self.signatures.insert(record.signature()) {
                self.document.conferences.push(record);
                outcome.added += 1;
            } else {
                outcome.skipped += 1;
            }
        }

        if outcome.added > 0 || !self.path.exists() {
            self.save()?;
        }
        info!(
            added = outcome.added,
            skipped = outcome.skipped,
            total = self.len(),
            "Merged into conference store"
        );
        Ok(outcome)
    }

    /// Like [`merge`](Self::merge), but records with a known signature replace
    /// the stored one in place.
    pub fn upsert(
        &mut self,
        records: Vec<StoredConference>,
    ) -> Result<MergeOutcome, PersistenceError> {
        self.refresh_from_disk();

        let mut outcome = MergeOutcome::default();
        for record in records {
            let signature = record.signature();
            if self.signatures.insert(signature.clone()) {
                self.document.conferences.push(record);
                outcome.added += 1;
            } else if let Some(existing) = self
                .document
                .conferences
                .iter_mut()
                .find(|c| c.signature() == signature)
            {
                *existing = record;
                outcome.replaced += 1;
            }
        }

        if outcome.added + outcome.replaced > 0 || !self.path.exists() {
            self.save()?;
        }
        info!(
            added = outcome.added,
            replaced = outcome.replaced,
            total = self.len(),
            "Upserted into conference store"
        );
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Scrape ledger
// ---------------------------------------------------------------------------

/// Every enriched candidate ever scraped, whether or not extraction has run.
pub struct ScrapeLedger {
    path: PathBuf,
    exists: bool,
    document: StoreDocument<ConferenceCandidate>,
    signatures: HashSet<Signature>,
    unreadable: bool,
}

impl ScrapeLedger {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (document, unreadable): (StoreDocument<ConferenceCandidate>, _) =
            load_or_empty(&path, "scrape ledger");
        let exists = path.exists() && !unreadable;
        let signatures = document.conferences.iter().map(|c| c.signature()).collect();
        Self {
            path,
            exists,
            document,
            signatures,
            unreadable,
        }
    }

    pub fn candidates(&self) -> &[ConferenceCandidate] {
        &self.document.conferences
    }

    pub fn contains(&self, signature: &Signature) -> bool {
        self.signatures.contains(signature)
    }

    pub fn len(&self) -> usize {
        self.document.conferences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.conferences.is_empty()
    }

    /// Age of the last write, `None` if the ledger has never been written or
    /// carries no usable timestamp.
    pub fn age(&self) -> Option<Duration> {
        if !self.exists {
            return None;
        }
        let metadata = &self.document.metadata;
        let written = metadata.last_updated.or(metadata.created)?;
        Some((Utc::now() - written).to_std().unwrap_or(Duration::ZERO))
    }

    /// Written within `max_age`.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.age().is_some_and(|age| age < max_age)
    }

    /// Add unseen candidates and write the ledger. Returns how many were added.
    pub fn append(
        &mut self,
        candidates: &[ConferenceCandidate],
    ) -> Result<usize, PersistenceError> {
        let mut added = 0;
        for candidate in candidates {
            if self.signatures.insert(candidate.signature()) {
                self.document.conferences.push(candidate.clone());
                added += 1;
            }
        }
        if self.unreadable {
            set_aside(&self.path)?;
            self.unreadable = false;
        }
        self.document.touch();
        write_json_atomic(&self.path, &self.document)?;
        self.exists = true;
        info!(path = %self.path.display(), added, total = self.len(), "Scrape ledger written");
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use confscout_common::ExtractedFields;

    fn record(title: &str) -> StoredConference {
        StoredConference::new(
            ConferenceCandidate {
                title: title.into(),
                conference_dates: "1-2 June 2026".into(),
                location: "Vienna, Austria".into(),
                ..Default::default()
            },
            ExtractedFields::default(),
        )
    }

    fn set_aside_files(dir: &Path, name: &str) -> Vec<PathBuf> {
        let prefix = format!("{name}.corrupt-");
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with(&prefix))
            .collect()
    }

    const LEGACY_STORE: &str = r#"{
        "metadata": {
            "created": "2025-03-01 10:00:00",
            "total_conferences": 2,
            "last_updated": null
        },
        "conferences": [
            {
                "Title": "Old Finance Meeting",
                "Conference Date": "5-6 May 2025",
                "Location": "Oslo, Norway",
                "Deadline": "2025/01/15",
                "Link": "https://conf.example/c/old-1",
                "Submission Fees": "",
                "Registration Fees": "NOK 2000",
                "Continent": "Europe",
                "Posted Date": "2 Jan 2025"
            },
            {
                "Title": "Old Banking Workshop",
                "Conference Date": "9 June 2025",
                "Location": "Rome, Italy",
                "Deadline": "",
                "Link": "https://conf.example/c/old-2",
                "Submission Fee": "",
                "Registration Fee": "",
                "Continent": "Europe",
                "Posted Date": "4 Jan 2025"
            }
        ]
    }"#;

    #[test]
    fn timestamps_accept_rfc3339_and_naive_layouts() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-03-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-01 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConferenceStore::load(dir.path().join("conferences.json"));
        assert!(store.is_empty());
        assert!(store.signatures().is_empty());
    }

    #[test]
    fn corrupt_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conferences.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(ConferenceStore::load(&path).is_empty());
    }

    #[test]
    fn legacy_store_loads_and_keeps_its_records_on_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conferences.json");
        fs::write(&path, LEGACY_STORE).unwrap();

        let mut store = ConferenceStore::load(&path);
        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[0].registration_fee, "NOK 2000");
        assert_eq!(
            store.metadata().created,
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(store.metadata().last_updated, None);

        let outcome = store.merge(vec![record("New Asset Pricing Forum")]).unwrap();
        assert_eq!(outcome.added, 1);

        let reloaded = ConferenceStore::load(&path);
        let titles: Vec<_> = reloaded.records().iter().map(|r| r.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Old Finance Meeting", "Old Banking Workshop", "New Asset Pricing Forum"]
        );
        assert_eq!(reloaded.metadata().total_conferences, 3);
        assert!(reloaded.metadata().last_updated.is_some());
        assert!(set_aside_files(dir.path(), "conferences.json").is_empty());
    }

    #[test]
    fn malformed_metadata_does_not_cost_the_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conferences.json");
        let body =
            LEGACY_STORE.replace(r#""total_conferences": 2"#, r#""total_conferences": "two""#);
        fs::write(&path, body).unwrap();

        let store = ConferenceStore::load(&path);
        assert_eq!(store.len(), 2);
        assert_eq!(store.metadata(), &StoreMetadata::default());
    }

    #[test]
    fn corrupt_store_is_set_aside_before_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conferences.json");
        fs::write(&path, "{ not json").unwrap();

        let mut store = ConferenceStore::load(&path);
        store.merge(vec![record("Finance Symposium")]).unwrap();

        assert_eq!(ConferenceStore::load(&path).len(), 1);
        let kept = set_aside_files(dir.path(), "conferences.json");
        assert_eq!(kept.len(), 1);
        assert_eq!(fs::read_to_string(&kept[0]).unwrap(), "{ not json");
    }

    #[test]
    fn merge_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conferences.json");
        let batch = || vec![record("Finance Symposium"), record("Banking Workshop")];

        let mut store = ConferenceStore::load(&path);
        let first = store.merge(batch()).unwrap();
        assert_eq!(first.added, 2);

        let mut reloaded = ConferenceStore::load(&path);
        let second = reloaded.merge(batch()).unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.metadata().total_conferences, 2);
    }

    #[test]
    fn merge_rechecks_records_written_after_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conferences.json");

        let mut early = ConferenceStore::load(&path);
        let mut other = ConferenceStore::load(&path);
        other.merge(vec![record("Finance Symposium")]).unwrap();

        let outcome = early
            .merge(vec![record("finance symposium!"), record("Banking Workshop")])
            .unwrap();
        assert_eq!(outcome.added, 1);
        assert_eq!(ConferenceStore::load(&path).len(), 2);
    }

    #[test]
    fn upsert_replaces_matching_signatures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conferences.json");
        let mut store = ConferenceStore::load(&path);
        store.merge(vec![record("Finance Symposium")]).unwrap();

        let mut updated = record("Finance Symposium");
        updated.continent = "Europe".into();
        let outcome = store.upsert(vec![updated, record("Banking Workshop")]).unwrap();
        assert_eq!((outcome.added, outcome.replaced), (1, 1));

        let reloaded = ConferenceStore::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.records()[0].continent, "Europe");
    }

    #[test]
    fn ledger_freshness_follows_last_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ssrn.json");

        let mut ledger = ScrapeLedger::load(&path);
        assert!(!ledger.is_fresh(Duration::from_secs(3600)));

        let candidate = ConferenceCandidate {
            title: "Finance Symposium".into(),
            conference_dates: "1 May 2026".into(),
            ..Default::default()
        };
        assert_eq!(ledger.append(&[candidate.clone(), candidate]).unwrap(), 1);

        let reloaded = ScrapeLedger::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.is_fresh(Duration::from_secs(3600)));
        assert!(!reloaded.is_fresh(Duration::ZERO));
    }

    #[test]
    fn legacy_ledger_loads_with_its_link_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ssrn.json");
        fs::write(
            &path,
            r#"{
                "metadata": {"created": "2025-03-01 10:00:00", "last_updated": null},
                "conferences": [{
                    "title": "Old Finance Meeting",
                    "conference_dates": "5-6 May 2025",
                    "location": "Oslo, Norway",
                    "description": "Annual meeting",
                    "ssrn_link": "https://conf.example/c/old-1"
                }]
            }"#,
        )
        .unwrap();

        let ledger = ScrapeLedger::load(&path);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.candidates()[0].detail_link, "https://conf.example/c/old-1");
        assert!(ledger.age().is_some());
        assert!(!ledger.is_fresh(Duration::from_secs(3600)));
    }

    #[test]
    fn corrupt_ledger_is_stale_and_set_aside_on_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ssrn.json");
        fs::write(&path, "[truncated").unwrap();

        let mut ledger = ScrapeLedger::load(&path);
        assert!(ledger.age().is_none());

        let candidate = ConferenceCandidate {
            title: "Finance Symposium".into(),
            conference_dates: "1 May 2026".into(),
            ..Default::default()
        };
        assert_eq!(ledger.append(&[candidate]).unwrap(), 1);

        assert_eq!(ScrapeLedger::load(&path).len(), 1);
        let kept = set_aside_files(dir.path(), "ssrn.json");
        assert_eq!(kept.len(), 1);
        assert_eq!(fs::read_to_string(&kept[0]).unwrap(), "[truncated");
    }

    #[test]
    fn writes_leave_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conferences.json");
        ConferenceStore::load(&path)
            .merge(vec![record("Finance Symposium")])
            .unwrap();
        assert!(path.exists());
        assert!(!temp_sibling(&path).exists());
    }
}
