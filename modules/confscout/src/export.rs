//! Flat CSV export of the conference store.
//!
//! Regenerated in full on every run. Test-data rows are left out and the rest
//! are sorted newest posting first, then by title.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use tracing::info;

use confscout_common::{PersistenceError, StoredConference};

use crate::store::temp_sibling;

/// `samp…` as a word prefix (sample, sampling), `smp`, or `trial` as words.
static TEST_DATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsamp|\bsmp\b|\btrial\b").expect("valid regex"));

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("valid regex"));

const POSTED_FORMATS: &[&str] = &[
    "%d %b %Y",
    "%d %B %Y",
    "%b %d %Y",
    "%B %d, %Y",
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%m/%d/%Y",
];

#[derive(Serialize)]
struct ExportRow<'a> {
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Conference Date")]
    conference_dates: &'a str,
    #[serde(rename = "Location")]
    location: &'a str,
    #[serde(rename = "Deadline")]
    deadline: &'a str,
    #[serde(rename = "Link")]
    link: &'a str,
    #[serde(rename = "Submission Fee")]
    submission_fee: &'a str,
    #[serde(rename = "Registration Fee")]
    registration_fee: &'a str,
    #[serde(rename = "Continent")]
    continent: &'a str,
    #[serde(rename = "Posted Date")]
    posted_date: &'a str,
}

impl<'a> From<&'a StoredConference> for ExportRow<'a> {
    fn from(c: &'a StoredConference) -> Self {
        Self {
            title: &c.title,
            conference_dates: &c.conference_dates,
            location: &c.location,
            deadline: &c.submission_deadline,
            link: &c.detail_link,
            submission_fee: &c.submission_fee,
            registration_fee: &c.registration_fee,
            continent: &c.continent,
            posted_date: &c.posted_date,
        }
    }
}

pub fn is_test_data(record: &StoredConference) -> bool {
    [&record.title, &record.location, &record.detail_link]
        .iter()
        .any(|field| TEST_DATA.is_match(field))
}

/// Parse a free-text posting date. A bare year counts as 1 January of that year.
pub fn posted_sort_key(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    POSTED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            let year = YEAR.captures(text)?.get(1)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, 1, 1)
        })
}

/// Newest first; undated rows last; ties broken by title.
fn export_order(a: &StoredConference, b: &StoredConference) -> Ordering {
    let (ka, kb) = (posted_sort_key(&a.posted_date), posted_sort_key(&b.posted_date));
    kb.cmp(&ka).then_with(|| a.title.cmp(&b.title))
}

/// Rows in export order with test data removed.
pub fn export_rows(records: &[StoredConference]) -> Vec<&StoredConference> {
    let mut rows: Vec<&StoredConference> = records.iter().filter(|r| !is_test_data(r)).collect();
    rows.sort_by(|a, b| export_order(a, b));
    rows
}

/// Write the export file and return the number of rows written.
pub fn write_csv(records: &[StoredConference], path: &Path) -> Result<usize, PersistenceError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
    }

    let rows = export_rows(records);
    let tmp = temp_sibling(path);
    let csv_err = |e: csv::Error| PersistenceError::io(&tmp, e.into());

    let mut writer = csv::Writer::from_path(&tmp).map_err(csv_err)?;
    for row in &rows {
        writer.serialize(ExportRow::from(*row)).map_err(csv_err)?;
    }
    if rows.is_empty() {
        // serialize() emits the header with the first row; write it explicitly for an empty export.
        writer
            .write_record([
                "Title",
                "Conference Date",
                "Location",
                "Deadline",
                "Link",
                "Submission Fee",
                "Registration Fee",
                "Continent",
                "Posted Date",
            ])
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|e| PersistenceError::io(&tmp, e))?;
    drop(writer);
    std::fs::rename(&tmp, path).map_err(|e| PersistenceError::io(path, e))?;

    info!(
        path = %path.display(),
        rows = rows.len(),
        filtered = records.len() - rows.len(),
        "Export written"
    );
    Ok(rows.len())
}
