use std::fmt;

use serde::{Deserialize, Serialize};

use crate::signature::Signature;

/// Titles at or below this many characters are treated as missing.
pub const MIN_TITLE_CHARS: usize = 5;

// =============================================================================
// Candidate
// =============================================================================

/// A conference parsed from a listing page, not yet checked against the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceCandidate {
    pub title: String,
    #[serde(default)]
    pub conference_dates: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "ssrn_link")]
    pub detail_link: String,
    #[serde(default)]
    pub posted_date: String,
}

impl ConferenceCandidate {
    pub fn signature(&self) -> Signature {
        Signature::new(&self.title, &self.location, &self.conference_dates)
    }

    /// A candidate needs a real title and a date range to be worth tracking.
    pub fn is_actionable(&self) -> bool {
        self.title.trim().chars().count() > MIN_TITLE_CHARS
            && !self.conference_dates.trim().is_empty()
    }
}

// =============================================================================
// Extracted fields
// =============================================================================

/// Fields derived by the extraction service. Empty string means "not found".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(rename = "Submission Deadline", default)]
    pub submission_deadline: String,
    #[serde(rename = "Submission Fee", alias = "Submission Fees", default)]
    pub submission_fee: String,
    #[serde(rename = "Registration Fee", alias = "Registration Fees", default)]
    pub registration_fee: String,
    #[serde(rename = "Continent", default)]
    pub continent: String,
}

impl ExtractedFields {
    pub fn is_empty(&self) -> bool {
        self.submission_deadline.is_empty()
            && self.submission_fee.is_empty()
            && self.registration_fee.is_empty()
            && self.continent.is_empty()
    }
}

// =============================================================================
// Continent
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Continent {
    Asia,
    Australia,
    Europe,
    NorthAmerica,
    SouthAmerica,
    Africa,
}

impl Continent {
    pub const ALL: [Continent; 6] = [
        Continent::Asia,
        Continent::Australia,
        Continent::Europe,
        Continent::NorthAmerica,
        Continent::SouthAmerica,
        Continent::Africa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Continent::Asia => "Asia",
            Continent::Australia => "Australia",
            Continent::Europe => "Europe",
            Continent::NorthAmerica => "North America",
            Continent::SouthAmerica => "South America",
            Continent::Africa => "Africa",
        }
    }

    /// Map a free-text region to the canonical set. Matching ignores case,
    /// punctuation and spacing; a few common aliases are accepted.
    pub fn parse(raw: &str) -> Option<Continent> {
        let key = crate::signature::normalize(raw);
        if key.is_empty() {
            return None;
        }
        if let Some(c) = Self::ALL
            .iter()
            .find(|c| crate::signature::normalize(c.as_str()) == key)
        {
            return Some(*c);
        }
        let continent = match key.as_str() {
            "oceania" | "australasia" | "australia and oceania" | "new zealand" => {
                Continent::Australia
            }
            "n america" | "northamerica" | "usa" | "us" | "united states" | "canada" => {
                Continent::NorthAmerica
            }
            "s america" | "southamerica" | "latin america" => Continent::SouthAmerica,
            "eu" | "uk" | "united kingdom" => Continent::Europe,
            _ => return None,
        };
        Some(continent)
    }
}

impl fmt::Display for Continent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Stored conference
// =============================================================================

/// A candidate plus its extracted fields, as persisted in the conference store.
/// Keys match the column names of the flat export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConference {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Conference Date", default)]
    pub conference_dates: String,
    #[serde(rename = "Location", default)]
    pub location: String,
    #[serde(rename = "Deadline", default)]
    pub submission_deadline: String,
    #[serde(rename = "Link", default)]
    pub detail_link: String,
    #[serde(rename = "Submission Fee", alias = "Submission Fees", default)]
    pub submission_fee: String,
    #[serde(rename = "Registration Fee", alias = "Registration Fees", default)]
    pub registration_fee: String,
    #[serde(rename = "Continent", default)]
    pub continent: String,
    #[serde(rename = "Posted Date", default)]
    pub posted_date: String,
    #[serde(rename = "Description", default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl StoredConference {
    pub fn new(candidate: ConferenceCandidate, fields: ExtractedFields) -> Self {
        Self {
            title: candidate.title,
            conference_dates: candidate.conference_dates,
            location: candidate.location,
            submission_deadline: fields.submission_deadline,
            detail_link: candidate.detail_link,
            submission_fee: fields.submission_fee,
            registration_fee: fields.registration_fee,
            continent: fields.continent,
            posted_date: candidate.posted_date,
            description: candidate.description,
        }
    }

    pub fn signature(&self) -> Signature {
        Signature::new(&self.title, &self.location, &self.conference_dates)
    }

    pub fn fields(&self) -> ExtractedFields {
        ExtractedFields {
            submission_deadline: self.submission_deadline.clone(),
            submission_fee: self.submission_fee.clone(),
            registration_fee: self.registration_fee.clone(),
            continent: self.continent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, dates: &str) -> ConferenceCandidate {
        ConferenceCandidate {
            title: title.into(),
            conference_dates: dates.into(),
            location: "Chicago, IL".into(),
            ..Default::default()
        }
    }

    #[test]
    fn short_titles_and_dateless_listings_are_not_actionable() {
        assert!(candidate("Annual Finance Meeting", "3-5 June 2026").is_actionable());
        assert!(!candidate("CFP", "3-5 June 2026").is_actionable());
        assert!(!candidate("  Short  ", "3-5 June 2026").is_actionable());
        assert!(!candidate("Annual Finance Meeting", "  ").is_actionable());
    }

    #[test]
    fn stored_record_uses_export_column_names() {
        let stored = StoredConference::new(
            candidate("Annual Finance Meeting", "3-5 June 2026"),
            ExtractedFields {
                submission_deadline: "2026-02-01".into(),
                continent: "North America".into(),
                ..Default::default()
            },
        );
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["Title"], "Annual Finance Meeting");
        assert_eq!(json["Conference Date"], "3-5 June 2026");
        assert_eq!(json["Deadline"], "2026-02-01");
        assert_eq!(json["Continent"], "North America");
        assert!(json.get("Description").is_none());
    }

    #[test]
    fn stored_record_accepts_plural_fee_keys() {
        let raw = r#"{"Title": "Derivatives Forum", "Submission Fees": "$50", "Registration Fees": "€300"}"#;
        let stored: StoredConference = serde_json::from_str(raw).unwrap();
        assert_eq!(stored.submission_fee, "$50");
        assert_eq!(stored.registration_fee, "€300");
        assert_eq!(stored.conference_dates, "");
    }

    #[test]
    fn signature_matches_between_candidate_and_stored_record() {
        let c = candidate("Annual Finance Meeting", "3-5 June 2026");
        let stored = StoredConference::new(c.clone(), ExtractedFields::default());
        assert_eq!(c.signature(), stored.signature());
    }

    #[test]
    fn continent_parse_handles_case_and_aliases() {
        assert_eq!(Continent::parse("europe"), Some(Continent::Europe));
        assert_eq!(Continent::parse("NORTH AMERICA"), Some(Continent::NorthAmerica));
        assert_eq!(Continent::parse("North-America"), Some(Continent::NorthAmerica));
        assert_eq!(Continent::parse("Oceania"), Some(Continent::Australia));
        assert_eq!(Continent::parse("N. America"), Some(Continent::NorthAmerica));
        assert_eq!(Continent::parse("Antarctica"), None);
        assert_eq!(Continent::parse(""), None);
    }
}
