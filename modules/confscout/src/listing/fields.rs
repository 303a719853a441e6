//! Ordered regex ladders for the fields of a listing entry.
//!
//! Each ladder runs strict to loose; the first pattern yielding an acceptable
//! value wins.

use std::sync::LazyLock;

use regex::Regex;

pub struct FieldPattern {
    pub name: &'static str,
    pub regex: Regex,
}

fn ladder(specs: &[(&'static str, &str)]) -> Vec<FieldPattern> {
    specs
        .iter()
        .map(|&(name, pattern)| FieldPattern {
            name,
            regex: Regex::new(pattern).expect("valid regex"),
        })
        .collect()
}

pub static DATE_PATTERNS: LazyLock<Vec<FieldPattern>> = LazyLock::new(|| {
    ladder(&[
        ("labelled", r"(?i)Conference Dates?:\s*(.+?)\s*(?:Location:|Posted:|$)"),
        (
            "full_range",
            r"(\d{1,2}\s+[A-Za-z]+\.?\s+\d{4}\s*[-–]\s*\d{1,2}\s+[A-Za-z]+\.?\s+\d{4})",
        ),
        ("day_range", r"(\d{1,2}\s*[-–]\s*\d{1,2}\s+[A-Za-z]+\.?\s+\d{4})"),
        (
            "month_first",
            r"([A-Z][a-z]+\.?\s+\d{1,2}(?:\s*[-–]\s*\d{1,2})?,\s*\d{4})",
        ),
        ("single_day", r"(\d{1,2}\s+[A-Za-z]+\s+\d{4})"),
    ])
});

pub static LOCATION_PATTERNS: LazyLock<Vec<FieldPattern>> = LazyLock::new(|| {
    ladder(&[
        ("labelled", r"(?i)Location:\s*(.+?)\s*(?:Posted:|$)"),
        (
            "venue_phrase",
            r"(?i:\bvenue:|\bheld in|\btaking place in)\s*([A-Z][A-Za-z.'-]*(?:,?\s+[A-Z][A-Za-z.'-]*)*)",
        ),
    ])
});

/// Applied to the title when the entry body names no place.
pub static TITLE_LOCATION_PATTERNS: LazyLock<Vec<FieldPattern>> = LazyLock::new(|| {
    ladder(&[
        (
            "title_suffix",
            r",\s*([A-Z][A-Za-z.' -]+(?:,\s*[A-Z][A-Za-z.' -]+)*)\s*$",
        ),
        ("title_in", r"\bin\s+([A-Z][A-Za-z.'-]+(?:,?\s+[A-Z][A-Za-z.'-]+)*)"),
    ])
});

pub static POSTED_PATTERNS: LazyLock<Vec<FieldPattern>> = LazyLock::new(|| {
    ladder(&[
        ("day_first", r"(?i)Posted:\s*(\d{1,2}\s+[A-Za-z]+\.?\s+\d{4})"),
        ("month_first", r"(?i)Posted:\s*([A-Za-z]+\.?\s+\d{1,2},?\s+\d{4})"),
        (
            "numeric",
            r"(?i)Posted:\s*(\d{4}-\d{2}-\d{2}|\d{1,2}[/-]\d{1,2}[/-]\d{4})",
        ),
        ("loose", r"(?i)Posted:\s*(\S+(?:\s+\S+){0,2})"),
    ])
});

/// Bare place names that are expanded to include their country.
const PLACE_EXPANSIONS: &[(&str, &str)] = &[
    ("utah", "Utah, USA"),
    ("new york", "New York, USA"),
    ("nyc", "New York, USA"),
    ("boston", "Boston, USA"),
    ("chicago", "Chicago, USA"),
    ("london", "London, UK"),
    ("paris", "Paris, France"),
    ("hong kong", "Hong Kong, China"),
];

/// First acceptable capture from `patterns`, with the name of the pattern that produced it.
pub fn first_match(
    patterns: &[FieldPattern],
    haystack: &str,
    accept: impl Fn(&str) -> bool,
) -> Option<(String, &'static str)> {
    patterns.iter().find_map(|p| {
        let value = p.regex.captures(haystack)?.get(1)?.as_str();
        let value = tidy(value);
        accept(&value).then_some((value, p.name))
    })
}

fn tidy(value: &str) -> String {
    crate::util::collapse_whitespace(value)
        .trim_matches(|c: char| c == ',' || c == ';' || c == '|' || c.is_whitespace())
        .to_string()
}

/// Everything before a `Posted:` label, so date fallbacks never pick up the posting date.
pub fn before_posted(text: &str) -> &str {
    match text.find("Posted:") {
        Some(idx) => &text[..idx],
        None => text,
    }
}

pub fn extract_dates(text: &str) -> String {
    first_match(&DATE_PATTERNS, before_posted(text), |v| !v.is_empty())
        .map(|(v, _)| v)
        .unwrap_or_default()
}

pub fn extract_location(text: &str, title: &str) -> String {
    let valid = |v: &str| v.chars().count() > 2;
    let found = first_match(&LOCATION_PATTERNS, text, valid)
        .or_else(|| first_match(&TITLE_LOCATION_PATTERNS, title, valid));
    match found {
        Some((location, _)) => expand_place(&location),
        None => String::new(),
    }
}

pub fn extract_posted(text: &str) -> String {
    first_match(&POSTED_PATTERNS, text, |v| !v.is_empty())
        .map(|(v, _)| v)
        .unwrap_or_default()
}

pub fn expand_place(location: &str) -> String {
    let key = location.trim().trim_end_matches('.').to_lowercase();
    PLACE_EXPANSIONS
        .iter()
        .find(|(bare, _)| *bare == key)
        .map(|(_, full)| full.to_string())
        .unwrap_or_else(|| location.trim().to_string())
}
