//! Which list nodes count as conference announcements.
//!
//! Rules are tried in order and the first match wins. Earlier rules are
//! strict (the listing's own field labels); later ones trade precision for
//! recall on pages with looser markup.

use std::sync::LazyLock;

use regex::Regex;

/// Nodes with less visible text than this are navigation, not announcements.
pub const MIN_ENTRY_CHARS: usize = 50;

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid regex"));

const DOMAIN_KEYWORDS: &[&str] = &[
    "finance",
    "financial",
    "economics",
    "accounting",
    "banking",
    "asset pricing",
    "corporate governance",
    "investment",
    "fintech",
];

const CALL_KEYWORDS: &[&str] = &["call for papers", "submission", "deadline"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// "Conference Date(s)" plus a "Location:" or "Posted:" label.
    LabelledFields,
    /// A finance or academic keyword plus a year or a "Posted" token.
    DomainWithYear,
    /// Call-for-papers vocabulary.
    CallForPapers,
}

pub const RULES: &[MatchRule] = &[
    MatchRule::LabelledFields,
    MatchRule::DomainWithYear,
    MatchRule::CallForPapers,
];

impl MatchRule {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            MatchRule::LabelledFields => {
                text.contains("Conference Date")
                    && (text.contains("Location:") || text.contains("Posted:"))
            }
            MatchRule::DomainWithYear => {
                let lower = text.to_lowercase();
                DOMAIN_KEYWORDS.iter().any(|k| lower.contains(k))
                    && (YEAR.is_match(text) || lower.contains("posted"))
            }
            MatchRule::CallForPapers => {
                let lower = text.to_lowercase();
                CALL_KEYWORDS.iter().any(|k| lower.contains(k))
            }
        }
    }
}

/// First rule matching a node's visible text, if the text is long enough.
pub fn classify(text: &str) -> Option<MatchRule> {
    if text.chars().count() <= MIN_ENTRY_CHARS {
        return None;
    }
    RULES.iter().copied().find(|rule| rule.matches(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labelled_entries_match_first_rule() {
        let text = "Behavioral Finance Workshop Conference Dates: 3-4 June 2026 Location: Oslo, Norway Posted: 10 Jan 2026";
        assert_eq!(classify(text), Some(MatchRule::LabelledFields));
    }

    #[test]
    fn keyword_entries_need_a_year_or_posted_token() {
        let with_year = "International Conference on Empirical Banking and Credit Markets, autumn 2026 edition";
        assert_eq!(classify(with_year), Some(MatchRule::DomainWithYear));

        let no_year = "International Conference on Empirical Banking and Credit Markets, autumn edition";
        assert_eq!(classify(no_year), None);
    }

    #[test]
    fn call_for_papers_is_the_loosest_rule() {
        let text = "Call for Papers: Workshop on Market Microstructure, hosted by a university consortium";
        assert_eq!(classify(text), Some(MatchRule::CallForPapers));
    }

    #[test]
    fn short_text_never_qualifies() {
        assert_eq!(classify("Conference Date: 1 May Location: X"), None);
    }
}
