//! Listing page parsing: list nodes in, conference candidates out.

pub mod fields;
pub mod pagination;
pub mod rules;

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::debug;

use confscout_common::ConferenceCandidate;

use crate::util::{element_text, resolve_link};
use rules::MatchRule;

pub use pagination::discover_pages;

/// Listing-page descriptions are a preview; detail pages supply the full text.
pub const LISTING_DESCRIPTION_CHARS: usize = 500;

static ENTRY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li").expect("valid selector"));
static LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// A parsed entry and the rule that admitted it.
#[derive(Debug, Clone)]
pub struct ListingEntry {
    pub candidate: ConferenceCandidate,
    pub rule: MatchRule,
}

/// Parse one listing page into candidates, in page order.
///
/// Nodes without a title or link are skipped. Nodes repeating an earlier
/// node's visible text are dropped.
pub fn extract_entries(html: &str, page_url: &str) -> Vec<ListingEntry> {
    let document = Html::parse_document(html);
    let base = url::Url::parse(page_url).ok();

    let mut seen_text = HashSet::new();
    let mut entries = Vec::new();

    for node in document.select(&ENTRY) {
        let Some(anchor) = node.select(&LINK).next() else {
            continue;
        };
        let text = element_text(node);
        let Some(rule) = rules::classify(&text) else {
            continue;
        };
        if !seen_text.insert(text.clone()) {
            continue;
        }

        let title = element_text(anchor);
        let detail_link = anchor
            .value()
            .attr("href")
            .and_then(|href| resolve_link(base.as_ref(), href))
            .unwrap_or_default();
        if title.is_empty() || detail_link.is_empty() {
            debug!(?rule, "Listing node without title or link, skipping");
            continue;
        }

        let candidate = ConferenceCandidate {
            conference_dates: fields::extract_dates(&text),
            location: fields::extract_location(&text, &title),
            posted_date: fields::extract_posted(&text),
            description: ai_client::truncate_chars(&text, LISTING_DESCRIPTION_CHARS).to_string(),
            detail_link,
            title,
        };
        entries.push(ListingEntry { candidate, rule });
    }

    entries
}

pub fn extract_candidates(html: &str, page_url: &str) -> Vec<ConferenceCandidate> {
    extract_entries(html, page_url)
        .into_iter()
        .map(|e| e.candidate)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{listing_item, listing_page};

    const PAGE: &str = "https://www.ssrn.com/announcements/";

    #[test]
    fn parses_labelled_entries() {
        let html = listing_page(&[listing_item(
            "European Finance Association Annual Meeting",
            "/conference/efa-2026",
            "20-23 August 2026",
            "Utah",
            "3 Jan 2026",
        )]);
        let entries = extract_entries(&html, PAGE);
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.rule, MatchRule::LabelledFields);
        let c = &entry.candidate;
        assert_eq!(c.title, "European Finance Association Annual Meeting");
        assert_eq!(c.detail_link, "https://www.ssrn.com/conference/efa-2026");
        assert_eq!(c.conference_dates, "20-23 August 2026");
        assert_eq!(c.location, "Utah, USA");
        assert_eq!(c.posted_date, "3 Jan 2026");
        assert!(c.description.starts_with("European Finance Association Annual Meeting"));
    }

    #[test]
    fn repeated_nodes_are_dropped_in_order() {
        let a = listing_item(
            "Alpha Finance Symposium",
            "/a",
            "1-2 May 2026",
            "Oslo, Norway",
            "1 Jan 2026",
        );
        let b = listing_item(
            "Beta Banking Workshop",
            "/b",
            "3-4 May 2026",
            "Rome, Italy",
            "2 Jan 2026",
        );
        let html = listing_page(&[a.clone(), b, a]);

        let titles: Vec<_> = extract_candidates(&html, PAGE)
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["Alpha Finance Symposium", "Beta Banking Workshop"]);
    }

    #[test]
    fn navigation_and_linkless_nodes_yield_nothing() {
        let html = r#"<html><body><ul>
            <li><a href="/home">Home</a></li>
            <li>Conference Dates: 1-2 June 2026 Location: Vienna, Austria Posted: 1 Jan 2026 but no link anywhere</li>
            <li><a href="/x">   </a> Conference Dates: 1-2 June 2026 Location: Vienna, Austria Posted: 1 Jan 2026</li>
        </ul></body></html>"#;
        assert!(extract_candidates(html, PAGE).is_empty());
    }

    #[test]
    fn relaxed_rules_admit_looser_markup() {
        let html = r#"<html><body><ul>
            <li><a href="https://cfp.example.org/micro">Market Microstructure Workshop</a>
                Call for papers now open, paper submission deadline approaching.</li>
        </ul></body></html>"#;
        let entries = extract_entries(html, PAGE);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rule, MatchRule::CallForPapers);
        assert_eq!(entries[0].candidate.conference_dates, "");
    }

    #[test]
    fn malformed_html_does_not_panic() {
        let html = "<ul><li><a href='/c'>Unclosed Finance Conference 2026 Posted: <b>soon<li>";
        let _ = extract_candidates(html, PAGE);
    }
}
