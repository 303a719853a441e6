//! Detail-page enrichment: swap a listing preview for the conference page's
//! own description when the page yields something richer.

use std::sync::{Arc, LazyLock};

use futures::stream::{self, StreamExt};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use confscout_common::ConferenceCandidate;

use crate::fetch::PageFetcher;
use crate::util::{collapse_whitespace, element_text};

/// Upper bound on fallback body text taken from an unstructured page.
pub const MAX_FALLBACK_CHARS: usize = 3000;
/// Fallback body text at or below this length is boilerplate.
const MIN_FALLBACK_CHARS: usize = 100;
/// Section bodies at or below this length are ignored.
const MIN_SECTION_CHARS: usize = 20;

const SECTION_KEYWORDS: &[&str] = &[
    "description",
    "overview",
    "call for papers",
    "topics",
    "scope",
    "about",
    "details",
    "submission",
    "conference",
    "additional",
];

const HIDDEN_TAGS: &[&str] = &["nav", "header", "footer", "script", "style"];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static CONTENT_AREAS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["article", "div.main-content", "div#content", "div.content"]
        .into_iter()
        .map(selector)
        .collect()
});
static FORM_GROUP: LazyLock<Selector> = LazyLock::new(|| selector("div.form-group"));
static HEADING: LazyLock<Selector> = LazyLock::new(|| selector("h3"));
static SECTION_DIV: LazyLock<Selector> = LazyLock::new(|| selector("div"));
static SECTION_P: LazyLock<Selector> = LazyLock::new(|| selector("p"));
static MAIN: LazyLock<Selector> = LazyLock::new(|| selector("main"));
static BODY: LazyLock<Selector> = LazyLock::new(|| selector("body"));

/// Text of `root` excluding navigation, header, footer, script and style subtrees.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .take_while(|a| a.id() != root.id())
            .filter_map(|a| a.value().as_element())
            .any(|e| HIDDEN_TAGS.contains(&e.name()));
        if !hidden {
            parts.push(text);
        }
    }
    collapse_whitespace(&parts.join(" "))
}

fn section_body(group: ElementRef<'_>) -> Option<String> {
    let text = match group.select(&SECTION_DIV).next() {
        Some(div) => element_text(div),
        None => element_text(group.select(&SECTION_P).next()?),
    };
    (text.chars().count() > MIN_SECTION_CHARS).then_some(text)
}

/// Keyword-headed sections from the first content area that has any.
fn structured_sections(document: &Html) -> Vec<String> {
    for area_selector in CONTENT_AREAS.iter() {
        let Some(area) = document.select(area_selector).next() else {
            continue;
        };
        let parts: Vec<String> = area
            .select(&FORM_GROUP)
            .filter(|group| {
                group.select(&HEADING).next().is_some_and(|h3| {
                    let heading = element_text(h3).to_lowercase();
                    SECTION_KEYWORDS.iter().any(|k| heading.contains(k))
                })
            })
            .filter_map(section_body)
            .collect();
        if !parts.is_empty() {
            return parts;
        }
    }
    Vec::new()
}

/// Best description a detail page offers, or `None` for pages with nothing usable.
pub fn extract_description(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let sections = structured_sections(&document);
    if !sections.is_empty() {
        return Some(sections.join(" "));
    }

    let root = document
        .select(&MAIN)
        .next()
        .or_else(|| document.select(&BODY).next())?;
    let text = visible_text(root);
    if text.chars().count() > MIN_FALLBACK_CHARS {
        Some(ai_client::truncate_chars(&text, MAX_FALLBACK_CHARS).to_string())
    } else {
        None
    }
}

pub struct EnrichReport {
    pub candidates: Vec<ConferenceCandidate>,
    pub enriched: usize,
}

pub struct DetailEnricher {
    fetcher: Arc<dyn PageFetcher>,
    concurrency: usize,
}

impl DetailEnricher {
    pub fn new(fetcher: Arc<dyn PageFetcher>, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// New description for `candidate`, if the detail page has a longer one.
    async fn richer_description(&self, candidate: &ConferenceCandidate) -> Option<String> {
        if candidate.detail_link.is_empty() {
            return None;
        }
        let html = match self.fetcher.fetch(&candidate.detail_link).await {
            Ok(html) => html,
            Err(e) => {
                warn!(url = %candidate.detail_link, error = %e, "Detail page unavailable, keeping listing description");
                return None;
            }
        };
        let description = extract_description(&html)?;
        (description.chars().count() > candidate.description.chars().count()).then_some(description)
    }

    /// Never fails; an unreachable or empty detail page leaves the candidate as it was.
    /// The flag reports whether the description was replaced.
    pub async fn enrich(&self, mut candidate: ConferenceCandidate) -> (ConferenceCandidate, bool) {
        match self.richer_description(&candidate).await {
            Some(description) => {
                debug!(title = %candidate.title, chars = description.len(), "Description enriched");
                candidate.description = description;
                (candidate, true)
            }
            None => (candidate, false),
        }
    }

    /// Enrich in input order with at most `concurrency` detail fetches in flight.
    pub async fn enrich_all(&self, candidates: Vec<ConferenceCandidate>) -> EnrichReport {
        let total = candidates.len();
        let results: Vec<(ConferenceCandidate, bool)> = stream::iter(candidates)
            .map(|candidate| self.enrich(candidate))
            .buffered(self.concurrency)
            .collect()
            .await;

        let enriched = results.iter().filter(|(_, hit)| *hit).count();
        info!(total, enriched, "Detail enrichment complete");
        EnrichReport {
            candidates: results.into_iter().map(|(c, _)| c).collect(),
            enriched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{detail_page, MockFetcher};

    fn candidate(link: &str, description: &str) -> ConferenceCandidate {
        ConferenceCandidate {
            title: "Corporate Finance Symposium".into(),
            conference_dates: "1-2 June 2026".into(),
            location: "Vienna, Austria".into(),
            description: description.into(),
            detail_link: link.into(),
            posted_date: String::new(),
        }
    }

    #[test]
    fn keyword_sections_are_joined_in_document_order() {
        let html = r#"<html><body><div id="content">
            <div class="form-group"><h3>Description</h3><div>The symposium brings together researchers in corporate finance.</div></div>
            <div class="form-group"><h3>Organizers</h3><div>Names of the people who organize the meeting.</div></div>
            <div class="form-group"><h3>Call for Papers</h3><p>Submit full papers through the online portal by March.</p></div>
            <div class="form-group"><h3>Topics</h3><div>Too short</div></div>
        </div></body></html>"#;
        assert_eq!(
            extract_description(html).as_deref(),
            Some("The symposium brings together researchers in corporate finance. Submit full papers through the online portal by March.")
        );
    }

    #[test]
    fn falls_back_to_main_text_without_chrome() {
        let body = "Registration opens in January and the programme features keynote lectures, paper sessions and a doctoral consortium for early career researchers.";
        let html = format!(
            "<html><body><nav>Home About Contact</nav><header>Site banner</header><main><p>{body}</p><script>var x = 1;</script></main><footer>Copyright</footer></body></html>"
        );
        assert_eq!(extract_description(&html).as_deref(), Some(body));
    }

    #[test]
    fn thin_pages_have_no_description() {
        assert_eq!(extract_description("<html><body><p>Page not found</p></body></html>"), None);
    }

    #[test]
    fn fallback_text_is_bounded() {
        let html = format!("<html><body><main>{}</main></body></html>", "word ".repeat(2000));
        let description = extract_description(&html).unwrap();
        assert_eq!(description.chars().count(), MAX_FALLBACK_CHARS);
    }

    #[tokio::test]
    async fn richer_detail_page_replaces_description() {
        let fetcher = MockFetcher::new().on_page(
            "https://example.org/c/1",
            &detail_page(
                "A detailed call for papers covering asset pricing, banking and household finance.",
            ),
        );
        let enricher = DetailEnricher::new(Arc::new(fetcher), 2);
        let (enriched, replaced) =
            enricher.enrich(candidate("https://example.org/c/1", "short")).await;
        assert!(replaced);
        assert!(enriched.description.starts_with("A detailed call for papers"));
    }

    #[tokio::test]
    async fn unreachable_or_poorer_pages_keep_the_listing_text() {
        let long_listing = "x".repeat(400);
        let fetcher = MockFetcher::new().on_page(
            "https://example.org/c/2",
            &detail_page("A detailed call for papers covering asset pricing and more."),
        );
        let enricher = DetailEnricher::new(Arc::new(fetcher), 2);

        let report = enricher
            .enrich_all(vec![
                candidate("https://example.org/missing", "listing text"),
                candidate("https://example.org/c/2", &long_listing),
                candidate("", "no link"),
            ])
            .await;

        assert_eq!(report.enriched, 0);
        let descriptions: Vec<_> =
            report.candidates.iter().map(|c| c.description.as_str()).collect();
        assert_eq!(descriptions, vec!["listing text", long_listing.as_str(), "no link"]);
    }
}
