use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use crate::util::{resolve_link, sanitize_url};

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

const PAGE_PARAMS: &[&str] = &["page", "offset", "start"];

fn is_pagination(url: &Url) -> bool {
    url.path().contains("/page/")
        || url
            .query_pairs()
            .any(|(key, _)| PAGE_PARAMS.contains(&key.as_ref()))
}

fn without_fragment(mut url: Url) -> String {
    url.set_fragment(None);
    sanitize_url(url.as_str())
}

/// Further pages of a listing linked from `html`, on the listing's own host,
/// deduplicated and capped at `cap`.
pub fn discover_pages(html: &str, page_url: &str, cap: usize) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    seen.insert(without_fragment(base.clone()));

    let mut pages = Vec::new();
    for anchor in document.select(&ANCHOR) {
        if pages.len() >= cap {
            break;
        }
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(link) = resolve_link(Some(&base), href).and_then(|l| Url::parse(&l).ok()) else {
            continue;
        };
        if link.host_str() != base.host_str() || !is_pagination(&link) {
            continue;
        }
        let link = without_fragment(link);
        if seen.insert(link.clone()) {
            pages.push(link);
        }
    }
    pages
}
