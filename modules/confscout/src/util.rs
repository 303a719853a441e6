// Shared text and URL helpers for listing and detail parsing.

use scraper::ElementRef;

/// Collapse every whitespace run to a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text content of an element, with text nodes joined by spaces and
/// whitespace collapsed.
pub fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// Strip tracking parameters from URLs that would otherwise defeat link dedup.
pub fn sanitize_url(url: &str) -> String {
    const TRACKING_PARAMS: &[&str] = &[
        "fbclid",
        "gclid",
        "utm_source",
        "utm_medium",
        "utm_campaign",
        "utm_term",
        "utm_content",
        "ref",
        "mc_cid",
        "mc_eid",
    ];

    let Ok(mut parsed) = url::Url::parse(url) else {
        return url.to_string();
    };

    if parsed.query().is_none() {
        return url.to_string();
    }

    let clean_pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if clean_pairs.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(clean_pairs);
    }

    parsed.to_string()
}

/// Resolve `href` against `base`, keeping only http(s) results.
pub fn resolve_link(base: Option<&url::Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let resolved = match url::Url::parse(href) {
        Ok(abs) => abs,
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(href).ok()?,
        Err(_) => return None,
    };
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_tracking_keeps_paging() {
        assert_eq!(
            sanitize_url("https://example.com/list?page=2&utm_source=mail"),
            "https://example.com/list?page=2"
        );
        assert_eq!(
            sanitize_url("https://example.com/list?utm_source=x&fbclid=y"),
            "https://example.com/list"
        );
        assert_eq!(sanitize_url("not a url"), "not a url");
    }

    #[test]
    fn resolve_handles_relative_and_rejects_scripts() {
        let base = url::Url::parse("https://www.ssrn.com/index.cfm/en/janda/").ok();
        assert_eq!(
            resolve_link(base.as_ref(), "/conference/42").as_deref(),
            Some("https://www.ssrn.com/conference/42")
        );
        assert_eq!(
            resolve_link(base.as_ref(), "https://other.org/cfp").as_deref(),
            Some("https://other.org/cfp")
        );
        assert_eq!(resolve_link(base.as_ref(), "javascript:void(0)"), None);
        assert_eq!(resolve_link(base.as_ref(), "mailto:chair@uni.edu"), None);
        assert_eq!(resolve_link(None, "/relative"), None);
    }

    #[test]
    fn collapse_whitespace_trims_and_joins() {
        assert_eq!(collapse_whitespace("  a \n\t b  "), "a b");
    }
}
