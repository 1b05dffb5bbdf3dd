//! HTML link extraction for the crawl frontier.

use std::collections::HashSet;

use percent_encoding::percent_decode_str;
use scraper::{Html, Selector};
use url::Url;

use crate::url_utils;

/// Element/attribute pairs that can carry crawlable URLs.
const URL_ELEMENT_MATCHES: [(&str, &str); 4] = [
    ("a[href]", "href"),
    ("img[src]", "src"),
    ("link[href]", "href"),
    ("script[src]", "src"),
];

/// Extract the canonical frontier URLs from an HTML body.
///
/// Each candidate is unescaped once, trimmed, and resolved against the
/// fetched URL's scheme+host (so relative links resolve from the host root).
/// Survivors are allow-listed by host, filtered by blacklist prefix and query
/// policy, fragment-stripped, and deduped within the page in first-seen order.
pub fn extract_links(
    html: &str,
    final_url: &Url,
    roots: &[Url],
    blacklist_paths: &[String],
) -> Vec<String> {
    let document = Html::parse_document(html);
    let base = url_utils::root_base(final_url);

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for (selector_str, attr) in URL_ELEMENT_MATCHES {
        let selector = Selector::parse(selector_str).expect("Invalid CSS selector");

        for element in document.select(&selector) {
            let href = match element.value().attr(attr) {
                Some(v) => v,
                None => continue,
            };

            let unescaped = percent_decode_str(href).decode_utf8_lossy();
            let trimmed = unescaped.trim();
            if trimmed.is_empty() {
                continue;
            }

            let mut url = match base.join(trimmed) {
                Ok(u) => u,
                Err(_) => continue,
            };

            if !url_utils::host_allowed(&url, roots) {
                continue;
            }
            if url_utils::is_blacklisted(url.path(), blacklist_paths) {
                continue;
            }
            url_utils::strip_fragment(&mut url);
            if url_utils::query_disqualifies(&url) {
                continue;
            }

            let canonical = url.to_string();
            if seen.insert(canonical.clone()) {
                links.push(canonical);
            }
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harvest(html: &str) -> Vec<String> {
        let final_url = Url::parse("https://www.gov.uk/guides/page").unwrap();
        let roots = vec![Url::parse("https://www.gov.uk").unwrap()];
        let blacklist = vec!["/search".to_string()];
        extract_links(html, &final_url, &roots, &blacklist)
    }

    #[test]
    fn test_root_relative_link_resolves() {
        let links = harvest(r#"<a href="/bar">bar</a>"#);
        assert_eq!(links, vec!["https://www.gov.uk/bar".to_string()]);
    }

    #[test]
    fn test_relative_link_resolves_against_host_root() {
        // The base is scheme+host, not the page path.
        let links = harvest(r#"<a href="other">other</a>"#);
        assert_eq!(links, vec!["https://www.gov.uk/other".to_string()]);
    }

    #[test]
    fn test_all_element_kinds_harvested() {
        let links = harvest(concat!(
            r#"<a href="/a">a</a>"#,
            r#"<img src="/i.png">"#,
            r#"<link rel="stylesheet" href="/s.css">"#,
            r#"<script src="/j.js"></script>"#,
        ));
        assert_eq!(
            links,
            vec![
                "https://www.gov.uk/a".to_string(),
                "https://www.gov.uk/i.png".to_string(),
                "https://www.gov.uk/s.css".to_string(),
                "https://www.gov.uk/j.js".to_string(),
            ]
        );
    }

    #[test]
    fn test_foreign_host_dropped() {
        let links = harvest(r#"<a href="https://evil.com/x">x</a><a href="/ok">ok</a>"#);
        assert_eq!(links, vec!["https://www.gov.uk/ok".to_string()]);
    }

    #[test]
    fn test_allowed_host_with_port_kept() {
        let links = harvest(r#"<a href="https://www.gov.uk:8443/x">x</a>"#);
        assert_eq!(links, vec!["https://www.gov.uk:8443/x".to_string()]);
    }

    #[test]
    fn test_blacklisted_path_dropped() {
        let links = harvest(r#"<a href="/search?q=1">s</a><a href="/searching">ok</a>"#);
        assert_eq!(links, vec!["https://www.gov.uk/searching".to_string()]);
    }

    #[test]
    fn test_fragment_stripped_and_deduped() {
        let links = harvest(r#"<a href="/a#one">1</a><a href="/a#two">2</a><a href="/a">3</a>"#);
        assert_eq!(links, vec!["https://www.gov.uk/a".to_string()]);
    }

    #[test]
    fn test_query_permutations_dropped_pagination_kept() {
        let links = harvest(concat!(
            r#"<a href="/list?page=3">next</a>"#,
            r#"<a href="/list?order=asc">sorted</a>"#,
        ));
        assert_eq!(links, vec!["https://www.gov.uk/list?page=3".to_string()]);
    }

    #[test]
    fn test_unescaped_once_before_parsing() {
        let links = harvest(r#"<a href="%2Fbar">bar</a>"#);
        assert_eq!(links, vec!["https://www.gov.uk/bar".to_string()]);
    }

    #[test]
    fn test_whitespace_trimmed() {
        let links = harvest("<a href=\"  /padded  \">p</a>");
        assert_eq!(links, vec!["https://www.gov.uk/padded".to_string()]);
    }

    #[test]
    fn test_mailto_and_empty_dropped() {
        let links = harvest(r#"<a href="mailto:x@gov.uk">m</a><a href="">e</a>"#);
        assert!(links.is_empty());
    }

    #[test]
    fn test_no_links_in_plain_document() {
        assert!(harvest("<html><body><p>nothing here</p></body></html>").is_empty());
    }
}
