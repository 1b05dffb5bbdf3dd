//! URL helper functions used throughout the worker.

use url::Url;

/// Check whether a URL's host matches any allow-listed root.
///
/// Comparison is host-only: ports are ignored on both sides.
pub fn host_allowed(url: &Url, roots: &[Url]) -> bool {
    match url.host_str() {
        Some(host) => roots.iter().any(|root| root.host_str() == Some(host)),
        None => false,
    }
}

/// Check whether a URL path begins with any blacklisted prefix.
pub fn is_blacklisted(path: &str, blacklist_paths: &[String]) -> bool {
    blacklist_paths.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

/// Remove the fragment portion from a URL in place.
pub fn strip_fragment(url: &mut Url) {
    url.set_fragment(None);
}

/// Base URL for resolving links found on a page: the fetched URL's scheme and
/// host with the path reset to "/", so root-relative and relative links both
/// resolve against the host root.
pub fn root_base(url: &Url) -> Url {
    let mut base = url.clone();
    base.set_path("/");
    base.set_query(None);
    base.set_fragment(None);
    base
}

/// Pagination-aware query policy: a URL whose query string, after removing the
/// `page` parameter, is still non-empty is a search-result permutation and is
/// dropped from the frontier.
pub fn query_disqualifies(url: &Url) -> bool {
    match url.query() {
        None | Some("") => false,
        Some(_) => url
            .query_pairs()
            .any(|(key, _)| key != "page"),
    }
}
