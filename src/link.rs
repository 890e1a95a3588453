// src/link.rs
//! Link resolution: every surviving listing must carry a usable absolute URL.
//!
//! Sources routinely return empty links, bare "#" placeholders, or paths
//! relative to their own storefront. When the link can't be salvaged we
//! manufacture a search-results URL for the retailer (keyed by substring
//! match on the source name); an unrecognized retailer resolves to
//! [`ResolvedLink::Unavailable`], and those listings are excluded before
//! ranking. The affiliate step is idempotent and per-retailer.

use url::Url;

use crate::config::{Policy, RetailerPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedLink {
    Url(String),
    /// No valid link and no known retailer to manufacture one for.
    Unavailable,
}

fn is_placeholder(link: &str) -> bool {
    let l = link.trim();
    l.is_empty() || l == "#" || l.eq_ignore_ascii_case("javascript:void(0)") || l == "about:blank"
}

fn parse_absolute(link: &str) -> Option<Url> {
    match Url::parse(link) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => Some(u),
        _ => None,
    }
}

fn manufactured_search_url(retailer: &RetailerPolicy, title: &str) -> String {
    format!("{}{}", retailer.search_url, urlencoding::encode(title.trim()))
}

/// Resolve a raw link into a guaranteed-valid absolute URL, or the
/// unavailable sentinel.
pub fn resolve(original: Option<&str>, title: &str, source: &str, policy: &Policy) -> ResolvedLink {
    let retailer = policy.retailer_for(source);

    if let Some(link) = original.filter(|l| !is_placeholder(l)) {
        if let Some(u) = parse_absolute(link) {
            return ResolvedLink::Url(u.to_string());
        }
        // Rooted relative path: resolve against the retailer's storefront
        // origin. Anything else unparsable falls through to the
        // manufactured search link.
        if link.trim_start().starts_with('/') {
            if let Some(r) = retailer {
                if let Ok(base) = Url::parse(&r.domain) {
                    if let Ok(joined) = base.join(link.trim()) {
                        return ResolvedLink::Url(joined.to_string());
                    }
                }
            }
        }
    }

    match retailer {
        Some(r) if !title.trim().is_empty() => ResolvedLink::Url(manufactured_search_url(r, title)),
        _ => ResolvedLink::Unavailable,
    }
}

/// Append the retailer's affiliate parameter when eligible. Keyed on the
/// link's domain: a no-op for unrecognized domains, disabled retailers, and
/// URLs that already carry the parameter.
pub fn apply_affiliate(link: &str, policy: &Policy) -> String {
    let Ok(mut url) = Url::parse(link) else {
        return link.to_string();
    };
    let Some(host) = url.host_str().map(str::to_lowercase) else {
        return link.to_string();
    };
    let Some(retailer) = policy.retailers.iter().find(|r| host.contains(&r.key)) else {
        return link.to_string();
    };
    let aff = &retailer.affiliate;
    if !aff.enabled || aff.param.is_empty() {
        return link.to_string();
    }
    if url.query_pairs().any(|(k, _)| k == aff.param.as_str()) {
        return link.to_string();
    }
    url.query_pairs_mut().append_pair(&aff.param, &aff.value);
    url.to_string()
}
