// src/relevance.rs
//! Relevance scoring: how well a listing title matches the search query.
//!
//! Deterministic token-overlap heuristic. Short query tokens (<= 3 chars)
//! require whole-word matches so "15" never matches "150"; longer tokens may
//! match inside compound title tokens ("iphone" in "iphone15"). Accessory
//! titles get a hard penalty when the query didn't ask for an accessory.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::RelevancePolicy;

static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?u)\b\w+\b").expect("tokenizer regex"));

/// Lowercase word tokens of length >= 2.
pub fn tokenize(input: &str) -> Vec<String> {
    RE_WORD
        .find_iter(&input.to_lowercase())
        .map(|m| m.as_str().to_string())
        .filter(|t| t.chars().count() >= 2)
        .collect()
}

fn token_matches(query_token: &str, title_tokens: &[String]) -> bool {
    if title_tokens.iter().any(|t| t == query_token) {
        return true;
    }
    // Longer tokens may hide inside compound words; short ones must not,
    // to avoid substring false positives.
    query_token.chars().count() > 3 && title_tokens.iter().any(|t| t.contains(query_token))
}

/// Score a title against a query. `None`/empty query passes everything at 1.0.
pub fn score(title: &str, query: Option<&str>, policy: &RelevancePolicy) -> f32 {
    let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) else {
        return 1.0;
    };

    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        return 1.0;
    }
    let title_tokens = tokenize(title);

    let matched = query_tokens
        .iter()
        .filter(|qt| token_matches(qt, &title_tokens))
        .count();
    let mut s = matched as f32 / query_tokens.len() as f32;

    // Accessory suppression: a "case"/"charger"/... title pollutes searches
    // for the device itself.
    let title_lc = title.to_lowercase();
    let query_lc = query.to_lowercase();
    let accessory_hit = policy
        .accessory_keywords
        .iter()
        .any(|k| title_lc.contains(k.as_str()) && !query_lc.contains(k.as_str()));
    if accessory_hit {
        s *= policy.accessory_penalty;
    }

    s.clamp(0.0, 1.0)
}

/// Threshold gate, applied only when a query was supplied.
pub fn accepted(score: f32, query: Option<&str>, policy: &RelevancePolicy) -> bool {
    match query.map(str::trim) {
        Some(q) if !q.is_empty() => score >= policy.threshold,
        _ => true,
    }
}
