// src/dedup.rs
//! Collapse listings that describe the same physical offer reported by
//! overlapping providers. Single forward pass with a seen-set; must run
//! after price normalization (so equal prices key identically) and before
//! ranking. First listing per key wins.

use std::collections::HashSet;

use crate::types::NormalizedDeal;

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Composite identity: (source, title, price-in-cents), all normalized.
fn key(deal: &NormalizedDeal) -> (String, String, i64) {
    (
        deal.source.trim().to_lowercase(),
        collapse_ws(&deal.title.to_lowercase()),
        (deal.price * 100.0).round() as i64,
    )
}

pub fn dedup(deals: Vec<NormalizedDeal>) -> Vec<NormalizedDeal> {
    let mut seen: HashSet<(String, String, i64)> = HashSet::with_capacity(deals.len());
    let mut out = Vec::with_capacity(deals.len());
    for deal in deals {
        if seen.insert(key(&deal)) {
            out.push(deal);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deal(source: &str, title: &str, price: f64) -> NormalizedDeal {
        NormalizedDeal {
            title: title.into(),
            price,
            original_price: price,
            original_currency: "NGN".into(),
            source: source.into(),
            link: "https://example.com/x".into(),
            image: None,
            rating: "N/A".into(),
            reviews: "N/A".into(),
            relevance: 1.0,
            is_regional_match: true,
        }
    }

    #[test]
    fn first_listing_per_key_wins() {
        let a = deal("Jumia", "iPhone 15  128GB", 950_000.0);
        let b = deal("jumia", "iphone 15 128gb", 950_000.0);
        let c = deal("Jumia", "iPhone 15 128GB", 950_100.0);
        let out = dedup(vec![a.clone(), b, c.clone()]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, a.title);
        assert_eq!(out[1].price, c.price);
    }

    #[test]
    fn idempotent_on_deduped_input() {
        let input = vec![
            deal("Jumia", "iPhone 15", 950_000.0),
            deal("Konga", "iPhone 15", 950_000.0),
        ];
        let once = dedup(input);
        let twice = dedup(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn near_equal_prices_round_to_same_key() {
        let out = dedup(vec![
            deal("Jumia", "iPhone 15", 950_000.001),
            deal("Jumia", "iPhone 15", 949_999.999),
        ]);
        assert_eq!(out.len(), 1);
    }
}
