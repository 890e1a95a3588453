// src/price.rs
//! Price normalization: heterogeneous raw prices in, one target currency out.
//!
//! Sources report prices as bare numbers or free text ("$1,299.99",
//! "₦ 450,000", "GBP 719.00"). Parse failure drops the listing; it is
//! expected noise from untrusted sources, not an error. Conversion is
//! fail-open via [`CurrencyTable::convert`].

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Policy;
use crate::currency::CurrencyTable;
use crate::types::RawPrice;

/// Parsed + converted price for one listing.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPrice {
    /// Amount in the target currency.
    pub amount: f64,
    /// Amount as reported, in the source currency.
    pub original_amount: f64,
    /// Best-guess ISO-ish code of the source currency.
    pub original_currency: String,
}

/// Symbols and codes we recognize inline in price text, most specific first.
const CURRENCY_MARKERS: &[(&str, &str)] = &[
    ("₦", "NGN"),
    ("£", "GBP"),
    ("€", "EUR"),
    ("$", "USD"),
    ("NGN", "NGN"),
    ("GBP", "GBP"),
    ("EUR", "EUR"),
    ("USD", "USD"),
];

static RE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("price number regex"));

/// Extract the numeric amount from free-text price. Strips currency symbols,
/// codes, and grouping characters first; returns `None` when nothing numeric
/// remains.
pub fn parse_amount(text: &str) -> Option<f64> {
    let mut s = text.trim().to_string();
    for (marker, _) in CURRENCY_MARKERS {
        s = s.replace(marker, "");
    }
    // Grouping: "1,299.99" and "1 299,99" both show up in the wild. Commas
    // followed by exactly 3 digits are separators; a trailing ",dd" is a
    // decimal point.
    s = s.replace(' ', "").replace('\u{a0}', "");
    static RE_GROUP: Lazy<Regex> =
        Lazy::new(|| Regex::new(r",(\d{3})(?:\b|$)").expect("grouping regex"));
    let mut prev = String::new();
    while prev != s {
        prev = s.clone();
        s = RE_GROUP.replace_all(&s, "$1").into_owned();
    }
    s = s.replace(',', ".");
    let m = RE_NUMBER.find(&s)?;
    m.as_str().parse::<f64>().ok()
}

/// Best-guess currency: inline symbol/code → per-source override table →
/// base currency.
pub fn detect_currency(price_text: Option<&str>, source: &str, policy: &Policy) -> String {
    if let Some(text) = price_text {
        for (marker, code) in CURRENCY_MARKERS {
            if text.contains(marker) {
                return (*code).to_string();
            }
        }
    }
    // Longest matching needle wins, so "amazon uk" beats "amazon".
    let s = source.to_lowercase();
    policy
        .currency
        .source_overrides
        .iter()
        .filter(|(needle, _)| s.contains(&needle.to_lowercase()))
        .max_by_key(|(needle, _)| needle.len())
        .map(|(_, code)| code.clone())
        .unwrap_or_else(|| policy.currency.base.clone())
}

fn reports_in_target(source: &str, policy: &Policy) -> bool {
    let s = source.to_lowercase();
    policy
        .currency
        .target_currency_sources
        .iter()
        .any(|k| s.contains(k))
}

/// Full normalization of one raw price. `None` means "drop the listing".
pub fn normalize(raw: &RawPrice, source: &str, table: &CurrencyTable, policy: &Policy) -> Option<NormalizedPrice> {
    let (original_amount, price_text) = match raw {
        RawPrice::Number(n) => {
            if !n.is_finite() || *n <= 0.0 {
                return None;
            }
            (*n, None)
        }
        RawPrice::Text(t) => {
            let amount = parse_amount(t)?;
            if amount <= 0.0 {
                return None;
            }
            (amount, Some(t.as_str()))
        }
    };

    // Regional retailers on the allow-list already quote the target currency.
    if reports_in_target(source, policy) {
        return Some(NormalizedPrice {
            amount: original_amount,
            original_amount,
            original_currency: policy.currency.target.clone(),
        });
    }

    let currency = detect_currency(price_text, source, policy);
    let amount = table.convert(original_amount, &currency, &policy.currency.target);
    Some(NormalizedPrice {
        amount,
        original_amount,
        original_currency: currency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_with_grouping() {
        assert_eq!(parse_amount("$1,299.99"), Some(1299.99));
    }

    #[test]
    fn naira_with_spaces() {
        assert_eq!(parse_amount("₦ 450,000"), Some(450_000.0));
    }

    #[test]
    fn code_prefix() {
        assert_eq!(parse_amount("GBP 719.00"), Some(719.0));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_amount("call for price"), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("N/A"), None);
    }

    #[test]
    fn detect_prefers_inline_symbol() {
        let p = crate::config::Policy::with_default_retailers();
        assert_eq!(detect_currency(Some("£719"), "Amazon", &p), "GBP");
        assert_eq!(detect_currency(None, "Amazon UK (.co.uk)", &p), "GBP");
        assert_eq!(detect_currency(None, "UnknownShop", &p), "USD");
    }
}
