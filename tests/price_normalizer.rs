// tests/price_normalizer.rs
// Scenario tests for price parsing, currency detection, and conversion.

use std::collections::HashMap;

use async_trait::async_trait;
use dealscout::config::Policy;
use dealscout::currency::{CurrencyTable, RateProvider};
use dealscout::price;
use dealscout::types::RawPrice;

fn table() -> CurrencyTable {
    let mut rates = HashMap::new();
    rates.insert("NGN".to_string(), 1500.0);
    rates.insert("GBP".to_string(), 0.8);
    rates.insert("EUR".to_string(), 0.9);
    CurrencyTable::with_rates("USD", rates)
}

fn policy() -> Policy {
    Policy::with_default_retailers()
}

#[test]
fn dollar_string_parses_to_usd() {
    // "$1,299.99" → 1299.99, USD.
    assert_eq!(price::parse_amount("$1,299.99"), Some(1299.99));
    assert_eq!(
        price::detect_currency(Some("$1,299.99"), "Amazon", &policy()),
        "USD"
    );
}

#[test]
fn foreign_price_converts_to_target() {
    let p = policy();
    let out = price::normalize(
        &RawPrice::Text("$100.00".into()),
        "Amazon",
        &table(),
        &p,
    )
    .expect("parsable");
    assert!((out.amount - 150_000.0).abs() < 1e-6);
    assert_eq!(out.original_amount, 100.0);
    assert_eq!(out.original_currency, "USD");
}

#[test]
fn allow_listed_source_skips_conversion() {
    let p = policy();
    let out = price::normalize(
        &RawPrice::Text("₦450,000".into()),
        "Jumia",
        &table(),
        &p,
    )
    .expect("parsable");
    assert_eq!(out.amount, 450_000.0);
    assert_eq!(out.original_currency, "NGN");
}

#[test]
fn unparsable_price_drops_the_listing() {
    let p = policy();
    for text in ["call for price", "", "—", "out of stock"] {
        assert!(
            price::normalize(&RawPrice::Text(text.into()), "Amazon", &table(), &p).is_none(),
            "expected drop for {text:?}"
        );
    }
    assert!(price::normalize(&RawPrice::Number(f64::NAN), "Amazon", &table(), &p).is_none());
    assert!(price::normalize(&RawPrice::Number(0.0), "Amazon", &table(), &p).is_none());
}

#[test]
fn missing_rate_fails_open_to_original_amount() {
    let p = policy();
    let empty = CurrencyTable::new("USD");
    let out = price::normalize(&RawPrice::Text("$250".into()), "eBay", &empty, &p)
        .expect("parsable");
    // No NGN rate yet: amount passes through unconverted, never errors.
    assert_eq!(out.amount, 250.0);
}

#[test]
fn currency_round_trip_within_tolerance() {
    let t = table();
    let original = 1299.99;
    let in_base = t.convert(original, "GBP", "USD");
    let back = t.convert(in_base, "USD", "GBP");
    assert!((back - original).abs() < 1e-6);
}

struct FixedRates(HashMap<String, f64>);

#[async_trait]
impl RateProvider for FixedRates {
    async fn fetch_latest_rates(&self, _base: &str) -> anyhow::Result<HashMap<String, f64>> {
        Ok(self.0.clone())
    }
    fn name(&self) -> &'static str {
        "fixed"
    }
}

struct DownRates;

#[async_trait]
impl RateProvider for DownRates {
    async fn fetch_latest_rates(&self, _base: &str) -> anyhow::Result<HashMap<String, f64>> {
        anyhow::bail!("rate service unreachable")
    }
    fn name(&self) -> &'static str {
        "down"
    }
}

#[tokio::test]
async fn refresh_overwrites_the_table_and_failure_keeps_it_stale() {
    let t = CurrencyTable::new("USD");
    assert!(t.last_updated().is_none());

    let mut rates = HashMap::new();
    rates.insert("NGN".to_string(), 1500.0);
    t.refresh(&FixedRates(rates)).await.unwrap();
    let stamped = t.last_updated().expect("stamped after refresh");
    assert_eq!(t.convert(1.0, "USD", "NGN"), 1500.0);

    // A failed refresh surfaces the error but keeps the previous table.
    assert!(t.refresh(&DownRates).await.is_err());
    assert_eq!(t.convert(1.0, "USD", "NGN"), 1500.0);
    assert_eq!(t.last_updated(), Some(stamped));

    // The next successful refresh overwrites the whole row.
    let mut newer = HashMap::new();
    newer.insert("NGN".to_string(), 1600.0);
    t.refresh(&FixedRates(newer)).await.unwrap();
    assert_eq!(t.convert(1.0, "USD", "NGN"), 1600.0);
    assert!(t.last_updated().expect("restamped") >= stamped);
}

#[test]
fn source_override_implies_gbp_without_symbol() {
    let p = policy();
    let out = price::normalize(
        &RawPrice::Number(719.0),
        "Amazon UK (.co.uk)",
        &table(),
        &p,
    )
    .expect("parsable");
    assert_eq!(out.original_currency, "GBP");
    // 719 GBP → 898.75 USD → 1,348,125 NGN with the fixture rates.
    assert!((out.amount - 1_348_125.0).abs() < 1e-3);
}
