// tests/cache_ttl.rs
// Result cache semantics: normalized keys, TTL-as-absent reads, stale rows
// left in place, store failures degrading to misses.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dealscout::cache::{normalize_key, CacheStore, MemoryCacheStore, ResultCache};
use dealscout::error::StoreResult;
use dealscout::types::{CachedResult, NormalizedDeal};

fn deal(title: &str) -> NormalizedDeal {
    NormalizedDeal {
        title: title.into(),
        price: 100.0,
        original_price: 100.0,
        original_currency: "NGN".into(),
        source: "Jumia".into(),
        link: "https://www.jumia.com.ng/x".into(),
        image: None,
        rating: "N/A".into(),
        reviews: "N/A".into(),
        relevance: 1.0,
        is_regional_match: true,
    }
}

#[tokio::test]
async fn put_then_get_round_trips_with_key_normalization() {
    let cache = ResultCache::in_memory(24);
    cache.put("  iPhone 15  ", vec![deal("a")], 1).await;
    let row = cache.get("iphone 15").await.expect("fresh row");
    assert_eq!(row.query, "iphone 15");
    assert_eq!(row.deals.len(), 1);
    assert_eq!(row.total_valid, 1);
}

#[tokio::test]
async fn row_older_than_ttl_reads_as_absent_but_stays() {
    let store = Arc::new(MemoryCacheStore::default());
    let cache = ResultCache::new(store.clone(), 24);

    store
        .upsert(CachedResult {
            query: normalize_key("iphone 15"),
            deals: vec![deal("old")],
            total_valid: 1,
            last_updated: Utc::now() - Duration::hours(25),
        })
        .await
        .unwrap();

    assert!(cache.get("iphone 15").await.is_none(), "25h > 24h TTL");
    // The stale row was not deleted; it is still inspectable in the store.
    let raw = store.read(&normalize_key("iphone 15")).await.unwrap();
    assert_eq!(raw.unwrap().deals[0].title, "old");
}

#[tokio::test]
async fn fresh_overwrite_replaces_stale_row() {
    let store = Arc::new(MemoryCacheStore::default());
    let cache = ResultCache::new(store.clone(), 24);

    store
        .upsert(CachedResult {
            query: "iphone 15".into(),
            deals: vec![deal("old")],
            total_valid: 1,
            last_updated: Utc::now() - Duration::hours(30),
        })
        .await
        .unwrap();

    cache.put("iphone 15", vec![deal("new")], 1).await;
    let row = cache.get("iphone 15").await.expect("fresh after overwrite");
    assert_eq!(row.deals[0].title, "new");
}

struct BrokenStore;

#[async_trait]
impl CacheStore for BrokenStore {
    async fn read(&self, _key: &str) -> StoreResult<Option<CachedResult>> {
        Err(anyhow::anyhow!("backend down").into())
    }
    async fn upsert(&self, _row: CachedResult) -> StoreResult<()> {
        Err(anyhow::anyhow!("backend down").into())
    }
}

#[tokio::test]
async fn store_failure_is_a_miss_and_put_is_swallowed() {
    let cache = ResultCache::new(Arc::new(BrokenStore), 24);
    assert!(cache.get("iphone 15").await.is_none());
    // Must not panic or propagate.
    cache.put("iphone 15", vec![deal("x")], 1).await;
}
