// tests/watch_scheduler.rs
// Scheduler semantics: due/skip, last_run advancement, price bounds,
// per-watch failure isolation, and notification payloads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Notify;
use dealscout::aggregate::Aggregator;
use dealscout::assist::DisabledAssist;
use dealscout::cache::ResultCache;
use dealscout::config::Policy;
use dealscout::currency::CurrencyTable;
use dealscout::engine::DealEngine;
use dealscout::notify::{MemorySink, NotificationSink};
use dealscout::providers::{FixtureProvider, SourceProvider};
use dealscout::scheduler::WatchScheduler;
use dealscout::types::{NotifyChannel, RawListing, RawPrice, SearchOutcome, Watch, WatchNotification};
use dealscout::watch::{MemoryWatchStore, WatchStore};

fn listing(title: &str, price: f64) -> RawListing {
    RawListing {
        title: title.into(),
        price: Some(RawPrice::Number(price)),
        source: "Jumia".into(),
        link: Some("https://www.jumia.com.ng/p/1".into()),
        image: None,
        rating: None,
        reviews: None,
    }
}

fn watch(id: &str, query: &str, last_run_hours_ago: Option<i64>) -> Watch {
    Watch {
        id: id.into(),
        owner: "u1".into(),
        label: query.into(),
        query: query.into(),
        frequency_hours: 12,
        min_price: None,
        max_price: None,
        active: true,
        last_run_at: last_run_hours_ago.map(|h| Utc::now() - Duration::hours(h)),
        channel: NotifyChannel::Email,
        created_at: Utc::now(),
    }
}

fn test_policy() -> Arc<Policy> {
    let mut p = Policy::with_default_retailers();
    // Keep the tick fast under test; the delay is a production-only
    // backpressure knob.
    p.scheduler.inter_watch_delay_secs = 0;
    Arc::new(p)
}

fn scheduler_with(
    listings: Vec<RawListing>,
    store: Arc<MemoryWatchStore>,
    sink: Arc<MemorySink>,
) -> WatchScheduler {
    let policy = test_policy();
    let mut rates = HashMap::new();
    rates.insert("NGN".to_string(), 1500.0);
    let provider: Arc<dyn SourceProvider> = Arc::new(FixtureProvider::new("Jumia", listings));
    let aggregator = Aggregator::new(
        vec![provider],
        CurrencyTable::with_rates("USD", rates),
        Arc::clone(&policy),
        Arc::new(DisabledAssist),
    );
    let engine = Arc::new(DealEngine::new(
        aggregator,
        ResultCache::in_memory(24),
        Arc::clone(&policy),
    ));
    WatchScheduler::new(engine, store, sink, policy)
}

#[tokio::test]
async fn due_watch_runs_and_advances_last_run() {
    let store = Arc::new(MemoryWatchStore::default());
    let sink = Arc::new(MemorySink::default());
    store.insert(watch("w-due", "iphone 15", Some(13))).await.unwrap();

    let sched = scheduler_with(
        vec![listing("iPhone 15 128GB", 950_000.0)],
        store.clone(),
        sink.clone(),
    );
    sched.run_tick(Utc::now()).await;

    let w = store.get("w-due").await.unwrap().unwrap();
    let advanced = w.last_run_at.expect("last_run_at set");
    assert!(Utc::now().signed_duration_since(advanced) < Duration::minutes(1));
    assert_eq!(sink.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn not_yet_due_watch_is_skipped() {
    let store = Arc::new(MemoryWatchStore::default());
    let sink = Arc::new(MemorySink::default());
    store.insert(watch("w-early", "iphone 15", Some(3))).await.unwrap();

    let sched = scheduler_with(
        vec![listing("iPhone 15 128GB", 950_000.0)],
        store.clone(),
        sink.clone(),
    );
    sched.run_tick(Utc::now()).await;

    let w = store.get("w-early").await.unwrap().unwrap();
    // Skip is a no-op: last_run_at stays ~3h old, no notification.
    let age = Utc::now().signed_duration_since(w.last_run_at.unwrap());
    assert!(age > Duration::hours(2));
    assert!(sink.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn price_bounds_filter_qualifying_deals() {
    let store = Arc::new(MemoryWatchStore::default());
    let sink = Arc::new(MemorySink::default());
    let mut w = watch("w-bounds", "iphone 15", None);
    w.max_price = Some(900_000.0);
    store.insert(w).await.unwrap();

    let sched = scheduler_with(
        vec![
            listing("iPhone 15 128GB", 950_000.0),
            listing("iPhone 15 renewed", 850_000.0),
        ],
        store.clone(),
        sink.clone(),
    );
    sched.run_tick(Utc::now()).await;

    let sent = sink.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].deals.len(), 1);
    assert_eq!(sent[0].deals[0].title, "iPhone 15 renewed");
    assert_eq!(sent[0].channel, NotifyChannel::Email);
    assert!(sent[0].summary.contains("iPhone 15 renewed"));
}

#[tokio::test]
async fn watch_finding_nothing_still_advances_last_run() {
    let store = Arc::new(MemoryWatchStore::default());
    let sink = Arc::new(MemorySink::default());
    store.insert(watch("w-quiet", "ps5 console", None)).await.unwrap();

    let sched = scheduler_with(
        vec![listing("iPhone 15 128GB", 950_000.0)],
        store.clone(),
        sink.clone(),
    );
    sched.run_tick(Utc::now()).await;

    let w = store.get("w-quiet").await.unwrap().unwrap();
    assert!(w.last_run_at.is_some(), "a watch that finds nothing still ran");
    assert!(sink.sent.lock().unwrap().is_empty());
}

/// Provider whose inventory can change between calls, like a retailer
/// repricing between an interactive search and the next watch run.
struct RestockingProvider {
    listings: RwLock<Vec<RawListing>>,
}

impl RestockingProvider {
    fn new(listings: Vec<RawListing>) -> Self {
        Self {
            listings: RwLock::new(listings),
        }
    }

    fn restock(&self, listings: Vec<RawListing>) {
        *self.listings.write().unwrap() = listings;
    }
}

#[async_trait]
impl SourceProvider for RestockingProvider {
    async fn search(&self, _query: &str, _region: Option<&str>) -> Result<Vec<RawListing>> {
        Ok(self.listings.read().unwrap().clone())
    }
    fn name(&self) -> &str {
        "restocking"
    }
}

#[tokio::test]
async fn watch_run_sees_live_listings_not_the_cached_row() {
    let policy = test_policy();
    let mut rates = HashMap::new();
    rates.insert("NGN".to_string(), 1500.0);
    let provider = Arc::new(RestockingProvider::new(vec![listing(
        "iPhone 15 launch price",
        990_000.0,
    )]));
    let aggregator = Aggregator::new(
        vec![Arc::clone(&provider) as Arc<dyn SourceProvider>],
        CurrencyTable::with_rates("USD", rates),
        Arc::clone(&policy),
        Arc::new(DisabledAssist),
    );
    let engine = Arc::new(DealEngine::new(
        aggregator,
        ResultCache::in_memory(24),
        Arc::clone(&policy),
    ));

    // An interactive search populates the 24h cache.
    let first = engine.search("iphone 15", None).await;
    assert!(!first.deals().is_empty());

    // The retailer reprices before the watch comes due.
    provider.restock(vec![listing("iPhone 15 flash sale", 700_000.0)]);

    let store = Arc::new(MemoryWatchStore::default());
    let sink = Arc::new(MemorySink::default());
    store.insert(watch("w-live", "iphone 15", Some(13))).await.unwrap();
    let sched = WatchScheduler::new(Arc::clone(&engine), store, sink.clone(), policy);
    sched.run_tick(Utc::now()).await;

    // The owner is told about the live listing, not the cached row.
    {
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].deals[0].title, "iPhone 15 flash sale");
    }

    // The watch run refreshed the cache for interactive callers too.
    let after = engine.search("iphone 15", None).await;
    let SearchOutcome::Results { deals, from_cache, .. } = after else {
        panic!("expected results");
    };
    assert!(from_cache);
    assert_eq!(deals[0].title, "iPhone 15 flash sale");
}

/// Provider that holds its first call open until released; later calls
/// return immediately. Counts every call.
struct GatedProvider {
    calls: AtomicUsize,
    gate: Notify,
}

#[async_trait]
impl SourceProvider for GatedProvider {
    async fn search(&self, _query: &str, _region: Option<&str>) -> Result<Vec<RawListing>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            self.gate.notified().await;
        }
        Ok(vec![listing("iPhone 15 128GB", 950_000.0)])
    }
    fn name(&self) -> &str {
        "gated"
    }
}

#[tokio::test]
async fn tick_overlapping_a_running_tick_is_dropped_not_queued() {
    let provider = Arc::new(GatedProvider {
        calls: AtomicUsize::new(0),
        gate: Notify::new(),
    });
    let policy = test_policy();
    let mut rates = HashMap::new();
    rates.insert("NGN".to_string(), 1500.0);
    let aggregator = Aggregator::new(
        vec![Arc::clone(&provider) as Arc<dyn SourceProvider>],
        CurrencyTable::with_rates("USD", rates),
        Arc::clone(&policy),
        Arc::new(DisabledAssist),
    );
    let engine = Arc::new(DealEngine::new(
        aggregator,
        ResultCache::in_memory(24),
        Arc::clone(&policy),
    ));
    let store = Arc::new(MemoryWatchStore::default());
    store.insert(watch("w-guard", "iphone 15", None)).await.unwrap();
    let sched = Arc::new(WatchScheduler::new(
        engine,
        store.clone(),
        Arc::new(MemorySink::default()),
        policy,
    ));

    let running = {
        let s = Arc::clone(&sched);
        tokio::spawn(async move { s.tick().await })
    };
    // Wait until the first tick is held open inside the provider call.
    while provider.calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    // A tick arriving mid-run returns immediately without touching watches.
    sched.tick().await;
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    provider.gate.notify_one();
    running.await.unwrap();
    let w = store.get("w-guard").await.unwrap().unwrap();
    assert!(w.last_run_at.is_some(), "first tick completed after release");

    // Guard released: the next tick runs due watches again.
    store.insert(watch("w-after", "ps5 console", None)).await.unwrap();
    sched.tick().await;
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn notify(&self, _n: WatchNotification) -> Result<()> {
        anyhow::bail!("delivery boundary unavailable")
    }
}

#[tokio::test]
async fn one_failing_watch_does_not_abort_the_tick() {
    let store = Arc::new(MemoryWatchStore::default());
    store.insert(watch("w-1", "iphone 15", None)).await.unwrap();
    store.insert(watch("w-2", "iphone 15", None)).await.unwrap();

    let policy = test_policy();
    let mut rates = HashMap::new();
    rates.insert("NGN".to_string(), 1500.0);
    let provider: Arc<dyn SourceProvider> = Arc::new(FixtureProvider::new(
        "Jumia",
        vec![listing("iPhone 15 128GB", 950_000.0)],
    ));
    let aggregator = Aggregator::new(
        vec![provider],
        CurrencyTable::with_rates("USD", rates),
        Arc::clone(&policy),
        Arc::new(DisabledAssist),
    );
    let engine = Arc::new(DealEngine::new(
        aggregator,
        ResultCache::in_memory(24),
        Arc::clone(&policy),
    ));
    let sched = WatchScheduler::new(engine, store.clone(), Arc::new(FailingSink), policy);

    sched.run_tick(Utc::now()).await;

    // Both watches ran despite every notification failing, and both
    // advanced so a broken sink cannot cause a retry storm.
    for id in ["w-1", "w-2"] {
        let w = store.get(id).await.unwrap().unwrap();
        assert!(w.last_run_at.is_some(), "{id} should have advanced");
    }
}
