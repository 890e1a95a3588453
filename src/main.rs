//! Deal aggregation service binary entrypoint.
//! Boots the engine, the currency refresher, the watch scheduler, and the
//! thin operational HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dealscout::aggregate::Aggregator;
use dealscout::api::{self, AppState};
use dealscout::assist;
use dealscout::cache::ResultCache;
use dealscout::config::Policy;
use dealscout::currency::{CurrencyTable, HttpRateProvider, RateProvider};
use dealscout::engine::DealEngine;
use dealscout::metrics::Metrics;
use dealscout::notify::TracingSink;
use dealscout::providers::{self, JsonApiProvider, SourceProvider};
use dealscout::scheduler::WatchScheduler;
use dealscout::watch::MemoryWatchStore;

const DEFAULT_RATES_ENDPOINT: &str = "https://open.er-api.com/v6/latest/";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dealscout=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let policy = Arc::new(Policy::load_default().context("loading policy")?);
    let metrics = Metrics::init(policy.cache.ttl_hours);

    // Currency table + fixed-interval refresher. First refresh happens on
    // the refresher's first tick; conversion fails open until then.
    let currency = CurrencyTable::new(policy.currency.base.clone());
    let rates_endpoint =
        std::env::var("DEALSCOUT_RATES_ENDPOINT").unwrap_or_else(|_| DEFAULT_RATES_ENDPOINT.into());
    let rate_provider: Arc<dyn RateProvider> = Arc::new(HttpRateProvider::new(rates_endpoint));
    let _refresher = currency.spawn_refresher(
        rate_provider,
        Duration::from_secs(u64::from(policy.currency.refresh_hours) * 3600),
    );

    // Source providers from config/sources.toml.
    let sources = providers::load_sources_default().context("loading sources")?;
    if sources.is_empty() {
        tracing::warn!("no sources configured; searches will return no results");
    }
    let source_providers: Vec<Arc<dyn SourceProvider>> = sources
        .into_iter()
        .map(|cfg| Arc::new(JsonApiProvider::from_config(cfg)) as Arc<dyn SourceProvider>)
        .collect();

    let aggregator = Aggregator::new(
        source_providers,
        currency.clone(),
        Arc::clone(&policy),
        assist::build_assist(),
    );
    let cache = ResultCache::in_memory(policy.cache.ttl_hours);
    let engine = Arc::new(DealEngine::new(aggregator, cache, Arc::clone(&policy)));

    // Watch scheduler on the in-memory store; a persistent store plugs in
    // through the WatchStore trait.
    let watch_store = Arc::new(MemoryWatchStore::default());
    let sink = Arc::new(TracingSink);
    let scheduler = Arc::new(WatchScheduler::new(
        Arc::clone(&engine),
        watch_store,
        sink,
        Arc::clone(&policy),
    ));
    let _scheduler_task = scheduler.spawn();

    let router = api::create_router(AppState {
        engine: Arc::clone(&engine),
    })
    .merge(metrics.router());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "dealscout listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding listener")?;
    axum::serve(listener, router).await.context("serving")?;
    Ok(())
}
