// src/metrics.rs
//! Prometheus recorder, series registration, and the /metrics router.
//!
//! Every series the pipeline, cache, currency table, and scheduler emit is
//! described here in one place, so /metrics carries help text before the
//! first increment.

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Initialize the Prometheus recorder, register all known series, and
    /// expose a static gauge for the result-cache TTL.
    pub fn init(cache_ttl_hours: u32) -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");

        describe_series();
        gauge!("result_cache_ttl_hours").set(f64::from(cache_ttl_hours));

        Self { handle }
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe_series() {
    // Aggregation pipeline.
    describe_counter!("deals_fetched_total", "Raw listings returned by providers.");
    describe_counter!("deals_kept_total", "Listings surviving the full pipeline.");
    describe_counter!(
        "deals_dropped_unparsable_total",
        "Listings dropped for missing title or unparsable/absent price."
    );
    describe_counter!(
        "deals_dropped_link_total",
        "Listings dropped for unresolvable link."
    );
    describe_counter!(
        "deals_dropped_relevance_total",
        "Listings dropped below the relevance threshold."
    );
    describe_counter!("deals_dedup_total", "Listings removed as duplicates.");
    describe_counter!("provider_errors_total", "Provider fetch/timeout errors.");
    describe_counter!(
        "assist_fallback_total",
        "AI assist passes that fell back to deterministic order."
    );
    describe_histogram!("provider_fetch_ms", "Per-provider fetch time in milliseconds.");
    describe_gauge!("aggregate_last_run_ts", "Unix ts of the last aggregation.");

    // Result cache.
    describe_counter!("cache_store_errors_total", "Cache store read/write failures.");
    describe_counter!("cache_stale_reads_total", "Cache reads past the TTL, served as misses.");
    describe_gauge!("result_cache_ttl_hours", "Configured result-cache TTL.");

    // Currency table.
    describe_counter!(
        "currency_conversion_fallback_total",
        "Conversions that fell open to the unconverted amount."
    );
    describe_counter!("currency_refresh_errors_total", "Failed rate refreshes.");
    describe_gauge!("currency_table_last_refresh_ts", "Unix ts of the last rate refresh.");

    // Watch scheduler.
    describe_counter!("watch_ticks_total", "Scheduler ticks executed.");
    describe_counter!("watch_ticks_skipped_total", "Ticks skipped (previous still running).");
    describe_counter!("watch_runs_total", "Watches whose pipeline ran.");
    describe_counter!("watch_skips_total", "Watches skipped as not yet due.");
    describe_counter!("watch_run_errors_total", "Per-watch pipeline/notify failures.");
    describe_counter!("watch_notifications_total", "Notifications handed to the sink.");
    describe_gauge!("watch_tick_last_ts", "Unix ts of the last completed tick.");
}
