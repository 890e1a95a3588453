// src/aggregate.rs
//! The Aggregator: concurrent provider fan-out plus the cleaning pipeline.
//!
//! Pipeline order is fixed: price normalization → link resolution → relevance
//! scoring → deduplication. Each provider call is isolated behind its own
//! timeout; a broken provider contributes zero listings and the aggregation
//! proceeds. The optional AI assist reranks large candidate sets and fails
//! open to the deterministic order.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use metrics::{counter, gauge, histogram};
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::assist::{sanitize_indices, DynRerankAssist};
use crate::config::Policy;
use crate::currency::CurrencyTable;
use crate::dedup::dedup;
use crate::link::{apply_affiliate, resolve, ResolvedLink};
use crate::price;
use crate::providers::SourceProvider;
use crate::relevance;
use crate::types::{NormalizedDeal, RawListing, NA};

/// Collapse whitespace and decode HTML entities in a scraped title.
pub fn normalize_title(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    let stripped = re_tags.replace_all(&decoded, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct Aggregator {
    providers: Vec<Arc<dyn SourceProvider>>,
    currency: CurrencyTable,
    policy: Arc<Policy>,
    assist: DynRerankAssist,
}

impl Aggregator {
    pub fn new(
        providers: Vec<Arc<dyn SourceProvider>>,
        currency: CurrencyTable,
        policy: Arc<Policy>,
        assist: DynRerankAssist,
    ) -> Self {
        Self {
            providers,
            currency,
            policy,
            assist,
        }
    }

    /// Fan out to all providers concurrently. Errors and timeouts are
    /// per-provider: they log, count, and contribute nothing.
    async fn fetch_all(&self, query: &str, region_hint: Option<&str>) -> Vec<RawListing> {
        let timeout = Duration::from_secs(self.policy.aggregate.provider_timeout_secs);
        let calls = self.providers.iter().map(|p| {
            let p = Arc::clone(p);
            async move {
                let t0 = std::time::Instant::now();
                let outcome = tokio::time::timeout(timeout, p.search(query, region_hint)).await;
                histogram!("provider_fetch_ms").record(t0.elapsed().as_millis() as f64);
                match outcome {
                    Ok(Ok(listings)) => {
                        debug!(target: "aggregate", provider = p.name(), count = listings.len(), "provider ok");
                        listings
                    }
                    Ok(Err(e)) => {
                        counter!("provider_errors_total").increment(1);
                        warn!(target: "aggregate", provider = p.name(), error = ?e, "provider error");
                        Vec::new()
                    }
                    Err(_) => {
                        counter!("provider_errors_total").increment(1);
                        warn!(target: "aggregate", provider = p.name(), "provider timed out");
                        Vec::new()
                    }
                }
            }
        });
        join_all(calls).await.into_iter().flatten().collect()
    }

    /// Run one raw listing through normalize → link → relevance. `None` means
    /// dropped, with the reason already counted.
    fn clean_one(&self, raw: RawListing, query: Option<&str>) -> Option<NormalizedDeal> {
        let title = normalize_title(&raw.title);
        if title.is_empty() {
            counter!("deals_dropped_unparsable_total").increment(1);
            return None;
        }

        let parsed = raw
            .price
            .as_ref()
            .and_then(|rp| price::normalize(rp, &raw.source, &self.currency, &self.policy));
        let Some(p) = parsed else {
            counter!("deals_dropped_unparsable_total").increment(1);
            return None;
        };

        let link = match resolve(raw.link.as_deref(), &title, &raw.source, &self.policy) {
            ResolvedLink::Url(u) => apply_affiliate(&u, &self.policy),
            ResolvedLink::Unavailable => {
                counter!("deals_dropped_link_total").increment(1);
                return None;
            }
        };

        let score = relevance::score(&title, query, &self.policy.relevance);
        if !relevance::accepted(score, query, &self.policy.relevance) {
            counter!("deals_dropped_relevance_total").increment(1);
            return None;
        }

        let is_regional_match = self.policy.is_regional_source(&raw.source);
        Some(NormalizedDeal {
            title,
            price: p.amount,
            original_price: p.original_amount,
            original_currency: p.original_currency,
            source: raw.source,
            link,
            image: raw.image,
            rating: raw.rating.unwrap_or_else(|| NA.to_string()),
            reviews: raw.reviews.unwrap_or_else(|| NA.to_string()),
            relevance: score,
            is_regional_match,
        })
    }

    /// Best-effort AI rerank of a large candidate set. Any failure leaves the
    /// deterministic order untouched.
    async fn assist_pass(&self, query: &str, deals: Vec<NormalizedDeal>) -> Vec<NormalizedDeal> {
        if deals.len() <= self.policy.aggregate.assist_batch_size {
            return deals;
        }
        match self.assist.rerank(query, &deals).await {
            Ok(indices) => match sanitize_indices(indices, deals.len()) {
                Some(keep) => {
                    debug!(target: "assist", kept = keep.len(), of = deals.len(), "assist rerank applied");
                    let mut slots: Vec<Option<NormalizedDeal>> =
                        deals.into_iter().map(Some).collect();
                    keep.into_iter().filter_map(|i| slots[i].take()).collect()
                }
                None => {
                    counter!("assist_fallback_total").increment(1);
                    warn!(
                        target: "assist",
                        provider = self.assist.provider_name(),
                        "assist reply unusable; keeping deterministic order"
                    );
                    deals
                }
            },
            Err(e) => {
                counter!("assist_fallback_total").increment(1);
                debug!(
                    target: "assist",
                    provider = self.assist.provider_name(),
                    error = ?e,
                    "assist unavailable; keeping deterministic order"
                );
                deals
            }
        }
    }

    /// `aggregate(query, region_hint)` → clean, deduplicated candidate set.
    pub async fn aggregate(&self, query: &str, region_hint: Option<&str>) -> Vec<NormalizedDeal> {
        let raw = self.fetch_all(query, region_hint).await;
        counter!("deals_fetched_total").increment(raw.len() as u64);

        let opt_query = {
            let q = query.trim();
            if q.is_empty() {
                None
            } else {
                Some(q)
            }
        };

        let before_dedup: Vec<NormalizedDeal> = raw
            .into_iter()
            .filter_map(|r| self.clean_one(r, opt_query))
            .collect();

        let cleaned = before_dedup.len();
        let deduped = dedup(before_dedup);
        counter!("deals_dedup_total").increment((cleaned - deduped.len()) as u64);

        let candidates = match opt_query {
            Some(q) => self.assist_pass(q, deduped).await,
            None => deduped,
        };

        counter!("deals_kept_total").increment(candidates.len() as u64);
        gauge!("aggregate_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        candidates
    }
}
