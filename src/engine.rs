// src/engine.rs
//! DealEngine: the facade callers (API, scheduler, conversational layer)
//! talk to. Cache check → aggregate → blend → cache write. Zero candidates
//! after filtering is an explicit `NoResults` outcome, never an error, so a
//! caller can react, e.g. offer to create a watch.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::info;

use crate::aggregate::Aggregator;
use crate::cache::ResultCache;
use crate::config::Policy;
use crate::types::SearchOutcome;

/// Short anonymized id for query logging; raw query text stays out of logs.
pub(crate) fn anon_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub struct DealEngine {
    aggregator: Aggregator,
    cache: ResultCache,
    policy: Arc<Policy>,
}

impl DealEngine {
    pub fn new(aggregator: Aggregator, cache: ResultCache, policy: Arc<Policy>) -> Self {
        Self {
            aggregator,
            cache,
            policy,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Run a full search. A fresh aggregation always completes and populates
    /// the cache even if the original caller has gone away.
    pub async fn search(&self, query: &str, region_hint: Option<&str>) -> SearchOutcome {
        let qid = anon_hash(query);

        if let Some(row) = self.cache.get(query).await {
            info!(target: "engine", %qid, deals = row.deals.len(), "cache hit");
            return SearchOutcome::Results {
                deals: row.deals,
                total_valid: row.total_valid,
                from_cache: true,
            };
        }

        self.run_pipeline(&qid, query, region_hint).await
    }

    /// Aggregate and blend unconditionally, skipping the cache read. Watch
    /// runs come through here so their refresh cadence is set by
    /// `frequency_hours`, never the cache TTL; the fresh result still lands
    /// in the cache for interactive callers.
    pub async fn refresh(&self, query: &str, region_hint: Option<&str>) -> SearchOutcome {
        let qid = anon_hash(query);
        self.run_pipeline(&qid, query, region_hint).await
    }

    async fn run_pipeline(
        &self,
        qid: &str,
        query: &str,
        region_hint: Option<&str>,
    ) -> SearchOutcome {
        let candidates = self.aggregator.aggregate(query, region_hint).await;
        if candidates.is_empty() {
            info!(target: "engine", %qid, "no candidates after filtering");
            return SearchOutcome::NoResults;
        }

        let regional_user = self.policy.is_home_region(region_hint);
        let blended = crate::blend::blend(candidates, &self.policy, regional_user);
        info!(
            target: "engine",
            %qid,
            ranked = blended.deals.len(),
            total_valid = blended.total_valid,
            regional = regional_user,
            "search complete"
        );

        self.cache
            .put(query, blended.deals.clone(), blended.total_valid)
            .await;

        SearchOutcome::Results {
            deals: blended.deals,
            total_valid: blended.total_valid,
            from_cache: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anon_hash_is_short_and_stable() {
        let a = anon_hash("iphone 15");
        let b = anon_hash("iphone 15");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        assert_ne!(a, anon_hash("iphone 16"));
    }
}
