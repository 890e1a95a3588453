// src/cache.rs
//! Result cache: final ranked results keyed by normalized query text.
//!
//! TTL interpretation belongs to the core, not the store: a row older than
//! the TTL reads as absent but stays in place for inspection until the next
//! successful refresh overwrites it. Puts are unconditional last-write-wins
//! upserts. Store failures degrade to cache misses; they never fail a search.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use metrics::counter;
use tracing::warn;

use crate::error::StoreResult;
use crate::types::{CachedResult, NormalizedDeal};

/// Keyed persistence boundary. Implementations do plain upsert/read; they
/// know nothing about TTLs.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn read(&self, key: &str) -> StoreResult<Option<CachedResult>>;
    async fn upsert(&self, row: CachedResult) -> StoreResult<()>;
}

/// In-memory store; last-write-wins by construction.
#[derive(Default)]
pub struct MemoryCacheStore {
    rows: RwLock<HashMap<String, CachedResult>>,
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn read(&self, key: &str) -> StoreResult<Option<CachedResult>> {
        Ok(self.rows.read().expect("cache store poisoned").get(key).cloned())
    }

    async fn upsert(&self, row: CachedResult) -> StoreResult<()> {
        self.rows
            .write()
            .expect("cache store poisoned")
            .insert(row.query.clone(), row);
        Ok(())
    }
}

/// Case-insensitive, trimmed cache key.
pub fn normalize_key(query: &str) -> String {
    query.trim().to_lowercase()
}

#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl_hours: u32) -> Self {
        Self {
            store,
            ttl: Duration::hours(i64::from(ttl_hours)),
        }
    }

    pub fn in_memory(ttl_hours: u32) -> Self {
        Self::new(Arc::new(MemoryCacheStore::default()), ttl_hours)
    }

    /// Fresh row or nothing. Expired rows are left in place; store failures
    /// count as misses.
    pub async fn get(&self, query: &str) -> Option<CachedResult> {
        let key = normalize_key(query);
        let row = match self.store.read(&key).await {
            Ok(r) => r?,
            Err(e) => {
                counter!("cache_store_errors_total").increment(1);
                warn!(target: "cache", error = ?e, "cache read failed; treating as miss");
                return None;
            }
        };
        let age = Utc::now().signed_duration_since(row.last_updated);
        if age > self.ttl {
            counter!("cache_stale_reads_total").increment(1);
            return None;
        }
        Some(row)
    }

    /// Unconditional upsert. A failed write is logged and swallowed; the
    /// caller still has its freshly computed result.
    pub async fn put(&self, query: &str, deals: Vec<NormalizedDeal>, total_valid: usize) {
        let row = CachedResult {
            query: normalize_key(query),
            deals,
            total_valid,
            last_updated: Utc::now(),
        };
        if let Err(e) = self.store.upsert(row).await {
            counter!("cache_store_errors_total").increment(1);
            warn!(target: "cache", error = ?e, "cache write failed; result not persisted");
        }
    }
}
