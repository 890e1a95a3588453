// src/watch.rs
//! Watch persistence boundary.
//!
//! The engine consumes CRUD plus two queries: all active watches (for the
//! scheduler) and active watches per owner. The scheduler only ever advances
//! `last_run_at`; every other mutation belongs to the owner.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::Policy;
use crate::error::{StoreError, StoreResult};
use crate::types::{NotifyChannel, Watch};

#[async_trait]
pub trait WatchStore: Send + Sync {
    async fn insert(&self, watch: Watch) -> StoreResult<()>;
    async fn get(&self, id: &str) -> StoreResult<Option<Watch>>;
    async fn list_active(&self) -> StoreResult<Vec<Watch>>;
    async fn list_for_owner(&self, owner: &str) -> StoreResult<Vec<Watch>>;
    async fn set_active(&self, id: &str, active: bool) -> StoreResult<()>;
    async fn update_bounds(
        &self,
        id: &str,
        min_price: Option<f64>,
        max_price: Option<f64>,
        frequency_hours: u32,
    ) -> StoreResult<()>;
    /// Scheduler-only mutation.
    async fn advance_last_run(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()>;
    /// Explicit owner action; the only hard delete.
    async fn delete(&self, id: &str) -> StoreResult<()>;
}

/// Builder applying the policy's frequency clamp and defaults.
pub fn new_watch(
    policy: &Policy,
    owner: impl Into<String>,
    label: impl Into<String>,
    query: impl Into<String>,
    frequency_hours: Option<u32>,
    min_price: Option<f64>,
    max_price: Option<f64>,
    channel: NotifyChannel,
) -> Watch {
    let now = Utc::now();
    let freq = policy.clamp_frequency(
        frequency_hours.unwrap_or(policy.scheduler.default_frequency_hours),
    );
    Watch {
        id: format!("watch-{}", now.timestamp_nanos_opt().unwrap_or_default()),
        owner: owner.into(),
        label: label.into(),
        query: query.into(),
        frequency_hours: freq,
        min_price,
        max_price,
        active: true,
        last_run_at: None,
        channel,
        created_at: now,
    }
}

#[derive(Default)]
pub struct MemoryWatchStore {
    rows: RwLock<HashMap<String, Watch>>,
}

impl MemoryWatchStore {
    fn with_row<T>(&self, id: &str, f: impl FnOnce(&mut Watch) -> T) -> StoreResult<T> {
        let mut g = self.rows.write().expect("watch store poisoned");
        let row = g
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(f(row))
    }
}

#[async_trait]
impl WatchStore for MemoryWatchStore {
    async fn insert(&self, watch: Watch) -> StoreResult<()> {
        self.rows
            .write()
            .expect("watch store poisoned")
            .insert(watch.id.clone(), watch);
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Watch>> {
        Ok(self.rows.read().expect("watch store poisoned").get(id).cloned())
    }

    async fn list_active(&self) -> StoreResult<Vec<Watch>> {
        let mut out: Vec<Watch> = self
            .rows
            .read()
            .expect("watch store poisoned")
            .values()
            .filter(|w| w.active)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn list_for_owner(&self, owner: &str) -> StoreResult<Vec<Watch>> {
        let mut out: Vec<Watch> = self
            .rows
            .read()
            .expect("watch store poisoned")
            .values()
            .filter(|w| w.active && w.owner == owner)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn set_active(&self, id: &str, active: bool) -> StoreResult<()> {
        self.with_row(id, |w| w.active = active)
    }

    async fn update_bounds(
        &self,
        id: &str,
        min_price: Option<f64>,
        max_price: Option<f64>,
        frequency_hours: u32,
    ) -> StoreResult<()> {
        self.with_row(id, |w| {
            w.min_price = min_price;
            w.max_price = max_price;
            w.frequency_hours = frequency_hours;
        })
    }

    async fn advance_last_run(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        self.with_row(id, |w| w.last_run_at = Some(at))
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.rows.write().expect("watch store poisoned").remove(id);
        Ok(())
    }
}
