// src/currency.rs
//! Exchange-rate table and its refresh loop.
//!
//! Rates are stored per base unit (rate[X] = units of X per 1 base). The
//! table is shared last-write-wins state: the refresher overwrites it in
//! place and readers tolerate momentarily stale data. A missing or zero rate
//! never divides: conversion fails open and returns the amount unchanged.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Boundary to whatever service supplies exchange rates.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn fetch_latest_rates(&self, base: &str) -> Result<HashMap<String, f64>>;
    fn name(&self) -> &'static str;
}

/// Rate provider backed by an exchangerate-style JSON endpoint
/// (`{ "rates": { "NGN": 1530.0, ... } }`).
pub struct HttpRateProvider {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpRateProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("dealscout/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn fetch_latest_rates(&self, base: &str) -> Result<HashMap<String, f64>> {
        #[derive(serde::Deserialize)]
        struct RatesBody {
            rates: HashMap<String, f64>,
        }
        let url = format!("{}{}", self.endpoint, base);
        let body: RatesBody = self
            .http
            .get(&url)
            .send()
            .await
            .context("rate provider request")?
            .error_for_status()
            .context("rate provider non-2xx")?
            .json()
            .await
            .context("rate provider body")?;
        Ok(body.rates)
    }

    fn name(&self) -> &'static str {
        "http-rates"
    }
}

struct TableInner {
    rates: HashMap<String, f64>,
    last_updated: Option<DateTime<Utc>>,
}

/// Shared currency table. Created lazily empty; `refresh` overwrites the
/// whole row. Cloning shares the underlying table.
#[derive(Clone)]
pub struct CurrencyTable {
    base: String,
    inner: Arc<RwLock<TableInner>>,
}

impl CurrencyTable {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            inner: Arc::new(RwLock::new(TableInner {
                rates: HashMap::new(),
                last_updated: None,
            })),
        }
    }

    /// Table pre-seeded with static rates; used by tests and offline runs.
    pub fn with_rates(base: impl Into<String>, rates: HashMap<String, f64>) -> Self {
        let t = Self::new(base);
        t.install(rates);
        t
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.inner.read().expect("currency table poisoned").last_updated
    }

    fn install(&self, rates: HashMap<String, f64>) {
        let mut g = self.inner.write().expect("currency table poisoned");
        g.rates = rates;
        g.last_updated = Some(Utc::now());
    }

    fn rate(&self, code: &str) -> Option<f64> {
        if code.eq_ignore_ascii_case(&self.base) {
            return Some(1.0);
        }
        let g = self.inner.read().expect("currency table poisoned");
        g.rates
            .get(&code.to_ascii_uppercase())
            .copied()
            .filter(|r| *r > 0.0)
    }

    /// Convert through the base as a pivot. Missing or zero rate on either
    /// side returns the amount unconverted.
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> f64 {
        if from.eq_ignore_ascii_case(to) {
            return amount;
        }
        match (self.rate(from), self.rate(to)) {
            (Some(from_rate), Some(to_rate)) => amount / from_rate * to_rate,
            _ => {
                counter!("currency_conversion_fallback_total").increment(1);
                amount
            }
        }
    }

    /// Pull fresh rates from the provider and overwrite the table.
    pub async fn refresh(&self, provider: &dyn RateProvider) -> Result<()> {
        let rates = provider.fetch_latest_rates(&self.base).await?;
        let n = rates.len();
        self.install(rates);
        gauge!("currency_table_last_refresh_ts").set(Utc::now().timestamp() as f64);
        info!(target: "currency", provider = provider.name(), rates = n, "currency table refreshed");
        Ok(())
    }

    /// Spawn the fixed-interval refresh loop. A failed refresh keeps the
    /// previous table and is retried on the next tick.
    pub fn spawn_refresher(
        &self,
        provider: Arc<dyn RateProvider>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let table = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = table.refresh(provider.as_ref()).await {
                    counter!("currency_refresh_errors_total").increment(1);
                    warn!(target: "currency", error = ?e, "currency refresh failed; keeping stale table");
                }
            }
        })
    }
}
