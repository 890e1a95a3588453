// src/scheduler.rs
//! Recurring watch scheduler.
//!
//! One tick loads the active watches and walks them strictly sequentially:
//! due check, pipeline run, price-bound filter, notification, advance
//! `last_run_at`. The inter-watch sleep is deliberate backpressure on shared
//! providers. A tick that would start while the previous one is still
//! running is skipped, not queued. One watch's failure never aborts the
//! rest of the tick, and its `last_run_at` still advances so a
//! systematically failing query can't turn into a retry storm.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Policy;
use crate::engine::DealEngine;
use crate::notify::{build_notification, NotificationSink};
use crate::types::{NormalizedDeal, SearchOutcome, Watch};
use crate::watch::WatchStore;

pub struct WatchScheduler {
    engine: Arc<DealEngine>,
    store: Arc<dyn WatchStore>,
    sink: Arc<dyn NotificationSink>,
    policy: Arc<Policy>,
    in_progress: AtomicBool,
}

impl WatchScheduler {
    pub fn new(
        engine: Arc<DealEngine>,
        store: Arc<dyn WatchStore>,
        sink: Arc<dyn NotificationSink>,
        policy: Arc<Policy>,
    ) -> Self {
        Self {
            engine,
            store,
            sink,
            policy,
            in_progress: AtomicBool::new(false),
        }
    }

    /// Process a single watch: fresh pipeline run, price-bound filter,
    /// notify. Goes through [`DealEngine::refresh`] rather than `search` so
    /// the cadence is the watch's own `frequency_hours`; a cached row from an
    /// earlier interactive search must not be replayed to the owner.
    /// Returns the qualifying deal count.
    async fn run_watch(&self, watch: &Watch) -> anyhow::Result<usize> {
        let outcome = self.engine.refresh(&watch.query, None).await;
        let qualifying: Vec<NormalizedDeal> = match outcome {
            SearchOutcome::Results { deals, .. } => deals
                .into_iter()
                .filter(|d| watch.price_qualifies(d.price))
                .collect(),
            SearchOutcome::NoResults => Vec::new(),
        };

        if qualifying.is_empty() {
            debug!(target: "scheduler", watch = %watch.id, "ran, nothing qualifying");
            return Ok(0);
        }

        let n = qualifying.len();
        let notification = build_notification(watch, qualifying);
        counter!("watch_notifications_total").increment(1);
        self.sink.notify(notification).await?;
        Ok(n)
    }

    /// One full pass over the active watches. Public for tests; production
    /// code drives it through [`WatchScheduler::spawn`].
    pub async fn run_tick(&self, now: DateTime<Utc>) {
        counter!("watch_ticks_total").increment(1);

        let watches = match self.store.list_active().await {
            Ok(w) => w,
            Err(e) => {
                warn!(target: "scheduler", error = ?e, "could not list active watches");
                return;
            }
        };

        let delay = Duration::from_secs(self.policy.scheduler.inter_watch_delay_secs);
        let mut first = true;
        for watch in &watches {
            if !watch.is_due(now) {
                counter!("watch_skips_total").increment(1);
                continue;
            }

            // Backpressure between pipeline runs, not before the first one.
            if !first {
                tokio::time::sleep(delay).await;
            }
            first = false;

            counter!("watch_runs_total").increment(1);
            match self.run_watch(watch).await {
                Ok(n) => {
                    info!(target: "scheduler", watch = %watch.id, qualifying = n, "watch ran");
                }
                Err(e) => {
                    counter!("watch_run_errors_total").increment(1);
                    warn!(target: "scheduler", watch = %watch.id, error = ?e, "watch run failed");
                }
            }

            // Advance even on failure: a watch that found nothing (or broke)
            // still "ran".
            if let Err(e) = self.store.advance_last_run(&watch.id, Utc::now()).await {
                warn!(target: "scheduler", watch = %watch.id, error = ?e, "could not advance last_run_at");
            }
        }

        gauge!("watch_tick_last_ts").set(Utc::now().timestamp() as f64);
    }

    /// Tick wrapper with the skip-if-already-running guard.
    pub async fn tick(&self) {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            counter!("watch_ticks_skipped_total").increment(1);
            debug!(target: "scheduler", "previous tick still running; skipping");
            return;
        }
        self.run_tick(Utc::now()).await;
        self.in_progress.store(false, Ordering::SeqCst);
    }

    /// Spawn the fixed-interval tick loop.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.policy.scheduler.tick_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }
}
