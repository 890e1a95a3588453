// src/notify.rs
//! Notification boundary.
//!
//! The scheduler constructs a [`WatchNotification`] and hands it off; actual
//! delivery (email transport, chat transport, in-app fan-out) lives outside
//! the core. The core never learns whether delivery succeeded.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::types::{NormalizedDeal, Watch, WatchNotification};

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: WatchNotification) -> Result<()>;
}

/// Human-readable one-liner for the notification payload.
pub fn summarize(watch: &Watch, deals: &[NormalizedDeal]) -> String {
    match deals.first() {
        Some(best) => format!(
            "{} new deal(s) for \"{}\" — best: {} at {:.2} from {}",
            deals.len(),
            watch.label,
            best.title,
            best.price,
            best.source
        ),
        None => format!("No new deals for \"{}\"", watch.label),
    }
}

/// Assemble the immutable payload for one qualifying run.
pub fn build_notification(watch: &Watch, deals: Vec<NormalizedDeal>) -> WatchNotification {
    let summary = summarize(watch, &deals);
    WatchNotification {
        watch_id: watch.id.clone(),
        owner: watch.owner.clone(),
        deals,
        summary,
        channel: watch.channel,
        read: false,
        created_at: Utc::now(),
    }
}

/// Sink that only logs; the default when no delivery integration is wired.
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, n: WatchNotification) -> Result<()> {
        info!(
            target: "notify",
            watch = %n.watch_id,
            owner = %n.owner,
            channel = ?n.channel,
            deals = n.deals.len(),
            summary = %n.summary,
            "watch notification emitted"
        );
        Ok(())
    }
}

/// Collecting sink for tests.
#[derive(Default)]
pub struct MemorySink {
    pub sent: Mutex<Vec<WatchNotification>>,
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn notify(&self, n: WatchNotification) -> Result<()> {
        self.sent.lock().expect("sink poisoned").push(n);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NotifyChannel;
    use chrono::Utc;

    #[test]
    fn summary_names_the_best_deal() {
        let watch = Watch {
            id: "w1".into(),
            owner: "u1".into(),
            label: "iPhone 15".into(),
            query: "iphone 15".into(),
            frequency_hours: 12,
            min_price: None,
            max_price: None,
            active: true,
            last_run_at: None,
            channel: NotifyChannel::Email,
            created_at: Utc::now(),
        };
        let deal = NormalizedDeal {
            title: "iPhone 15 128GB".into(),
            price: 950_000.0,
            original_price: 950_000.0,
            original_currency: "NGN".into(),
            source: "Jumia".into(),
            link: "https://www.jumia.com.ng/x".into(),
            image: None,
            rating: "N/A".into(),
            reviews: "N/A".into(),
            relevance: 1.0,
            is_regional_match: true,
        };
        let n = build_notification(&watch, vec![deal]);
        assert!(n.summary.contains("iPhone 15 128GB"));
        assert!(n.summary.contains("Jumia"));
        assert!(!n.read);
        assert_eq!(n.channel, NotifyChannel::Email);
    }
}
