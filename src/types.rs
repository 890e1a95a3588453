// src/types.rs
//! Core data model shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw price as reported by a source: a bare number or free text like
/// `"$1,299.99"` / `"₦450,000"`. Untrusted either way.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawPrice {
    Number(f64),
    Text(String),
}

/// One untrusted listing as returned by a source provider, already mapped
/// out of the provider's own field names by its adapter. No invariants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawListing {
    pub title: String,
    pub price: Option<RawPrice>,
    pub source: String,
    pub link: Option<String>,
    pub image: Option<String>,
    pub rating: Option<String>,
    pub reviews: Option<String>,
}

/// A listing that survived the pipeline. `link` is always a syntactically
/// valid absolute URL, never empty and never a bare `#`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedDeal {
    pub title: String,
    /// Price in the target currency.
    pub price: f64,
    /// Price as reported, in the source currency.
    pub original_price: f64,
    pub original_currency: String,
    pub source: String,
    pub link: String,
    pub image: Option<String>,
    pub rating: String,
    pub reviews: String,
    /// Deterministic relevance score in [0, 1].
    pub relevance: f32,
    pub is_regional_match: bool,
}

/// Sentinel used for unknown rating/review counts.
pub const NA: &str = "N/A";

/// Final ranked result persisted per normalized query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResult {
    /// Lowercased, trimmed query text; unique key.
    pub query: String,
    pub deals: Vec<NormalizedDeal>,
    /// Candidate count before truncation to the result limit.
    pub total_valid: usize,
    pub last_updated: DateTime<Utc>,
}

/// Outcome of a search: zero candidates after filtering is an explicit
/// outcome, not an error, so callers can react (e.g. offer to create a watch).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SearchOutcome {
    Results {
        deals: Vec<NormalizedDeal>,
        total_valid: usize,
        from_cache: bool,
    },
    NoResults,
}

impl SearchOutcome {
    pub fn deals(&self) -> &[NormalizedDeal] {
        match self {
            SearchOutcome::Results { deals, .. } => deals,
            SearchOutcome::NoResults => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SearchOutcome::NoResults)
    }
}

/// Preferred delivery channel for watch notifications. Delivery itself lives
/// behind the NotificationSink boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyChannel {
    Email,
    Chat,
    InApp,
}

impl Default for NotifyChannel {
    fn default() -> Self {
        NotifyChannel::InApp
    }
}

/// A saved recurring search. Owned by its creating account; the scheduler
/// only reads it and advances `last_run_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Watch {
    pub id: String,
    pub owner: String,
    pub label: String,
    pub query: String,
    pub frequency_hours: u32,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub channel: NotifyChannel,
    pub created_at: DateTime<Utc>,
}

impl Watch {
    /// Whether enough time has passed since the last run. A watch that has
    /// never run is always due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_run_at {
            None => true,
            Some(last) => {
                let elapsed = now.signed_duration_since(last);
                elapsed >= chrono::Duration::hours(i64::from(self.frequency_hours))
            }
        }
    }

    /// Price-bound filter applied to a blended result before notification.
    pub fn price_qualifies(&self, price: f64) -> bool {
        if let Some(min) = self.min_price {
            if price < min {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if price > max {
                return false;
            }
        }
        true
    }
}

/// Payload handed to the notification boundary when a watch run finds at
/// least one qualifying deal. Immutable except for `read`, which belongs to
/// the recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchNotification {
    pub watch_id: String,
    pub owner: String,
    pub deals: Vec<NormalizedDeal>,
    pub summary: String,
    pub channel: NotifyChannel,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
