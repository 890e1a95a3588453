// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod aggregate;
pub mod api;
pub mod assist;
pub mod blend;
pub mod cache;
pub mod config;
pub mod currency;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod link;
pub mod metrics;
pub mod notify;
pub mod price;
pub mod providers;
pub mod relevance;
pub mod scheduler;
pub mod types;
pub mod watch;

// ---- Re-exports for stable public API ----
pub use crate::config::Policy;
pub use crate::engine::DealEngine;
pub use crate::scheduler::WatchScheduler;
pub use crate::types::{
    CachedResult, NormalizedDeal, NotifyChannel, RawListing, RawPrice, SearchOutcome, Watch,
    WatchNotification,
};
