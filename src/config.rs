// src/config.rs
//! Policy tables and tunables for the aggregation pipeline.
//!
//! Every hand-maintained keyword list lives here as data, not code:
//! accessory keywords, regional bucket substrings, retailer search
//! endpoints, affiliate tags, currency overrides. Loaded from
//! `config/policy.toml` (override path with `DEALSCOUT_POLICY_PATH`); when
//! the file is absent the compiled-in defaults apply, so the engine always
//! has a usable policy.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_POLICY_PATH: &str = "config/policy.toml";
pub const ENV_POLICY_PATH: &str = "DEALSCOUT_POLICY_PATH";

fn default_threshold() -> f32 {
    0.4
}
fn default_penalty() -> f32 {
    0.2
}
fn default_tie_epsilon() -> f32 {
    0.05
}
fn default_accessories() -> Vec<String> {
    [
        "case", "cover", "screen protector", "strap", "charger", "cable", "pouch", "sleeve",
        "holder", "stand", "skin", "tempered glass",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelevancePolicy {
    /// Listings scoring below this are dropped when a query is present.
    pub threshold: f32,
    /// Multiplier applied when the title names an accessory the query doesn't.
    pub accessory_penalty: f32,
    /// Relevance deltas under this are ties, broken by price.
    pub tie_epsilon: f32,
    pub accessory_keywords: Vec<String>,
}

impl Default for RelevancePolicy {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            accessory_penalty: default_penalty(),
            tie_epsilon: default_tie_epsilon(),
            accessory_keywords: default_accessories(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CurrencyPolicy {
    /// Pivot currency for conversions.
    pub base: String,
    /// Currency the final result set is priced in.
    pub target: String,
    pub refresh_hours: u32,
    /// Substring-on-source → currency code, consulted when the price text
    /// carries no symbol (e.g. ".co.uk" implies GBP).
    pub source_overrides: HashMap<String, String>,
    /// Sources known to already report in the target currency; conversion is
    /// skipped entirely for these.
    pub target_currency_sources: Vec<String>,
}

impl Default for CurrencyPolicy {
    fn default() -> Self {
        let mut source_overrides = HashMap::new();
        source_overrides.insert(".co.uk".into(), "GBP".into());
        source_overrides.insert("amazon uk".into(), "GBP".into());
        source_overrides.insert("ebay".into(), "USD".into());
        source_overrides.insert("amazon".into(), "USD".into());
        source_overrides.insert("aliexpress".into(), "USD".into());
        Self {
            base: "USD".into(),
            target: "NGN".into(),
            refresh_hours: 6,
            source_overrides,
            target_currency_sources: vec![
                "jumia".into(),
                "konga".into(),
                "slot".into(),
                "pointek".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AffiliatePolicy {
    pub enabled: bool,
    /// Query parameter name, e.g. "tag" for Amazon, "aff_id" for Jumia.
    pub param: String,
    pub value: String,
}

/// One known retailer: matched by case-insensitive substring on the source
/// name, supplies the domain for relative links and the manufactured
/// search-results endpoint for missing/broken links.
#[derive(Debug, Clone, Deserialize)]
pub struct RetailerPolicy {
    /// Substring key, e.g. "jumia".
    pub key: String,
    /// Absolute origin used to resolve relative links, e.g. "https://www.jumia.com.ng".
    pub domain: String,
    /// Search endpoint prefix; the urlencoded title is appended.
    pub search_url: String,
    #[serde(default)]
    pub affiliate: AffiliatePolicy,
}

fn default_retailers() -> Vec<RetailerPolicy> {
    vec![
        RetailerPolicy {
            key: "jumia".into(),
            domain: "https://www.jumia.com.ng".into(),
            search_url: "https://www.jumia.com.ng/catalog/?q=".into(),
            affiliate: AffiliatePolicy {
                enabled: true,
                param: "aff_id".into(),
                value: "dealscout".into(),
            },
        },
        RetailerPolicy {
            key: "konga".into(),
            domain: "https://www.konga.com".into(),
            search_url: "https://www.konga.com/search?search=".into(),
            affiliate: AffiliatePolicy {
                enabled: true,
                param: "k_id".into(),
                value: "dealscout".into(),
            },
        },
        RetailerPolicy {
            key: "slot".into(),
            domain: "https://slot.ng".into(),
            search_url: "https://slot.ng/?s=".into(),
            affiliate: AffiliatePolicy::default(),
        },
        RetailerPolicy {
            key: "pointek".into(),
            domain: "https://pointekonline.com".into(),
            search_url: "https://pointekonline.com/?s=".into(),
            affiliate: AffiliatePolicy::default(),
        },
        RetailerPolicy {
            key: "amazon".into(),
            domain: "https://www.amazon.com".into(),
            search_url: "https://www.amazon.com/s?k=".into(),
            affiliate: AffiliatePolicy {
                enabled: true,
                param: "tag".into(),
                value: "dealscout-20".into(),
            },
        },
        RetailerPolicy {
            key: "ebay".into(),
            domain: "https://www.ebay.com".into(),
            search_url: "https://www.ebay.com/sch/i.html?_nkw=".into(),
            affiliate: AffiliatePolicy::default(),
        },
        RetailerPolicy {
            key: "aliexpress".into(),
            domain: "https://www.aliexpress.com".into(),
            search_url: "https://www.aliexpress.com/wholesale?SearchText=".into(),
            affiliate: AffiliatePolicy::default(),
        },
    ]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlendPolicy {
    /// Substring naming the primary local bucket; emitted first, in full.
    pub primary_local: String,
    /// Substrings naming the secondary local buckets.
    pub secondary_local: Vec<String>,
    /// Items taken from the combined secondary-local buckets per one foreign
    /// item during interleave.
    pub locals_per_foreign: usize,
    pub max_results: usize,
    /// Region hints that select the interleaving policy; anything else gets
    /// the plain local-then-foreign concatenation.
    pub home_regions: Vec<String>,
}

impl Default for BlendPolicy {
    fn default() -> Self {
        Self {
            primary_local: "jumia".into(),
            secondary_local: vec!["konga".into(), "slot".into(), "pointek".into()],
            locals_per_foreign: 9,
            max_results: 15,
            home_regions: vec!["ng".into(), "nigeria".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregatePolicy {
    pub provider_timeout_secs: u64,
    /// AI rerank assist only engages above this many candidates.
    pub assist_batch_size: usize,
}

impl Default for AggregatePolicy {
    fn default() -> Self {
        Self {
            provider_timeout_secs: 10,
            assist_batch_size: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    pub ttl_hours: u32,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self { ttl_hours: 24 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerPolicy {
    pub tick_secs: u64,
    /// Synchronous pause between watches inside one tick; deliberate
    /// backpressure on shared downstream providers.
    pub inter_watch_delay_secs: u64,
    pub min_frequency_hours: u32,
    pub max_frequency_hours: u32,
    pub default_frequency_hours: u32,
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self {
            tick_secs: 600,
            inter_watch_delay_secs: 2,
            min_frequency_hours: 1,
            max_frequency_hours: 168,
            default_frequency_hours: 12,
        }
    }
}

/// Root policy document.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Policy {
    pub relevance: RelevancePolicy,
    pub currency: CurrencyPolicy,
    #[serde(default = "default_retailers")]
    pub retailers: Vec<RetailerPolicy>,
    pub blend: BlendPolicy,
    pub aggregate: AggregatePolicy,
    pub cache: CachePolicy,
    pub scheduler: SchedulerPolicy,
}

impl Policy {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing policy toml")
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading policy from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load via `$DEALSCOUT_POLICY_PATH`, then `config/policy.toml`, then
    /// compiled-in defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_POLICY_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            anyhow::bail!("{ENV_POLICY_PATH} points to non-existent path");
        }
        let default = PathBuf::from(DEFAULT_POLICY_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        Ok(Self::with_default_retailers())
    }

    /// Defaults including the retailer table (serde's `Default` derive leaves
    /// `retailers` empty; this is the constructor everything else should use).
    pub fn with_default_retailers() -> Self {
        Self {
            retailers: default_retailers(),
            ..Self::default()
        }
    }

    pub fn clamp_frequency(&self, hours: u32) -> u32 {
        hours.clamp(
            self.scheduler.min_frequency_hours,
            self.scheduler.max_frequency_hours,
        )
    }

    /// Case-insensitive substring lookup in the retailer table.
    pub fn retailer_for(&self, source: &str) -> Option<&RetailerPolicy> {
        let s = source.to_lowercase();
        self.retailers.iter().find(|r| s.contains(&r.key))
    }

    /// Whether a region hint points at the home market. No hint means yes:
    /// the blended default is the regional experience.
    pub fn is_home_region(&self, region_hint: Option<&str>) -> bool {
        match region_hint.map(str::trim).filter(|r| !r.is_empty()) {
            None => true,
            Some(r) => {
                let r = r.to_lowercase();
                self.blend.home_regions.iter().any(|h| r == *h)
            }
        }
    }

    /// Whether a source name lands in any local bucket (primary or secondary).
    pub fn is_regional_source(&self, source: &str) -> bool {
        let s = source.to_lowercase();
        s.contains(&self.blend.primary_local)
            || self.blend.secondary_local.iter().any(|k| s.contains(k))
    }
}
