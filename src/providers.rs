// src/providers.rs
//! Source provider boundary + adapters.
//!
//! Every upstream search source returns differently-shaped raw objects. The
//! adapter layer maps each source's field names into [`RawListing`] right at
//! the boundary, so the core pipeline never branches on source-specific
//! shapes. Providers must return an empty list for "no results"; transport
//! failures may error and the aggregator treats them as zero listings.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::types::{RawListing, RawPrice};

pub const DEFAULT_SOURCES_PATH: &str = "config/sources.toml";
pub const ENV_SOURCES_PATH: &str = "DEALSCOUT_SOURCES_PATH";

#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Search the source. Empty result is not an error.
    async fn search(&self, query: &str, region_hint: Option<&str>) -> Result<Vec<RawListing>>;
    fn name(&self) -> &str;
}

/// Field-name mapping from one source's JSON into RawListing.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceFieldMap {
    /// Key of the array holding listings; empty/absent means the body itself
    /// is the array.
    #[serde(default)]
    pub results: Option<String>,
    pub title: String,
    pub price: String,
    pub link: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub reviews: Option<String>,
}

/// One configured upstream source.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Endpoint template; `{query}` is replaced with the urlencoded query.
    pub endpoint: String,
    /// Optional query parameter carrying the region hint.
    #[serde(default)]
    pub region_param: Option<String>,
    pub fields: SourceFieldMap,
}

#[derive(Debug, Clone, Deserialize)]
struct SourcesRoot {
    #[serde(default)]
    sources: Vec<SourceConfig>,
}

pub fn load_sources_from(path: &Path) -> Result<Vec<SourceConfig>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let root: SourcesRoot = toml::from_str(&content).context("parsing sources toml")?;
    Ok(root.sources)
}

/// Load via `$DEALSCOUT_SOURCES_PATH`, then `config/sources.toml`, then none.
pub fn load_sources_default() -> Result<Vec<SourceConfig>> {
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        }
        anyhow::bail!("{ENV_SOURCES_PATH} points to non-existent path");
    }
    let default = PathBuf::from(DEFAULT_SOURCES_PATH);
    if default.exists() {
        return load_sources_from(&default);
    }
    Ok(Vec::new())
}

fn value_as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_price(v: &Value) -> Option<RawPrice> {
    match v {
        Value::Number(n) => n.as_f64().map(RawPrice::Number),
        Value::String(s) => Some(RawPrice::Text(s.clone())),
        _ => None,
    }
}

/// Map one duck-typed JSON object into a RawListing. Missing fields become
/// `None`/empty; the pipeline decides what to drop.
pub fn map_listing(obj: &Value, fields: &SourceFieldMap, source: &str) -> RawListing {
    let get = |key: &str| obj.get(key);
    RawListing {
        title: get(&fields.title).and_then(value_as_string).unwrap_or_default(),
        price: get(&fields.price).and_then(value_as_price),
        source: source.to_string(),
        link: get(&fields.link).and_then(value_as_string),
        image: fields
            .image
            .as_deref()
            .and_then(get)
            .and_then(value_as_string),
        rating: fields
            .rating
            .as_deref()
            .and_then(get)
            .and_then(value_as_string),
        reviews: fields
            .reviews
            .as_deref()
            .and_then(get)
            .and_then(value_as_string),
    }
}

fn extract_array<'a>(body: &'a Value, fields: &SourceFieldMap) -> Option<&'a Vec<Value>> {
    match fields.results.as_deref() {
        Some(key) if !key.is_empty() => body.get(key)?.as_array(),
        _ => body.as_array(),
    }
}

/// HTTP provider for JSON search APIs, driven entirely by [`SourceConfig`].
pub struct JsonApiProvider {
    cfg: SourceConfig,
    http: reqwest::Client,
}

impl JsonApiProvider {
    pub fn from_config(cfg: SourceConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("dealscout/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { cfg, http }
    }

    fn request_url(&self, query: &str, region_hint: Option<&str>) -> String {
        let mut url = self
            .cfg
            .endpoint
            .replace("{query}", &urlencoding::encode(query));
        if let (Some(param), Some(region)) = (self.cfg.region_param.as_deref(), region_hint) {
            let sep = if url.contains('?') { '&' } else { '?' };
            url.push(sep);
            url.push_str(param);
            url.push('=');
            url.push_str(&urlencoding::encode(region));
        }
        url
    }

    fn parse_body(&self, body: &Value) -> Vec<RawListing> {
        let Some(items) = extract_array(body, &self.cfg.fields) else {
            return Vec::new();
        };
        items
            .iter()
            .map(|obj| map_listing(obj, &self.cfg.fields, &self.cfg.name))
            .collect()
    }
}

#[async_trait]
impl SourceProvider for JsonApiProvider {
    async fn search(&self, query: &str, region_hint: Option<&str>) -> Result<Vec<RawListing>> {
        let url = self.request_url(query, region_hint);
        let body: Value = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("{}: request", self.cfg.name))?
            .error_for_status()
            .with_context(|| format!("{}: non-2xx", self.cfg.name))?
            .json()
            .await
            .with_context(|| format!("{}: body", self.cfg.name))?;
        Ok(self.parse_body(&body))
    }

    fn name(&self) -> &str {
        &self.cfg.name
    }
}

/// In-memory provider for tests and offline runs.
pub struct FixtureProvider {
    name: String,
    listings: Vec<RawListing>,
}

impl FixtureProvider {
    pub fn new(name: impl Into<String>, listings: Vec<RawListing>) -> Self {
        Self {
            name: name.into(),
            listings,
        }
    }
}

#[async_trait]
impl SourceProvider for FixtureProvider {
    async fn search(&self, _query: &str, _region_hint: Option<&str>) -> Result<Vec<RawListing>> {
        Ok(self.listings.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
