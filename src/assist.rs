// src/assist.rs
//! AI relevance assist: optional, best-effort reranking of a candidate batch.
//!
//! The assist is an opaque boundary call. It returns the indices of listings
//! worth keeping, best first; anything else (transport failure, malformed
//! reply, out-of-range indices) makes the aggregator fall back to the
//! deterministic order unchanged. The assist can never block the pipeline.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::NormalizedDeal;

pub const DEFAULT_ASSIST_CONFIG_PATH: &str = "config/assist.json";
pub const ENV_ASSIST_TEST_MODE: &str = "ASSIST_TEST_MODE";

/// Build-time assist config. Reading/parsing failure yields the disabled
/// default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistConfig {
    pub enabled: bool,
    /// "openai" is the only real provider for now.
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: None,
            model: None,
        }
    }
}

pub fn load_assist_config() -> AssistConfig {
    let path = Path::new(DEFAULT_ASSIST_CONFIG_PATH);
    match fs::read_to_string(path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
        Err(_) => AssistConfig::default(),
    }
}

#[async_trait]
pub trait RerankAssist: Send + Sync {
    /// Return kept indices into `deals`, best first. `Err` and nonsense
    /// replies are both treated as "no opinion" by the caller.
    async fn rerank(&self, query: &str, deals: &[NormalizedDeal]) -> Result<Vec<usize>>;
    fn provider_name(&self) -> &'static str;
}

pub type DynRerankAssist = Arc<dyn RerankAssist>;

/// Factory honoring `ASSIST_TEST_MODE=mock` and the config file, mirroring
/// how the rest of the engine builds boundary clients.
pub fn build_assist_from_config(config: &AssistConfig) -> DynRerankAssist {
    if std::env::var(ENV_ASSIST_TEST_MODE)
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockAssist::keep_all());
    }
    if !config.enabled {
        return Arc::new(DisabledAssist);
    }
    match config.provider.as_deref() {
        Some("openai") => Arc::new(OpenAiAssist::new(config.model.as_deref())),
        _ => Arc::new(DisabledAssist),
    }
}

pub fn build_assist() -> DynRerankAssist {
    build_assist_from_config(&load_assist_config())
}

/// No-op assist; the deterministic order stands.
pub struct DisabledAssist;

#[async_trait]
impl RerankAssist for DisabledAssist {
    async fn rerank(&self, _query: &str, _deals: &[NormalizedDeal]) -> Result<Vec<usize>> {
        anyhow::bail!("assist disabled")
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic assist for tests: returns a fixed index order, or every
/// index in original order when constructed with `keep_all`.
pub struct MockAssist {
    indices: Option<Vec<usize>>,
}

impl MockAssist {
    pub fn keep_all() -> Self {
        Self { indices: None }
    }

    pub fn with_indices(indices: Vec<usize>) -> Self {
        Self {
            indices: Some(indices),
        }
    }
}

#[async_trait]
impl RerankAssist for MockAssist {
    async fn rerank(&self, _query: &str, deals: &[NormalizedDeal]) -> Result<Vec<usize>> {
        Ok(match &self.indices {
            Some(ix) => ix.clone(),
            None => (0..deals.len()).collect(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// OpenAI-backed assist (Chat Completions). Requires `OPENAI_API_KEY`.
pub struct OpenAiAssist {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiAssist {
    pub fn new(model_override: Option<&str>) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent("dealscout/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key,
            model: model_override.unwrap_or("gpt-4o-mini").to_string(),
        }
    }

    fn prompt(query: &str, deals: &[NormalizedDeal]) -> String {
        let mut lines = String::new();
        for (i, d) in deals.iter().enumerate() {
            lines.push_str(&format!("{i}: {} — {} {}\n", d.title, d.price, d.source));
        }
        format!(
            "A shopper searched for \"{query}\". Below is a numbered list of product \
             listings. Reply with ONLY a JSON array of the indices of listings that \
             genuinely match the search, ordered best match first.\n\n{lines}"
        )
    }
}

/// Pull the first JSON array out of a free-text model reply.
fn parse_indices_reply(reply: &str) -> Option<Vec<usize>> {
    let start = reply.find('[')?;
    let end = reply[start..].find(']')? + start;
    serde_json::from_str::<Vec<usize>>(&reply[start..=end]).ok()
}

#[async_trait]
impl RerankAssist for OpenAiAssist {
    async fn rerank(&self, query: &str, deals: &[NormalizedDeal]) -> Result<Vec<usize>> {
        if self.api_key.is_empty() {
            anyhow::bail!("OPENAI_API_KEY missing");
        }
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "user", "content": Self::prompt(query, deals) }
            ]
        });
        let resp: serde_json::Value = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("assist request")?
            .error_for_status()
            .context("assist non-2xx")?
            .json()
            .await
            .context("assist body")?;
        let content = resp["choices"][0]["message"]["content"]
            .as_str()
            .context("assist reply missing content")?;
        debug!(target: "assist", reply = content, "assist raw reply");
        parse_indices_reply(content).context("assist reply not an index array")
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Validate an assist reply against the batch: indices must be in range and
/// unique. Returns `None` when the reply is unusable.
pub fn sanitize_indices(indices: Vec<usize>, len: usize) -> Option<Vec<usize>> {
    let mut seen = vec![false; len];
    let mut out = Vec::with_capacity(indices.len());
    for i in indices {
        if i >= len || seen[i] {
            return None;
        }
        seen[i] = true;
        out.push(i);
    }
    if out.is_empty() {
        return None;
    }
    Some(out)
}
