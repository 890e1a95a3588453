// src/api.rs
//! Thin operational HTTP surface: health, search, metrics. The product API
//! (accounts, auth, the conversational layer) lives elsewhere; this router
//! exists for operators and smoke tests.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::engine::DealEngine;
use crate::types::SearchOutcome;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DealEngine>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
    #[serde(default)]
    region: Option<String>,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<SearchOutcome> {
    let outcome = state
        .engine
        .search(&params.q, params.region.as_deref())
        .await;
    Json(outcome)
}
