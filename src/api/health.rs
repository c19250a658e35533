//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::resolver::CacheStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub cache: CacheStats,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let cache = state.manager.resolver().cache_stats().await;

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        cache,
    })
}
