//! Template usage endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::collaborators::UsageStatistics;
use crate::error::Result;
use crate::server::AppState;

use super::Actor;

#[derive(Debug, Deserialize)]
pub struct LogUsageRequest {
    pub action: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UsageWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// POST /api/v1/templates/{id}/usage - Record a use such as "print" or "sign"
#[tracing::instrument(
    name = "http.log_usage",
    skip(state, request, actor),
    fields(action = %request.action)
)]
pub async fn log_usage(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(request): Json<LogUsageRequest>,
) -> Result<StatusCode> {
    state
        .manager
        .log_usage(id, actor.as_str(), &request.action)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/templates/{id}/usage?start=...&end=...
#[tracing::instrument(name = "http.usage_statistics", skip(state))]
pub async fn usage_statistics(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(window): Query<UsageWindow>,
) -> Result<Json<UsageStatistics>> {
    Ok(Json(
        state
            .manager
            .usage_statistics(id, window.start, window.end)
            .await?,
    ))
}
