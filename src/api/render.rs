//! Document rendering endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::Result;
use crate::render::RenderedDocument;
use crate::server::AppState;
use crate::template::RenderContext;

use super::Actor;

/// POST /api/v1/templates/{id}/render - Render the latest published version
#[tracing::instrument(name = "http.render_template", skip(state, context, actor))]
pub async fn render_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(context): Json<RenderContext>,
) -> Result<Json<RenderedDocument>> {
    Ok(Json(
        state
            .manager
            .render_template(id, &context, actor.as_str())
            .await?,
    ))
}

/// POST /api/v1/templates/{id}/preview - Render the latest version with sample data
#[tracing::instrument(name = "http.render_preview", skip(state, context, actor))]
pub async fn render_preview(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(context): Json<RenderContext>,
) -> Result<Json<RenderedDocument>> {
    Ok(Json(
        state
            .manager
            .render_preview(id, &context, actor.as_str())
            .await?,
    ))
}
