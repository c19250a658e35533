//! Variable resolution and validation endpoints.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::server::AppState;
use crate::template::{RenderContext, Template, UpdateVariableRequest};

use super::Actor;

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub names: Vec<String>,
    #[serde(default)]
    pub context: RenderContext,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateValueRequest {
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateValueResponse {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// POST /api/v1/templates/{id}/variables/resolve
#[tracing::instrument(name = "http.resolve_variables", skip(state, request))]
pub async fn resolve_variables(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>> {
    let values = state
        .manager
        .resolve_all_variables(id, &request.names, &request.context)
        .await?;
    Ok(Json(ResolveResponse { values }))
}

/// PUT /api/v1/templates/{id}/variables/{name}
#[tracing::instrument(name = "http.update_variable", skip(state, request, actor))]
pub async fn update_variable(
    State(state): State<AppState>,
    Path((id, name)): Path<(Uuid, String)>,
    actor: Actor,
    Json(request): Json<UpdateVariableRequest>,
) -> Result<Json<Template>> {
    Ok(Json(
        state
            .manager
            .update_variable(id, &name, request, actor.as_str())
            .await?,
    ))
}

/// POST /api/v1/templates/{id}/variables/{name}/validate
#[tracing::instrument(name = "http.validate_variable", skip(state, request))]
pub async fn validate_variable(
    State(state): State<AppState>,
    Path((id, name)): Path<(Uuid, String)>,
    Json(request): Json<ValidateValueRequest>,
) -> Result<Json<ValidateValueResponse>> {
    let errors = state
        .manager
        .validate_variable(id, &name, &request.value)
        .await?;
    Ok(Json(ValidateValueResponse {
        valid: errors.is_empty(),
        errors,
    }))
}
