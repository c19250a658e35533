//! Template authoring and lifecycle endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::collaborators::ClinicalRule;
use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::template::{
    CreateTemplateRequest, Section, Template, TemplateFilter, TemplateListResponse,
    UpdateFieldRequest, UpdateTemplateRequest,
};
use crate::validation::ValidationReport;

use super::Actor;

/// POST /api/v1/templates - Create a new template (version 1 draft)
#[tracing::instrument(
    name = "http.create_template",
    skip(state, request, actor),
    fields(name = %request.name, actor = %actor.as_str())
)]
pub async fn create_template(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<Template>)> {
    let created = state.manager.create_template(request, actor.as_str()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/templates - List latest versions
#[tracing::instrument(name = "http.list_templates", skip(state))]
pub async fn list_templates(
    State(state): State<AppState>,
    Query(filter): Query<TemplateFilter>,
) -> Result<Json<TemplateListResponse>> {
    Ok(Json(state.manager.list_templates(&filter).await?))
}

/// GET /api/v1/templates/{id} - Latest version of a template
#[tracing::instrument(name = "http.get_template", skip(state))]
pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Template>> {
    Ok(Json(state.manager.get_template(id).await?))
}

/// PUT /api/v1/templates/{id} - Update; forks a new draft when the latest is published
#[tracing::instrument(name = "http.update_template", skip(state, request, actor))]
pub async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(request): Json<UpdateTemplateRequest>,
) -> Result<Json<Template>> {
    Ok(Json(
        state
            .manager
            .update_template(id, request, actor.as_str())
            .await?,
    ))
}

/// POST /api/v1/templates/{id}/sections - Append a section
#[tracing::instrument(name = "http.add_section", skip(state, section, actor))]
pub async fn add_section(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(section): Json<Section>,
) -> Result<(StatusCode, Json<Template>)> {
    let updated = state.manager.add_section(id, section, actor.as_str()).await?;
    Ok((StatusCode::CREATED, Json(updated)))
}

/// PUT /api/v1/templates/{id}/sections/{section_id}/fields/{field_id}
#[tracing::instrument(name = "http.update_field", skip(state, request, actor))]
pub async fn update_field(
    State(state): State<AppState>,
    Path((id, section_id, field_id)): Path<(Uuid, Uuid, Uuid)>,
    actor: Actor,
    Json(request): Json<UpdateFieldRequest>,
) -> Result<Json<Template>> {
    Ok(Json(
        state
            .manager
            .update_field(id, section_id, field_id, request, actor.as_str())
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct AssociateRulesRequest {
    pub rule_ids: Vec<u64>,
}

/// PUT /api/v1/templates/{id}/rules - Replace the associated decision-support rules
#[tracing::instrument(name = "http.associate_rules", skip(state, request, actor))]
pub async fn associate_rules(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(request): Json<AssociateRulesRequest>,
) -> Result<Json<Template>> {
    Ok(Json(
        state
            .manager
            .associate_rules(id, request.rule_ids, actor.as_str())
            .await?,
    ))
}

/// GET /api/v1/templates/{id}/rules
#[tracing::instrument(name = "http.associated_rules", skip(state))]
pub async fn associated_rules(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ClinicalRule>>> {
    Ok(Json(state.manager.associated_rules(id).await?))
}

/// GET /api/v1/templates/{id}/versions
#[tracing::instrument(name = "http.list_versions", skip(state))]
pub async fn list_versions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Template>>> {
    Ok(Json(state.manager.list_versions(id).await?))
}

/// GET /api/v1/templates/{id}/versions/{version}
#[tracing::instrument(name = "http.get_version", skip(state))]
pub async fn get_version(
    State(state): State<AppState>,
    Path((id, version)): Path<(Uuid, u32)>,
) -> Result<Json<Template>> {
    Ok(Json(state.manager.get_version(id, version).await?))
}

/// GET /api/v1/templates/{id}/validate - Validation report for the latest version
#[tracing::instrument(name = "http.validate_template", skip(state))]
pub async fn validate_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ValidationReport>> {
    Ok(Json(state.manager.validate_template(id).await?))
}

/// POST /api/v1/templates/{id}/publish
#[tracing::instrument(name = "http.publish_template", skip(state, actor))]
pub async fn publish_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<Template>> {
    Ok(Json(
        state.manager.publish_template(id, actor.as_str()).await?,
    ))
}

/// POST /api/v1/templates/{id}/deactivate
#[tracing::instrument(name = "http.deactivate_template", skip(state, actor))]
pub async fn deactivate_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<Template>> {
    Ok(Json(
        state.manager.deactivate_template(id, actor.as_str()).await?,
    ))
}

/// GET /api/v1/templates/{id}/export
#[tracing::instrument(name = "http.export_template", skip(state))]
pub async fn export_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>> {
    Ok(Json(state.manager.export_template(id).await?))
}

/// POST /api/v1/templates/import - Import an export as a new lineage
#[tracing::instrument(name = "http.import_template", skip(state, exported, actor))]
pub async fn import_template(
    State(state): State<AppState>,
    actor: Actor,
    Json(exported): Json<Value>,
) -> Result<(StatusCode, Json<Template>)> {
    if !exported.is_object() {
        return Err(AppError::BadRequest(
            "Import payload must be an exported template object".to_string(),
        ));
    }

    let imported = state
        .manager
        .import_template(exported, actor.as_str())
        .await?;
    Ok((StatusCode::CREATED, Json(imported)))
}

#[derive(Debug, Deserialize)]
pub struct EncounterQuery {
    pub specialty: String,
}

/// GET /api/v1/encounters/{encounter_id}/templates?specialty=...
#[tracing::instrument(name = "http.templates_for_encounter", skip(state))]
pub async fn templates_for_encounter(
    State(state): State<AppState>,
    Path(encounter_id): Path<String>,
    Query(query): Query<EncounterQuery>,
) -> Result<Json<Vec<Template>>> {
    Ok(Json(
        state
            .manager
            .templates_for_encounter(&encounter_id, &query.specialty)
            .await?,
    ))
}
