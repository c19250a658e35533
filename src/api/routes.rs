use axum::{
    routing::{get, post, put},
    Router,
};

use crate::server::AppState;

use super::health::health;
use super::metrics::prometheus_metrics;
use super::render::{render_preview, render_template};
use super::template::{
    add_section, associate_rules, associated_rules, create_template, deactivate_template,
    export_template, get_template, get_version, import_template, list_templates, list_versions,
    publish_template, templates_for_encounter, update_field, update_template, validate_template,
};
use super::usage::{log_usage, usage_statistics};
use super::variables::{resolve_variables, update_variable, validate_variable};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Metrics
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                // Authoring
                .route("/templates", post(create_template).get(list_templates))
                .route("/templates/import", post(import_template))
                .route("/templates/{id}", get(get_template).put(update_template))
                .route("/templates/{id}/sections", post(add_section))
                .route(
                    "/templates/{id}/sections/{section_id}/fields/{field_id}",
                    put(update_field),
                )
                .route(
                    "/templates/{id}/rules",
                    get(associated_rules).put(associate_rules),
                )
                // Versions & lifecycle
                .route("/templates/{id}/versions", get(list_versions))
                .route("/templates/{id}/versions/{version}", get(get_version))
                .route("/templates/{id}/validate", get(validate_template))
                .route("/templates/{id}/publish", post(publish_template))
                .route("/templates/{id}/deactivate", post(deactivate_template))
                .route("/templates/{id}/export", get(export_template))
                // Rendering
                .route("/templates/{id}/render", post(render_template))
                .route("/templates/{id}/preview", post(render_preview))
                // Variables
                .route("/templates/{id}/variables/resolve", post(resolve_variables))
                .route("/templates/{id}/variables/{name}", put(update_variable))
                .route(
                    "/templates/{id}/variables/{name}/validate",
                    post(validate_variable),
                )
                // Usage
                .route(
                    "/templates/{id}/usage",
                    get(usage_statistics).post(log_usage),
                )
                // Encounter selection
                .route(
                    "/encounters/{encounter_id}/templates",
                    get(templates_for_encounter),
                ),
        )
}
