//! Template lifecycle: create, edit, version, publish, render.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::collaborators::{
    AccessPolicy, AuditEvent, AuditSink, ClinicalRule, Collaborators, RuleEngine, TemplateAction,
    UsageEntry, UsageLog, UsageStatistics,
};
use crate::metrics::{LifecycleMetrics, RenderMetrics};
use crate::render::{RenderedDocument, RendererConfig, TemplateRenderer};
use crate::resolver::{
    Resolution, ResolverConfig, VariableCache, VariableResolver, VariableScope,
};
use crate::template::{
    CreateTemplateRequest, Field, RenderContext, Section, Template, TemplateError, TemplateFilter,
    TemplateListResponse, TemplateRepository, TemplateResult, UpdateFieldRequest,
    UpdateSectionRequest, UpdateTemplateRequest, UpdateVariableRequest, Variable,
};
use crate::validation::{TemplateValidator, ValidationConfig, ValidationReport};

/// Engine tuning, grouped by component
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub resolver: ResolverConfig,
    pub renderer: RendererConfig,
    pub validation: ValidationConfig,
}

/// Owns the template lifecycle.
///
/// Published rows are immutable: every edit of a published template is
/// applied to a fresh draft at `version + 1`. Drafts are edited in place.
/// Every write is conditional on the row the operation read, so an edit
/// racing a publish, a deactivate or another edit fails with
/// [`TemplateError::Conflict`] instead of overwriting it.
pub struct TemplateManager {
    repository: Arc<dyn TemplateRepository>,
    renderer: TemplateRenderer,
    validator: TemplateValidator,
    rules: Arc<dyn RuleEngine>,
    audit: Arc<dyn AuditSink>,
    access: Arc<dyn AccessPolicy>,
    usage: Arc<dyn UsageLog>,
}

impl TemplateManager {
    pub fn new(
        repository: Arc<dyn TemplateRepository>,
        cache: Arc<dyn VariableCache>,
        collaborators: Collaborators,
        config: EngineConfig,
    ) -> Self {
        let resolver = VariableResolver::new(
            cache,
            collaborators.accessors,
            collaborators.clinical,
            config.resolver,
        );
        let renderer = TemplateRenderer::new(
            resolver,
            collaborators.formulas.clone(),
            collaborators.alerts,
            config.renderer,
        );
        let validator = TemplateValidator::new(
            collaborators.rules.clone(),
            collaborators.terminology,
            collaborators.formulas,
            config.validation,
        );

        Self {
            repository,
            renderer,
            validator,
            rules: collaborators.rules,
            audit: collaborators.audit,
            access: collaborators.access,
            usage: collaborators.usage,
        }
    }

    pub fn resolver(&self) -> &VariableResolver {
        self.renderer.resolver()
    }

    pub fn validator(&self) -> &TemplateValidator {
        &self.validator
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Latest version of a template
    pub async fn get_template(&self, id: Uuid) -> TemplateResult<Template> {
        self.repository
            .latest(id)
            .await?
            .ok_or_else(|| TemplateError::template_not_found(id))
    }

    pub async fn get_version(&self, id: Uuid, version: u32) -> TemplateResult<Template> {
        self.repository
            .get(id, version)
            .await?
            .ok_or_else(|| TemplateError::NotFound {
                kind: "Template version",
                id: format!("{}@{}", id, version),
            })
    }

    /// Every version of a template, oldest first
    pub async fn list_versions(&self, id: Uuid) -> TemplateResult<Vec<Template>> {
        let versions = self.repository.versions(id).await?;
        if versions.is_empty() {
            return Err(TemplateError::template_not_found(id));
        }
        Ok(versions)
    }

    pub async fn list_templates(&self, filter: &TemplateFilter) -> TemplateResult<TemplateListResponse> {
        let templates = self.repository.list(filter).await?;
        let total = templates.len();
        Ok(TemplateListResponse { templates, total })
    }

    /// Published, active templates of a specialty whose decision-support
    /// rules all hold for the encounter
    pub async fn templates_for_encounter(
        &self,
        encounter_id: &str,
        specialty: &str,
    ) -> TemplateResult<Vec<Template>> {
        let filter = TemplateFilter {
            specialty: Some(specialty.to_string()),
            active_only: true,
            published_only: true,
            ..TemplateFilter::default()
        };

        let mut applicable = Vec::new();
        for template in self.repository.list(&filter).await? {
            if self.rules_hold(&template, encounter_id).await {
                applicable.push(template);
            }
        }
        Ok(applicable)
    }

    async fn rules_hold(&self, template: &Template, encounter_id: &str) -> bool {
        if !template.enable_decision_support {
            return true;
        }

        for rule_id in &template.associated_rule_ids {
            match self.rules.evaluate_rule(*rule_id, encounter_id).await {
                Ok(evaluation) if evaluation.is_valid => {}
                Ok(_) => return false,
                Err(e) => {
                    tracing::warn!(
                        template_id = %template.id,
                        rule_id = rule_id,
                        encounter_id = %encounter_id,
                        error = %e,
                        "Rule evaluation failed, excluding template"
                    );
                    return false;
                }
            }
        }
        true
    }

    // ========================================================================
    // Authoring
    // ========================================================================

    /// Create a new template lineage as a version 1 draft
    pub async fn create_template(
        &self,
        request: CreateTemplateRequest,
        actor: &str,
    ) -> TemplateResult<Template> {
        self.authorize(actor, TemplateAction::Create, None)?;

        let template = request.into_template(actor);
        ensure_invariants(&template)?;
        self.repository.insert(template.clone()).await?;

        self.record(&template, TemplateAction::Create, actor);
        tracing::info!(
            template_id = %template.id,
            name = %template.name,
            actor = %actor,
            "Template created"
        );
        Ok(template)
    }

    /// Update template attributes; forks a new draft if the latest version is published
    pub async fn update_template(
        &self,
        id: Uuid,
        request: UpdateTemplateRequest,
        actor: &str,
    ) -> TemplateResult<Template> {
        self.edit(id, actor, |template| {
            request.apply_to(template);
            Ok(())
        })
        .await
    }

    pub async fn add_section(&self, id: Uuid, section: Section, actor: &str) -> TemplateResult<Template> {
        self.edit(id, actor, |template| {
            if template.section(section.id).is_some() {
                return Err(TemplateError::InvalidTemplate(format!(
                    "Section id already exists: {}",
                    section.id
                )));
            }
            template.sections.push(section);
            Ok(())
        })
        .await
    }

    pub async fn update_section(
        &self,
        id: Uuid,
        section_id: Uuid,
        request: UpdateSectionRequest,
        actor: &str,
    ) -> TemplateResult<Template> {
        self.edit(id, actor, |template| {
            request.apply_to(template.section_mut(section_id)?);
            Ok(())
        })
        .await
    }

    pub async fn remove_section(&self, id: Uuid, section_id: Uuid, actor: &str) -> TemplateResult<Template> {
        self.edit(id, actor, |template| {
            let before = template.sections.len();
            template.sections.retain(|s| s.id != section_id);
            if template.sections.len() == before {
                return Err(TemplateError::section_not_found(section_id));
            }
            Ok(())
        })
        .await
    }

    /// Reassign section order to match `ordered_ids`, which must list every section once
    pub async fn reorder_sections(
        &self,
        id: Uuid,
        ordered_ids: Vec<Uuid>,
        actor: &str,
    ) -> TemplateResult<Template> {
        self.edit(id, actor, |template| {
            let existing: Vec<Uuid> = template.sections.iter().map(|s| s.id).collect();
            check_permutation("section", &existing, &ordered_ids)?;
            for (position, section_id) in ordered_ids.iter().enumerate() {
                template.section_mut(*section_id)?.order_index = position as i32;
            }
            Ok(())
        })
        .await
    }

    pub async fn add_field(
        &self,
        id: Uuid,
        section_id: Uuid,
        field: Field,
        actor: &str,
    ) -> TemplateResult<Template> {
        self.edit(id, actor, |template| {
            let section = template.section_mut(section_id)?;
            if section.fields.iter().any(|f| f.id == field.id) {
                return Err(TemplateError::InvalidTemplate(format!(
                    "Field id already exists: {}",
                    field.id
                )));
            }
            section.fields.push(field);
            Ok(())
        })
        .await
    }

    pub async fn remove_field(
        &self,
        id: Uuid,
        section_id: Uuid,
        field_id: Uuid,
        actor: &str,
    ) -> TemplateResult<Template> {
        self.edit(id, actor, |template| {
            let section = template.section_mut(section_id)?;
            let before = section.fields.len();
            section.fields.retain(|f| f.id != field_id);
            if section.fields.len() == before {
                return Err(TemplateError::field_not_found(field_id));
            }
            Ok(())
        })
        .await
    }

    pub async fn reorder_fields(
        &self,
        id: Uuid,
        section_id: Uuid,
        ordered_ids: Vec<Uuid>,
        actor: &str,
    ) -> TemplateResult<Template> {
        self.edit(id, actor, |template| {
            let section = template.section_mut(section_id)?;
            let existing: Vec<Uuid> = section.fields.iter().map(|f| f.id).collect();
            check_permutation("field", &existing, &ordered_ids)?;
            for field in &mut section.fields {
                if let Some(position) = ordered_ids.iter().position(|id| *id == field.id) {
                    field.order_index = position as i32;
                }
            }
            Ok(())
        })
        .await
    }

    pub async fn update_field(
        &self,
        id: Uuid,
        section_id: Uuid,
        field_id: Uuid,
        request: UpdateFieldRequest,
        actor: &str,
    ) -> TemplateResult<Template> {
        self.edit(id, actor, |template| {
            request.apply_to(template.field_mut(section_id, field_id)?);
            Ok(())
        })
        .await
    }

    pub async fn add_variable(&self, id: Uuid, variable: Variable, actor: &str) -> TemplateResult<Template> {
        self.edit(id, actor, |template| {
            template.variables.push(variable);
            Ok(())
        })
        .await
    }

    pub async fn remove_variable(&self, id: Uuid, name: &str, actor: &str) -> TemplateResult<Template> {
        self.edit(id, actor, |template| {
            let before = template.variables.len();
            template.variables.retain(|v| v.name != name);
            if template.variables.len() == before {
                return Err(TemplateError::variable_not_found(name));
            }
            Ok(())
        })
        .await
    }

    pub async fn update_variable(
        &self,
        id: Uuid,
        name: &str,
        request: UpdateVariableRequest,
        actor: &str,
    ) -> TemplateResult<Template> {
        self.edit(id, actor, |template| {
            request.apply_to(template.variable_mut(name)?);
            Ok(())
        })
        .await
    }

    /// Replace the decision-support rules of a template.
    ///
    /// Rule existence is checked by validation at publish time.
    pub async fn associate_rules(
        &self,
        id: Uuid,
        rule_ids: Vec<u64>,
        actor: &str,
    ) -> TemplateResult<Template> {
        self.edit(id, actor, |template| {
            let mut unique = Vec::with_capacity(rule_ids.len());
            for rule_id in rule_ids {
                if !unique.contains(&rule_id) {
                    unique.push(rule_id);
                }
            }
            template.associated_rule_ids = unique;
            Ok(())
        })
        .await
    }

    /// Rules associated with the latest version that the rule engine knows about
    pub async fn associated_rules(&self, id: Uuid) -> TemplateResult<Vec<ClinicalRule>> {
        let template = self.get_template(id).await?;
        let mut rules = Vec::with_capacity(template.associated_rule_ids.len());
        for rule_id in &template.associated_rule_ids {
            match self.rules.get_rule(*rule_id).await {
                Ok(Some(rule)) => rules.push(rule),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        template_id = %id,
                        rule_id = rule_id,
                        error = %e,
                        "Rule lookup failed"
                    );
                }
            }
        }
        Ok(rules)
    }

    /// Copy-on-write edit of the latest version.
    ///
    /// A published latest version is never modified: the change lands on a
    /// new draft at `version + 1`. Invariants are checked before saving, and
    /// the write fails with `Conflict` if another writer got there first.
    async fn edit<F>(&self, id: Uuid, actor: &str, mutate: F) -> TemplateResult<Template>
    where
        F: FnOnce(&mut Template) -> TemplateResult<()>,
    {
        let current = self.get_template(id).await?;
        if !current.is_active {
            return Err(TemplateError::Inactive(id));
        }
        self.authorize(actor, TemplateAction::Update, Some(&current))?;

        let forked = current.is_published;
        let mut next = if forked {
            current.fork_draft(actor)
        } else {
            let mut draft = current.clone();
            draft.modified_by = Some(actor.to_string());
            draft.modified_at = Some(Utc::now());
            draft
        };

        mutate(&mut next)?;
        next.attach_children();
        ensure_invariants(&next)?;

        if forked {
            self.repository.insert(next.clone()).await?;
        } else {
            self.repository.replace(&current, next.clone()).await?;
            // Same (id, version) key: values cached for the old draft are stale
            self.resolver()
                .invalidate_scope(VariableScope::of(&current))
                .await;
        }

        if forked {
            LifecycleMetrics::record_fork();
            self.record(&next, TemplateAction::Fork, actor);
            tracing::info!(
                template_id = %id,
                from_version = current.version,
                version = next.version,
                actor = %actor,
                "Published template edited, forked new draft version"
            );
        }
        self.record(&next, TemplateAction::Update, actor);
        tracing::info!(
            template_id = %id,
            version = next.version,
            actor = %actor,
            "Template updated"
        );
        Ok(next)
    }

    // ========================================================================
    // Validation & publishing
    // ========================================================================

    /// Validate the latest version without changing it
    pub async fn validate_template(&self, id: Uuid) -> TemplateResult<ValidationReport> {
        let template = self.get_template(id).await?;
        let report = self.validator.validate(&template).await;
        LifecycleMetrics::record_validation(report.is_valid());
        Ok(report)
    }

    /// Publish the latest version.
    ///
    /// Validation runs first; on any error nothing is written and the full
    /// report is returned in `TemplateError::ValidationFailed`.
    pub async fn publish_template(&self, id: Uuid, actor: &str) -> TemplateResult<Template> {
        let current = self.get_template(id).await?;
        if !current.is_active {
            return Err(TemplateError::Inactive(id));
        }
        if current.is_published {
            return Ok(current);
        }
        self.authorize(actor, TemplateAction::Publish, Some(&current))?;

        let report = self.validator.validate(&current).await;
        LifecycleMetrics::record_validation(report.is_valid());
        if !report.is_valid() {
            LifecycleMetrics::record_publish(false);
            tracing::warn!(
                template_id = %id,
                version = current.version,
                errors = report.error_count(),
                categories = ?report.failing_categories(),
                "Publish refused, template failed validation"
            );
            return Err(TemplateError::ValidationFailed(report));
        }

        let mut published = current.clone();
        let now = Utc::now();
        published.is_published = true;
        published.published_date = Some(now);
        published.modified_by = Some(actor.to_string());
        published.modified_at = Some(now);
        self.repository.replace(&current, published.clone()).await?;

        LifecycleMetrics::record_publish(true);
        self.record(&published, TemplateAction::Publish, actor);
        tracing::info!(
            template_id = %id,
            version = published.version,
            actor = %actor,
            "Template published"
        );
        Ok(published)
    }

    /// Deactivate every version of a template. Nothing is deleted.
    pub async fn deactivate_template(&self, id: Uuid, actor: &str) -> TemplateResult<Template> {
        let current = self.get_template(id).await?;
        self.authorize(actor, TemplateAction::Deactivate, Some(&current))?;

        let rows = self.repository.set_active(id, false).await?;
        let template = self.get_template(id).await?;

        self.record(&template, TemplateAction::Deactivate, actor);
        tracing::info!(
            template_id = %id,
            versions = rows,
            actor = %actor,
            "Template deactivated"
        );
        Ok(template)
    }

    // ========================================================================
    // Rendering & variables
    // ========================================================================

    /// Render the latest published version
    pub async fn render_template(
        &self,
        id: Uuid,
        context: &RenderContext,
        actor: &str,
    ) -> TemplateResult<RenderedDocument> {
        let template = self
            .repository
            .latest_published(id)
            .await?
            .ok_or(TemplateError::NotPublished(id))?;
        self.render_with_mode(&template, context, actor, "published")
            .await
    }

    /// Render the latest version, draft or not, without persisting anything
    pub async fn render_preview(
        &self,
        id: Uuid,
        sample_context: &RenderContext,
        actor: &str,
    ) -> TemplateResult<RenderedDocument> {
        let template = self.get_template(id).await?;
        self.render_with_mode(&template, sample_context, actor, "preview")
            .await
    }

    async fn render_with_mode(
        &self,
        template: &Template,
        context: &RenderContext,
        actor: &str,
        mode: &str,
    ) -> TemplateResult<RenderedDocument> {
        if !template.is_active {
            return Err(TemplateError::Inactive(template.id));
        }
        self.authorize(actor, TemplateAction::Render, Some(template))?;

        let started = Instant::now();
        let document = self.renderer.render(template, context).await;
        RenderMetrics::record_render(mode, started.elapsed().as_secs_f64());
        let action = if mode == "preview" { "preview" } else { "render" };
        self.usage
            .log(UsageEntry::new(template.id, template.version, actor, action));

        if !document.unresolved.is_empty() {
            tracing::warn!(
                template_id = %template.id,
                version = template.version,
                unresolved = ?document.unresolved,
                "Rendered with unresolved placeholders"
            );
        }
        Ok(document)
    }

    /// Resolve one variable of the latest version
    pub async fn resolve_variable(
        &self,
        id: Uuid,
        name: &str,
        context: &RenderContext,
    ) -> TemplateResult<Resolution> {
        let template = self.get_template(id).await?;
        Ok(self
            .resolver()
            .resolve_detailed(VariableScope::of(&template), name, context)
            .await)
    }

    pub async fn resolve_all_variables(
        &self,
        id: Uuid,
        names: &[String],
        context: &RenderContext,
    ) -> TemplateResult<BTreeMap<String, String>> {
        let template = self.get_template(id).await?;
        Ok(self
            .resolver()
            .resolve_all(VariableScope::of(&template), names, context)
            .await)
    }

    /// Check a candidate value against a variable's declared rules
    pub async fn validate_variable(
        &self,
        id: Uuid,
        name: &str,
        value: &str,
    ) -> TemplateResult<Vec<String>> {
        let template = self.get_template(id).await?;
        self.resolver()
            .validate_variable(VariableScope::of(&template), name, value)
    }

    // ========================================================================
    // Usage
    // ========================================================================

    /// Record a use of the latest version, e.g. "print" or "sign"
    pub async fn log_usage(&self, id: Uuid, actor: &str, action: &str) -> TemplateResult<()> {
        let template = self.get_template(id).await?;
        self.usage
            .log(UsageEntry::new(template.id, template.version, actor, action));
        Ok(())
    }

    pub async fn usage_statistics(
        &self,
        id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> TemplateResult<UsageStatistics> {
        let template = self.get_template(id).await?;
        let entries = self.usage.entries(template.id);
        Ok(UsageStatistics::summarize(template.id, &entries, start, end))
    }

    // ========================================================================
    // Export & import
    // ========================================================================

    pub async fn export_template(&self, id: Uuid) -> TemplateResult<serde_json::Value> {
        let template = self.get_template(id).await?;
        Ok(serde_json::to_value(&template)?)
    }

    /// Import an exported template as a brand new lineage (version 1 draft, fresh ids)
    pub async fn import_template(
        &self,
        exported: serde_json::Value,
        actor: &str,
    ) -> TemplateResult<Template> {
        self.authorize(actor, TemplateAction::Import, None)?;

        let mut template: Template = serde_json::from_value(exported)?;
        let source_id = template.id;

        template.reassign_ids();
        template.version = 1;
        template.is_active = true;
        template.is_published = false;
        template.published_date = None;
        template.created_by = actor.to_string();
        template.created_at = Utc::now();
        template.modified_by = None;
        template.modified_at = None;

        ensure_invariants(&template)?;
        self.repository.insert(template.clone()).await?;

        self.record(&template, TemplateAction::Import, actor);
        tracing::info!(
            template_id = %template.id,
            source_id = %source_id,
            actor = %actor,
            "Template imported"
        );
        Ok(template)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn authorize(
        &self,
        actor: &str,
        action: TemplateAction,
        template: Option<&Template>,
    ) -> TemplateResult<()> {
        if self.access.can(actor, action, template) {
            return Ok(());
        }

        tracing::warn!(
            actor = %actor,
            action = action.as_str(),
            template_id = ?template.map(|t| t.id),
            "Access denied"
        );
        Err(TemplateError::Unauthorized(format!(
            "{} may not {} this template",
            actor,
            action.as_str()
        )))
    }

    fn record(&self, template: &Template, action: TemplateAction, actor: &str) {
        self.audit
            .record(AuditEvent::new(template.id, template.version, action, actor));
    }
}

fn ensure_invariants(template: &Template) -> TemplateResult<()> {
    let report = TemplateValidator::check_invariants(template);
    if report.is_valid() {
        Ok(())
    } else {
        Err(TemplateError::ValidationFailed(report))
    }
}

/// `requested` must name every id in `existing` exactly once
fn check_permutation(kind: &str, existing: &[Uuid], requested: &[Uuid]) -> TemplateResult<()> {
    let existing_set: HashSet<&Uuid> = existing.iter().collect();
    let requested_set: HashSet<&Uuid> = requested.iter().collect();

    if requested.len() != existing.len()
        || requested_set.len() != requested.len()
        || existing_set != requested_set
    {
        return Err(TemplateError::InvalidTemplate(format!(
            "Reorder must list every {} id exactly once",
            kind
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{ClinicalRule, InMemoryRuleEngine};
    use crate::resolver::MemoryVariableCache;
    use crate::template::InMemoryTemplateRepository;
    use crate::validation::ValidationCategory;
    use serde_json::{json, Value};

    fn manager_with(collaborators: Collaborators) -> TemplateManager {
        TemplateManager::new(
            Arc::new(InMemoryTemplateRepository::new()),
            Arc::new(MemoryVariableCache::new()),
            collaborators,
            EngineConfig::default(),
        )
    }

    fn manager() -> TemplateManager {
        manager_with(Collaborators::default())
    }

    fn progress_note() -> CreateTemplateRequest {
        serde_json::from_value(json!({
            "name": "Progress Note",
            "category": "Notes",
            "specialty": "Internal Medicine",
            "purpose": "Progress Note",
            "allowed_roles": ["physician"],
            "sections": [
                {"name": "Subjective", "order_index": 0,
                 "content": "{{PatientName}} reports {{ChiefComplaint}}",
                 "fields": [{"name": "ChiefComplaint", "field_type": "textarea", "order_index": 0}]},
                {"name": "Assessment and Plan", "order_index": 1, "fields": [
                    {"name": "Assessment", "field_type": "textarea", "order_index": 0},
                    {"name": "Plan", "field_type": "textarea", "order_index": 1}
                ]}
            ],
            "variables": [{"name": "ChiefComplaint", "source": {"type": "context", "path": "visit.reason"}}]
        }))
        .unwrap()
    }

    fn context(value: Value) -> RenderContext {
        value.as_object().cloned().unwrap()
    }

    fn rename(name: &str) -> UpdateTemplateRequest {
        UpdateTemplateRequest {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    struct DenyPublish;

    impl AccessPolicy for DenyPublish {
        fn can(&self, _actor: &str, action: TemplateAction, _template: Option<&Template>) -> bool {
            action != TemplateAction::Publish
        }
    }

    #[tokio::test]
    async fn test_create_starts_as_version_one_draft() {
        let manager = manager();
        let created = manager.create_template(progress_note(), "author").await.unwrap();

        assert_eq!(created.version, 1);
        assert!(created.is_draft());
        assert_eq!(manager.get_template(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_section_order() {
        let mut request = progress_note();
        request.sections[1].order_index = 0;

        let err = manager().create_template(request, "author").await.unwrap_err();
        match err {
            TemplateError::ValidationFailed(report) => {
                assert_eq!(report.failing_categories(), vec![ValidationCategory::Structure]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_draft_is_edited_in_place() {
        let manager = manager();
        let created = manager.create_template(progress_note(), "author").await.unwrap();

        let updated = manager
            .update_template(created.id, rename("SOAP Note"), "editor")
            .await
            .unwrap();

        assert_eq!(updated.version, 1);
        assert_eq!(updated.name, "SOAP Note");
        assert_eq!(manager.list_versions(created.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_editing_published_forks_new_draft() {
        let manager = manager();
        let created = manager.create_template(progress_note(), "author").await.unwrap();
        let published = manager.publish_template(created.id, "author").await.unwrap();

        let updated = manager
            .update_template(created.id, rename("Progress Note v2"), "editor")
            .await
            .unwrap();

        assert_eq!(updated.version, 2);
        assert!(updated.is_draft());

        let v1 = manager.get_version(created.id, 1).await.unwrap();
        assert_eq!(v1, published);
        assert_eq!(v1.name, "Progress Note");
        assert_eq!(manager.list_versions(created.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_publish_refused_leaves_draft_untouched() {
        let manager = manager();
        let mut request = progress_note();
        request.allowed_roles.clear();
        let created = manager.create_template(request, "author").await.unwrap();

        let err = manager.publish_template(created.id, "author").await.unwrap_err();
        let TemplateError::ValidationFailed(report) = err else {
            panic!("expected validation failure");
        };
        assert_eq!(report.failing_categories(), vec![ValidationCategory::Security]);

        let stored = manager.get_template(created.id).await.unwrap();
        assert!(stored.is_draft());
        assert!(stored.published_date.is_none());
    }

    #[tokio::test]
    async fn test_publish_sets_published_date() {
        let manager = manager();
        let created = manager.create_template(progress_note(), "author").await.unwrap();

        let published = manager.publish_template(created.id, "author").await.unwrap();
        assert!(published.is_published);
        assert!(published.published_date.is_some());
        assert_eq!(published.version, 1);
    }

    #[tokio::test]
    async fn test_render_requires_published_version() {
        let manager = manager();
        let created = manager.create_template(progress_note(), "author").await.unwrap();
        let ctx = context(json!({"PatientName": "Jane", "visit": {"reason": "cough"}}));

        let err = manager.render_template(created.id, &ctx, "clinician").await.unwrap_err();
        assert!(matches!(err, TemplateError::NotPublished(id) if id == created.id));

        let preview = manager.render_preview(created.id, &ctx, "author").await.unwrap();
        assert!(preview.content.contains("Jane reports cough"));
    }

    #[tokio::test]
    async fn test_render_uses_latest_published_not_newer_draft() {
        let manager = manager();
        let created = manager.create_template(progress_note(), "author").await.unwrap();
        manager.publish_template(created.id, "author").await.unwrap();
        manager
            .update_template(created.id, rename("Unreleased"), "editor")
            .await
            .unwrap();

        let document = manager
            .render_template(created.id, &RenderContext::new(), "clinician")
            .await
            .unwrap();
        assert_eq!(document.version, 1);
        assert!(document.content.starts_with("# Progress Note"));
    }

    #[tokio::test]
    async fn test_deactivate_blocks_render_and_edit() {
        let manager = manager();
        let created = manager.create_template(progress_note(), "author").await.unwrap();
        manager.publish_template(created.id, "author").await.unwrap();

        let deactivated = manager.deactivate_template(created.id, "admin").await.unwrap();
        assert!(!deactivated.is_active);

        let err = manager
            .render_template(created.id, &RenderContext::new(), "clinician")
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::Inactive(_)));

        let err = manager
            .update_template(created.id, rename("Revived"), "editor")
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::Inactive(_)));
    }

    #[tokio::test]
    async fn test_reorder_sections_requires_permutation() {
        let manager = manager();
        let created = manager.create_template(progress_note(), "author").await.unwrap();
        let first = created.sections[0].id;
        let second = created.sections[1].id;

        let err = manager
            .reorder_sections(created.id, vec![first], "editor")
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidTemplate(_)));

        let reordered = manager
            .reorder_sections(created.id, vec![second, first], "editor")
            .await
            .unwrap();
        let names: Vec<&str> = reordered
            .sections_in_order()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["Assessment and Plan", "Subjective"]);
    }

    #[tokio::test]
    async fn test_remove_missing_field_is_not_found() {
        let manager = manager();
        let created = manager.create_template(progress_note(), "author").await.unwrap();

        let err = manager
            .remove_field(created.id, created.sections[0].id, Uuid::new_v4(), "editor")
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::NotFound { kind: "Field", .. }));
    }

    #[tokio::test]
    async fn test_import_creates_new_lineage() {
        let manager = manager();
        let created = manager.create_template(progress_note(), "author").await.unwrap();
        manager.publish_template(created.id, "author").await.unwrap();

        let exported = manager.export_template(created.id).await.unwrap();
        let imported = manager.import_template(exported, "importer").await.unwrap();

        assert_ne!(imported.id, created.id);
        assert_eq!(imported.version, 1);
        assert!(imported.is_draft());
        assert_eq!(imported.created_by, "importer");
        assert_eq!(imported.sections[0].template_id, imported.id);
        assert_ne!(imported.sections[0].id, created.sections[0].id);
    }

    #[tokio::test]
    async fn test_templates_for_encounter_applies_rules() {
        let rules = Arc::new(InMemoryRuleEngine::new());
        rules.insert(ClinicalRule {
            id: 7,
            name: "Diabetic follow-up".to_string(),
            is_active: true,
        });
        rules.set_outcome(7, "enc-1", true);
        rules.set_outcome(7, "enc-2", false);

        let manager = manager_with(Collaborators {
            rules: rules.clone(),
            ..Collaborators::default()
        });

        let mut request = progress_note();
        request.enable_decision_support = true;
        request.associated_rule_ids = vec![7];
        let created = manager.create_template(request, "author").await.unwrap();
        manager.publish_template(created.id, "author").await.unwrap();

        let matching = manager
            .templates_for_encounter("enc-1", "internal medicine")
            .await
            .unwrap();
        assert_eq!(matching.len(), 1);

        let excluded = manager
            .templates_for_encounter("enc-2", "Internal Medicine")
            .await
            .unwrap();
        assert!(excluded.is_empty());
    }

    #[tokio::test]
    async fn test_access_policy_denial() {
        let manager = manager_with(Collaborators {
            access: Arc::new(DenyPublish),
            ..Collaborators::default()
        });
        let created = manager.create_template(progress_note(), "author").await.unwrap();

        let err = manager.publish_template(created.id, "author").await.unwrap_err();
        assert!(matches!(err, TemplateError::Unauthorized(_)));
        assert!(manager.get_template(created.id).await.unwrap().is_draft());
    }

    #[tokio::test]
    async fn test_validate_variable_uses_declared_rules() {
        let manager = manager();
        let mut request = progress_note();
        request.variables.push(
            serde_json::from_value(json!({
                "name": "Mrn",
                "enable_validation": true,
                "validation_rules": [{"type": "regex", "pattern": "^[0-9]{6}$"}]
            }))
            .unwrap(),
        );
        let created = manager.create_template(request, "author").await.unwrap();

        assert!(manager
            .validate_variable(created.id, "Mrn", "123456")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            manager
                .validate_variable(created.id, "Mrn", "12ab")
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_update_field_keeps_id_and_forks_published() {
        let manager = manager();
        let created = manager.create_template(progress_note(), "author").await.unwrap();
        manager.publish_template(created.id, "author").await.unwrap();
        let section_id = created.sections[0].id;
        let field_id = created.sections[0].fields[0].id;

        let request: UpdateFieldRequest =
            serde_json::from_value(json!({"label": "Chief complaint", "is_required": true})).unwrap();
        let updated = manager
            .update_field(created.id, section_id, field_id, request, "editor")
            .await
            .unwrap();

        assert_eq!(updated.version, 2);
        let field = &updated.section(section_id).unwrap().fields[0];
        assert_eq!(field.id, field_id);
        assert_eq!(field.label, "Chief complaint");
        assert!(field.is_required);

        let v1 = manager.get_version(created.id, 1).await.unwrap();
        assert!(!v1.sections[0].fields[0].is_required);
    }

    #[tokio::test]
    async fn test_update_missing_variable_is_not_found() {
        let manager = manager();
        let created = manager.create_template(progress_note(), "author").await.unwrap();

        let err = manager
            .update_variable(created.id, "Nope", UpdateVariableRequest::default(), "editor")
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::NotFound { kind: "Variable", .. }));
    }

    #[tokio::test]
    async fn test_update_variable_changes_resolution() {
        let manager = manager();
        let created = manager.create_template(progress_note(), "author").await.unwrap();
        let ctx = context(json!({"visit": {"reason": "cough", "triage": "fever"}}));

        let request: UpdateVariableRequest = serde_json::from_value(json!({
            "source": {"type": "context", "path": "visit.triage"}
        }))
        .unwrap();
        manager
            .update_variable(created.id, "ChiefComplaint", request, "editor")
            .await
            .unwrap();

        let resolution = manager
            .resolve_variable(created.id, "ChiefComplaint", &ctx)
            .await
            .unwrap();
        assert_eq!(resolution.value, "fever");
    }

    #[tokio::test]
    async fn test_associate_rules_dedups_and_lists_known_rules() {
        let rules = Arc::new(InMemoryRuleEngine::new());
        rules.insert(ClinicalRule {
            id: 3,
            name: "Sepsis screen".to_string(),
            is_active: true,
        });
        let manager = manager_with(Collaborators {
            rules,
            ..Collaborators::default()
        });
        let created = manager.create_template(progress_note(), "author").await.unwrap();

        let updated = manager
            .associate_rules(created.id, vec![3, 9, 3], "editor")
            .await
            .unwrap();
        assert_eq!(updated.associated_rule_ids, vec![3, 9]);

        let known = manager.associated_rules(created.id).await.unwrap();
        assert_eq!(known.len(), 1);
        assert_eq!(known[0].name, "Sepsis screen");
    }

    #[tokio::test]
    async fn test_renders_are_counted_in_usage_statistics() {
        let manager = manager();
        let created = manager.create_template(progress_note(), "author").await.unwrap();
        manager.render_preview(created.id, &RenderContext::new(), "author").await.unwrap();
        manager.publish_template(created.id, "author").await.unwrap();
        manager
            .render_template(created.id, &RenderContext::new(), "dr.a")
            .await
            .unwrap();
        manager
            .render_template(created.id, &RenderContext::new(), "dr.b")
            .await
            .unwrap();
        manager.log_usage(created.id, "dr.a", "print").await.unwrap();

        let stats = manager.usage_statistics(created.id, None, None).await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.unique_users, 3);
        assert_eq!(stats.by_action.get("render"), Some(&2));
        assert_eq!(stats.by_action.get("preview"), Some(&1));
        assert_eq!(stats.by_action.get("print"), Some(&1));

        let future = Utc::now() + chrono::Duration::days(1);
        let none = manager
            .usage_statistics(created.id, Some(future), None)
            .await
            .unwrap();
        assert_eq!(none.total, 0);
    }

    #[tokio::test]
    async fn test_usage_of_unknown_template_is_not_found() {
        let err = manager()
            .log_usage(Uuid::new_v4(), "dr.a", "print")
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::NotFound { .. }));
    }
}
