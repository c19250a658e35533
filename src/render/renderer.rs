//! Ordered section and field rendering.
//!
//! A render never fails: unresolved placeholders become empty text and are
//! listed in the document, failing formulas render empty and alert lookups
//! are best-effort.

use std::sync::Arc;
use std::time::Duration;

use crate::collaborators::{with_timeout, AlertProvider, ClinicalAlert, FormulaEvaluator};
use crate::condition;
use crate::metrics::RenderMetrics;
use crate::resolver::{VariableResolver, VariableScope};
use crate::template::context::{encounter_id, lookup, value_to_text};
use crate::template::placeholder::{placeholders, splice};
use crate::template::{Field, RenderContext, Section, Template};

use super::document::{FieldMetadata, RenderedDocument, RenderedField, RenderedSection};

/// Context keys printed in the document header, with their labels
const IDENTITY_LINES: &[(&str, &str)] = &[
    ("Patient", "PatientName"),
    ("MRN", "MedicalRecordNumber"),
    ("DOB", "DateOfBirth"),
    ("Encounter", "EncounterId"),
    ("Encounter Date", "EncounterDate"),
    ("Provider", "ProviderName"),
];

const SIGNATURE_LINE: &str = "______________________";

#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Deadline for the alert lookup of one section
    pub alert_timeout: Duration,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            alert_timeout: Duration::from_secs(1),
        }
    }
}

/// Walks a template's sections and fields to produce a document
#[derive(Clone)]
pub struct TemplateRenderer {
    resolver: VariableResolver,
    formulas: Arc<dyn FormulaEvaluator>,
    alerts: Option<Arc<dyn AlertProvider>>,
    config: RendererConfig,
}

impl TemplateRenderer {
    pub fn new(
        resolver: VariableResolver,
        formulas: Arc<dyn FormulaEvaluator>,
        alerts: Option<Arc<dyn AlertProvider>>,
        config: RendererConfig,
    ) -> Self {
        Self {
            resolver,
            formulas,
            alerts,
            config,
        }
    }

    pub fn resolver(&self) -> &VariableResolver {
        &self.resolver
    }

    /// Render a template against a context
    pub async fn render(&self, template: &Template, context: &RenderContext) -> RenderedDocument {
        let scope = VariableScope::of(template);
        let mut unresolved = Vec::new();
        let mut lines = vec![format!("# {}", template.name)];

        if let Some(header) = &template.header_content {
            let header = self
                .resolve_text(scope, header, context, &mut unresolved)
                .await;
            if !header.trim().is_empty() {
                lines.push(header);
            }
        }

        for (label, key) in IDENTITY_LINES {
            if let Some(value) = context.get(*key).map(value_to_text) {
                if !value.is_empty() {
                    lines.push(format!("{}: {}", label, value));
                }
            }
        }

        let mut sections = Vec::new();
        for section in template.sections_in_order() {
            if section.is_conditional()
                && !condition::evaluate(template.id, section.display_conditions.as_ref(), context)
            {
                tracing::debug!(
                    template_id = %template.id,
                    section = %section.name,
                    "Section condition not met, skipping"
                );
                RenderMetrics::record_section_skipped();
                continue;
            }

            let rendered = self
                .render_section(scope, section, context, &mut unresolved)
                .await;

            lines.push(String::new());
            lines.push(format!("## {}", rendered.name));
            if let Some(description) = section.description.as_deref().filter(|d| !d.is_empty()) {
                lines.push(description.to_string());
            }
            if !rendered.content.is_empty() {
                lines.push(rendered.content.clone());
            }
            for field in &rendered.fields {
                lines.push(format!("- {}: {}", field.label, field.value));
            }
            for alert in &rendered.alerts {
                lines.push(format!(
                    "[{}] {}",
                    alert.severity.to_uppercase(),
                    alert.message
                ));
            }

            sections.push(rendered);
        }

        if let Some(footer) = &template.footer_content {
            let footer = self
                .resolve_text(scope, footer, context, &mut unresolved)
                .await;
            if !footer.trim().is_empty() {
                lines.push(String::new());
                lines.push(footer);
            }
        }

        if template.requires_signature {
            lines.push(String::new());
            lines.push(format!("Provider Signature: {}", SIGNATURE_LINE));
            lines.push(format!("Date: {}", SIGNATURE_LINE));
            if template.requires_co_sign {
                lines.push(String::new());
                lines.push(format!("Co-Signature: {}", SIGNATURE_LINE));
                lines.push(format!("Date: {}", SIGNATURE_LINE));
            }
        }

        RenderedDocument {
            template_id: template.id,
            version: template.version,
            content: lines.join("\n"),
            sections,
            unresolved,
        }
    }

    async fn render_section(
        &self,
        scope: VariableScope<'_>,
        section: &Section,
        context: &RenderContext,
        unresolved: &mut Vec<String>,
    ) -> RenderedSection {
        let content = self
            .resolve_text(scope, &section.content, context, unresolved)
            .await;

        let fields = section
            .fields_in_order()
            .into_iter()
            .filter(|field| {
                condition::evaluate(scope.template_id, field.display_condition.as_ref(), context)
            })
            .map(|field| self.render_field(scope, field, context))
            .collect();

        let alerts = if section.is_conditional() {
            self.fetch_alerts(scope, context).await
        } else {
            Vec::new()
        };

        RenderedSection {
            id: section.id,
            name: section.name.clone(),
            content,
            fields,
            alerts,
        }
    }

    fn render_field(
        &self,
        scope: VariableScope<'_>,
        field: &Field,
        context: &RenderContext,
    ) -> RenderedField {
        let value = if field.is_calculated {
            self.calculate(scope, field, context)
        } else {
            lookup(context, &field.name)
                .map(value_to_text)
                .or_else(|| field.default_value.clone())
                .unwrap_or_default()
        };

        RenderedField {
            id: field.id,
            name: field.name.clone(),
            label: field.display_label().to_string(),
            field_type: field.field_type.as_str().to_string(),
            value,
            constraints: FieldMetadata::from(field),
        }
    }

    fn calculate(&self, scope: VariableScope<'_>, field: &Field, context: &RenderContext) -> String {
        let formula = field.calculation_formula.as_deref().unwrap_or_default();
        match self.formulas.evaluate(formula, context) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    template_id = %scope.template_id,
                    field = %field.name,
                    error = %e,
                    "Calculated field failed, rendering as empty"
                );
                String::new()
            }
        }
    }

    async fn fetch_alerts(
        &self,
        scope: VariableScope<'_>,
        context: &RenderContext,
    ) -> Vec<ClinicalAlert> {
        let (Some(provider), Some(encounter)) = (&self.alerts, encounter_id(context)) else {
            return Vec::new();
        };

        match with_timeout(
            self.config.alert_timeout,
            provider.alerts_for_encounter(&encounter),
        )
        .await
        {
            Ok(alerts) => alerts,
            Err(e) => {
                tracing::warn!(
                    template_id = %scope.template_id,
                    encounter_id = %encounter,
                    error = %e,
                    "Alert lookup failed, continuing without alerts"
                );
                Vec::new()
            }
        }
    }

    /// Substitute placeholders in one left-to-right pass
    async fn resolve_text(
        &self,
        scope: VariableScope<'_>,
        text: &str,
        context: &RenderContext,
        unresolved: &mut Vec<String>,
    ) -> String {
        let found = placeholders(text);
        if found.is_empty() {
            return text.to_string();
        }

        let mut values = Vec::with_capacity(found.len());
        for placeholder in &found {
            let resolution = self
                .resolver
                .resolve_detailed(scope, placeholder.name, context)
                .await;
            if resolution.is_unresolved() && !unresolved.iter().any(|n| n == placeholder.name) {
                unresolved.push(placeholder.name.to_string());
            }
            values.push(resolution.value);
        }

        splice(text, &found, &values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        AccessorRegistry, ArithmeticFormulaEvaluator, CollaboratorError, InMemoryClinicalProvider,
    };
    use crate::resolver::{MemoryVariableCache, ResolverConfig};
    use crate::template::CreateTemplateRequest;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    fn ctx(value: Value) -> RenderContext {
        match value {
            Value::Object(map) => map,
            _ => panic!("context must be an object"),
        }
    }

    fn renderer(alerts: Option<Arc<dyn AlertProvider>>) -> TemplateRenderer {
        let resolver = VariableResolver::new(
            Arc::new(MemoryVariableCache::new()),
            AccessorRegistry::new(),
            None,
            ResolverConfig::default(),
        );
        TemplateRenderer::new(
            resolver,
            Arc::new(ArithmeticFormulaEvaluator),
            alerts,
            RendererConfig::default(),
        )
    }

    fn template(body: Value) -> Template {
        let request: CreateTemplateRequest = serde_json::from_value(body).unwrap();
        request.into_template("tester")
    }

    #[tokio::test]
    async fn test_greeting_substitution() {
        let template = template(json!({
            "name": "Visit",
            "sections": [{"name": "Intro", "order_index": 0, "content": "Hello {{PatientName}}"}]
        }));

        let document = renderer(None)
            .render(&template, &ctx(json!({"PatientName": "Jane Doe"})))
            .await;

        assert!(document.content.contains("Hello Jane Doe"));
        assert!(document.unresolved.is_empty());
    }

    #[tokio::test]
    async fn test_unmet_condition_omits_section_and_fields() {
        let template = template(json!({
            "name": "Screening",
            "sections": [
                {
                    "name": "Pregnancy",
                    "order_index": 0,
                    "content": "Pregnancy screening",
                    "has_conditions": true,
                    "display_conditions": {"Gender": "F"},
                    "fields": [{"name": "Lmp", "label": "Last menstrual period", "field_type": "date", "order_index": 0}]
                },
                {"name": "General", "order_index": 1, "content": "General exam"}
            ]
        }));

        let document = renderer(None)
            .render(&template, &ctx(json!({"Gender": "M"})))
            .await;

        assert!(!document.content.contains("Pregnancy"));
        assert!(!document.content.contains("Last menstrual period"));
        assert!(document.content.contains("## General"));
        assert_eq!(document.sections.len(), 1);
    }

    #[tokio::test]
    async fn test_sections_and_fields_follow_order_index() {
        let template = template(json!({
            "name": "Note",
            "sections": [
                {"name": "Second", "order_index": 5, "fields": [
                    {"name": "b", "label": "B", "field_type": "text", "order_index": 2},
                    {"name": "a", "label": "A", "field_type": "text", "order_index": 1}
                ]},
                {"name": "First", "order_index": 1}
            ]
        }));

        let document = renderer(None).render(&template, &RenderContext::new()).await;

        let first = document.content.find("## First").unwrap();
        let second = document.content.find("## Second").unwrap();
        assert!(first < second);
        let a = document.content.find("- A:").unwrap();
        let b = document.content.find("- B:").unwrap();
        assert!(a < b);
    }

    #[tokio::test]
    async fn test_field_values_and_metadata() {
        let template = template(json!({
            "name": "Vitals",
            "sections": [{"name": "Measurements", "order_index": 0, "fields": [
                {"name": "Weight", "label": "Weight (kg)", "field_type": "number", "order_index": 0,
                 "is_required": true, "constraints": {"min_value": 0.0, "max_value": 500.0}},
                {"name": "Height", "field_type": "number", "order_index": 1},
                {"name": "Unit", "field_type": "text", "order_index": 2, "default_value": "kg"},
                {"name": "Bmi", "label": "BMI", "field_type": "number", "order_index": 3,
                 "is_calculated": true, "calculation_formula": "Weight / (Height * Height)"},
                {"name": "Broken", "field_type": "number", "order_index": 4,
                 "is_calculated": true, "calculation_formula": "Weight / 0"},
                {"name": "Hidden", "field_type": "text", "order_index": 5,
                 "display_condition": {"ShowHidden": true}}
            ]}]
        }));

        let document = renderer(None)
            .render(&template, &ctx(json!({"Weight": 80, "Height": 2})))
            .await;
        let section = document.section("Measurements").unwrap();
        let values: Vec<(&str, &str)> = section
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.value.as_str()))
            .collect();

        assert_eq!(
            values,
            vec![
                ("Weight", "80"),
                ("Height", "2"),
                ("Unit", "kg"),
                ("Bmi", "20"),
                ("Broken", "")
            ]
        );
        assert!(section.fields[0].constraints.required);
        assert_eq!(section.fields[0].constraints.max, Some(500.0));
        assert!(section.fields[3].constraints.read_only);
        assert!(document.content.contains("- Unit: kg"));
    }

    #[tokio::test]
    async fn test_unknown_placeholder_renders_empty_and_is_reported() {
        let template = template(json!({
            "name": "Note",
            "header_content": "Clinic: {{Clinic}}",
            "sections": [{"name": "S", "order_index": 0, "content": "[{{ Unknown }}] [{{Clinic}}]"}]
        }));

        let document = renderer(None).render(&template, &RenderContext::new()).await;

        assert!(document.content.contains("[] []"));
        assert_eq!(document.unresolved, vec!["Clinic".to_string(), "Unknown".to_string()]);
    }

    #[tokio::test]
    async fn test_header_identity_footer_and_signatures() {
        let template = template(json!({
            "name": "Consult",
            "header_content": "Cardiology Consult",
            "footer_content": "Electronically generated",
            "requires_signature": true,
            "requires_co_sign": true,
            "sections": []
        }));

        let document = renderer(None)
            .render(
                &template,
                &ctx(json!({"PatientName": "Jane Doe", "MedicalRecordNumber": "000123"})),
            )
            .await;

        let lines: Vec<&str> = document.content.lines().collect();
        assert_eq!(lines[0], "# Consult");
        assert_eq!(lines[1], "Cardiology Consult");
        assert_eq!(lines[2], "Patient: Jane Doe");
        assert_eq!(lines[3], "MRN: 000123");
        assert!(document.content.contains("Electronically generated"));
        assert!(document.content.contains("Provider Signature: "));
        assert!(document.content.contains("Co-Signature: "));
    }

    #[tokio::test]
    async fn test_alerts_only_on_conditional_sections_with_encounter() {
        let provider = Arc::new(InMemoryClinicalProvider::new());
        provider.insert_alert(
            "enc-1",
            ClinicalAlert {
                severity: "high".to_string(),
                message: "Potassium critical".to_string(),
            },
        );
        let template = template(json!({
            "name": "Labs",
            "sections": [
                {"name": "Plain", "order_index": 0},
                {"name": "Flagged", "order_index": 1, "has_conditions": true}
            ]
        }));
        let renderer = renderer(Some(provider));

        let with_encounter = renderer
            .render(&template, &ctx(json!({"EncounterId": "enc-1"})))
            .await;
        assert_eq!(with_encounter.content.matches("[HIGH] Potassium critical").count(), 1);
        assert!(with_encounter.section("Plain").unwrap().alerts.is_empty());

        let without = renderer.render(&template, &RenderContext::new()).await;
        assert!(!without.content.contains("Potassium"));
    }

    struct FailingAlerts;

    #[async_trait]
    impl AlertProvider for FailingAlerts {
        async fn alerts_for_encounter(
            &self,
            _encounter_id: &str,
        ) -> Result<Vec<ClinicalAlert>, CollaboratorError> {
            Err(CollaboratorError::Failed("alert service down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failing_alert_provider_does_not_block_render() {
        let template = template(json!({
            "name": "Labs",
            "sections": [{"name": "Flagged", "order_index": 0, "has_conditions": true, "content": "ok"}]
        }));

        let document = renderer(Some(Arc::new(FailingAlerts)))
            .render(&template, &ctx(json!({"EncounterId": "enc-1"})))
            .await;

        assert!(document.content.contains("## Flagged\nok"));
    }

    #[tokio::test]
    async fn test_render_is_deterministic() {
        let template = template(json!({
            "name": "Note",
            "header_content": "{{Clinic}}",
            "sections": [{"name": "S", "order_index": 0, "content": "{{PatientName}} / {{Age}}",
                          "fields": [{"name": "Age", "field_type": "number", "order_index": 0}]}]
        }));
        let context = ctx(json!({"PatientName": "Jane", "Age": 40}));
        let renderer = renderer(None);

        let first = renderer.render(&template, &context).await;
        let second = renderer.render(&template, &context).await;
        assert_eq!(first, second);
    }
}
