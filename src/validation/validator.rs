//! Five-category template validation.
//!
//! Each category collects every violation it finds; categories do not stop
//! each other.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collaborators::{CodeSystem, FormulaEvaluator, RuleEngine, TerminologyChecker};
use crate::template::placeholder::placeholder_names;
use crate::template::{FieldType, Template};

use super::report::{ValidationCategory, ValidationReport};

/// Field names every template of a given purpose must contain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredFieldSet {
    pub purpose: String,
    pub fields: Vec<String>,
}

impl RequiredFieldSet {
    pub fn new(purpose: &str, fields: &[&str]) -> Self {
        Self {
            purpose: purpose.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Placeholder names that need no variable declaration
    pub builtin_variables: Vec<String>,
    pub required_fields: Vec<RequiredFieldSet>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            builtin_variables: [
                "PatientName",
                "PatientId",
                "MedicalRecordNumber",
                "DateOfBirth",
                "Gender",
                "EncounterId",
                "EncounterDate",
                "ProviderName",
                "FacilityName",
                "CurrentDate",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            required_fields: vec![
                RequiredFieldSet::new("Progress Note", &["ChiefComplaint", "Assessment", "Plan"]),
                RequiredFieldSet::new(
                    "History and Physical",
                    &[
                        "ChiefComplaint",
                        "HistoryOfPresentIllness",
                        "PhysicalExam",
                        "Assessment",
                        "Plan",
                    ],
                ),
            ],
        }
    }
}

/// Keys a section data source must carry, by source type
fn required_source_keys(source_type: &str) -> Option<&'static [&'static str]> {
    match source_type {
        "database" => Some(&["table", "field"]),
        "api" => Some(&["endpoint"]),
        "function" => Some(&["function"]),
        "clinical" => Some(&["mapping_path"]),
        "context" => Some(&["path"]),
        "static" => Some(&[]),
        _ => None,
    }
}

/// Runs the structure, content, clinical, data-binding and security checks
#[derive(Clone)]
pub struct TemplateValidator {
    rules: Arc<dyn RuleEngine>,
    terminology: Arc<dyn TerminologyChecker>,
    formulas: Arc<dyn FormulaEvaluator>,
    config: ValidationConfig,
}

impl TemplateValidator {
    pub fn new(
        rules: Arc<dyn RuleEngine>,
        terminology: Arc<dyn TerminologyChecker>,
        formulas: Arc<dyn FormulaEvaluator>,
        config: ValidationConfig,
    ) -> Self {
        Self {
            rules,
            terminology,
            formulas,
            config,
        }
    }

    /// Full validation across all five categories
    pub async fn validate(&self, template: &Template) -> ValidationReport {
        let mut report = ValidationReport::new();

        check_structure(template, &mut report);
        self.check_content(template, &mut report);
        self.check_clinical(template, &mut report).await;
        self.check_data_binding(template, &mut report);
        check_security(template, &mut report);

        tracing::debug!(
            template_id = %template.id,
            version = template.version,
            errors = report.error_count(),
            warnings = report.warning_count(),
            "Template validated"
        );

        report
    }

    /// Aggregate invariants enforced on every save: non-empty names, unique
    /// non-negative order indices and unique variable names.
    pub fn check_invariants(template: &Template) -> ValidationReport {
        let mut report = ValidationReport::new();
        check_invariants_into(template, &mut report);
        report
    }

    fn check_content(&self, template: &Template, report: &mut ValidationReport) {
        let category = ValidationCategory::Content;

        let declared: HashSet<&str> = template.variables.iter().map(|v| v.name.as_str()).collect();
        let builtin: HashSet<&str> = self
            .config
            .builtin_variables
            .iter()
            .map(String::as_str)
            .collect();

        let texts = template
            .header_content
            .iter()
            .chain(template.footer_content.iter())
            .chain(template.sections.iter().map(|s| &s.content));

        let mut reported = HashSet::new();
        for text in texts {
            for name in placeholder_names(text) {
                if declared.contains(name.as_str()) || builtin.contains(name.as_str()) {
                    continue;
                }
                if reported.insert(name.clone()) {
                    report.error(
                        category,
                        Some(name.as_str()),
                        format!("Invalid variable reference: {}", name),
                    );
                }
            }
        }

        for (_, field) in template.fields() {
            match &field.field_type {
                FieldType::Custom(name) if name.trim().is_empty() => report.error(
                    category,
                    Some(field.name.as_str()),
                    format!("Field type is required: {}", field.name),
                ),
                FieldType::Custom(name) => report.warning(
                    category,
                    Some(field.name.as_str()),
                    format!("Unrecognized field type '{}' on field: {}", name, field.name),
                ),
                FieldType::Select | FieldType::Radio if field.options.is_empty() => report.warning(
                    category,
                    Some(field.name.as_str()),
                    format!("Choice field has no options: {}", field.name),
                ),
                _ => {}
            }

            let has_message = field
                .validation_message
                .as_deref()
                .is_some_and(|m| !m.trim().is_empty());
            if field.is_required && !has_message {
                report.error(
                    category,
                    Some(field.name.as_str()),
                    format!("Required field needs a validation message: {}", field.name),
                );
            }
        }
    }

    async fn check_clinical(&self, template: &Template, report: &mut ValidationReport) {
        let category = ValidationCategory::Clinical;

        if let Some(purpose) = template.purpose.as_deref() {
            let required = self
                .config
                .required_fields
                .iter()
                .find(|set| set.purpose.eq_ignore_ascii_case(purpose.trim()));

            if let Some(required) = required {
                for name in &required.fields {
                    let present = template
                        .fields()
                        .any(|(_, field)| field.name.eq_ignore_ascii_case(name));
                    if !present {
                        report.error(
                            category,
                            Some(name.as_str()),
                            format!("Missing required clinical field: {}", name),
                        );
                    }
                }
            }
        }

        if template.enable_decision_support {
            if template.associated_rule_ids.is_empty() {
                report.warning(
                    category,
                    None,
                    "Decision support is enabled but no rules are associated",
                );
            }

            for rule_id in &template.associated_rule_ids {
                let field = rule_id.to_string();
                match self.rules.get_rule(*rule_id).await {
                    Ok(Some(rule)) if rule.is_active => {}
                    Ok(Some(_)) => report.error(
                        category,
                        Some(field.as_str()),
                        format!("Inactive clinical rule reference: {}", rule_id),
                    ),
                    Ok(None) => report.error(
                        category,
                        Some(field.as_str()),
                        format!("Invalid clinical rule reference: {}", rule_id),
                    ),
                    Err(e) => report.error(
                        category,
                        Some(field.as_str()),
                        format!("Could not verify clinical rule {}: {}", rule_id, e),
                    ),
                }
            }
        }

        for (_, field) in template.fields() {
            let codes = [
                (CodeSystem::Snomed, field.terminology.snomed.as_deref()),
                (CodeSystem::Loinc, field.terminology.loinc.as_deref()),
            ];
            for (system, code) in codes {
                let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
                    continue;
                };
                if !self.terminology.is_valid(system, code).await {
                    report.error(
                        category,
                        Some(field.name.as_str()),
                        format!("Invalid {} code: {}", system, code),
                    );
                }
            }
        }
    }

    fn check_data_binding(&self, template: &Template, report: &mut ValidationReport) {
        let category = ValidationCategory::DataBinding;

        for section in &template.sections {
            if let Some(source) = &section.data_source {
                if let Err(problem) = check_data_source(source) {
                    report.error(
                        category,
                        Some(section.name.as_str()),
                        format!(
                            "Invalid data source configuration in section {}: {}",
                            section.name, problem
                        ),
                    );
                }
            }
        }

        for (_, field) in template.fields().filter(|(_, f)| f.is_calculated) {
            let formula = field.calculation_formula.as_deref().unwrap_or_default();
            let problem = if formula.trim().is_empty() {
                Some("formula is empty".to_string())
            } else {
                self.formulas.check(formula).err().map(|e| e.to_string())
            };

            if let Some(problem) = problem {
                report.error(
                    category,
                    Some(field.name.as_str()),
                    format!("Invalid calculation formula in field {}: {}", field.name, problem),
                );
            }
        }
    }
}

/// A data source is a JSON object (or a string holding one) with a `type`
/// and the keys that type requires
fn check_data_source(source: &Value) -> Result<(), String> {
    let parsed;
    let source = match source {
        Value::Null => return Ok(()),
        Value::String(raw) if raw.trim().is_empty() => return Ok(()),
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw).map_err(|e| e.to_string())?;
            &parsed
        }
        other => other,
    };

    let config = source
        .as_object()
        .ok_or_else(|| "expected a JSON object".to_string())?;

    let source_type = config
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing 'type'".to_string())?;

    let required = required_source_keys(source_type)
        .ok_or_else(|| format!("unknown type '{}'", source_type))?;

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|key| {
            config
                .get(*key)
                .map_or(true, |v| v.is_null() || v.as_str().is_some_and(|s| s.trim().is_empty()))
        })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("missing {}", missing.join(", ")))
    }
}

fn check_structure(template: &Template, report: &mut ValidationReport) {
    let category = ValidationCategory::Structure;

    check_invariants_into(template, report);

    if template.category.trim().is_empty() {
        report.error(category, Some("category"), "Template category is required");
    }
    if template.specialty.trim().is_empty() {
        report.error(category, Some("specialty"), "Specialty type is required");
    }
    if template.sections.is_empty() {
        report.error(category, None, "Template must contain at least one section");
    }
}

fn check_invariants_into(template: &Template, report: &mut ValidationReport) {
    let category = ValidationCategory::Structure;

    if template.name.trim().is_empty() {
        report.error(category, Some("name"), "Template name is required");
    }

    let mut section_indices = HashSet::new();
    for section in &template.sections {
        if section.name.trim().is_empty() {
            report.error(category, None, "Section name is required");
        }
        if section.order_index < 0 {
            report.error(
                category,
                Some(section.name.as_str()),
                format!("Section order index must be non-negative: {}", section.name),
            );
        }
        if !section_indices.insert(section.order_index) {
            report.error(
                category,
                Some(section.name.as_str()),
                format!("Duplicate section order index {}", section.order_index),
            );
        }

        let mut field_indices = HashSet::new();
        for field in &section.fields {
            if field.name.trim().is_empty() {
                report.error(
                    category,
                    Some(section.name.as_str()),
                    format!("Field name is required in section: {}", section.name),
                );
            }
            if field.order_index < 0 {
                report.error(
                    category,
                    Some(field.name.as_str()),
                    format!("Field order index must be non-negative: {}", field.name),
                );
            }
            if !field_indices.insert(field.order_index) {
                report.error(
                    category,
                    Some(field.name.as_str()),
                    format!(
                        "Duplicate field order index {} in section: {}",
                        field.order_index, section.name
                    ),
                );
            }
        }
    }

    let mut variable_names = HashSet::new();
    for variable in &template.variables {
        if variable.name.trim().is_empty() {
            report.error(category, None, "Variable name is required");
        } else if !variable_names.insert(variable.name.as_str()) {
            report.error(
                category,
                Some(variable.name.as_str()),
                format!("Duplicate variable name: {}", variable.name),
            );
        }
    }
}

fn check_security(template: &Template, report: &mut ValidationReport) {
    let category = ValidationCategory::Security;

    if template.allowed_roles.iter().all(|r| r.trim().is_empty()) {
        report.error(
            category,
            Some("allowed_roles"),
            "Template must specify allowed roles",
        );
    }

    for (_, field) in template.fields() {
        if field.field_type.is_phi() && !field.is_encrypted {
            report.error(
                category,
                Some(field.name.as_str()),
                format!("PHI field must be encrypted: {}", field.name),
            );
        }
    }
}
