//! Template aggregate types and error definitions

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::validation::ValidationReport;

/// Template-specific error type
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Template validation failed with {} error(s)", .0.error_count())]
    ValidationFailed(ValidationReport),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Template has no published version: {0}")]
    NotPublished(Uuid),

    #[error("Template is inactive: {0}")]
    Inactive(Uuid),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflicting concurrent change: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TemplateError {
    pub fn template_not_found(id: Uuid) -> Self {
        Self::NotFound {
            kind: "Template",
            id: id.to_string(),
        }
    }

    pub fn section_not_found(id: Uuid) -> Self {
        Self::NotFound {
            kind: "Section",
            id: id.to_string(),
        }
    }

    pub fn field_not_found(id: Uuid) -> Self {
        Self::NotFound {
            kind: "Field",
            id: id.to_string(),
        }
    }

    pub fn variable_not_found(name: &str) -> Self {
        Self::NotFound {
            kind: "Variable",
            id: name.to_string(),
        }
    }
}

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Default cache duration for variables that do not declare one
pub const DEFAULT_CACHE_SECONDS: u64 = 300;

// ============================================================================
// Template
// ============================================================================

/// A versioned clinical document blueprint.
///
/// A template lineage shares one `id`; each row is identified by
/// `(id, version)`. Published rows are never mutated: edits fork a new draft
/// row with `version + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Lineage identifier, stable across versions
    pub id: Uuid,

    /// Version number, starting at 1
    pub version: u32,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub specialty: String,

    /// Note type, e.g. "Progress Note"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    pub is_active: bool,

    pub is_published: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<DateTime<Utc>>,

    pub created_by: String,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer_content: Option<String>,

    #[serde(default)]
    pub requires_signature: bool,

    #[serde(default)]
    pub requires_co_sign: bool,

    #[serde(default)]
    pub enable_decision_support: bool,

    #[serde(default)]
    pub associated_rule_ids: Vec<u64>,

    #[serde(default)]
    pub allowed_roles: Vec<String>,

    #[serde(default)]
    pub sections: Vec<Section>,

    #[serde(default)]
    pub variables: Vec<Variable>,
}

impl Template {
    /// Whether this row can still be edited in place
    pub fn is_draft(&self) -> bool {
        !self.is_published
    }

    /// Sections sorted by `order_index`
    pub fn sections_in_order(&self) -> Vec<&Section> {
        let mut sections: Vec<&Section> = self.sections.iter().collect();
        sections.sort_by_key(|s| s.order_index);
        sections
    }

    /// Look up a declared variable by name
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn section(&self, section_id: Uuid) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == section_id)
    }

    pub fn section_mut(&mut self, section_id: Uuid) -> TemplateResult<&mut Section> {
        self.sections
            .iter_mut()
            .find(|s| s.id == section_id)
            .ok_or_else(|| TemplateError::section_not_found(section_id))
    }

    pub fn field_mut(&mut self, section_id: Uuid, field_id: Uuid) -> TemplateResult<&mut Field> {
        self.section_mut(section_id)?
            .fields
            .iter_mut()
            .find(|f| f.id == field_id)
            .ok_or_else(|| TemplateError::field_not_found(field_id))
    }

    pub fn variable_mut(&mut self, name: &str) -> TemplateResult<&mut Variable> {
        self.variables
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| TemplateError::variable_not_found(name))
    }

    /// Every field together with its owning section
    pub fn fields(&self) -> impl Iterator<Item = (&Section, &Field)> {
        self.sections
            .iter()
            .flat_map(|s| s.fields.iter().map(move |f| (s, f)))
    }

    /// Copy this row into the next draft version.
    pub fn fork_draft(&self, actor: &str) -> Template {
        let mut next = self.clone();
        next.version = self.version + 1;
        next.is_published = false;
        next.published_date = None;
        next.modified_by = Some(actor.to_string());
        next.modified_at = Some(Utc::now());
        next
    }

    /// Point every child back at its parent ids
    pub fn attach_children(&mut self) {
        let template_id = self.id;
        for section in &mut self.sections {
            section.template_id = template_id;
            let section_id = section.id;
            for field in &mut section.fields {
                field.section_id = section_id;
            }
        }
        for variable in &mut self.variables {
            variable.template_id = template_id;
        }
    }

    /// Give the template and all of its children fresh identifiers
    pub fn reassign_ids(&mut self) {
        self.id = Uuid::new_v4();
        for section in &mut self.sections {
            section.id = Uuid::new_v4();
            for field in &mut section.fields {
                field.id = Uuid::new_v4();
            }
        }
        for variable in &mut self.variables {
            variable.id = Uuid::new_v4();
        }
        self.attach_children();
    }
}

// ============================================================================
// Section & Field
// ============================================================================

/// A conditionally visible block of text and fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    #[serde(default = "Uuid::nil")]
    pub template_id: Uuid,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Position within the template, unique and non-negative
    pub order_index: i32,

    /// Text with `{{variable}}` placeholders
    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub has_conditions: bool,

    /// Declarative display condition (see [`crate::condition`])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_conditions: Option<serde_json::Value>,

    /// Data binding configuration, checked by the data-binding validator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<serde_json::Value>,

    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Section {
    /// A section is conditional when flagged or when it carries a condition
    pub fn is_conditional(&self) -> bool {
        self.has_conditions
            || self
                .display_conditions
                .as_ref()
                .is_some_and(|c| !c.is_null())
    }

    /// Fields sorted by `order_index`
    pub fn fields_in_order(&self) -> Vec<&Field> {
        let mut fields: Vec<&Field> = self.fields.iter().collect();
        fields.sort_by_key(|f| f.order_index);
        fields
    }
}

/// A single typed data-entry point within a section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    #[serde(default = "Uuid::nil")]
    pub section_id: Uuid,

    pub name: String,

    #[serde(default)]
    pub label: String,

    pub field_type: FieldType,

    /// Position within the section, unique and non-negative
    pub order_index: i32,

    #[serde(default)]
    pub is_required: bool,

    #[serde(default)]
    pub is_read_only: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,

    /// Choices for select and radio fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,

    #[serde(default)]
    pub constraints: FieldConstraints,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_condition: Option<serde_json::Value>,

    #[serde(default)]
    pub is_calculated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation_formula: Option<String>,

    #[serde(default)]
    pub terminology: TerminologyCodes,

    /// Mandatory for PHI-typed fields before publish
    #[serde(default)]
    pub is_encrypted: bool,
}

impl Field {
    /// Label shown to the reader, falling back to the field name
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }
}

/// Length, range and pattern constraints on a field value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Optional terminology bindings of a field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminologyCodes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snomed: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loinc: Option<String>,
}

/// Kind of input a field collects.
///
/// Parsed case-insensitively. Unknown names are kept as `Custom` so that the
/// content validator can report them instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Text,
    Textarea,
    Select,
    Radio,
    Checkbox,
    Date,
    Number,
    Ssn,
    Mrn,
    Dob,
    Address,
    Phone,
    Custom(String),
}

impl FieldType {
    /// Whether values of this type are Protected Health Information
    pub fn is_phi(&self) -> bool {
        matches!(
            self,
            FieldType::Ssn | FieldType::Mrn | FieldType::Dob | FieldType::Address | FieldType::Phone
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Text => "text",
            FieldType::Textarea => "textarea",
            FieldType::Select => "select",
            FieldType::Radio => "radio",
            FieldType::Checkbox => "checkbox",
            FieldType::Date => "date",
            FieldType::Number => "number",
            FieldType::Ssn => "SSN",
            FieldType::Mrn => "MRN",
            FieldType::Dob => "DOB",
            FieldType::Address => "Address",
            FieldType::Phone => "Phone",
            FieldType::Custom(name) => name,
        }
    }
}

impl From<String> for FieldType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => FieldType::Text,
            "textarea" => FieldType::Textarea,
            "select" => FieldType::Select,
            "radio" => FieldType::Radio,
            "checkbox" => FieldType::Checkbox,
            "date" => FieldType::Date,
            "number" => FieldType::Number,
            "ssn" => FieldType::Ssn,
            "mrn" => FieldType::Mrn,
            "dob" => FieldType::Dob,
            "address" => FieldType::Address,
            "phone" => FieldType::Phone,
            _ => FieldType::Custom(value.trim().to_string()),
        }
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Variable
// ============================================================================

/// A named, template-scoped placeholder resolved at render time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    #[serde(default = "Uuid::nil")]
    pub template_id: Uuid,

    /// Unique within the template
    pub name: String,

    #[serde(default)]
    pub source: VariableSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,

    #[serde(default)]
    pub enable_cache: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_duration_seconds: Option<u64>,

    #[serde(default)]
    pub enable_validation: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_rules: Vec<ValidationRule>,
}

impl Variable {
    /// Cache lifetime, never below one second
    pub fn cache_ttl(&self, default_seconds: u64) -> Duration {
        Duration::from_secs(self.cache_duration_seconds.unwrap_or(default_seconds).max(1))
    }

    pub fn fallback(&self) -> String {
        self.default_value.clone().unwrap_or_default()
    }
}

/// Where a variable's value comes from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VariableSource {
    /// The variable's default value
    #[default]
    Static,
    /// A dotted path into the render context
    Context { path: String },
    /// Delegated to the database accessor
    Database {
        #[serde(default)]
        config: serde_json::Value,
    },
    /// Delegated to the API accessor
    Api {
        #[serde(default)]
        config: serde_json::Value,
    },
    /// Delegated to the function accessor
    Function {
        #[serde(default)]
        config: serde_json::Value,
    },
    /// A fixed mapping into the clinical snapshot
    Clinical { mapping_path: ClinicalMapping },
}

impl VariableSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            VariableSource::Static => SourceKind::Static,
            VariableSource::Context { .. } => SourceKind::Context,
            VariableSource::Database { .. } => SourceKind::Database,
            VariableSource::Api { .. } => SourceKind::Api,
            VariableSource::Function { .. } => SourceKind::Function,
            VariableSource::Clinical { .. } => SourceKind::Clinical,
        }
    }
}

/// Fieldless discriminant of [`VariableSource`], used for logs and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Static,
    Context,
    Database,
    Api,
    Function,
    Clinical,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Static => "static",
            SourceKind::Context => "context",
            SourceKind::Database => "database",
            SourceKind::Api => "api",
            SourceKind::Function => "function",
            SourceKind::Clinical => "clinical",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sources served by pluggable external accessors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalSource {
    Database,
    Api,
    Function,
}

impl From<ExternalSource> for SourceKind {
    fn from(value: ExternalSource) -> Self {
        match value {
            ExternalSource::Database => SourceKind::Database,
            ExternalSource::Api => SourceKind::Api,
            ExternalSource::Function => SourceKind::Function,
        }
    }
}

/// Supported clinical snapshot mappings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClinicalMapping {
    #[serde(rename = "vitals.latest")]
    VitalsLatest,
    #[serde(rename = "medications.active")]
    MedicationsActive,
    #[serde(rename = "problems.active")]
    ProblemsActive,
}

/// Declared rule applied by `validate_variable`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationRule {
    Required,
    Regex {
        pattern: String,
    },
    Range {
        min: Option<f64>,
        max: Option<f64>,
    },
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
}

// ============================================================================
// Requests
// ============================================================================

/// Request to create a new template
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub specialty: String,

    #[serde(default)]
    pub purpose: Option<String>,

    #[serde(default)]
    pub header_content: Option<String>,

    #[serde(default)]
    pub footer_content: Option<String>,

    #[serde(default)]
    pub requires_signature: bool,

    #[serde(default)]
    pub requires_co_sign: bool,

    #[serde(default)]
    pub enable_decision_support: bool,

    #[serde(default)]
    pub associated_rule_ids: Vec<u64>,

    #[serde(default)]
    pub allowed_roles: Vec<String>,

    #[serde(default)]
    pub sections: Vec<Section>,

    #[serde(default)]
    pub variables: Vec<Variable>,
}

impl CreateTemplateRequest {
    /// Build the first draft row of a new lineage
    pub fn into_template(self, actor: &str) -> Template {
        let mut template = Template {
            id: Uuid::new_v4(),
            version: 1,
            name: self.name,
            description: self.description,
            category: self.category,
            specialty: self.specialty,
            purpose: self.purpose,
            is_active: true,
            is_published: false,
            published_date: None,
            created_by: actor.to_string(),
            created_at: Utc::now(),
            modified_by: None,
            modified_at: None,
            header_content: self.header_content,
            footer_content: self.footer_content,
            requires_signature: self.requires_signature,
            requires_co_sign: self.requires_co_sign,
            enable_decision_support: self.enable_decision_support,
            associated_rule_ids: self.associated_rule_ids,
            allowed_roles: self.allowed_roles,
            sections: self.sections,
            variables: self.variables,
        };
        template.attach_children();
        template
    }
}

/// Request to update an existing template. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTemplateRequest {
    pub name: Option<String>,

    /// Use null to clear
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,

    pub category: Option<String>,

    pub specialty: Option<String>,

    /// Use null to clear
    #[serde(default, deserialize_with = "double_option")]
    pub purpose: Option<Option<String>>,

    /// Use null to clear
    #[serde(default, deserialize_with = "double_option")]
    pub header_content: Option<Option<String>>,

    /// Use null to clear
    #[serde(default, deserialize_with = "double_option")]
    pub footer_content: Option<Option<String>>,

    pub requires_signature: Option<bool>,

    pub requires_co_sign: Option<bool>,

    pub enable_decision_support: Option<bool>,

    pub associated_rule_ids: Option<Vec<u64>>,

    pub allowed_roles: Option<Vec<String>>,

    /// Replaces the whole section list
    pub sections: Option<Vec<Section>>,

    /// Replaces the whole variable list
    pub variables: Option<Vec<Variable>>,
}

/// Partial update of one section. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSectionRequest {
    pub name: Option<String>,

    /// Use null to clear
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,

    pub order_index: Option<i32>,

    pub content: Option<String>,

    pub has_conditions: Option<bool>,

    /// Use null to clear
    #[serde(default, deserialize_with = "double_option")]
    pub display_conditions: Option<Option<serde_json::Value>>,

    /// Use null to clear
    #[serde(default, deserialize_with = "double_option")]
    pub data_source: Option<Option<serde_json::Value>>,

    /// Replaces the whole field list
    pub fields: Option<Vec<Field>>,
}

impl UpdateSectionRequest {
    pub fn apply_to(self, section: &mut Section) {
        if let Some(name) = self.name {
            section.name = name;
        }
        if let Some(description) = self.description {
            section.description = description;
        }
        if let Some(order_index) = self.order_index {
            section.order_index = order_index;
        }
        if let Some(content) = self.content {
            section.content = content;
        }
        if let Some(has_conditions) = self.has_conditions {
            section.has_conditions = has_conditions;
        }
        if let Some(conditions) = self.display_conditions {
            section.display_conditions = conditions;
        }
        if let Some(data_source) = self.data_source {
            section.data_source = data_source;
        }
        if let Some(fields) = self.fields {
            section.fields = fields;
        }
    }
}

/// Partial update of one field. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateFieldRequest {
    pub name: Option<String>,

    pub label: Option<String>,

    pub field_type: Option<FieldType>,

    pub order_index: Option<i32>,

    pub is_required: Option<bool>,

    pub is_read_only: Option<bool>,

    /// Use null to clear
    #[serde(default, deserialize_with = "double_option")]
    pub default_value: Option<Option<String>>,

    /// Use null to clear
    #[serde(default, deserialize_with = "double_option")]
    pub placeholder: Option<Option<String>>,

    pub options: Option<Vec<String>>,

    pub constraints: Option<FieldConstraints>,

    /// Use null to clear
    #[serde(default, deserialize_with = "double_option")]
    pub validation_message: Option<Option<String>>,

    /// Use null to clear
    #[serde(default, deserialize_with = "double_option")]
    pub display_condition: Option<Option<serde_json::Value>>,

    pub is_calculated: Option<bool>,

    /// Use null to clear
    #[serde(default, deserialize_with = "double_option")]
    pub calculation_formula: Option<Option<String>>,

    pub terminology: Option<TerminologyCodes>,

    pub is_encrypted: Option<bool>,
}

impl UpdateFieldRequest {
    pub fn apply_to(self, field: &mut Field) {
        if let Some(name) = self.name {
            field.name = name;
        }
        if let Some(label) = self.label {
            field.label = label;
        }
        if let Some(field_type) = self.field_type {
            field.field_type = field_type;
        }
        if let Some(order_index) = self.order_index {
            field.order_index = order_index;
        }
        if let Some(is_required) = self.is_required {
            field.is_required = is_required;
        }
        if let Some(is_read_only) = self.is_read_only {
            field.is_read_only = is_read_only;
        }
        if let Some(default_value) = self.default_value {
            field.default_value = default_value;
        }
        if let Some(placeholder) = self.placeholder {
            field.placeholder = placeholder;
        }
        if let Some(options) = self.options {
            field.options = options;
        }
        if let Some(constraints) = self.constraints {
            field.constraints = constraints;
        }
        if let Some(message) = self.validation_message {
            field.validation_message = message;
        }
        if let Some(condition) = self.display_condition {
            field.display_condition = condition;
        }
        if let Some(is_calculated) = self.is_calculated {
            field.is_calculated = is_calculated;
        }
        if let Some(formula) = self.calculation_formula {
            field.calculation_formula = formula;
        }
        if let Some(terminology) = self.terminology {
            field.terminology = terminology;
        }
        if let Some(is_encrypted) = self.is_encrypted {
            field.is_encrypted = is_encrypted;
        }
    }
}

/// Partial update of one variable. The name is the variable's key and
/// cannot be changed here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateVariableRequest {
    pub source: Option<VariableSource>,

    /// Use null to clear
    #[serde(default, deserialize_with = "double_option")]
    pub default_value: Option<Option<String>>,

    pub enable_cache: Option<bool>,

    /// Use null to clear
    #[serde(default, deserialize_with = "double_option")]
    pub cache_duration_seconds: Option<Option<u64>>,

    pub enable_validation: Option<bool>,

    pub validation_rules: Option<Vec<ValidationRule>>,
}

impl UpdateVariableRequest {
    pub fn apply_to(self, variable: &mut Variable) {
        if let Some(source) = self.source {
            variable.source = source;
        }
        if let Some(default_value) = self.default_value {
            variable.default_value = default_value;
        }
        if let Some(enable_cache) = self.enable_cache {
            variable.enable_cache = enable_cache;
        }
        if let Some(seconds) = self.cache_duration_seconds {
            variable.cache_duration_seconds = seconds;
        }
        if let Some(enable_validation) = self.enable_validation {
            variable.enable_validation = enable_validation;
        }
        if let Some(rules) = self.validation_rules {
            variable.validation_rules = rules;
        }
    }
}

/// Keep an explicit `null` distinct from an absent key
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UpdateTemplateRequest {
    pub fn apply_to(self, template: &mut Template) {
        if let Some(name) = self.name {
            template.name = name;
        }
        if let Some(description) = self.description {
            template.description = description;
        }
        if let Some(category) = self.category {
            template.category = category;
        }
        if let Some(specialty) = self.specialty {
            template.specialty = specialty;
        }
        if let Some(purpose) = self.purpose {
            template.purpose = purpose;
        }
        if let Some(header) = self.header_content {
            template.header_content = header;
        }
        if let Some(footer) = self.footer_content {
            template.footer_content = footer;
        }
        if let Some(requires_signature) = self.requires_signature {
            template.requires_signature = requires_signature;
        }
        if let Some(requires_co_sign) = self.requires_co_sign {
            template.requires_co_sign = requires_co_sign;
        }
        if let Some(enable) = self.enable_decision_support {
            template.enable_decision_support = enable;
        }
        if let Some(rule_ids) = self.associated_rule_ids {
            template.associated_rule_ids = rule_ids;
        }
        if let Some(roles) = self.allowed_roles {
            template.allowed_roles = roles;
        }
        if let Some(sections) = self.sections {
            template.sections = sections;
        }
        if let Some(variables) = self.variables {
            template.variables = variables;
        }
    }
}

/// Filter for listing templates
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateFilter {
    pub category: Option<String>,

    pub specialty: Option<String>,

    #[serde(default)]
    pub active_only: bool,

    #[serde(default)]
    pub published_only: bool,
}

impl TemplateFilter {
    pub fn matches(&self, template: &Template) -> bool {
        if let Some(category) = &self.category {
            if !template.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if let Some(specialty) = &self.specialty {
            if !template.specialty.eq_ignore_ascii_case(specialty) {
                return false;
            }
        }
        if self.active_only && !template.is_active {
            return false;
        }
        if self.published_only && !template.is_published {
            return false;
        }
        true
    }
}

/// Response for listing templates
#[derive(Debug, Serialize)]
pub struct TemplateListResponse {
    pub templates: Vec<Template>,

    pub total: usize,
}
