//! Rendered document output

use serde::Serialize;
use uuid::Uuid;

use crate::collaborators::ClinicalAlert;
use crate::template::Field;

/// Constraint metadata carried next to a field value, enough for a client to
/// rebuild an editable control
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldMetadata {
    pub required: bool,
    pub read_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_message: Option<String>,
}

impl From<&Field> for FieldMetadata {
    fn from(field: &Field) -> Self {
        Self {
            required: field.is_required,
            read_only: field.is_read_only || field.is_calculated,
            min_length: field.constraints.min_length,
            max_length: field.constraints.max_length,
            min: field.constraints.min_value,
            max: field.constraints.max_value,
            pattern: field.constraints.pattern.clone(),
            placeholder: field.placeholder.clone(),
            options: field.options.clone(),
            validation_message: field.validation_message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedField {
    pub id: Uuid,
    pub name: String,
    pub label: String,
    pub field_type: String,
    pub value: String,
    pub constraints: FieldMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedSection {
    pub id: Uuid,
    pub name: String,
    /// Section content with placeholders substituted
    pub content: String,
    pub fields: Vec<RenderedField>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<ClinicalAlert>,
}

/// Output of a render: the text document plus its structured parts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedDocument {
    pub template_id: Uuid,
    pub version: u32,
    pub content: String,
    pub sections: Vec<RenderedSection>,
    /// Placeholder names that could not be resolved, in order of appearance
    pub unresolved: Vec<String>,
}

impl RenderedDocument {
    pub fn section(&self, name: &str) -> Option<&RenderedSection> {
        self.sections.iter().find(|s| s.name == name)
    }
}
