//! Categorized validation results

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// The five independent validation categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCategory {
    Structure,
    Content,
    Clinical,
    DataBinding,
    Security,
}

impl ValidationCategory {
    pub const ALL: [ValidationCategory; 5] = [
        ValidationCategory::Structure,
        ValidationCategory::Content,
        ValidationCategory::Clinical,
        ValidationCategory::DataBinding,
        ValidationCategory::Security,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCategory::Structure => "structure",
            ValidationCategory::Content => "content",
            ValidationCategory::Clinical => "clinical",
            ValidationCategory::DataBinding => "data_binding",
            ValidationCategory::Security => "security",
        }
    }
}

impl fmt::Display for ValidationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    /// The offending field, section or attribute, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

/// Findings of one category
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

/// Validation outcome for a template.
///
/// Valid iff no category has errors. Warnings never block publishing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub categories: BTreeMap<ValidationCategory, CategoryReport>,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationReport {
    /// An empty report listing every category
    pub fn new() -> Self {
        Self {
            categories: ValidationCategory::ALL
                .iter()
                .map(|category| (*category, CategoryReport::default()))
                .collect(),
        }
    }

    pub fn error(
        &mut self,
        category: ValidationCategory,
        field: Option<&str>,
        message: impl Into<String>,
    ) {
        self.categories
            .entry(category)
            .or_default()
            .errors
            .push(issue(field, message));
    }

    pub fn warning(
        &mut self,
        category: ValidationCategory,
        field: Option<&str>,
        message: impl Into<String>,
    ) {
        self.categories
            .entry(category)
            .or_default()
            .warnings
            .push(issue(field, message));
    }

    pub fn errors(&self, category: ValidationCategory) -> &[ValidationIssue] {
        self.categories
            .get(&category)
            .map(|c| c.errors.as_slice())
            .unwrap_or_default()
    }

    pub fn warnings(&self, category: ValidationCategory) -> &[ValidationIssue] {
        self.categories
            .get(&category)
            .map(|c| c.warnings.as_slice())
            .unwrap_or_default()
    }

    pub fn error_count(&self) -> usize {
        self.categories.values().map(|c| c.errors.len()).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.categories.values().map(|c| c.warnings.len()).sum()
    }

    pub fn is_valid(&self) -> bool {
        self.error_count() == 0
    }

    /// Categories that have at least one error
    pub fn failing_categories(&self) -> Vec<ValidationCategory> {
        self.categories
            .iter()
            .filter(|(_, c)| !c.errors.is_empty())
            .map(|(category, _)| *category)
            .collect()
    }
}

fn issue(field: Option<&str>, message: impl Into<String>) -> ValidationIssue {
    ValidationIssue {
        field: field.map(str::to_string),
        message: message.into(),
    }
}
