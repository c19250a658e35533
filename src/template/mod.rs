//! Clinical document templates.
//!
//! This module provides:
//! - The template aggregate: ordered sections, ordered fields and scoped variables
//! - `{{variable}}` placeholder scanning
//! - Render context helpers
//! - The template repository seam with an in-memory implementation
//!
//! # Example
//!
//! ```ignore
//! let request: CreateTemplateRequest = serde_json::from_value(json!({
//!     "name": "Progress Note",
//!     "category": "Notes",
//!     "specialty": "Internal Medicine",
//!     "sections": [{
//!         "name": "Subjective",
//!         "order_index": 0,
//!         "content": "Patient {{PatientName}} reports {{ChiefComplaint}}"
//!     }]
//! }))?;
//!
//! let template = manager.create_template(request, "dr.smith").await?;
//! ```

pub mod context;
pub mod placeholder;
mod store;
mod types;

pub use context::RenderContext;
pub use store::{create_template_repository, InMemoryTemplateRepository, TemplateRepository};
pub use types::{
    ClinicalMapping, CreateTemplateRequest, ExternalSource, Field, FieldConstraints, FieldType,
    Section, SourceKind, Template, TemplateError, TemplateFilter, TemplateListResponse,
    TemplateResult, TerminologyCodes, UpdateFieldRequest, UpdateSectionRequest,
    UpdateTemplateRequest, UpdateVariableRequest, ValidationRule, Variable, VariableSource,
    DEFAULT_CACHE_SECONDS,
};
