//! Document rendering.
//!
//! Sections are processed in `order_index` order. Conditional sections whose
//! condition fails are omitted entirely; visible sections get their
//! placeholders substituted, their fields rendered with constraint metadata
//! and, when an encounter is known, any clinical alerts appended.

mod document;
pub mod formula;
mod renderer;

pub use document::{FieldMetadata, RenderedDocument, RenderedField, RenderedSection};
pub use formula::{ArithmeticFormulaEvaluator, FormulaError, FormulaEvaluator};
pub use renderer::{RendererConfig, TemplateRenderer};
