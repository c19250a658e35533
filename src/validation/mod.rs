//! Template validation.
//!
//! `TemplateValidator::validate` runs five independent categories and
//! returns a `ValidationReport`. A template may be published only when the
//! report has no errors; warnings are informational.
//!
//! | Category       | Checks                                                        |
//! |----------------|---------------------------------------------------------------|
//! | `Structure`    | name/category/specialty, ≥1 section, order index invariants   |
//! | `Content`      | placeholders declared or built-in, field types, messages       |
//! | `Clinical`     | purpose-specific required fields, rule ids, terminology codes |
//! | `DataBinding`  | section data sources, calculated field formulas               |
//! | `Security`     | allowed roles, encryption of PHI-typed fields                 |

mod report;
mod validator;

pub use report::{CategoryReport, ValidationCategory, ValidationIssue, ValidationReport};
pub use validator::{RequiredFieldSet, TemplateValidator, ValidationConfig};
