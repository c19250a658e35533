//! Template lifecycle management.
//!
//! `TemplateManager` is the single entry point for authoring, publishing and
//! rendering templates. It wires the repository, variable resolver, renderer
//! and validator together and enforces the versioning rules:
//!
//! - New templates start as a version 1 draft
//! - Drafts are edited in place; a write racing another write to the same row fails with `Conflict`
//! - Editing a published version forks a draft at `version + 1`
//! - Publishing requires a validation report with no errors
//! - Rendering reads the latest published version; previews read the latest draft

mod manager;

pub use manager::{EngineConfig, TemplateManager};
