//! Permission gate contract.
//!
//! The engine asks before every mutating operation; enforcement (roles,
//! sharing) belongs to the host application.

use serde::Serialize;

use crate::template::Template;

/// Operations that are audited and permission-checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateAction {
    Create,
    Update,
    Fork,
    Publish,
    Deactivate,
    Import,
    Render,
}

impl TemplateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateAction::Create => "create",
            TemplateAction::Update => "update",
            TemplateAction::Fork => "fork",
            TemplateAction::Publish => "publish",
            TemplateAction::Deactivate => "deactivate",
            TemplateAction::Import => "import",
            TemplateAction::Render => "render",
        }
    }
}

pub trait AccessPolicy: Send + Sync {
    /// `template` is `None` for actions that create a new lineage
    fn can(&self, actor: &str, action: TemplateAction, template: Option<&Template>) -> bool;
}

/// Grants everything; used when the host enforces access upstream
pub struct AllowAllPolicy;

impl AccessPolicy for AllowAllPolicy {
    fn can(&self, _actor: &str, _action: TemplateAction, _template: Option<&Template>) -> bool {
        true
    }
}
