//! Fire-and-forget audit trail

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::TemplateAction;

/// A single audited action on a template
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub template_id: Uuid,
    pub version: u32,
    pub action: TemplateAction,
    pub actor: String,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(template_id: Uuid, version: u32, action: TemplateAction, actor: &str) -> Self {
        Self {
            template_id,
            version,
            action,
            actor: actor.to_string(),
            at: Utc::now(),
        }
    }
}

/// Receives audit events. Recording must not block or fail the caller.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes audit events as structured tracing events on the `audit` target
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            template_id = %event.template_id,
            version = event.version,
            action = event.action.as_str(),
            actor = %event.actor,
            at = %event.at,
            "Template audit event"
        );
    }
}
