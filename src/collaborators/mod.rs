//! External collaborators consumed by the template engine.
//!
//! Everything the engine needs from the rest of the system goes through one
//! of these seams:
//!
//! - `ExternalAccessor` / `AccessorRegistry`: database, api and function variable sources
//! - `ClinicalContextProvider`: vitals, medications and problems snapshots
//! - `RuleEngine`: decision-support rule lookup and evaluation
//! - `TerminologyChecker`: SNOMED CT / LOINC code validity
//! - `AlertProvider`: clinical alerts appended to conditional sections
//! - `FormulaEvaluator`: calculated field values
//! - `AuditSink`: fire-and-forget audit trail
//! - `AccessPolicy`: permission gate enforced by the host
//! - `UsageLog`: per-template usage entries behind the usage statistics
//!
//! In-process defaults are provided for development and tests.

mod access;
mod accessor;
mod audit;
mod clinical;
mod rules;
mod terminology;
mod usage;

pub use access::{AccessPolicy, AllowAllPolicy, TemplateAction};
pub use accessor::{AccessorRegistry, ExternalAccessor};
pub use audit::{AuditEvent, AuditSink, TracingAuditSink};
pub use clinical::{
    AlertProvider, ClinicalAlert, ClinicalContextProvider, ClinicalSnapshot,
    InMemoryClinicalProvider,
};
pub use rules::{ClinicalRule, InMemoryRuleEngine, RuleEngine, RuleEvaluation};
pub use terminology::{CodeSystem, FormatTerminologyChecker, TerminologyChecker};
pub use usage::{InMemoryUsageLog, UsageEntry, UsageLog, UsageStatistics};

pub use crate::render::formula::{ArithmeticFormulaEvaluator, FormulaError, FormulaEvaluator};

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors reported by external collaborators
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CollaboratorError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("No collaborator configured for {0}")]
    NotConfigured(String),

    #[error("Missing context value: {0}")]
    MissingContext(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Collaborator failed: {0}")]
    Failed(String),
}

/// Run a collaborator future with a deadline
pub async fn with_timeout<T, F>(limit: Duration, future: F) -> Result<T, CollaboratorError>
where
    F: std::future::Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout(limit)),
    }
}

/// The full set of collaborators handed to the engine
#[derive(Clone)]
pub struct Collaborators {
    pub accessors: AccessorRegistry,
    pub clinical: Option<Arc<dyn ClinicalContextProvider>>,
    pub rules: Arc<dyn RuleEngine>,
    pub terminology: Arc<dyn TerminologyChecker>,
    pub alerts: Option<Arc<dyn AlertProvider>>,
    pub formulas: Arc<dyn FormulaEvaluator>,
    pub audit: Arc<dyn AuditSink>,
    pub access: Arc<dyn AccessPolicy>,
    pub usage: Arc<dyn UsageLog>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            accessors: AccessorRegistry::new(),
            clinical: None,
            rules: Arc::new(InMemoryRuleEngine::new()),
            terminology: Arc::new(FormatTerminologyChecker),
            alerts: None,
            formulas: Arc::new(ArithmeticFormulaEvaluator),
            audit: Arc::new(TracingAuditSink),
            access: Arc::new(AllowAllPolicy),
            usage: Arc::new(InMemoryUsageLog::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_expires() {
        let result: Result<(), _> = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert_eq!(result, Err(CollaboratorError::Timeout(Duration::from_millis(50))));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let result = with_timeout(Duration::from_secs(1), async {
            Err::<(), _>(CollaboratorError::Failed("boom".to_string()))
        })
        .await;

        assert_eq!(result, Err(CollaboratorError::Failed("boom".to_string())));
    }
}
