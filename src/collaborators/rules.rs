//! Decision-support rule engine contract

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::CollaboratorError;

/// A decision-support rule as seen by the template engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalRule {
    pub id: u64,
    pub name: String,
    pub is_active: bool,
}

/// Outcome of evaluating a rule for an encounter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub rule_id: u64,
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Query contract of the rule engine; rule logic itself lives elsewhere
#[async_trait]
pub trait RuleEngine: Send + Sync {
    async fn get_rule(&self, id: u64) -> Result<Option<ClinicalRule>, CollaboratorError>;

    async fn evaluate_rule(
        &self,
        id: u64,
        encounter_id: &str,
    ) -> Result<RuleEvaluation, CollaboratorError>;
}

/// Rules held in memory with fixed per-encounter outcomes.
///
/// Evaluations default to valid unless an outcome was recorded.
#[derive(Default)]
pub struct InMemoryRuleEngine {
    rules: DashMap<u64, ClinicalRule>,
    outcomes: DashMap<(u64, String), bool>,
}

impl InMemoryRuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, rule: ClinicalRule) {
        self.rules.insert(rule.id, rule);
    }

    pub fn set_outcome(&self, rule_id: u64, encounter_id: impl Into<String>, is_valid: bool) {
        self.outcomes.insert((rule_id, encounter_id.into()), is_valid);
    }
}

#[async_trait]
impl RuleEngine for InMemoryRuleEngine {
    async fn get_rule(&self, id: u64) -> Result<Option<ClinicalRule>, CollaboratorError> {
        Ok(self.rules.get(&id).map(|r| r.clone()))
    }

    async fn evaluate_rule(
        &self,
        id: u64,
        encounter_id: &str,
    ) -> Result<RuleEvaluation, CollaboratorError> {
        if !self.rules.contains_key(&id) {
            return Err(CollaboratorError::Failed(format!("unknown rule {}", id)));
        }

        let is_valid = self
            .outcomes
            .get(&(id, encounter_id.to_string()))
            .map(|v| *v)
            .unwrap_or(true);

        Ok(RuleEvaluation {
            rule_id: id,
            is_valid,
            message: None,
        })
    }
}
