//! Clinical context and alert providers

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::template::ClinicalMapping;

use super::CollaboratorError;

/// Point-in-time clinical data for an encounter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalSnapshot {
    #[serde(default)]
    pub latest_vitals: Option<serde_json::Value>,

    #[serde(default)]
    pub active_medications: Vec<serde_json::Value>,

    #[serde(default)]
    pub active_problems: Vec<serde_json::Value>,
}

impl ClinicalSnapshot {
    /// Parse a snapshot supplied inline in a render context
    pub fn from_context_value(value: &serde_json::Value) -> Result<Self, CollaboratorError> {
        serde_json::from_value(value.clone())
            .map_err(|e| CollaboratorError::InvalidConfig(format!("clinical snapshot: {}", e)))
    }

    /// Serialize the part of the snapshot selected by `mapping`.
    ///
    /// Missing vitals render as an empty string; lists render as JSON arrays.
    pub fn render(&self, mapping: ClinicalMapping) -> Result<String, serde_json::Error> {
        match mapping {
            ClinicalMapping::VitalsLatest => match &self.latest_vitals {
                Some(vitals) => serde_json::to_string(vitals),
                None => Ok(String::new()),
            },
            ClinicalMapping::MedicationsActive => serde_json::to_string(&self.active_medications),
            ClinicalMapping::ProblemsActive => serde_json::to_string(&self.active_problems),
        }
    }
}

/// Supplies clinical snapshots keyed by encounter
#[async_trait]
pub trait ClinicalContextProvider: Send + Sync {
    async fn snapshot(&self, encounter_id: &str) -> Result<ClinicalSnapshot, CollaboratorError>;
}

/// A decision-support alert shown under a conditional section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalAlert {
    pub severity: String,
    pub message: String,
}

/// Supplies alerts for an encounter
#[async_trait]
pub trait AlertProvider: Send + Sync {
    async fn alerts_for_encounter(
        &self,
        encounter_id: &str,
    ) -> Result<Vec<ClinicalAlert>, CollaboratorError>;
}

/// In-memory clinical data, keyed by encounter id
#[derive(Default)]
pub struct InMemoryClinicalProvider {
    snapshots: DashMap<String, ClinicalSnapshot>,
    alerts: DashMap<String, Vec<ClinicalAlert>>,
}

impl InMemoryClinicalProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_snapshot(&self, encounter_id: impl Into<String>, snapshot: ClinicalSnapshot) {
        self.snapshots.insert(encounter_id.into(), snapshot);
    }

    pub fn insert_alert(&self, encounter_id: impl Into<String>, alert: ClinicalAlert) {
        self.alerts.entry(encounter_id.into()).or_default().push(alert);
    }
}

#[async_trait]
impl ClinicalContextProvider for InMemoryClinicalProvider {
    async fn snapshot(&self, encounter_id: &str) -> Result<ClinicalSnapshot, CollaboratorError> {
        self.snapshots
            .get(encounter_id)
            .map(|s| s.clone())
            .ok_or_else(|| CollaboratorError::Failed(format!("no snapshot for encounter {}", encounter_id)))
    }
}

#[async_trait]
impl AlertProvider for InMemoryClinicalProvider {
    async fn alerts_for_encounter(
        &self,
        encounter_id: &str,
    ) -> Result<Vec<ClinicalAlert>, CollaboratorError> {
        Ok(self
            .alerts
            .get(encounter_id)
            .map(|a| a.clone())
            .unwrap_or_default())
    }
}
