//! Pluggable accessors for database, api and function variable sources

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::template::{ExternalSource, RenderContext};

use super::CollaboratorError;

/// Fetches a variable value from an external system.
///
/// `config` is the variable's source configuration, passed through
/// untouched. Implementations are called under the resolver's timeout.
#[async_trait]
pub trait ExternalAccessor: Send + Sync {
    async fn fetch(
        &self,
        config: &serde_json::Value,
        context: &RenderContext,
    ) -> Result<String, CollaboratorError>;
}

/// Accessors by external source
#[derive(Clone, Default)]
pub struct AccessorRegistry {
    accessors: HashMap<ExternalSource, Arc<dyn ExternalAccessor>>,
}

impl AccessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the accessor for a source
    pub fn register(&mut self, source: ExternalSource, accessor: Arc<dyn ExternalAccessor>) {
        self.accessors.insert(source, accessor);
    }

    /// Builder-style registration
    pub fn with(mut self, source: ExternalSource, accessor: Arc<dyn ExternalAccessor>) -> Self {
        self.register(source, accessor);
        self
    }

    pub fn get(&self, source: ExternalSource) -> Option<&Arc<dyn ExternalAccessor>> {
        self.accessors.get(&source)
    }

    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}
