//! Variable resolution.
//!
//! Resolution order, first hit wins:
//! 1. live cache entry (variables with caching enabled)
//! 2. a literal value for the name in the render context
//! 3. the variable definition: undefined names resolve to `""`
//! 4. dispatch on the variable source
//!
//! Source failures never propagate. They are logged and the variable falls
//! back to its default value.
//!
//! Cache entries are scoped to what produced them. Static values are shared
//! by every render of a template version. Values read from an external or
//! clinical source are keyed by encounter and are not cached at all without
//! an `EncounterId`. Values taken straight from the request (context paths
//! and inline clinical snapshots) are never cached.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use uuid::Uuid;

use crate::collaborators::{
    with_timeout, AccessorRegistry, ClinicalContextProvider, ClinicalSnapshot, CollaboratorError,
};
use crate::metrics::ResolverMetrics;
use crate::template::context::{encounter_id, lookup, value_to_text, CLINICAL_SNAPSHOT_KEY};
use crate::template::{
    ClinicalMapping, ExternalSource, RenderContext, SourceKind, Template, TemplateError,
    TemplateResult, Variable, VariableSource, DEFAULT_CACHE_SECONDS,
};

use super::cache::{CacheStats, VariableCache};
use super::rules::check_rule;

/// Resolver tuning
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Deadline for each external or clinical lookup
    pub accessor_timeout: Duration,
    /// TTL for cached variables that do not declare one
    pub default_cache_ttl_seconds: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            accessor_timeout: Duration::from_secs(2),
            default_cache_ttl_seconds: DEFAULT_CACHE_SECONDS,
        }
    }
}

/// The variables visible to a resolve call, identified by template version
#[derive(Debug, Clone, Copy)]
pub struct VariableScope<'a> {
    pub template_id: Uuid,
    pub version: u32,
    pub variables: &'a [Variable],
}

impl<'a> VariableScope<'a> {
    pub fn of(template: &'a Template) -> Self {
        Self {
            template_id: template.id,
            version: template.version,
            variables: &template.variables,
        }
    }

    pub fn variable(&self, name: &str) -> Option<&'a Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Common prefix of every cache key of this template version
    pub fn cache_prefix(&self) -> String {
        format!("variable:{}:v{}:", self.template_id, self.version)
    }

    /// Cache key for a variable resolved against `context`, or `None` when
    /// the value must not be cached
    pub fn cache_key(&self, variable: &Variable, context: &RenderContext) -> Option<String> {
        if !variable.enable_cache {
            return None;
        }

        let base = format!("{}{}", self.cache_prefix(), variable.name);
        match &variable.source {
            VariableSource::Static => Some(base),
            VariableSource::Context { .. } => None,
            VariableSource::Clinical { .. } if context.contains_key(CLINICAL_SNAPSHOT_KEY) => None,
            VariableSource::Database { .. }
            | VariableSource::Api { .. }
            | VariableSource::Function { .. }
            | VariableSource::Clinical { .. } => {
                encounter_id(context).map(|encounter| format!("{}@{}", base, encounter))
            }
        }
    }
}

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "source", rename_all = "snake_case")]
pub enum ResolutionSource {
    Cache,
    Context,
    /// The variable's source answered
    Source(SourceKind),
    /// The source failed and the default value was used
    Fallback(SourceKind),
    /// No such variable
    Undefined,
}

impl ResolutionSource {
    fn metric_label(&self) -> &'static str {
        match self {
            ResolutionSource::Cache => "cache",
            ResolutionSource::Context => "context",
            ResolutionSource::Source(kind) => kind.as_str(),
            ResolutionSource::Fallback(_) => "fallback",
            ResolutionSource::Undefined => "undefined",
        }
    }
}

/// A resolved value with its provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub value: String,
    pub source: ResolutionSource,
}

impl Resolution {
    /// Whether the placeholder should be reported as unresolved
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self.source,
            ResolutionSource::Undefined | ResolutionSource::Fallback(_)
        )
    }
}

/// Resolves template variables against a render context
#[derive(Clone)]
pub struct VariableResolver {
    cache: Arc<dyn VariableCache>,
    accessors: AccessorRegistry,
    clinical: Option<Arc<dyn ClinicalContextProvider>>,
    config: ResolverConfig,
}

impl VariableResolver {
    pub fn new(
        cache: Arc<dyn VariableCache>,
        accessors: AccessorRegistry,
        clinical: Option<Arc<dyn ClinicalContextProvider>>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            cache,
            accessors,
            clinical,
            config,
        }
    }

    /// Resolve a name to its value
    pub async fn resolve(
        &self,
        scope: VariableScope<'_>,
        name: &str,
        context: &RenderContext,
    ) -> String {
        self.resolve_detailed(scope, name, context).await.value
    }

    /// Resolve a name, reporting where the value came from
    pub async fn resolve_detailed(
        &self,
        scope: VariableScope<'_>,
        name: &str,
        context: &RenderContext,
    ) -> Resolution {
        let name = name.trim();
        let resolution = self.resolve_uncounted(scope, name, context).await;
        ResolverMetrics::record_resolution(resolution.source.metric_label());
        resolution
    }

    async fn resolve_uncounted(
        &self,
        scope: VariableScope<'_>,
        name: &str,
        context: &RenderContext,
    ) -> Resolution {
        let definition = scope.variable(name);

        let cache_key = definition.and_then(|v| scope.cache_key(v, context));

        if let Some(key) = &cache_key {
            if let Some(value) = self.cache.get(key).await {
                ResolverMetrics::record_cache_hit();
                return Resolution {
                    value,
                    source: ResolutionSource::Cache,
                };
            }
            ResolverMetrics::record_cache_miss();
        }

        if let Some(value) = context.get(name) {
            return Resolution {
                value: value_to_text(value),
                source: ResolutionSource::Context,
            };
        }

        let Some(variable) = definition else {
            tracing::warn!(
                template_id = %scope.template_id,
                variable = %name,
                "Undefined variable, rendering as empty"
            );
            return Resolution {
                value: String::new(),
                source: ResolutionSource::Undefined,
            };
        };

        let kind = variable.source.kind();
        match self.fetch(variable, context).await {
            Ok(value) => {
                if let Some(key) = &cache_key {
                    let ttl = variable.cache_ttl(self.config.default_cache_ttl_seconds);
                    self.cache.set(key, &value, ttl).await;
                }
                Resolution {
                    value,
                    source: ResolutionSource::Source(kind),
                }
            }
            Err(e) => {
                tracing::warn!(
                    template_id = %scope.template_id,
                    variable = %name,
                    source = %kind,
                    error = %e,
                    "Variable source failed, using default value"
                );
                ResolverMetrics::record_accessor_failure(kind.as_str());
                Resolution {
                    value: variable.fallback(),
                    source: ResolutionSource::Fallback(kind),
                }
            }
        }
    }

    async fn fetch(
        &self,
        variable: &Variable,
        context: &RenderContext,
    ) -> Result<String, CollaboratorError> {
        match &variable.source {
            VariableSource::Static => Ok(variable.fallback()),
            VariableSource::Context { path } => lookup(context, path)
                .map(value_to_text)
                .ok_or_else(|| CollaboratorError::MissingContext(path.clone())),
            VariableSource::Database { config } => {
                self.fetch_external(ExternalSource::Database, config, context)
                    .await
            }
            VariableSource::Api { config } => {
                self.fetch_external(ExternalSource::Api, config, context).await
            }
            VariableSource::Function { config } => {
                self.fetch_external(ExternalSource::Function, config, context)
                    .await
            }
            VariableSource::Clinical { mapping_path } => {
                self.fetch_clinical(*mapping_path, context).await
            }
        }
    }

    async fn fetch_external(
        &self,
        source: ExternalSource,
        config: &serde_json::Value,
        context: &RenderContext,
    ) -> Result<String, CollaboratorError> {
        let accessor = self
            .accessors
            .get(source)
            .ok_or_else(|| CollaboratorError::NotConfigured(SourceKind::from(source).to_string()))?;

        with_timeout(self.config.accessor_timeout, accessor.fetch(config, context)).await
    }

    /// An inline snapshot in the context wins over the provider
    async fn fetch_clinical(
        &self,
        mapping: ClinicalMapping,
        context: &RenderContext,
    ) -> Result<String, CollaboratorError> {
        let snapshot = match context.get(CLINICAL_SNAPSHOT_KEY) {
            Some(inline) => ClinicalSnapshot::from_context_value(inline)?,
            None => {
                let provider = self
                    .clinical
                    .as_ref()
                    .ok_or_else(|| CollaboratorError::NotConfigured("clinical".to_string()))?;
                let encounter = encounter_id(context)
                    .ok_or_else(|| CollaboratorError::MissingContext("EncounterId".to_string()))?;
                with_timeout(self.config.accessor_timeout, provider.snapshot(&encounter)).await?
            }
        };

        snapshot
            .render(mapping)
            .map_err(|e| CollaboratorError::Failed(e.to_string()))
    }

    /// Resolve every name concurrently. Failures degrade per name.
    pub async fn resolve_all(
        &self,
        scope: VariableScope<'_>,
        names: &[String],
        context: &RenderContext,
    ) -> BTreeMap<String, String> {
        let resolutions = join_all(
            names
                .iter()
                .map(|name| self.resolve(scope, name, context)),
        )
        .await;

        names
            .iter()
            .map(|name| name.trim().to_string())
            .zip(resolutions)
            .collect()
    }

    /// Apply a variable's declared rules to a candidate value.
    ///
    /// Returns the violations; an empty list means the value is acceptable.
    pub fn validate_variable(
        &self,
        scope: VariableScope<'_>,
        name: &str,
        value: &str,
    ) -> TemplateResult<Vec<String>> {
        let variable = scope
            .variable(name.trim())
            .ok_or_else(|| TemplateError::variable_not_found(name))?;

        if !variable.enable_validation {
            return Ok(Vec::new());
        }

        Ok(variable
            .validation_rules
            .iter()
            .filter_map(|rule| check_rule(rule, value))
            .collect())
    }

    /// Drop cached values for every variable of a template version, across all encounters
    pub async fn invalidate_scope(&self, scope: VariableScope<'_>) {
        self.cache.invalidate_prefix(&scope.cache_prefix()).await;
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }
}
