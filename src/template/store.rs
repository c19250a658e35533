//! Template persistence seam and the in-memory repository

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::types::{Template, TemplateError, TemplateFilter, TemplateResult};

/// Storage for template rows keyed by `(id, version)`.
///
/// Writes are conditional. A row is only created where none exists and only
/// replaced while it still equals the copy the caller read, so two writers
/// racing on the same row cannot both succeed.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Create the row `(template.id, template.version)`.
    ///
    /// Fails with [`TemplateError::Conflict`] if that row already exists.
    async fn insert(&self, template: Template) -> TemplateResult<()>;

    /// Replace the row `(expected.id, expected.version)` with `template`.
    ///
    /// Fails with [`TemplateError::Conflict`] unless the stored row is still
    /// equal to `expected`.
    async fn replace(&self, expected: &Template, template: Template) -> TemplateResult<()>;

    /// Load one specific version
    async fn get(&self, id: Uuid, version: u32) -> TemplateResult<Option<Template>>;

    /// Load the highest version of a lineage
    async fn latest(&self, id: Uuid) -> TemplateResult<Option<Template>>;

    /// Load the highest published version of a lineage
    async fn latest_published(&self, id: Uuid) -> TemplateResult<Option<Template>>;

    /// All versions of a lineage, oldest first
    async fn versions(&self, id: Uuid) -> TemplateResult<Vec<Template>>;

    /// Latest row of every lineage matching the filter.
    ///
    /// With `published_only`, the latest published row of each lineage is
    /// considered instead.
    async fn list(&self, filter: &TemplateFilter) -> TemplateResult<Vec<Template>>;

    /// Set `is_active` on every version of a lineage, returning the number of rows touched
    async fn set_active(&self, id: Uuid, active: bool) -> TemplateResult<usize>;
}

/// In-memory template repository
pub struct InMemoryTemplateRepository {
    templates: DashMap<Uuid, BTreeMap<u32, Template>>,
}

impl Default for InMemoryTemplateRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTemplateRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
        }
    }

    /// Number of lineages stored
    pub fn count(&self) -> usize {
        self.templates.len()
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn insert(&self, template: Template) -> TemplateResult<()> {
        let mut versions = self.templates.entry(template.id).or_default();
        if versions.contains_key(&template.version) {
            return Err(TemplateError::Conflict(format!(
                "version {} of template {} already exists",
                template.version, template.id
            )));
        }
        versions.insert(template.version, template);
        Ok(())
    }

    async fn replace(&self, expected: &Template, template: Template) -> TemplateResult<()> {
        if expected.id != template.id || expected.version != template.version {
            return Err(TemplateError::Conflict(
                "replacement must keep the row key".to_string(),
            ));
        }

        let mut versions = self.templates.entry(template.id).or_default();
        match versions.get_mut(&template.version) {
            Some(stored) if stored == expected => {
                *stored = template;
                Ok(())
            }
            Some(_) => Err(TemplateError::Conflict(format!(
                "version {} of template {} changed concurrently",
                template.version, template.id
            ))),
            None => Err(TemplateError::template_not_found(template.id)),
        }
    }

    async fn get(&self, id: Uuid, version: u32) -> TemplateResult<Option<Template>> {
        Ok(self
            .templates
            .get(&id)
            .and_then(|versions| versions.get(&version).cloned()))
    }

    async fn latest(&self, id: Uuid) -> TemplateResult<Option<Template>> {
        Ok(self
            .templates
            .get(&id)
            .and_then(|versions| versions.values().next_back().cloned()))
    }

    async fn latest_published(&self, id: Uuid) -> TemplateResult<Option<Template>> {
        Ok(self.templates.get(&id).and_then(|versions| {
            versions
                .values()
                .rev()
                .find(|t| t.is_published)
                .cloned()
        }))
    }

    async fn versions(&self, id: Uuid) -> TemplateResult<Vec<Template>> {
        Ok(self
            .templates
            .get(&id)
            .map(|versions| versions.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn list(&self, filter: &TemplateFilter) -> TemplateResult<Vec<Template>> {
        let mut templates: Vec<Template> = self
            .templates
            .iter()
            .filter_map(|entry| {
                let candidate = if filter.published_only {
                    entry.value().values().rev().find(|t| t.is_published)
                } else {
                    entry.value().values().next_back()
                };
                candidate.filter(|t| filter.matches(t)).cloned()
            })
            .collect();

        templates.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(templates)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> TemplateResult<usize> {
        let Some(mut versions) = self.templates.get_mut(&id) else {
            return Ok(0);
        };

        for template in versions.values_mut() {
            template.is_active = active;
        }
        Ok(versions.len())
    }
}

/// Create an Arc-wrapped in-memory repository
pub fn create_template_repository() -> Arc<dyn TemplateRepository> {
    Arc::new(InMemoryTemplateRepository::new())
}
