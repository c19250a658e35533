//! End-to-end tests of the template engine
//!
//! These tests drive `TemplateManager` with in-memory collaborators: no
//! Redis, no server startup.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;
use uuid::Uuid;

use clinical_template_service::collaborators::{
    AccessorRegistry, CollaboratorError, Collaborators, ExternalAccessor,
};
use clinical_template_service::lifecycle::{EngineConfig, TemplateManager};
use clinical_template_service::resolver::MemoryVariableCache;
use clinical_template_service::template::{
    CreateTemplateRequest, ExternalSource, InMemoryTemplateRepository, RenderContext, Template,
    TemplateError, TemplateFilter, TemplateRepository, TemplateResult, UpdateTemplateRequest,
};
use clinical_template_service::validation::{ValidationCategory, ValidationReport};

fn manager_with(collaborators: Collaborators) -> TemplateManager {
    TemplateManager::new(
        Arc::new(InMemoryTemplateRepository::new()),
        Arc::new(MemoryVariableCache::new()),
        collaborators,
        EngineConfig::default(),
    )
}

fn manager() -> TemplateManager {
    manager_with(Collaborators::default())
}

/// A progress note that passes every validation category
fn progress_note() -> Value {
    json!({
        "name": "Progress Note",
        "category": "Notes",
        "specialty": "Family Medicine",
        "purpose": "Progress Note",
        "allowed_roles": ["physician", "nurse_practitioner"],
        "sections": [
            {"name": "Greeting", "order_index": 0, "content": "Hello {{PatientName}}"},
            {"name": "Subjective", "order_index": 1, "fields": [
                {"name": "ChiefComplaint", "label": "Chief Complaint", "field_type": "textarea",
                 "order_index": 0, "is_required": true,
                 "validation_message": "Chief complaint is required"}
            ]},
            {"name": "Assessment and Plan", "order_index": 2, "fields": [
                {"name": "Assessment", "field_type": "textarea", "order_index": 0},
                {"name": "Plan", "field_type": "textarea", "order_index": 1}
            ]}
        ]
    })
}

fn request(body: Value) -> CreateTemplateRequest {
    serde_json::from_value(body).unwrap()
}

fn context(value: Value) -> RenderContext {
    value.as_object().cloned().unwrap()
}

async fn publish_refusal(manager: &TemplateManager, body: Value) -> ValidationReport {
    let created = manager.create_template(request(body), "author").await.unwrap();
    match manager.publish_template(created.id, "author").await {
        Err(TemplateError::ValidationFailed(report)) => {
            let stored = manager.get_template(created.id).await.unwrap();
            assert!(stored.is_draft(), "refused publish must not change the draft");
            report
        }
        other => panic!("expected publish to be refused, got {:?}", other),
    }
}

#[tokio::test]
async fn test_scenario_a_placeholder_substitution() {
    let manager = manager();
    let created = manager
        .create_template(request(progress_note()), "author")
        .await
        .unwrap();
    manager.publish_template(created.id, "author").await.unwrap();

    let document = manager
        .render_template(
            created.id,
            &context(json!({"PatientName": "Jane Doe"})),
            "clinician",
        )
        .await
        .unwrap();

    assert!(document.content.contains("Hello Jane Doe"));
    assert_eq!(document.section("Greeting").unwrap().content, "Hello Jane Doe");
}

#[tokio::test]
async fn test_scenario_b_unencrypted_ssn_blocks_publish() {
    let mut body = progress_note();
    body["sections"][1]["fields"]
        .as_array_mut()
        .unwrap()
        .push(json!({"name": "PatientSsn", "field_type": "SSN", "order_index": 1, "is_encrypted": false}));

    let report = publish_refusal(&manager(), body).await;

    assert_eq!(report.failing_categories(), vec![ValidationCategory::Security]);
    let errors = report.errors(ValidationCategory::Security);
    assert_eq!(errors[0].field.as_deref(), Some("PatientSsn"));
    assert!(errors[0].message.contains("PatientSsn"));
}

#[tokio::test]
async fn test_scenario_c_unmet_condition_excludes_section() {
    let mut body = progress_note();
    body["sections"].as_array_mut().unwrap().push(json!({
        "name": "Obstetric History",
        "order_index": 3,
        "has_conditions": true,
        "display_conditions": {"Gender": "F"},
        "content": "Gravida {{Gravida}}",
        "fields": [{"name": "LastMenstrualPeriod", "field_type": "date", "order_index": 0}]
    }));
    body["variables"] = json!([{"name": "Gravida", "default_value": "0"}]);

    let manager = manager();
    let created = manager.create_template(request(body), "author").await.unwrap();
    manager.publish_template(created.id, "author").await.unwrap();

    let male = manager
        .render_template(created.id, &context(json!({"Gender": "M"})), "clinician")
        .await
        .unwrap();
    assert!(male.section("Obstetric History").is_none());
    assert!(!male.content.contains("Obstetric History"));
    assert!(!male.content.contains("Gravida"));
    assert!(!male.content.contains("LastMenstrualPeriod"));

    let absent = manager
        .render_template(created.id, &RenderContext::new(), "clinician")
        .await
        .unwrap();
    assert!(absent.section("Obstetric History").is_none());

    let female = manager
        .render_template(created.id, &context(json!({"Gender": "F"})), "clinician")
        .await
        .unwrap();
    assert!(female.section("Obstetric History").is_some());
    assert!(female.content.contains("Gravida 0"));
}

#[tokio::test]
async fn test_publish_refused_for_each_category() {
    let manager = manager();

    let mut structure = progress_note();
    structure["category"] = json!("");

    let mut content = progress_note();
    content["sections"][0]["content"] = json!("Hello {{NotDeclared}}");

    let mut clinical = progress_note();
    clinical["sections"][2]["fields"].as_array_mut().unwrap().pop();

    let mut data_binding = progress_note();
    data_binding["sections"][0]["data_source"] = json!({"type": "database", "table": "encounters"});

    let mut security = progress_note();
    security["allowed_roles"] = json!([]);

    let cases = vec![
        (structure, ValidationCategory::Structure),
        (content, ValidationCategory::Content),
        (clinical, ValidationCategory::Clinical),
        (data_binding, ValidationCategory::DataBinding),
        (security, ValidationCategory::Security),
    ];

    for (body, category) in cases {
        let report = publish_refusal(&manager, body).await;
        assert_eq!(report.failing_categories(), vec![category], "{:?}", report);
    }
}

#[tokio::test]
async fn test_publish_succeeds_iff_validate_is_clean() {
    let manager = manager();
    let created = manager
        .create_template(request(progress_note()), "author")
        .await
        .unwrap();

    let report = tokio_test::assert_ok!(manager.validate_template(created.id).await);
    assert!(report.is_valid(), "{:?}", report);

    let published = tokio_test::assert_ok!(manager.publish_template(created.id, "author").await);
    assert!(published.is_published);
}

#[tokio::test]
async fn test_update_after_publish_forks_version() {
    let manager = manager();
    let created = manager
        .create_template(request(progress_note()), "author")
        .await
        .unwrap();
    let v1 = manager.publish_template(created.id, "author").await.unwrap();

    let v2 = manager
        .update_template(
            created.id,
            UpdateTemplateRequest {
                description: Some(Some("Revised".to_string())),
                ..Default::default()
            },
            "editor",
        )
        .await
        .unwrap();

    assert_eq!(v2.version, 2);
    assert!(v2.is_draft());
    assert_eq!(manager.get_version(created.id, 1).await.unwrap(), v1);

    // A second edit lands on the same draft
    let v2_again = manager
        .update_template(
            created.id,
            UpdateTemplateRequest {
                name: Some("Progress Note (revised)".to_string()),
                ..Default::default()
            },
            "editor",
        )
        .await
        .unwrap();
    assert_eq!(v2_again.version, 2);
    assert_eq!(v2_again.description.as_deref(), Some("Revised"));

    let versions = manager.list_versions(created.id).await.unwrap();
    assert_eq!(versions.len(), 2);
}

#[tokio::test]
async fn test_unknown_placeholder_is_empty_and_reported() {
    let manager = manager();
    let mut body = progress_note();
    body["sections"][0]["content"] = json!("Hello {{PatientName}}{{ Nickname }}!");
    let created = manager.create_template(request(body), "author").await.unwrap();

    let preview = manager
        .render_preview(created.id, &context(json!({"PatientName": "Jane"})), "author")
        .await
        .unwrap();

    assert!(preview.content.contains("Hello Jane!"));
    assert_eq!(preview.unresolved, vec!["Nickname".to_string()]);
}

#[tokio::test]
async fn test_render_is_idempotent() {
    let manager = manager();
    let created = manager
        .create_template(request(progress_note()), "author")
        .await
        .unwrap();
    manager.publish_template(created.id, "author").await.unwrap();
    let ctx = context(json!({"PatientName": "Jane Doe", "ChiefComplaint": "Headache"}));

    let first = manager.render_template(created.id, &ctx, "a").await.unwrap();
    let second = manager.render_template(created.id, &ctx, "a").await.unwrap();

    assert_eq!(first, second);
}

/// Returns whatever value the test currently stores
struct SwitchableAccessor {
    value: Mutex<String>,
}

#[async_trait]
impl ExternalAccessor for SwitchableAccessor {
    async fn fetch(&self, _config: &Value, _context: &RenderContext) -> Result<String, CollaboratorError> {
        Ok(self.value.lock().unwrap().clone())
    }
}

#[tokio::test(start_paused = true)]
async fn test_cached_variable_is_stale_within_ttl() {
    let accessor = Arc::new(SwitchableAccessor {
        value: Mutex::new("Clinic A".to_string()),
    });
    let manager = manager_with(Collaborators {
        accessors: AccessorRegistry::new().with(ExternalSource::Database, accessor.clone()),
        ..Collaborators::default()
    });

    let mut body = progress_note();
    body["sections"][0]["content"] = json!("Seen at {{Clinic}}");
    body["variables"] = json!([{
        "name": "Clinic",
        "source": {"type": "database", "config": {"table": "facilities", "field": "name"}},
        "enable_cache": true,
        "cache_duration_seconds": 60
    }]);
    let created = manager.create_template(request(body), "author").await.unwrap();
    manager.publish_template(created.id, "author").await.unwrap();

    let ctx = context(json!({"EncounterId": "enc-1"}));
    let section = |doc: clinical_template_service::render::RenderedDocument| {
        doc.section("Greeting").unwrap().content.clone()
    };

    let t0 = manager.render_template(created.id, &ctx, "clinician").await.unwrap();
    assert_eq!(section(t0), "Seen at Clinic A");

    *accessor.value.lock().unwrap() = "Clinic B".to_string();

    tokio::time::advance(Duration::from_secs(30)).await;
    let t30 = manager.render_template(created.id, &ctx, "clinician").await.unwrap();
    assert_eq!(section(t30), "Seen at Clinic A");

    tokio::time::advance(Duration::from_secs(31)).await;
    let t61 = manager.render_template(created.id, &ctx, "clinician").await.unwrap();
    assert_eq!(section(t61), "Seen at Clinic B");
}

#[tokio::test]
async fn test_broken_variable_does_not_fail_render() {
    let manager = manager();
    let mut body = progress_note();
    body["sections"][0]["content"] = json!("Hello {{PatientName}}, score {{Risk}}");
    body["variables"] = json!([{
        "name": "Risk",
        "source": {"type": "function", "config": {"function": "risk_score"}},
        "default_value": "n/a"
    }]);
    let created = manager.create_template(request(body), "author").await.unwrap();

    let preview = manager
        .render_preview(created.id, &context(json!({"PatientName": "Jane"})), "author")
        .await
        .unwrap();

    assert!(preview.content.contains("Hello Jane, score n/a"));
    assert_eq!(preview.unresolved, vec!["Risk".to_string()]);
}

#[tokio::test]
async fn test_resolve_all_variables_degrades_per_name() {
    let manager = manager();
    let mut body = progress_note();
    body["variables"] = json!([
        {"name": "Facility", "default_value": "General Hospital"},
        {"name": "Reason", "source": {"type": "context", "path": "visit.reason"}}
    ]);
    let created = manager.create_template(request(body), "author").await.unwrap();

    let values = manager
        .resolve_all_variables(
            created.id,
            &["Facility".to_string(), "Reason".to_string(), "Missing".to_string()],
            &context(json!({"visit": {"reason": "follow-up"}})),
        )
        .await
        .unwrap();

    assert_eq!(values["Facility"], "General Hospital");
    assert_eq!(values["Reason"], "follow-up");
    assert_eq!(values["Missing"], "");
}

/// Parks draft replacements until a published row has been written
struct PublishFirstRepository {
    inner: InMemoryTemplateRepository,
    draft_waiting: Notify,
    published: Notify,
}

impl PublishFirstRepository {
    fn new() -> Self {
        Self {
            inner: InMemoryTemplateRepository::new(),
            draft_waiting: Notify::new(),
            published: Notify::new(),
        }
    }
}

#[async_trait]
impl TemplateRepository for PublishFirstRepository {
    async fn insert(&self, template: Template) -> TemplateResult<()> {
        self.inner.insert(template).await
    }

    async fn replace(&self, expected: &Template, template: Template) -> TemplateResult<()> {
        if template.is_published {
            let result = self.inner.replace(expected, template).await;
            self.published.notify_one();
            return result;
        }
        self.draft_waiting.notify_one();
        self.published.notified().await;
        self.inner.replace(expected, template).await
    }

    async fn get(&self, id: Uuid, version: u32) -> TemplateResult<Option<Template>> {
        self.inner.get(id, version).await
    }

    async fn latest(&self, id: Uuid) -> TemplateResult<Option<Template>> {
        self.inner.latest(id).await
    }

    async fn latest_published(&self, id: Uuid) -> TemplateResult<Option<Template>> {
        self.inner.latest_published(id).await
    }

    async fn versions(&self, id: Uuid) -> TemplateResult<Vec<Template>> {
        self.inner.versions(id).await
    }

    async fn list(&self, filter: &TemplateFilter) -> TemplateResult<Vec<Template>> {
        self.inner.list(filter).await
    }

    async fn set_active(&self, id: Uuid, active: bool) -> TemplateResult<usize> {
        self.inner.set_active(id, active).await
    }
}

#[tokio::test]
async fn test_draft_edit_racing_publish_cannot_overwrite_published_row() {
    let repository = Arc::new(PublishFirstRepository::new());
    let manager = TemplateManager::new(
        repository.clone(),
        Arc::new(MemoryVariableCache::new()),
        Collaborators::default(),
        EngineConfig::default(),
    );
    let created = manager
        .create_template(request(progress_note()), "author")
        .await
        .unwrap();

    let edit = manager.update_template(
        created.id,
        UpdateTemplateRequest {
            description: Some(Some("edited concurrently".to_string())),
            ..Default::default()
        },
        "editor",
    );
    let publish = async {
        repository.draft_waiting.notified().await;
        manager.publish_template(created.id, "author").await
    };
    let (edited, published) = tokio::join!(edit, publish);

    let published = published.unwrap();
    assert!(published.is_published);
    assert!(
        matches!(edited, Err(TemplateError::Conflict(_))),
        "stale draft edit must be rejected, got {:?}",
        edited
    );

    let stored = manager.get_version(created.id, 1).await.unwrap();
    assert_eq!(stored, published);
    assert_eq!(stored.description, None);

    // Retrying the edit now forks a new draft
    let retried = manager
        .update_template(
            created.id,
            UpdateTemplateRequest {
                description: Some(Some("edited concurrently".to_string())),
                ..Default::default()
            },
            "editor",
        )
        .await
        .unwrap();
    assert_eq!(retried.version, 2);
    assert!(manager.get_version(created.id, 1).await.unwrap().is_published);
}

#[tokio::test]
async fn test_cached_clinical_variable_follows_the_encounter() {
    let manager = manager();
    let mut body = progress_note();
    body["sections"][0]["content"] = json!("Active medications: {{Meds}}");
    body["variables"] = json!([{
        "name": "Meds",
        "source": {"type": "clinical", "mapping_path": "medications.active"},
        "enable_cache": true,
        "cache_duration_seconds": 300
    }]);
    let created = manager.create_template(request(body), "author").await.unwrap();
    manager.publish_template(created.id, "author").await.unwrap();

    let first = manager
        .render_template(
            created.id,
            &context(json!({
                "EncounterId": "enc-A",
                "clinical": {"active_medications": ["warfarin"]}
            })),
            "clinician",
        )
        .await
        .unwrap();
    let second = manager
        .render_template(
            created.id,
            &context(json!({
                "EncounterId": "enc-B",
                "clinical": {"active_medications": ["insulin"]}
            })),
            "clinician",
        )
        .await
        .unwrap();

    let greeting = |doc: &clinical_template_service::render::RenderedDocument| {
        doc.section("Greeting").unwrap().content.clone()
    };
    assert_eq!(greeting(&first), r#"Active medications: ["warfarin"]"#);
    assert_eq!(greeting(&second), r#"Active medications: ["insulin"]"#);
    assert!(!second.content.contains("warfarin"));
}

#[tokio::test]
async fn test_deeply_nested_formula_is_refused_at_publish() {
    let mut body = progress_note();
    let formula = format!("{}1{}", "(".repeat(200), ")".repeat(200));
    body["sections"][2]["fields"].as_array_mut().unwrap().push(json!({
        "name": "Score", "field_type": "number", "order_index": 2,
        "is_calculated": true, "calculation_formula": formula
    }));

    let report = publish_refusal(&manager(), body).await;

    assert_eq!(report.failing_categories(), vec![ValidationCategory::DataBinding]);
    assert!(report.errors(ValidationCategory::DataBinding)[0]
        .message
        .contains("nests deeper"));
}
