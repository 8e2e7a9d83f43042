//! Project deletion saga

use pgmux_core::pooling::keys;
use pgmux_core::{DomainEvent, ProjectStatus};
use pgmux_router::lifecycle::{
    project_directories, CreateProjectRequest, LifecycleError, StepStatus, STEP_DELETE_RECORD,
    STEP_DROP_DATABASE, STEP_DROP_ROLE,
};
use pretty_assertions::assert_eq;
use tests::events::drain;
use tests::harness::RouterHarness;
use tests::projects::{active_project, legacy_project};

async fn created(h: &RouterHarness, project_ref: &str) {
    let report = h
        .services
        .lifecycle
        .create_project(CreateProjectRequest::new(project_ref, "Doomed"))
        .await
        .unwrap();
    assert!(report.success());
}

#[tokio::test]
async fn test_delete_removes_every_resource() {
    let h = RouterHarness::new();
    created(&h, "proj1").await;
    let mut rx = h.subscribe();

    let report = h.services.lifecycle.delete_project("proj1").await.unwrap();

    assert!(report.success(), "{:?}", report);
    assert!(report.failed_steps().is_empty());
    assert!(!h.projects.contains("proj1"));
    assert!(!h.services.registry.is_project_registered("proj1"));
    assert_eq!(h.driver.open_connections("db_proj1"), 0);
    assert!(h.services.service_manager.configured_projects().is_empty());
    for dir in project_directories("proj1", &h.settings.data_path).unwrap() {
        assert!(!dir.exists(), "{} left behind", dir.display());
    }
    let ops = h.admin.operations();
    assert!(ops.contains(&"drop_role:proj1_user".to_string()));
    assert!(ops.contains(&"drop_database:db_proj1".to_string()));

    let invalidated = h.cache.keys();
    assert!(invalidated.contains(&keys::unified("proj1").configuration));
    assert!(invalidated.contains(&keys::legacy_configuration("proj1")));

    let deleted = drain(&mut rx).into_iter().find_map(|e| match e {
        DomainEvent::ProjectDeleted { project_ref, failed_steps } => Some((project_ref, failed_steps)),
        _ => None,
    });
    assert_eq!(deleted, Some(("proj1".to_string(), Vec::new())));
}

#[tokio::test]
async fn test_delete_continues_past_failed_steps() {
    let h = RouterHarness::new();
    created(&h, "proj1").await;
    h.admin.fail("drop_role");
    h.admin.fail("drop_database");

    let report = h.services.lifecycle.delete_project("proj1").await.unwrap();

    assert!(report.success());
    assert_eq!(report.failed_steps(), vec![STEP_DROP_ROLE, STEP_DROP_DATABASE]);
    assert_eq!(
        report.step(STEP_DELETE_RECORD).map(|s| s.status),
        Some(StepStatus::Succeeded)
    );
    assert!(!h.projects.contains("proj1"));
    assert!(!h.services.registry.is_project_registered("proj1"));

    let failures = report.failures();
    assert_eq!(failures.len(), 2);
    assert!(failures
        .iter()
        .all(|f| matches!(f, LifecycleError::TeardownStepFailure { .. })));
}

#[tokio::test]
async fn test_record_failure_fails_the_deletion() {
    let h = RouterHarness::new();
    created(&h, "proj1").await;
    h.projects.set_fail_deletes(true);
    let mut rx = h.subscribe();
    h.cache.clear();

    let report = h.services.lifecycle.delete_project("proj1").await.unwrap();

    assert!(!report.success());
    assert_eq!(report.aborted_at.as_deref(), Some(STEP_DELETE_RECORD));
    assert!(h.projects.contains("proj1"));
    assert_eq!(h.projects.status_of("proj1"), Some(ProjectStatus::Deleting));
    assert!(h.cache.keys().is_empty());
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, DomainEvent::ProjectDeleted { .. })));
}

#[tokio::test]
async fn test_delete_unknown_project() {
    let h = RouterHarness::new();

    let err = h.services.lifecycle.delete_project("ghost").await.unwrap_err();

    assert!(matches!(err, LifecycleError::ProjectNotFound(ref r) if r == "ghost"));
    assert!(h.admin.operations().is_empty());
}

#[tokio::test]
async fn test_legacy_project_keeps_the_shared_role() {
    let h = RouterHarness::new();
    h.projects.insert(legacy_project("old"));

    let report = h.services.lifecycle.delete_project("old").await.unwrap();

    assert!(report.success());
    assert_eq!(h.admin.operations(), vec!["drop_database:db_old"]);
}

#[tokio::test]
async fn test_delete_without_pool_or_directories() {
    let h = RouterHarness::new();
    h.projects.insert(tests::projects::active_project("cold"));

    let report = h.services.lifecycle.delete_project("cold").await.unwrap();

    assert!(report.success());
    assert!(report.failed_steps().is_empty());
}

#[tokio::test]
async fn test_delete_keeps_resources_owned_by_another_project() {
    let h = RouterHarness::new();
    created(&h, "a-b").await;
    // A record left over from before names were checked for collisions
    h.projects
        .insert(active_project("a_b").with_status(ProjectStatus::Failed));
    let ops_before = h.admin.operations();

    let report = h.services.lifecycle.delete_project("a_b").await.unwrap();

    assert!(report.success());
    assert_eq!(h.admin.operations(), ops_before);
    assert!(!h.projects.contains("a_b"));
    assert!(h.projects.contains("a-b"));
    assert!(h.services.registry.is_project_registered("a-b"));
}
