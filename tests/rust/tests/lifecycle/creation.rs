//! Project creation saga

use pgmux_core::{DomainEvent, ProjectStatus, ServiceName};
use pgmux_router::lifecycle::{
    project_directories, CreateProjectRequest, LifecycleError, StepStatus, STEP_ACTIVATE,
    STEP_CONFIGURE_SERVICES, STEP_CREATE_DATABASE, STEP_CREATE_ROLE, STEP_INITIALIZE_SCHEMAS,
    STEP_REGISTER_POOL,
};
use pretty_assertions::assert_eq;
use tests::events::{count_of, drain};
use tests::harness::RouterHarness;
use tests::projects::active_project;

use super::WEBHOOKS_DDL;

#[tokio::test]
async fn test_create_project_end_to_end() {
    let h = RouterHarness::new();
    let mut rx = h.subscribe();

    let report = h
        .services
        .lifecycle
        .create_project(CreateProjectRequest::new("proj-1", "My Project").with_owner("user-1"))
        .await
        .unwrap();

    assert!(report.success(), "{:?}", report);
    assert!(report.failed_steps().is_empty());
    assert_eq!(h.projects.status_of("proj-1"), Some(ProjectStatus::Active));
    assert_eq!(
        h.admin.operations(),
        vec!["create_role:proj_1_user", "create_database:db_proj_1"]
    );
    assert!(h.services.registry.is_project_registered("proj-1"));
    for dir in project_directories("proj-1", &h.settings.data_path).unwrap() {
        assert!(dir.is_dir(), "{} missing", dir.display());
    }

    let config = h
        .services
        .service_manager
        .get_project_service_config("proj-1")
        .await
        .unwrap();
    assert_eq!(config.database_user, "proj_1_user");
    assert!(!config.using_fallback_credentials);

    let events = drain(&mut rx);
    assert_eq!(count_of(&events, "project_initialized"), 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, DomainEvent::ProjectCreated { project_ref } if project_ref == "proj-1")));
}

#[tokio::test]
async fn test_create_rejects_duplicates_and_bad_refs() {
    let h = RouterHarness::new();
    h.projects.insert(active_project("proj1"));

    let err = h
        .services
        .lifecycle
        .create_project(CreateProjectRequest::new("proj1", "again"))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::ProjectExists(ref r) if r == "proj1"));

    let err = h
        .services
        .lifecycle
        .create_project(CreateProjectRequest::new("../proj", "escape"))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidProjectRef(_)));
    assert!(h.admin.operations().is_empty());
}

#[tokio::test]
async fn test_schema_failure_compensates_newest_first() {
    let h = RouterHarness::new();
    h.driver.fail_sql_containing(WEBHOOKS_DDL);

    let report = h
        .services
        .lifecycle
        .create_project(CreateProjectRequest::new("proj1", "Doomed"))
        .await
        .unwrap();

    assert!(!report.success());
    assert_eq!(report.aborted_at.as_deref(), Some(STEP_INITIALIZE_SCHEMAS));
    assert_eq!(
        report.step(STEP_ACTIVATE).map(|s| s.status),
        Some(StepStatus::Skipped)
    );
    let compensated: Vec<&str> = report.compensations.iter().map(|c| c.step.as_str()).collect();
    assert_eq!(
        compensated,
        vec![STEP_REGISTER_POOL, STEP_CREATE_DATABASE, STEP_CREATE_ROLE]
    );
    assert_eq!(
        h.admin.operations(),
        vec![
            "create_role:proj1_user",
            "create_database:db_proj1",
            "drop_database:db_proj1",
            "drop_role:proj1_user",
        ]
    );

    // Partial schemas are dropped before the pool goes away
    let statements = h.driver.statements("db_proj1");
    assert!(statements.iter().any(|s| s == "DROP SCHEMA IF EXISTS auth CASCADE"));

    assert!(!h.services.registry.is_project_registered("proj1"));
    assert_eq!(h.driver.open_connections("db_proj1"), 0);
    assert_eq!(h.projects.status_of("proj1"), Some(ProjectStatus::Failed));
    assert!(h.services.service_manager.configured_projects().is_empty());
    for dir in project_directories("proj1", &h.settings.data_path).unwrap() {
        assert!(!dir.exists());
    }
}

#[tokio::test]
async fn test_role_failure_aborts_before_touching_the_cluster() {
    let h = RouterHarness::new();
    h.admin.fail("create_role");

    let report = h
        .services
        .lifecycle
        .create_project(CreateProjectRequest::new("proj1", "No role"))
        .await
        .unwrap();

    assert_eq!(report.aborted_at.as_deref(), Some(STEP_CREATE_ROLE));
    assert!(report.compensations.is_empty());
    assert_eq!(h.admin.operations(), vec!["create_role:proj1_user"]);
    assert_eq!(h.driver.connects(), 0);
    assert_eq!(h.projects.status_of("proj1"), Some(ProjectStatus::Failed));
}

#[tokio::test]
async fn test_service_failure_does_not_abort_creation() {
    let h = RouterHarness::new();
    h.client(ServiceName::Realtime).set_failing(true);

    let report = h
        .services
        .lifecycle
        .create_project(CreateProjectRequest::new("proj1", "Partial"))
        .await
        .unwrap();

    assert!(report.success());
    assert_eq!(report.failed_steps(), vec![STEP_CONFIGURE_SERVICES]);
    let error = report
        .step(STEP_CONFIGURE_SERVICES)
        .and_then(|s| s.error.clone())
        .unwrap_or_default();
    assert!(error.contains("realtime"), "{}", error);
    assert_eq!(h.projects.status_of("proj1"), Some(ProjectStatus::Active));
    assert_eq!(h.services.failures.len(), 1);
}

#[tokio::test]
async fn test_create_rejects_refs_that_derive_taken_names() {
    let h = RouterHarness::new();
    let report = h
        .services
        .lifecycle
        .create_project(CreateProjectRequest::new("a-b", "First"))
        .await
        .unwrap();
    assert!(report.success());
    let ops_before = h.admin.operations();

    for colliding in ["a_b", "A_B", "A-b"] {
        let err = h
            .services
            .lifecycle
            .create_project(CreateProjectRequest::new(colliding, "Second"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, LifecycleError::NameConflict { ref owner, .. } if owner == "a-b"),
            "{}: {:?}",
            colliding,
            err
        );
        assert!(!h.projects.contains(colliding));
    }
    assert_eq!(h.admin.operations(), ops_before);
}
