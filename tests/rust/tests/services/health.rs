//! Health probes across configured projects

use pgmux_core::ServiceName;
use tests::projects::active_project;
use tests::MockProjectRepository;

use super::ManagerFixture;

fn two_projects() -> ManagerFixture {
    ManagerFixture::new(
        MockProjectRepository::new()
            .with_project(active_project("proj1"))
            .with_project(active_project("proj2")),
    )
}

#[tokio::test]
async fn test_healthy_when_every_probe_succeeds() {
    let fx = two_projects();
    fx.manager.configure_project_services("proj1").await;
    fx.manager.configure_project_services("proj2").await;

    let report = fx.manager.health_check(None).await;

    assert!(report.healthy);
    assert_eq!(report.projects.len(), 2);
    assert!(report.projects.iter().all(|p| p.services.len() == 4));
}

#[tokio::test]
async fn test_unhealthy_service_is_named() {
    let fx = two_projects();
    fx.manager.configure_project_services("proj1").await;
    fx.client(ServiceName::Realtime).set_unhealthy(true);

    let report = fx.manager.health_check(Some("proj1")).await;

    assert!(!report.healthy);
    let project = &report.projects[0];
    assert_eq!(project.project_ref, "proj1");
    let unhealthy: Vec<_> = project.services.iter().filter(|s| !s.healthy).collect();
    assert_eq!(unhealthy.len(), 1);
    assert_eq!(unhealthy[0].service, ServiceName::Realtime);
    assert!(unhealthy[0].error.as_deref().unwrap_or_default().contains("proj1"));
}

#[tokio::test]
async fn test_no_configured_projects_is_healthy() {
    let fx = two_projects();

    let report = fx.manager.health_check(None).await;

    assert!(report.healthy);
    assert!(report.projects.is_empty());
}

#[tokio::test]
async fn test_report_serializes_for_the_dashboard() {
    let fx = two_projects();
    fx.manager.configure_project_services("proj1").await;

    let report = fx.manager.health_check(None).await;
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["healthy"], true);
    assert_eq!(json["projects"][0]["project_ref"], "proj1");
}
