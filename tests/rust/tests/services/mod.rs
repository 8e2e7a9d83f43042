//! Service configuration manager tests

mod health;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use pgmux_core::{
    AuthFailureLog, CredentialResolver, DefaultCredentials, DomainEvent, EventBus,
    ProjectRepository, ServiceName, ServiceState,
};
use pgmux_router::services::{ServiceConfigManager, ServiceTarget};
use pretty_assertions::assert_eq;
use tests::events::{count_of, drain};
use tests::mocks::as_clients;
use tests::projects::{active_project, legacy_project};
use tests::settings::{DEFAULT_PASSWORD, DEFAULT_USER};
use tests::{MockProjectRepository, MockServiceClient};

pub struct ManagerFixture {
    pub repo: Arc<MockProjectRepository>,
    pub clients: Vec<Arc<MockServiceClient>>,
    pub failures: Arc<AuthFailureLog>,
    pub bus: EventBus,
    pub manager: ServiceConfigManager,
}

impl ManagerFixture {
    pub fn new(repo: MockProjectRepository) -> Self {
        let repo = Arc::new(repo);
        let clients = MockServiceClient::all();
        let failures = Arc::new(AuthFailureLog::new(100));
        let bus = EventBus::new();
        let manager = ServiceConfigManager::new(
            Arc::clone(&repo) as Arc<dyn ProjectRepository>,
            CredentialResolver::new(DefaultCredentials::new(DEFAULT_USER, DEFAULT_PASSWORD)),
            as_clients(&clients),
            Arc::clone(&failures),
        )
        .with_events(bus.sender());
        Self {
            repo,
            clients,
            failures,
            bus,
            manager,
        }
    }

    pub fn client(&self, service: ServiceName) -> &Arc<MockServiceClient> {
        let index = ServiceName::ALL
            .iter()
            .position(|s| *s == service)
            .expect("known service");
        &self.clients[index]
    }
}

#[tokio::test]
async fn test_all_services_configured() {
    let fx = ManagerFixture::new(MockProjectRepository::new().with_project(active_project("proj1")));

    let result = fx.manager.configure_project_services("proj1").await;

    assert!(result.success);
    assert_eq!(result.updated_services.len(), 4);
    assert!(result.errors.is_empty());

    let config = fx.manager.get_project_service_config("proj1").await.unwrap();
    assert_eq!(config.database_user, "proj1_user");
    assert_eq!(config.database_name, "db_proj1");
    assert!(!config.using_fallback_credentials);
    assert!(config.services.values().all(|s| s.state == ServiceState::Configured));
    for client in &fx.clients {
        assert_eq!(client.calls(), vec![("proj1".to_string(), "proj1_user".to_string())]);
    }
}

#[tokio::test]
async fn test_one_failing_service_does_not_block_the_others() {
    let fx = ManagerFixture::new(MockProjectRepository::new().with_project(active_project("proj1")));
    fx.client(ServiceName::Storage).set_failing(true);

    let result = fx.manager.configure_project_services("proj1").await;

    assert!(!result.success);
    assert_eq!(
        result.updated_services,
        vec![ServiceName::Gotrue, ServiceName::Realtime, ServiceName::Postgrest]
    );
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].service, ServiceTarget::Service(ServiceName::Storage));
    assert!(result.errors[0].error.contains("password authentication failed"));

    let config = fx.manager.get_project_service_config("proj1").await.unwrap();
    let storage = config.service(ServiceName::Storage).unwrap();
    assert_eq!(storage.state, ServiceState::Failed);
    assert_eq!(storage.error_count, 1);
    assert!(storage.last_error.is_some());
    assert!(config.service(ServiceName::Gotrue).unwrap().is_configured());
}

#[tokio::test]
async fn test_failed_service_recovers_on_next_run() {
    let fx = ManagerFixture::new(MockProjectRepository::new().with_project(active_project("proj1")));
    fx.client(ServiceName::Realtime).set_failing(true);
    fx.manager.configure_project_services("proj1").await;

    fx.client(ServiceName::Realtime).set_failing(false);
    let result = fx.manager.configure_project_services("proj1").await;

    assert!(result.success);
    let config = fx.manager.get_project_service_config("proj1").await.unwrap();
    let realtime = config.service(ServiceName::Realtime).unwrap();
    assert!(realtime.is_configured());
    assert_eq!(realtime.last_error, None);
    assert_eq!(realtime.error_count, 1);
}

#[tokio::test]
async fn test_missing_project_fails_as_a_whole() {
    let fx = ManagerFixture::new(MockProjectRepository::new());

    let result = fx.manager.configure_project_services("ghost").await;

    assert!(!result.success);
    assert!(result.updated_services.is_empty());
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].service, ServiceTarget::All);
    assert!(result.errors[0].error.contains("not found"));
    assert!(fx.clients.iter().all(|c| c.calls().is_empty()));
    assert!(fx.manager.configured_projects().is_empty());
}

#[tokio::test]
async fn test_repository_failure_is_reported_not_raised() {
    let repo = MockProjectRepository::new().with_project(active_project("proj1"));
    repo.set_fail_reads(true);
    let fx = ManagerFixture::new(repo);

    let result = fx.manager.configure_project_services("proj1").await;

    assert!(!result.success);
    assert_eq!(result.errors[0].service, ServiceTarget::All);
    assert!(result.errors[0].error.contains("platform database unavailable"));
}

#[tokio::test]
async fn test_legacy_project_uses_fallback_credentials() {
    let fx = ManagerFixture::new(MockProjectRepository::new().with_project(legacy_project("old")));
    let mut rx = fx.bus.subscribe();

    let result = fx.manager.configure_project_services("old").await;

    assert!(result.success);
    let config = fx.manager.get_project_service_config("old").await.unwrap();
    assert!(config.using_fallback_credentials);
    assert_eq!(config.database_user, DEFAULT_USER);
    assert_eq!(
        fx.client(ServiceName::Gotrue).calls(),
        vec![("old".to_string(), DEFAULT_USER.to_string())]
    );

    let events = drain(&mut rx);
    assert_eq!(count_of(&events, "fallback_credentials_used"), 1);
    assert_eq!(count_of(&events, "service_configured"), 4);
}

#[tokio::test]
async fn test_projects_are_isolated() {
    let fx = ManagerFixture::new(
        MockProjectRepository::new()
            .with_project(active_project("proj1"))
            .with_project(active_project("proj2")),
    );
    fx.client(ServiceName::Postgrest).set_failing(true);
    fx.manager.configure_project_services("proj1").await;
    fx.client(ServiceName::Postgrest).set_failing(false);
    fx.manager.configure_project_services("proj2").await;

    let proj1 = fx.manager.get_project_service_config("proj1").await.unwrap();
    let proj2 = fx.manager.get_project_service_config("proj2").await.unwrap();
    assert!(proj1.service(ServiceName::Postgrest).unwrap().is_failed());
    assert!(proj2.service(ServiceName::Postgrest).unwrap().is_configured());
    assert_eq!(proj2.database_user, "proj2_user");

    fx.manager.remove_project_service_config("proj1");
    assert!(fx.manager.get_project_service_config("proj1").await.is_none());
    assert!(fx.manager.get_project_service_config("proj2").await.is_some());
}

#[tokio::test]
async fn test_config_hidden_once_project_is_gone() {
    let fx = ManagerFixture::new(MockProjectRepository::new().with_project(active_project("proj1")));
    fx.manager.configure_project_services("proj1").await;
    fx.repo.delete("proj1").await.unwrap();

    assert!(fx.manager.get_project_service_config("proj1").await.is_none());
}

#[tokio::test]
async fn test_failure_log_is_newest_first() {
    let fx = ManagerFixture::new(
        MockProjectRepository::new()
            .with_project(active_project("proj1"))
            .with_project(active_project("proj2")),
    );
    fx.client(ServiceName::Gotrue).set_failing(true);

    fx.manager.configure_project_services("proj1").await;
    fx.manager.configure_project_services("proj2").await;
    fx.manager.configure_project_services("proj1").await;

    let proj1 = fx.manager.get_auth_failure_logs("proj1", 10);
    assert_eq!(proj1.len(), 2);
    assert!(proj1[0].timestamp >= proj1[1].timestamp);
    assert!(proj1.iter().all(|e| e.service == ServiceName::Gotrue));
    assert!(proj1.iter().all(|e| e.database_user == "proj1_user"));

    let all = fx.manager.get_all_auth_failure_logs(10);
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].project_ref, "proj1");
    assert_eq!(all[1].project_ref, "proj2");

    assert_eq!(fx.manager.get_all_auth_failure_logs(1).len(), 1);
    assert_eq!(fx.failures.len(), 3);
}

#[tokio::test]
async fn test_failure_events_are_emitted() {
    let fx = ManagerFixture::new(MockProjectRepository::new().with_project(active_project("proj1")));
    fx.client(ServiceName::Storage).set_failing(true);
    let mut rx = fx.bus.subscribe();

    fx.manager.configure_project_services("proj1").await;

    let events = drain(&mut rx);
    let failed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            DomainEvent::ServiceConfigurationFailed { service, .. } => Some(*service),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![ServiceName::Storage]);
    assert_eq!(count_of(&events, "service_configured"), 3);
}

#[tokio::test]
async fn test_concurrent_runs_serialize_per_service() {
    let fx = Arc::new(ManagerFixture::new(
        MockProjectRepository::new().with_project(active_project("proj1")),
    ));
    for client in &fx.clients {
        client.set_delay(Duration::from_millis(20));
    }

    let runs = (0..3).map(|_| {
        let fx = Arc::clone(&fx);
        async move { fx.manager.configure_project_services("proj1").await }
    });
    let results = join_all(runs).await;

    assert!(results.iter().all(|r| r.success));
    for client in &fx.clients {
        assert_eq!(client.calls().len(), 3);
        assert_eq!(client.max_in_flight(), 1, "{:?}", client.calls());
    }
}

#[tokio::test]
async fn test_removal_during_a_run_keeps_runs_serialized() {
    let fx = ManagerFixture::new(MockProjectRepository::new().with_project(active_project("proj1")));
    for client in &fx.clients {
        client.set_delay(Duration::from_millis(100));
    }

    let first = fx.manager.configure_project_services("proj1");
    let second = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        fx.manager.remove_project_service_config("proj1");
        fx.manager.configure_project_services("proj1").await
    };
    let (first, second) = tokio::join!(first, second);

    assert!(first.success && second.success);
    for client in &fx.clients {
        assert_eq!(client.calls().len(), 2);
        assert_eq!(client.max_in_flight(), 1, "{:?}", client.calls());
    }
}

#[tokio::test]
async fn test_services_of_one_project_run_concurrently() {
    let fx = ManagerFixture::new(MockProjectRepository::new().with_project(active_project("proj1")));
    for client in &fx.clients {
        client.set_delay(Duration::from_millis(100));
    }

    let started = tokio::time::Instant::now();
    let result = fx.manager.configure_project_services("proj1").await;

    assert!(result.success);
    assert!(started.elapsed() < Duration::from_millis(350));
}

#[tokio::test]
async fn test_stats_count_states() {
    let fx = ManagerFixture::new(
        MockProjectRepository::new()
            .with_project(active_project("proj1"))
            .with_project(active_project("proj2")),
    );
    fx.client(ServiceName::Storage).set_failing(true);
    fx.manager.configure_project_services("proj1").await;
    fx.client(ServiceName::Storage).set_failing(false);
    fx.manager.configure_project_services("proj2").await;

    let stats = fx.manager.get_stats();

    assert_eq!(stats.configured_projects, 2);
    assert_eq!(stats.services[&ServiceName::Storage].configured, 1);
    assert_eq!(stats.services[&ServiceName::Storage].failed, 1);
    assert_eq!(stats.services[&ServiceName::Gotrue].configured, 2);
    assert_eq!(stats.services[&ServiceName::Gotrue].failed, 0);
}

#[tokio::test]
async fn test_reset_clears_everything() {
    let fx = ManagerFixture::new(MockProjectRepository::new().with_project(active_project("proj1")));
    fx.client(ServiceName::Gotrue).set_failing(true);
    fx.manager.configure_project_services("proj1").await;

    fx.manager.reset();

    assert!(fx.manager.configured_projects().is_empty());
    assert!(fx.manager.get_all_auth_failure_logs(10).is_empty());
    assert_eq!(fx.manager.get_stats().configured_projects, 0);
}
