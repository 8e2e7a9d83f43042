//! Service Configuration Manager
//!
//! Keeps every project's auxiliary services pointed at its database with
//! the right credentials. Each service is configured independently: one
//! rejection is recorded against that service and never blocks the others.
//!
//! State machine per (project, service):
//! `Unconfigured → Configuring → Configured`, `Configuring → Failed`.
//! `Failed` sticks until a later configuration run succeeds.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use pgmux_core::{
    AuthFailureLog, AuthFailureLogEntry, CredentialResolver, DomainEvent, EventSender,
    ProjectRepository, ProjectServiceConfig, ServiceConfig, ServiceName,
};
use serde::{Serialize, Serializer};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::client::{ServiceClient, ServiceCredentials};

/// Which service an error belongs to; `All` when the project itself failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceTarget {
    All,
    Service(ServiceName),
}

impl ServiceTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Service(service) => service.as_str(),
        }
    }
}

impl fmt::Display for ServiceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ServiceTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One service's rejection, captured in a result rather than thrown
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceConfigurationError {
    pub service: ServiceTarget,
    pub error: String,
}

/// Outcome of one configuration run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigureResult {
    /// True only if every service configured cleanly
    pub success: bool,
    pub updated_services: Vec<ServiceName>,
    pub errors: Vec<ServiceConfigurationError>,
}

impl ConfigureResult {
    fn project_failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            updated_services: Vec::new(),
            errors: vec![ServiceConfigurationError {
                service: ServiceTarget::All,
                error: error.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub service: ServiceName,
    pub healthy: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectHealth {
    pub project_ref: String,
    /// True only if every service is healthy
    pub healthy: bool,
    pub services: Vec<ServiceHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub projects: Vec<ProjectHealth>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceCounts {
    pub configured: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceStats {
    pub configured_projects: usize,
    pub services: BTreeMap<ServiceName, ServiceCounts>,
}

pub struct ServiceConfigManager {
    projects: Arc<dyn ProjectRepository>,
    resolver: CredentialResolver,
    clients: Vec<Arc<dyn ServiceClient>>,
    configs: DashMap<String, ProjectServiceConfig>,
    /// Serializes configuration runs per (project, service)
    service_locks: DashMap<(String, ServiceName), Arc<Mutex<()>>>,
    failures: Arc<AuthFailureLog>,
    events: EventSender,
}

impl ServiceConfigManager {
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        resolver: CredentialResolver,
        clients: Vec<Arc<dyn ServiceClient>>,
        failures: Arc<AuthFailureLog>,
    ) -> Self {
        Self {
            projects,
            resolver,
            clients,
            configs: DashMap::new(),
            service_locks: DashMap::new(),
            failures,
            events: EventSender::detached(),
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    fn service_lock(&self, project_ref: &str, service: ServiceName) -> Arc<Mutex<()>> {
        self.service_locks
            .entry((project_ref.to_string(), service))
            .or_default()
            .clone()
    }

    fn update_service<F>(&self, project_ref: &str, service: ServiceName, f: F)
    where
        F: FnOnce(&mut ServiceConfig),
    {
        if let Some(mut config) = self.configs.get_mut(project_ref) {
            f(config.service_mut(service));
        }
    }

    /// Resolve credentials and push them to every service concurrently
    #[instrument(level = "debug", skip(self), fields(project_ref = %project_ref))]
    pub async fn configure_project_services(&self, project_ref: &str) -> ConfigureResult {
        let project = match self.projects.get(project_ref).await {
            Ok(Some(project)) => project,
            Ok(None) => {
                warn!("[ServiceConfig] Project {} not found", project_ref);
                return ConfigureResult::project_failed(format!("project {} not found", project_ref));
            }
            Err(e) => {
                warn!("[ServiceConfig] Failed to load project {}: {:#}", project_ref, e);
                return ConfigureResult::project_failed(format!("failed to load project: {:#}", e));
            }
        };

        let credentials = self.resolver.resolve(
            project_ref,
            project.database_user.as_deref(),
            project.database_password.as_deref(),
        );
        if credentials.is_fallback {
            warn!(
                project_ref = %project_ref,
                user = %credentials.user,
                "[ServiceConfig] Project has no credentials of its own, using default admin credentials"
            );
            self.events.emit(DomainEvent::FallbackCredentialsUsed {
                project_ref: project_ref.to_string(),
            });
        }

        {
            let mut record = self
                .configs
                .entry(project_ref.to_string())
                .or_insert_with(|| {
                    ProjectServiceConfig::new(project_ref, &credentials.user, &project.database_name)
                });
            record.database_user = credentials.user.clone();
            record.database_name = project.database_name.clone();
            record.using_fallback_credentials = credentials.is_fallback;
        }

        let service_credentials = ServiceCredentials {
            database_user: credentials.user.clone(),
            database_password: credentials.password.clone(),
            database_name: project.database_name.clone(),
        };

        let outcomes = join_all(
            self.clients
                .iter()
                .map(|client| self.configure_one(project_ref, client.as_ref(), &service_credentials)),
        )
        .await;

        let mut result = ConfigureResult::default();
        for outcome in outcomes {
            match outcome {
                Ok(service) => result.updated_services.push(service),
                Err(error) => result.errors.push(error),
            }
        }
        result.success = result.errors.is_empty();

        info!(
            project_ref = %project_ref,
            updated = result.updated_services.len(),
            failed = result.errors.len(),
            "[ServiceConfig] Configuration run finished"
        );
        result
    }

    async fn configure_one(
        &self,
        project_ref: &str,
        client: &dyn ServiceClient,
        credentials: &ServiceCredentials,
    ) -> Result<ServiceName, ServiceConfigurationError> {
        let service = client.service();
        let lock = self.service_lock(project_ref, service);
        let _guard = lock.lock().await;

        self.update_service(project_ref, service, ServiceConfig::begin);

        match client.configure(project_ref, credentials).await {
            Ok(()) => {
                self.update_service(project_ref, service, ServiceConfig::mark_configured);
                debug!("[ServiceConfig] {} configured for {}", service, project_ref);
                self.events.emit(DomainEvent::ServiceConfigured {
                    project_ref: project_ref.to_string(),
                    service,
                });
                Ok(service)
            }
            Err(e) => {
                let error = e.to_string();
                self.update_service(project_ref, service, |config| config.mark_failed(error.clone()));
                self.failures.append(AuthFailureLogEntry {
                    project_ref: project_ref.to_string(),
                    service,
                    timestamp: Utc::now(),
                    error: error.clone(),
                    database_user: credentials.database_user.clone(),
                });
                warn!(
                    project_ref = %project_ref,
                    service = %service,
                    error = %error,
                    "[ServiceConfig] Service rejected configuration"
                );
                self.events.emit(DomainEvent::ServiceConfigurationFailed {
                    project_ref: project_ref.to_string(),
                    service,
                    error: error.clone(),
                });
                Err(ServiceConfigurationError {
                    service: ServiceTarget::Service(service),
                    error,
                })
            }
        }
    }

    /// `None` when the project no longer resolves or was never configured
    pub async fn get_project_service_config(&self, project_ref: &str) -> Option<ProjectServiceConfig> {
        match self.projects.get(project_ref).await {
            Ok(Some(_)) => {}
            Ok(None) => return None,
            Err(e) => {
                warn!("[ServiceConfig] Failed to resolve project {}: {:#}", project_ref, e);
                return None;
            }
        }
        self.configs.get(project_ref).map(|c| c.value().clone())
    }

    pub fn remove_project_service_config(&self, project_ref: &str) {
        if self.configs.remove(project_ref).is_some() {
            debug!("[ServiceConfig] Removed configuration for {}", project_ref);
        }
        // A lock still cloned by a running configuration stays, or the next
        // run would get a fresh mutex and interleave with it
        self.service_locks
            .retain(|(r, _), lock| r != project_ref || Arc::strong_count(lock) > 1);
    }

    pub fn configured_projects(&self) -> Vec<String> {
        let mut refs: Vec<String> = self.configs.iter().map(|e| e.key().clone()).collect();
        refs.sort();
        refs
    }

    pub fn get_auth_failure_logs(&self, project_ref: &str, limit: usize) -> Vec<AuthFailureLogEntry> {
        self.failures.for_project(project_ref, limit)
    }

    pub fn get_all_auth_failure_logs(&self, limit: usize) -> Vec<AuthFailureLogEntry> {
        self.failures.recent(limit)
    }

    /// Probe every service of one project, or of every configured project
    pub async fn health_check(&self, project_ref: Option<&str>) -> HealthReport {
        let refs = match project_ref {
            Some(r) => vec![r.to_string()],
            None => self.configured_projects(),
        };

        let projects = join_all(refs.iter().map(|r| self.probe_project(r))).await;
        let healthy = projects.iter().all(|p| p.healthy);
        if !healthy {
            let unhealthy: Vec<&str> = projects
                .iter()
                .filter(|p| !p.healthy)
                .map(|p| p.project_ref.as_str())
                .collect();
            warn!(?unhealthy, "[ServiceConfig] Health check found unhealthy projects");
        }
        HealthReport { healthy, projects }
    }

    async fn probe_project(&self, project_ref: &str) -> ProjectHealth {
        let services = join_all(self.clients.iter().map(|client| async move {
            match client.probe(project_ref).await {
                Ok(()) => ServiceHealth {
                    service: client.service(),
                    healthy: true,
                    error: None,
                },
                Err(e) => ServiceHealth {
                    service: client.service(),
                    healthy: false,
                    error: Some(e.to_string()),
                },
            }
        }))
        .await;

        ProjectHealth {
            project_ref: project_ref.to_string(),
            healthy: services.iter().all(|s| s.healthy),
            services,
        }
    }

    pub fn get_stats(&self) -> ServiceStats {
        let mut services: BTreeMap<ServiceName, ServiceCounts> = ServiceName::ALL
            .into_iter()
            .map(|s| (s, ServiceCounts::default()))
            .collect();

        for entry in self.configs.iter() {
            for (name, config) in &entry.value().services {
                let counts = services.entry(*name).or_default();
                if config.is_configured() {
                    counts.configured += 1;
                } else if config.is_failed() {
                    counts.failed += 1;
                }
            }
        }

        ServiceStats {
            configured_projects: self.configs.len(),
            services,
        }
    }

    /// Drop all in-memory state
    pub fn reset(&self) {
        self.configs.clear();
        self.service_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        self.failures.clear();
    }
}
