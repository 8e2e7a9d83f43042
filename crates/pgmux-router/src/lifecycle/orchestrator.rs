//! Project lifecycle orchestration
//!
//! Owns no state of its own: it composes the repository, the pool
//! registry, the service configuration manager, the database admin and the
//! pooling cache into the creation and deletion sagas.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pgmux_core::pooling::{CacheInvalidator, PoolingBackend, PoolingCacheInvalidation};
use pgmux_core::{CredentialResolver, EventSender, Project, ProjectRepository, ProjectStatus};
use tracing::{info, warn};

use super::admin::DatabaseAdmin;
use super::error::{LifecycleError, LifecycleResult};
use super::initializer::ProjectInitializer;
use crate::pool::{ConnectionInfo, DatabaseEndpoint, PoolRegistry};
use crate::services::ServiceConfigManager;

pub type SharedInvalidation = Arc<PoolingCacheInvalidation<Arc<dyn CacheInvalidator>>>;

/// Values the sagas need besides their collaborators
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub endpoint: DatabaseEndpoint,
    pub data_path: PathBuf,
    pub pooling_backend: PoolingBackend,
}

pub struct ProjectLifecycle {
    pub(super) projects: Arc<dyn ProjectRepository>,
    pub(super) registry: Arc<PoolRegistry>,
    pub(super) services: Arc<ServiceConfigManager>,
    pub(super) initializer: ProjectInitializer,
    pub(super) admin: Arc<dyn DatabaseAdmin>,
    pub(super) invalidation: SharedInvalidation,
    pub(super) resolver: CredentialResolver,
    pub(super) settings: LifecycleSettings,
    pub(super) events: EventSender,
}

impl ProjectLifecycle {
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        registry: Arc<PoolRegistry>,
        services: Arc<ServiceConfigManager>,
        admin: Arc<dyn DatabaseAdmin>,
        invalidation: SharedInvalidation,
        resolver: CredentialResolver,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            initializer: ProjectInitializer::new(Arc::clone(&registry)),
            projects,
            registry,
            services,
            admin,
            invalidation,
            resolver,
            settings,
            events: EventSender::detached(),
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.initializer = self.initializer.with_events(events.clone());
        self.events = events;
        self
    }

    pub fn initializer(&self) -> &ProjectInitializer {
        &self.initializer
    }

    pub fn data_path(&self) -> &Path {
        &self.settings.data_path
    }

    /// How the registry reaches this project's database. Legacy projects
    /// without their own role connect with the default credentials.
    pub fn connection_info(&self, project: &Project) -> ConnectionInfo {
        let credentials = self.resolver.resolve(
            &project.project_ref,
            project.database_user.as_deref(),
            project.database_password.as_deref(),
        );
        self.settings
            .endpoint
            .connection_info(&project.database_name, &credentials)
    }

    pub(super) async fn load_project(&self, project_ref: &str) -> LifecycleResult<Project> {
        self.projects
            .get(project_ref)
            .await
            .map_err(LifecycleError::repository)?
            .ok_or_else(|| LifecycleError::ProjectNotFound(project_ref.to_string()))
    }

    pub(super) async fn set_status(&self, project_ref: &str, status: ProjectStatus) -> LifecycleResult<()> {
        self.projects
            .set_status(project_ref, status)
            .await
            .map_err(LifecycleError::repository)
    }

    /// Other projects whose database or role is `database_name` / `database_user`
    pub(super) async fn projects_sharing_names(
        &self,
        project_ref: &str,
        database_name: &str,
        database_user: Option<&str>,
    ) -> LifecycleResult<Vec<Project>> {
        let projects = self.projects.list().await.map_err(LifecycleError::repository)?;
        Ok(projects
            .into_iter()
            .filter(|p| p.project_ref != project_ref)
            .filter(|p| {
                p.database_name == database_name
                    || (database_user.is_some() && p.database_user.as_deref() == database_user)
            })
            .collect())
    }

    /// Register pools and configure services for every active project.
    /// Returns the refs that came up; failures are logged and skipped.
    pub async fn restore_active_projects(&self) -> LifecycleResult<Vec<String>> {
        let projects = self
            .projects
            .list_by_status(ProjectStatus::Active)
            .await
            .map_err(LifecycleError::repository)?;

        let mut restored = Vec::with_capacity(projects.len());
        for project in projects {
            let project_ref = project.project_ref.clone();
            if let Err(e) = self
                .registry
                .register_project(&project_ref, self.connection_info(&project))
                .await
            {
                warn!("[Lifecycle] Could not register {}: {}", project_ref, e);
                continue;
            }

            let result = self.services.configure_project_services(&project_ref).await;
            if !result.success {
                warn!(
                    project_ref = %project_ref,
                    errors = result.errors.len(),
                    "[Lifecycle] Project restored with service configuration errors"
                );
            }
            restored.push(project_ref);
        }

        info!("[Lifecycle] Restored {} active projects", restored.len());
        Ok(restored)
    }
}
