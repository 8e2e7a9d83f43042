//! Project creation saga
//!
//! ```text
//! insert_record → create_role → create_database → register_pool
//!   → initialize_schemas → create_directories → configure_services
//!   → activate
//! ```
//!
//! Any abort compensates the completed steps newest first and leaves the
//! record behind with status `failed` for the operator to inspect.

use pgmux_core::{is_valid_project_ref, CredentialSet, DomainEvent, Project, ProjectStatus};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::admin::quote_identifier;
use super::directories::{create_project_directories, delete_project_directories};
use super::error::{LifecycleError, LifecycleResult};
use super::orchestrator::ProjectLifecycle;
use super::saga::{Saga, SagaReport, StepPolicy};

pub const STEP_INSERT_RECORD: &str = "insert_record";
pub const STEP_CREATE_ROLE: &str = "create_role";
pub const STEP_CREATE_DATABASE: &str = "create_database";
pub const STEP_REGISTER_POOL: &str = "register_pool";
pub const STEP_INITIALIZE_SCHEMAS: &str = "initialize_schemas";
pub const STEP_CREATE_DIRECTORIES: &str = "create_directories";
pub const STEP_CONFIGURE_SERVICES: &str = "configure_services";
pub const STEP_ACTIVATE: &str = "activate";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectRequest {
    pub project_ref: String,
    pub name: String,
    pub owner_user_id: Option<String>,
}

impl CreateProjectRequest {
    pub fn new(project_ref: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project_ref: project_ref.into(),
            name: name.into(),
            owner_user_id: None,
        }
    }

    pub fn with_owner(mut self, owner_user_id: impl Into<String>) -> Self {
        self.owner_user_id = Some(owner_user_id.into());
        self
    }
}

/// `proj-1` → `proj_1`, so derived names are plain identifiers
fn identifier_stem(project_ref: &str) -> String {
    project_ref.to_ascii_lowercase().replace('-', "_")
}

pub fn database_name_for(project_ref: &str) -> String {
    format!("db_{}", identifier_stem(project_ref))
}

pub fn database_user_for(project_ref: &str) -> String {
    format!("{}_user", identifier_stem(project_ref))
}

fn generate_password() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

impl ProjectLifecycle {
    /// Provision a project end to end. `Err` only for requests rejected
    /// before anything was created; otherwise the report tells what
    /// happened.
    #[instrument(level = "debug", skip(self, request), fields(project_ref = %request.project_ref))]
    pub async fn create_project(&self, request: CreateProjectRequest) -> LifecycleResult<SagaReport> {
        let project_ref = request.project_ref.as_str();
        if !is_valid_project_ref(project_ref) {
            return Err(LifecycleError::InvalidProjectRef(project_ref.to_string()));
        }
        if self
            .projects
            .get(project_ref)
            .await
            .map_err(LifecycleError::repository)?
            .is_some()
        {
            return Err(LifecycleError::ProjectExists(project_ref.to_string()));
        }

        let database_name = database_name_for(project_ref);
        let database_user = database_user_for(project_ref);
        quote_identifier(&database_name)?;
        quote_identifier(&database_user)?;
        // Refs differing only in case or `-`/`_` derive the same names
        if let Some(owner) = self
            .projects_sharing_names(project_ref, &database_name, Some(&database_user))
            .await?
            .into_iter()
            .next()
        {
            let name = if owner.database_name == database_name {
                database_name
            } else {
                database_user
            };
            return Err(LifecycleError::NameConflict {
                project_ref: project_ref.to_string(),
                name,
                owner: owner.project_ref,
            });
        }

        let mut project = Project::new(project_ref, &database_name)
            .with_name(&request.name)
            .with_credentials(&database_user, generate_password());
        if let Some(owner) = &request.owner_user_id {
            project = project.with_owner(owner);
        }

        let credentials = CredentialSet {
            user: database_user.clone(),
            password: project.database_password.clone().unwrap_or_default(),
            is_fallback: false,
        };
        let connection_info = self
            .settings
            .endpoint
            .connection_info(&database_name, &credentials);
        let data_path = self.data_path().to_path_buf();
        let project = &project;

        let report = Saga::new("create_project", project_ref)
            .step(STEP_INSERT_RECORD, StepPolicy::Abort, async {
                self.projects
                    .create(project)
                    .await
                    .map_err(LifecycleError::repository)
            })
            .compensated_step(
                STEP_CREATE_ROLE,
                StepPolicy::Abort,
                async { self.admin.create_role(&credentials.user, &credentials.password).await },
                async { self.admin.drop_role(&credentials.user).await },
            )
            .compensated_step(
                STEP_CREATE_DATABASE,
                StepPolicy::Abort,
                async {
                    self.admin
                        .create_database(&database_name, &credentials.user)
                        .await
                },
                async { self.admin.drop_database(&database_name).await },
            )
            .compensated_step(
                STEP_REGISTER_POOL,
                StepPolicy::Abort,
                async {
                    self.registry
                        .register_project(project_ref, connection_info.clone())
                        .await?;
                    Ok(())
                },
                async {
                    self.registry.unregister_project(project_ref).await;
                    Ok(())
                },
            )
            .step(STEP_INITIALIZE_SCHEMAS, StepPolicy::Abort, async {
                let result = self
                    .initializer
                    .initialize_project(project_ref, &database_name)
                    .await;
                if result.success {
                    return Ok(());
                }
                self.initializer
                    .rollback_initialization(project_ref, &database_name)
                    .await;
                result.into_result().map(|_| ())
            })
            .compensated_step(
                STEP_CREATE_DIRECTORIES,
                StepPolicy::Abort,
                async {
                    create_project_directories(project_ref, &data_path).await?;
                    Ok(())
                },
                async {
                    delete_project_directories(project_ref, &data_path).await?;
                    Ok(())
                },
            )
            .step(STEP_CONFIGURE_SERVICES, StepPolicy::Continue, async {
                let result = self.services.configure_project_services(project_ref).await;
                if result.success {
                    return Ok(());
                }
                let errors: Vec<String> = result
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.service, e.error))
                    .collect();
                Err(LifecycleError::ServiceConfiguration(errors.join("; ")))
            })
            .step(STEP_ACTIVATE, StepPolicy::Abort, async {
                self.set_status(project_ref, ProjectStatus::Active).await
            })
            .run()
            .await;

        if !report.success() {
            // The record stays so the failure is visible; services must not
            // keep a configuration for a project that never came up.
            self.services.remove_project_service_config(project_ref);
            if let Err(e) = self.set_status(project_ref, ProjectStatus::Failed).await {
                warn!("[Lifecycle] Could not mark {} as failed: {}", project_ref, e);
            }
            warn!(
                project_ref = %project_ref,
                aborted_at = ?report.aborted_at,
                "[Lifecycle] Project creation aborted"
            );
            return Ok(report);
        }

        info!(
            project_ref = %project_ref,
            database = %database_name,
            failed_steps = ?report.failed_steps(),
            "[Lifecycle] Created project"
        );
        self.events.emit(DomainEvent::ProjectCreated {
            project_ref: project_ref.to_string(),
        });
        Ok(report)
    }
}
