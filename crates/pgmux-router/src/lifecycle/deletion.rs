//! Project deletion saga
//!
//! Every step but the last is best effort. Only removing the project
//! record decides whether the deletion succeeded.

use pgmux_core::pooling::InvalidationOptions;
use pgmux_core::{is_valid_project_ref, DomainEvent, ProjectStatus};
use tracing::{info, instrument, warn};

use super::directories::delete_project_directories;
use super::error::{LifecycleError, LifecycleResult};
use super::orchestrator::ProjectLifecycle;
use super::saga::{Saga, SagaReport, StepPolicy};

pub const STEP_MARK_DELETING: &str = "mark_deleting";
pub const STEP_REMOVE_SERVICE_CONFIG: &str = "remove_service_config";
pub const STEP_UNREGISTER_POOL: &str = "unregister_pool";
pub const STEP_DELETE_DIRECTORIES: &str = "delete_directories";
pub const STEP_DROP_ROLE: &str = "drop_role";
pub const STEP_DROP_DATABASE: &str = "drop_database";
pub const STEP_DELETE_RECORD: &str = "delete_record";

impl ProjectLifecycle {
    /// Tear a project down. `Err` only when the project cannot be resolved
    /// at all; otherwise the report says what happened, and
    /// `report.success()` reflects whether the record is gone.
    #[instrument(level = "debug", skip(self), fields(project_ref = %project_ref))]
    pub async fn delete_project(&self, project_ref: &str) -> LifecycleResult<SagaReport> {
        if !is_valid_project_ref(project_ref) {
            return Err(LifecycleError::InvalidProjectRef(project_ref.to_string()));
        }
        let project = self.load_project(project_ref).await?;
        let defaults = self.resolver.defaults();
        let sharing = self
            .projects_sharing_names(
                project_ref,
                &project.database_name,
                project.database_user.as_deref(),
            )
            .await?;
        let role_shared = sharing
            .iter()
            .any(|p| p.database_user.is_some() && p.database_user == project.database_user);
        let database_shared = sharing
            .iter()
            .any(|p| p.database_name == project.database_name);
        if !sharing.is_empty() {
            warn!(
                project_ref = %project_ref,
                shared_with = ?sharing.iter().map(|p| p.project_ref.as_str()).collect::<Vec<_>>(),
                "[Lifecycle] Keeping database resources still owned by other projects"
            );
        }
        let data_path = self.data_path().to_path_buf();

        let report = Saga::new("delete_project", project_ref)
            .step(STEP_MARK_DELETING, StepPolicy::Continue, async {
                self.set_status(project_ref, ProjectStatus::Deleting).await
            })
            .step(STEP_REMOVE_SERVICE_CONFIG, StepPolicy::Continue, async {
                self.services.remove_project_service_config(project_ref);
                Ok(())
            })
            .step(STEP_UNREGISTER_POOL, StepPolicy::Continue, async {
                let forced = self.registry.unregister_project(project_ref).await;
                if forced > 0 {
                    warn!(
                        "[Lifecycle] {} operations on {} were force-closed",
                        forced, project_ref
                    );
                }
                Ok(())
            })
            .step(STEP_DELETE_DIRECTORIES, StepPolicy::Continue, async {
                delete_project_directories(project_ref, &data_path).await?;
                Ok(())
            })
            .step(STEP_DROP_ROLE, StepPolicy::Continue, async {
                match project.database_user.as_deref() {
                    // The default admin role is shared by legacy projects
                    Some(user) if user != defaults.user && !role_shared => {
                        self.admin.drop_role(user).await
                    }
                    _ => Ok(()),
                }
            })
            .step(STEP_DROP_DATABASE, StepPolicy::Continue, async {
                if database_shared {
                    return Ok(());
                }
                self.admin.drop_database(&project.database_name).await
            })
            .step(STEP_DELETE_RECORD, StepPolicy::Abort, async {
                match self.projects.delete(project_ref).await {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(LifecycleError::ProjectNotFound(project_ref.to_string())),
                    Err(e) => Err(LifecycleError::repository(e)),
                }
            })
            .run()
            .await;

        if !report.success() {
            warn!(
                project_ref = %project_ref,
                "[Lifecycle] Project record could not be deleted"
            );
            return Ok(report);
        }

        let invalidated = self
            .invalidation
            .invalidate_all(
                project_ref,
                self.settings.pooling_backend,
                InvalidationOptions::default(),
            )
            .await;

        let failed_steps = report.failed_steps();
        info!(
            project_ref = %project_ref,
            failed_steps = ?failed_steps,
            invalidated_keys = invalidated.len(),
            "[Lifecycle] Deleted project"
        );
        self.events.emit(DomainEvent::ProjectDeleted {
            project_ref: project_ref.to_string(),
            failed_steps,
        });
        Ok(report)
    }
}
