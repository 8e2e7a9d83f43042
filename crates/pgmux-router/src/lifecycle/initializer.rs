//! Project schema initialization and rollback

use std::sync::Arc;

use pgmux_core::{DomainEvent, EventSender};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::error::LifecycleError;
use super::saga::{Saga, StepPolicy, TeardownReport};
use crate::error::RouterError;
use crate::pool::{PoolRegistry, ProjectConnection};

/// One platform schema and how to create and drop it
#[derive(Debug, Clone, Copy)]
pub struct SchemaScript {
    pub name: &'static str,
    pub create: &'static str,
    pub drop: &'static str,
}

/// Created in this order, dropped in reverse
pub const SCHEMA_SCRIPTS: [SchemaScript; 4] = [
    SchemaScript {
        name: "auth",
        create: include_str!("sql/auth.sql"),
        drop: "DROP SCHEMA IF EXISTS auth CASCADE",
    },
    SchemaScript {
        name: "storage",
        create: include_str!("sql/storage.sql"),
        drop: "DROP SCHEMA IF EXISTS storage CASCADE",
    },
    SchemaScript {
        name: "webhooks",
        create: include_str!("sql/webhooks.sql"),
        drop: "DROP SCHEMA IF EXISTS webhooks CASCADE",
    },
    SchemaScript {
        name: "analytics",
        create: include_str!("sql/analytics.sql"),
        drop: "DROP SCHEMA IF EXISTS analytics CASCADE",
    },
];

#[derive(Debug, Clone, Serialize)]
pub struct InitializationResult {
    pub success: bool,
    pub project_ref: String,
    pub database_name: String,
    /// Schemas actually created, in order
    pub schemas_created: Vec<String>,
    pub error: Option<String>,
}

impl InitializationResult {
    /// `PartialInitializationFailure` when the run did not complete
    pub fn into_result(self) -> Result<Vec<String>, LifecycleError> {
        if self.success {
            Ok(self.schemas_created)
        } else {
            Err(LifecycleError::PartialInitializationFailure {
                schemas_created: self.schemas_created,
                error: self.error.unwrap_or_default(),
            })
        }
    }
}

/// Creates and drops the platform schemas through the project's own pool
pub struct ProjectInitializer {
    registry: Arc<PoolRegistry>,
    events: EventSender,
}

impl ProjectInitializer {
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        Self {
            registry,
            events: EventSender::detached(),
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    /// Run every schema script, each in its own transaction. A failure stops
    /// the run and is reported in the result together with the schemas that
    /// were created before it.
    #[instrument(level = "debug", skip(self), fields(project_ref = %project_ref))]
    pub async fn initialize_project(&self, project_ref: &str, database_name: &str) -> InitializationResult {
        let mut result = InitializationResult {
            success: false,
            project_ref: project_ref.to_string(),
            database_name: database_name.to_string(),
            schemas_created: Vec::new(),
            error: None,
        };

        for script in SCHEMA_SCRIPTS {
            let sql = script.create;
            let outcome: Result<(), RouterError> = self
                .registry
                .with_transaction(project_ref, move |conn: &mut ProjectConnection| {
                    Box::pin(async move { conn.execute_script(sql).await })
                })
                .await;

            match outcome {
                Ok(()) => result.schemas_created.push(script.name.to_string()),
                Err(e) => {
                    warn!(
                        project_ref = %project_ref,
                        schema = script.name,
                        created = ?result.schemas_created,
                        error = %e,
                        "[Lifecycle] Schema initialization failed"
                    );
                    result.error = Some(e.to_string());
                    return result;
                }
            }
        }

        result.success = true;
        info!(
            project_ref = %project_ref,
            database = %database_name,
            "[Lifecycle] Initialized project schemas"
        );
        self.events.emit(DomainEvent::ProjectInitialized {
            project_ref: project_ref.to_string(),
            schemas: result.schemas_created.clone(),
        });
        result
    }

    /// Drop every platform schema, newest first. Each drop is its own step;
    /// failures are logged and the rest still run.
    #[instrument(level = "debug", skip(self), fields(project_ref = %project_ref))]
    pub async fn rollback_initialization(&self, project_ref: &str, database_name: &str) -> TeardownReport {
        let mut saga = Saga::new("rollback_initialization", project_ref);
        for script in SCHEMA_SCRIPTS.iter().rev() {
            saga = saga.step(script.name, StepPolicy::Continue, self.drop_schema(project_ref, script.drop));
        }
        let report = saga.run().await;

        info!(
            project_ref = %project_ref,
            database = %database_name,
            failed = ?report.failed_steps(),
            "[Lifecycle] Rolled back project schemas"
        );
        report
    }

    async fn drop_schema(&self, project_ref: &str, sql: &'static str) -> Result<(), LifecycleError> {
        self.registry.execute_script(project_ref, sql).await?;
        Ok(())
    }
}
